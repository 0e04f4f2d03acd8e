mod command;
mod config;
mod constants;
mod driver_threads;
mod error;
mod event;
mod geometry;
mod numeric;
mod occlusion;
mod packet;
mod pose;
mod sensor;
mod serial;
mod store;
mod time;
mod transport;

pub use crate::config::{DriverConfig, Timing};
pub use crate::constants::PACKET_SIZE;
use crate::driver_threads::{dispatch, read_device_signal, DriverStatus};
pub use crate::driver_threads::{join, SweepDriver};
pub use crate::error::SweepError;
pub use crate::event::Event;
pub use crate::geometry::{ang_from_degrees, ang_to_degrees, SinTable, ANG_1PER16_DEG, ANG_90_DEG};
pub use crate::occlusion::{IgnoreMask, OcclusionConfig, OcclusionFilter, ReferenceSweep};
pub use crate::pose::{PoseSource, SharedPose};
pub use crate::sensor::Sensor;
use crate::sensor::check_request;
use crate::serial::open_port;
pub use crate::serial::SerialTransport;
pub use crate::store::{FinishedScan, ScanStore};
pub use crate::transport::Transport;
use crossbeam_channel::{bounded, unbounded};
use log::info;
use std::sync::Arc;
pub use sweep_data::{Pose, PoseCorrection, Sample, Scan, SessionState, SLOTS_PER_SCAN};

/// Function to launch the Sweep driver.
/// # Arguments
///
/// * `port_name` - Serial port name such as `/dev/ttyUSB0`.
/// * `config` - Session configuration. Acquisition is requested right away with
///   its sweep rate and sample mode.
/// * `pose` - Robot pose estimate the scans are projected with.
pub fn run_driver(
    port_name: &str,
    config: DriverConfig,
    pose: Arc<dyn PoseSource>,
) -> Result<SweepDriver, SweepError> {
    check_request(config.sweep_rate, config.sample_mode)?;

    let port = open_port(port_name, config.baud_rate)?;
    let mut reader_port = port.try_clone()?;

    let store = Arc::new(ScanStore::new());
    let status = Arc::new(DriverStatus::default());
    let sensor = Sensor::new(
        SerialTransport::new(port),
        pose,
        store.clone(),
        config.timing.clone(),
        config.occlusion.clone(),
    );

    let (reader_terminator_tx, reader_terminator_rx) = bounded(10);
    let (dispatcher_terminator_tx, dispatcher_terminator_rx) = bounded(10);
    let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(200);
    let (control_tx, control_rx) = unbounded();

    let reader_thread = Some(std::thread::spawn(move || {
        read_device_signal(&mut reader_port, chunk_tx, reader_terminator_rx);
    }));

    let tick_period = config.tick_period;
    let dispatcher_status = status.clone();
    let dispatcher_thread = Some(std::thread::spawn(move || {
        dispatch(
            sensor,
            chunk_rx,
            control_rx,
            dispatcher_terminator_rx,
            tick_period,
            dispatcher_status,
        );
    }));
    info!("Sweep driver started on {}", port_name);

    let driver = SweepDriver {
        control_tx,
        reader_terminator_tx,
        dispatcher_terminator_tx,
        reader_thread,
        dispatcher_thread,
        status,
        store,
    };
    driver.request_run(config.sweep_rate, config.sample_mode)?;
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver_threads::do_terminate;
    use crate::packet::encode_packet;
    use crate::time::sleep_ms;
    use crossbeam_channel::Receiver;
    use serialport::{SerialPort, TTYPort};
    use std::io::{Read, Write};
    use std::time::Duration;

    fn test_config() -> DriverConfig {
        DriverConfig {
            timing: Timing {
                power_settle_ticks: 5,
                first_poll_ticks: 5,
                repoll_ticks: 5,
                post_config_poll_ticks: 5,
                reply_timeout_ticks: 500,
            },
            occlusion: OcclusionConfig::disabled(),
            ..DriverConfig::default()
        }
    }

    fn wait_for(timeout_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..timeout_ms / 10 {
            if condition() {
                return true;
            }
            sleep_ms(10);
        }
        condition()
    }

    // Answers every command like a sensor with a stabilized motor. After the
    // start acknowledge, `revolution` is streamed once.
    fn fake_sensor(mut master: TTYPort, revolution: Vec<u8>, terminator_rx: Receiver<bool>) {
        master.set_timeout(Duration::from_millis(10)).unwrap();
        let mut pending = Vec::new();
        let mut buffer = [0u8; 64];
        while !do_terminate(&terminator_rx) {
            if let Ok(n) = master.read(&mut buffer) {
                pending.extend_from_slice(&buffer[..n]);
            }
            while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                let command: Vec<u8> = pending.drain(..=end).collect();
                match &command[..2] {
                    b"MZ" => master.write_all(b"MZ00").unwrap(),
                    b"MS" | b"LR" => {
                        master.write_all(&command).unwrap();
                        master.write_all(b"00P\n").unwrap();
                    }
                    b"DS" => {
                        // streaming starts right behind the acknowledge
                        master
                            .write_all(&[&b"DS00P\n"[..], &revolution[..]].concat())
                            .unwrap();
                    }
                    _ => (),
                }
            }
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DriverConfig {
            sweep_rate: 6,
            ..DriverConfig::default()
        };
        let pose = Arc::new(SharedPose::default());
        assert!(matches!(
            run_driver("/dev/null", config, pose),
            Err(SweepError::InvalidConfigRequest(6, 2))
        ));
    }

    #[test]
    fn test_run_driver() {
        let (master, slave) = TTYPort::pair().expect("Unable to create ptty pair");
        let name = slave.name().unwrap();

        let pose = Arc::new(SharedPose::new(Pose::new(0, 0, 0)));
        let mut revolution = Vec::new();
        revolution.extend(encode_packet(0x01, 0, 100));
        revolution.extend(encode_packet(0x00, 90 * 16, 100));
        revolution.extend(encode_packet(0x00, 180 * 16, 1));
        revolution.extend(encode_packet(0x01, 0, 200));

        let (sensor_terminator_tx, sensor_terminator_rx) = bounded(1);
        let sensor_thread = std::thread::spawn(move || {
            fake_sensor(master, revolution, sensor_terminator_rx);
        });

        let driver = run_driver(&name, test_config(), pose.clone()).unwrap();
        assert!(wait_for(3000, || driver.snapshot().id == 1));
        assert_eq!(driver.state(), SessionState::Running);
        assert_eq!(driver.last_error(), None);

        {
            let scan = driver.finished_scan();
            assert_eq!(scan.n_valid(), 2);
            assert!((scan.samples[0].y - 1000).abs() <= 1);
            assert!((scan.samples[180].x - 1000).abs() <= 1);
            assert!(!scan.samples[360].valid);
        }

        driver
            .apply_correction(PoseCorrection {
                dang: 0,
                dx: 5,
                dy: 0,
            })
            .unwrap();
        assert!(wait_for(1000, || pose.current_pose() == Pose::new(5, 0, 0)));
        let scan = driver.snapshot();
        assert_eq!(scan.pose_at_end, Pose::new(5, 0, 0));
        assert!((scan.samples[180].x - 1005).abs() <= 1);

        assert!(matches!(
            driver.request_run(0, 1),
            Err(SweepError::InvalidConfigRequest(0, 1))
        ));
        driver.request_stop().unwrap();
        assert!(wait_for(1000, || driver.state() == SessionState::Off));

        drop(driver);
        sensor_terminator_tx.send(true).unwrap();
        sensor_thread.join().unwrap();
    }
}
