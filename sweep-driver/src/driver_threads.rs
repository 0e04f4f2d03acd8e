use crate::error::SweepError;
use crate::event::Event;
use crate::sensor::{check_request, Sensor};
use crate::serial::SerialTransport;
use crate::store::{FinishedScan, ScanStore};
use crossbeam_channel::{select, tick, Receiver, Sender};
use crossbeam_utils::atomic::AtomicCell;
use log::{error, info};
use serialport::SerialPort;
use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use sweep_data::{PoseCorrection, Scan, SessionState};

/// Requests forwarded to the thread that owns the sensor.
pub(crate) enum Control {
    Run(u8, u8),
    Stop,
    CorrectPose(PoseCorrection),
    CaptureReference,
}

/// Session status published by the dispatcher thread.
#[derive(Default)]
pub(crate) struct DriverStatus {
    state: AtomicCell<SessionState>,
    last_error_flags: AtomicCell<u8>,
    last_error: Mutex<Option<String>>,
}

impl DriverStatus {
    fn publish<T: crate::transport::Transport>(&self, sensor: &Sensor<T>) {
        self.last_error_flags.store(sensor.last_error_flags());
        let state = sensor.state();
        if self.state.swap(state) != state {
            let message = sensor.last_error().map(|e| e.to_string());
            *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = message;
        }
    }
}

/// Handle to a running driver.
///
/// The sensor is powered off and the threads are joined when this is dropped.
pub struct SweepDriver {
    pub(crate) control_tx: Sender<Control>,
    pub(crate) reader_terminator_tx: Sender<bool>,
    pub(crate) dispatcher_terminator_tx: Sender<bool>,
    pub(crate) reader_thread: Option<JoinHandle<()>>,
    pub(crate) dispatcher_thread: Option<JoinHandle<()>>,
    pub(crate) status: Arc<DriverStatus>,
    pub(crate) store: Arc<ScanStore>,
}

impl SweepDriver {
    fn control(&self, control: Control) -> Result<(), SweepError> {
        self.control_tx
            .send(control)
            .map_err(|_| SweepError::Disconnected)
    }

    /// Starts, restarts or reconfigures acquisition.
    /// Out-of-range arguments are rejected here and never reach the sensor.
    pub fn request_run(&self, sweep_rate: u8, sample_mode: u8) -> Result<(), SweepError> {
        check_request(sweep_rate, sample_mode)?;
        self.control(Control::Run(sweep_rate, sample_mode))
    }

    pub fn request_stop(&self) -> Result<(), SweepError> {
        self.control(Control::Stop)
    }

    /// Corrects the last finished scan and the pose source.
    pub fn apply_correction(&self, correction: PoseCorrection) -> Result<(), SweepError> {
        self.control(Control::CorrectPose(correction))
    }

    /// Rebuilds the ignore mask from the next full revolution. The robot should
    /// be standing well clear of obstacles.
    pub fn capture_reference(&self) -> Result<(), SweepError> {
        self.control(Control::CaptureReference)
    }

    pub fn state(&self) -> SessionState {
        self.status.state.load()
    }

    pub fn last_error_flags(&self) -> u8 {
        self.status.last_error_flags.load()
    }

    /// Description of the error behind the current `Error` state.
    pub fn last_error(&self) -> Option<String> {
        self.status
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn finished_scan(&self) -> FinishedScan<'_> {
        self.store.finished_scan()
    }

    pub fn snapshot(&self) -> Scan {
        self.store.snapshot()
    }

    pub fn store(&self) -> Arc<ScanStore> {
        self.store.clone()
    }
}

pub(crate) fn read_device_signal(
    port: &mut Box<dyn SerialPort>,
    chunk_tx: Sender<Vec<u8>>,
    reader_terminator_rx: Receiver<bool>,
) {
    let mut buffer = [0u8; 256];
    loop {
        if do_terminate(&reader_terminator_rx) {
            return;
        }

        let n_read = match port.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                error!("Failed to read from the sensor: {e}");
                return;
            }
        };
        if n_read == 0 {
            continue;
        }
        if chunk_tx.send(buffer[..n_read].to_vec()).is_err() {
            // dispatcher is gone
            return;
        }
    }
}

fn apply_control<T: crate::transport::Transport>(sensor: &mut Sensor<T>, control: Control) {
    match control {
        Control::Run(sweep_rate, sample_mode) => {
            if let Err(e) = sensor.request_run(sweep_rate, sample_mode) {
                error!("{e}");
            }
        }
        Control::Stop => sensor.request_stop(),
        Control::CorrectPose(correction) => sensor.apply_correction(&correction),
        Control::CaptureReference => sensor.capture_reference(),
    }
}

pub(crate) fn dispatch(
    mut sensor: Sensor<SerialTransport>,
    chunk_rx: Receiver<Vec<u8>>,
    control_rx: Receiver<Control>,
    dispatcher_terminator_rx: Receiver<bool>,
    tick_period: Duration,
    status: Arc<DriverStatus>,
) {
    let ticker = tick(tick_period);
    loop {
        select! {
            recv(chunk_rx) -> chunk => match chunk {
                Ok(data) => {
                    sensor.transport_mut().receive(&data);
                    while let Some(event) = sensor.transport_mut().next_event() {
                        sensor.handle(event);
                    }
                }
                Err(_) => {
                    error!("Serial reader stopped");
                    break;
                }
            },
            recv(ticker) -> _ => sensor.handle(Event::Tick),
            recv(control_rx) -> control => match control {
                Ok(control) => apply_control(&mut sensor, control),
                Err(_) => break,
            },
            recv(dispatcher_terminator_rx) -> _ => break,
        }
        status.publish(&sensor);
    }
    sensor.request_stop();
    status.publish(&sensor);
    info!("Sweep dispatcher stopped");
}

pub(crate) fn do_terminate(terminator_rx: &Receiver<bool>) -> bool {
    terminator_rx.try_recv().unwrap_or(false)
}

/// Function to join driver threads.
/// This function is automatically called when `driver` is dropped.
pub fn join(driver: &mut SweepDriver) {
    // either thread may already have exited
    let _ = driver.dispatcher_terminator_tx.send(true);
    let _ = driver.reader_terminator_tx.send(true);

    if let Some(thread) = driver.dispatcher_thread.take() {
        if thread.join().is_err() {
            error!("Sweep dispatcher thread panicked");
        }
    }
    if let Some(thread) = driver.reader_thread.take() {
        if thread.join().is_err() {
            error!("Serial reader thread panicked");
        }
    }
}

impl Drop for SweepDriver {
    fn drop(&mut self) {
        join(self);
    }
}
