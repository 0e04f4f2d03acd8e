//! Protocol state machine of one sensor session.
//!
//! The configuration handshake is a chain of ASCII commands separated by timed
//! motor status polls:
//!
//! ```text
//! Off -> WaitPowered -> PreconfWaitReady -> Conf1 -> Conf2 -> WaitReady
//!     -> WaitStartAck -> Running
//! ```
//!
//! Once running, every packet is decoded into the scan store. A sync packet closes
//! the revolution. Any handshake failure, or too many bad packets, ends in `Error`
//! until the next run request.

use crate::command::{validate_reply, Command};
use crate::config::Timing;
use crate::constants::{
    FAULT_BUDGET, FAULT_PENALTY, MAX_SAMPLE_MODE, MAX_SWEEP_RATE, MIN_SAMPLE_MODE,
    MIN_SWEEP_RATE, MIN_VALID_LENGTH_CM, PACKET_SIZE,
};
use crate::error::SweepError;
use crate::event::Event;
use crate::geometry::{ang_from_16th_deg, SinTable};
use crate::occlusion::{OcclusionConfig, OcclusionFilter, ReferenceSweep};
use crate::packet::{slot_index, validate_packet, RawSample};
use crate::pose::{correct_scan, PoseSource};
use crate::store::ScanStore;
use crate::transport::Transport;
use log::{debug, info, warn};
use std::sync::Arc;
use sweep_data::{PoseCorrection, SessionState};

enum Capture {
    Idle,
    /// Waiting for the next revolution to start.
    Armed,
    Recording(ReferenceSweep),
}

pub struct Sensor<T: Transport> {
    transport: T,
    pose: Arc<dyn PoseSource>,
    store: Arc<ScanStore>,
    table: SinTable,
    occlusion: OcclusionFilter,
    timing: Timing,
    state: SessionState,
    sweep_rate: u8,
    sample_mode: u8,
    countdown: u32,
    pending: Option<Command>,
    reply_wait: u32,
    fault_penalty: u32,
    last_error: Option<SweepError>,
    last_error_flags: u8,
    revolution: u32,
    capture: Capture,
}

pub(crate) fn check_request(sweep_rate: u8, sample_mode: u8) -> Result<(), SweepError> {
    let rate_ok = (MIN_SWEEP_RATE..=MAX_SWEEP_RATE).contains(&sweep_rate);
    let mode_ok = (MIN_SAMPLE_MODE..=MAX_SAMPLE_MODE).contains(&sample_mode);
    if !rate_ok || !mode_ok {
        return Err(SweepError::InvalidConfigRequest(sweep_rate, sample_mode));
    }
    Ok(())
}

impl<T: Transport> Sensor<T> {
    pub fn new(
        transport: T,
        pose: Arc<dyn PoseSource>,
        store: Arc<ScanStore>,
        timing: Timing,
        occlusion: OcclusionConfig,
    ) -> Sensor<T> {
        Sensor {
            transport,
            pose,
            store,
            table: SinTable::new(),
            occlusion: OcclusionFilter::new(occlusion),
            timing,
            state: SessionState::Uninit,
            sweep_rate: 0,
            sample_mode: 0,
            countdown: 0,
            pending: None,
            reply_wait: 0,
            fault_penalty: 0,
            last_error: None,
            last_error_flags: 0,
            revolution: 0,
            capture: Capture::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Error that moved the session to `Error`, cleared by the next run request.
    pub fn last_error(&self) -> Option<&SweepError> {
        self.last_error.as_ref()
    }

    /// Status byte of the last packet rejected by checksum or error flags.
    pub fn last_error_flags(&self) -> u8 {
        self.last_error_flags
    }

    pub fn store(&self) -> &Arc<ScanStore> {
        &self.store
    }

    pub fn occlusion(&self) -> &OcclusionFilter {
        &self.occlusion
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Powers the sensor and (re)starts the handshake with a new configuration.
    ///
    /// An out-of-range request is rejected and changes nothing. A running session
    /// is stopped and reconfigured without a power cycle.
    pub fn request_run(&mut self, sweep_rate: u8, sample_mode: u8) -> Result<(), SweepError> {
        check_request(sweep_rate, sample_mode)?;
        self.sweep_rate = sweep_rate;
        self.sample_mode = sample_mode;
        self.last_error = None;
        self.pending = None;
        self.reply_wait = 0;
        if let Err(e) = self.transport.set_power(true) {
            warn!("Failed to power the sensor on: {e}");
        }

        if self.state == SessionState::Running {
            // the stop command goes out on the next tick
            self.countdown = 0;
            self.enter(SessionState::Reconfigure);
        } else {
            self.transport.stop_reception();
            self.fault_penalty = 0;
            self.countdown = self.timing.power_settle_ticks;
            self.enter(SessionState::WaitPowered);
        }
        Ok(())
    }

    /// Powers the sensor off and abandons the session.
    pub fn request_stop(&mut self) {
        self.transport.stop_reception();
        if let Err(e) = self.transport.set_power(false) {
            warn!("Failed to power the sensor off: {e}");
        }
        self.countdown = 0;
        self.pending = None;
        self.reply_wait = 0;
        self.fault_penalty = 0;
        self.capture = Capture::Idle;
        self.enter(SessionState::Off);
    }

    /// Records the next full revolution and rebuilds the ignore mask from it.
    pub fn capture_reference(&mut self) {
        info!("Reference sweep armed");
        self.capture = Capture::Armed;
    }

    /// Replaces the ignore mask with one learnt from a caller-supplied sweep.
    pub fn build_ignore_mask(&mut self, sweep: &ReferenceSweep) {
        self.occlusion.build_ignore_mask(sweep);
    }

    /// Corrects the last finished scan and the pose estimate.
    pub fn apply_correction(&mut self, correction: &PoseCorrection) {
        let table = &self.table;
        let corrected = self
            .store
            .with_finished(|scan| correct_scan(scan, correction, table));
        if corrected.is_none() {
            warn!("Finished scan held by a reader, correction applied to the pose only");
        }
        self.pose.apply_correction(correction);
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Tick => self.on_tick(),
            Event::Reply(reply) => self.on_reply(&reply),
            Event::Packet(packet) => self.on_packet(&packet),
        }
    }

    fn enter(&mut self, state: SessionState) {
        if self.state != state {
            info!("Sweep state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn fail(&mut self, err: SweepError) {
        warn!("Sweep session failed in {:?}: {}", self.state, err);
        self.transport.stop_reception();
        self.pending = None;
        self.last_error = Some(err);
        self.enter(SessionState::Error);
    }

    fn send(&mut self, command: Command) {
        debug!("Sending {:?}", command);
        self.pending = Some(command);
        self.reply_wait = 0;
        if let Err(e) = self
            .transport
            .send_command(&command.encode(), command.reply_len())
        {
            self.fail(e);
        }
    }

    fn count_down(&mut self) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        self.countdown == 0
    }

    fn reply_overdue(&mut self) -> bool {
        self.reply_wait += 1;
        self.reply_wait >= self.timing.reply_timeout_ticks
    }

    fn on_tick(&mut self) {
        match self.state {
            SessionState::WaitPowered => {
                if self.count_down() {
                    self.countdown = self.timing.first_poll_ticks;
                    self.enter(SessionState::PreconfWaitReady);
                }
            }
            SessionState::PreconfWaitReady | SessionState::WaitReady => {
                if self.pending.is_some() {
                    if self.reply_overdue() {
                        debug!("No motor status reply, polling again");
                        self.send(Command::MotorStatus);
                    }
                } else if self.count_down() {
                    self.send(Command::MotorStatus);
                }
            }
            SessionState::Reconfigure => {
                if self.pending.is_none() {
                    self.transport.stop_reception();
                    self.send(Command::StopAcquisition);
                } else if self.reply_overdue() {
                    self.fail(SweepError::TimeoutError());
                }
            }
            SessionState::Conf1 | SessionState::Conf2 | SessionState::WaitStartAck => {
                if self.pending.is_some() && self.reply_overdue() {
                    self.fail(SweepError::TimeoutError());
                }
            }
            SessionState::Uninit
            | SessionState::Off
            | SessionState::Running
            | SessionState::Error => (),
        }
    }

    fn on_reply(&mut self, reply: &[u8]) {
        let Some(command) = self.pending.take() else {
            debug!("Dropping unexpected reply in {:?}", self.state);
            return;
        };
        let checked = validate_reply(self.state, &command, reply);

        match self.state {
            SessionState::PreconfWaitReady => match checked {
                Ok(()) => {
                    self.enter(SessionState::Conf1);
                    self.send(Command::MotorSpeed(self.sweep_rate));
                }
                Err(_) => self.countdown = self.timing.repoll_ticks,
            },
            SessionState::Conf1 => match checked {
                Ok(()) => {
                    self.enter(SessionState::Conf2);
                    self.send(Command::SampleRate(self.sample_mode));
                }
                Err(e) => self.fail(e),
            },
            SessionState::Conf2 => match checked {
                Ok(()) => {
                    // the motor needs time to settle at the new speed
                    self.countdown = self.timing.post_config_poll_ticks;
                    self.enter(SessionState::WaitReady);
                }
                Err(e) => self.fail(e),
            },
            SessionState::WaitReady => match checked {
                Ok(()) => {
                    self.enter(SessionState::WaitStartAck);
                    self.send(Command::StartAcquisition);
                }
                Err(_) => self.countdown = self.timing.repoll_ticks,
            },
            SessionState::WaitStartAck => match checked {
                Ok(()) => {
                    if let Err(e) = self.transport.start_continuous() {
                        self.fail(e);
                        return;
                    }
                    self.fault_penalty = 0;
                    self.enter(SessionState::Running);
                }
                Err(e) => self.fail(e),
            },
            SessionState::Reconfigure => match checked {
                Ok(()) => {
                    self.countdown = self.timing.repoll_ticks;
                    self.enter(SessionState::PreconfWaitReady);
                }
                Err(e) => self.fail(e),
            },
            _ => debug!("Dropping reply in {:?}", self.state),
        }
    }

    fn on_packet(&mut self, packet: &[u8; PACKET_SIZE]) {
        if self.state != SessionState::Running {
            return;
        }

        let sample = match validate_packet(packet) {
            Ok(sample) => sample,
            Err(e) => {
                self.last_error_flags = packet[0];
                self.register_fault(e);
                return;
            }
        };
        self.fault_penalty = self.fault_penalty.saturating_sub(1);

        if sample.sync {
            self.finish_revolution();
        }

        match slot_index(sample.angle) {
            Ok(slot) => self.store_sample(slot, &sample),
            Err(e) => self.register_fault(e),
        }
    }

    fn register_fault(&mut self, err: SweepError) {
        self.fault_penalty += FAULT_PENALTY;
        if self.fault_penalty > FAULT_BUDGET {
            warn!("Fault budget exhausted");
            self.fail(err);
        } else {
            debug!("Discarding packet: {err}");
        }
    }

    fn finish_revolution(&mut self) {
        let pose = self.pose.current_pose();
        self.revolution = self.revolution.wrapping_add(1);
        self.store.swap(pose, self.revolution);
        debug!("Revolution {} started", self.revolution);

        match std::mem::replace(&mut self.capture, Capture::Idle) {
            Capture::Idle => (),
            Capture::Armed => self.capture = Capture::Recording(ReferenceSweep::new()),
            Capture::Recording(sweep) => self.occlusion.build_ignore_mask(&sweep),
        }
    }

    fn store_sample(&mut self, slot: usize, sample: &RawSample) {
        let length_cm = sample.distance as i32;
        if length_cm < MIN_VALID_LENGTH_CM {
            // no return: only the flag changes
            let stored = self
                .store
                .with_acquiring(|scan| scan.samples[slot].valid = false);
            if stored.is_none() {
                debug!("Scan buffer held by a reader, sample at slot {} dropped", slot);
            }
            return;
        }
        let length = length_cm * 10;

        if let Capture::Recording(sweep) = &mut self.capture {
            sweep.record(slot, length.min(u16::MAX as i32) as u16);
        }

        let pose = self.pose.current_pose();
        let heading = pose.ang.wrapping_add(ang_from_16th_deg(sample.angle));
        let (dx, dy) = self.table.polar_to_xy(heading, length);
        let valid = self.occlusion.accepts(slot, length);

        let stored = self.store.with_acquiring(|scan| {
            let s = &mut scan.samples[slot];
            s.valid = valid;
            s.x = pose.x + dx;
            s.y = pose.y + dy;
        });
        if stored.is_none() {
            debug!("Scan buffer held by a reader, sample at slot {} dropped", slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encode_packet;
    use crate::pose::SharedPose;
    use crate::transport::mock::MockTransport;
    use sweep_data::{Pose, Sample};

    fn test_timing() -> Timing {
        Timing {
            power_settle_ticks: 2,
            first_poll_ticks: 1,
            repoll_ticks: 1,
            post_config_poll_ticks: 1,
            reply_timeout_ticks: 3,
        }
    }

    fn make_sensor(
        occlusion: OcclusionConfig,
    ) -> (Sensor<MockTransport>, Arc<SharedPose>, Arc<ScanStore>) {
        let pose = Arc::new(SharedPose::default());
        let store = Arc::new(ScanStore::new());
        let sensor = Sensor::new(
            MockTransport::default(),
            pose.clone(),
            store.clone(),
            test_timing(),
            occlusion,
        );
        (sensor, pose, store)
    }

    fn reply(sensor: &mut Sensor<MockTransport>, data: &[u8]) {
        sensor.handle(Event::Reply(data.to_vec()));
    }

    fn tick(sensor: &mut Sensor<MockTransport>, n: usize) {
        for _ in 0..n {
            sensor.handle(Event::Tick);
        }
    }

    fn packet(sensor: &mut Sensor<MockTransport>, status: u8, angle: u16, distance: u16) {
        sensor.handle(Event::Packet(encode_packet(status, angle, distance)));
    }

    fn run_to_running(sensor: &mut Sensor<MockTransport>) {
        sensor.request_run(2, 2).unwrap();
        tick(sensor, 3);
        reply(sensor, b"MZ00");
        reply(sensor, b"MS02\n00P\n");
        reply(sensor, b"LR02\n00P\n");
        tick(sensor, 1);
        reply(sensor, b"MZ00");
        reply(sensor, b"DS00P\n");
        assert_eq!(sensor.state(), SessionState::Running);
    }

    #[test]
    fn test_invalid_request_changes_nothing() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        sensor.request_stop();
        for (rate, mode) in [(0, 2), (6, 2), (2, 0), (2, 4)] {
            assert!(matches!(
                sensor.request_run(rate, mode),
                Err(SweepError::InvalidConfigRequest(r, m)) if r == rate && m == mode
            ));
            assert_eq!(sensor.state(), SessionState::Off);
        }
        assert!(!sensor.transport().powered);
        assert!(sensor.transport().sent.is_empty());
    }

    #[test]
    fn test_handshake() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        assert_eq!(sensor.state(), SessionState::Uninit);

        sensor.request_run(2, 2).unwrap();
        assert!(sensor.transport().powered);
        assert_eq!(sensor.state(), SessionState::WaitPowered);

        tick(&mut sensor, 1);
        assert_eq!(sensor.state(), SessionState::WaitPowered);
        tick(&mut sensor, 1);
        assert_eq!(sensor.state(), SessionState::PreconfWaitReady);
        assert!(sensor.transport().sent.is_empty());

        tick(&mut sensor, 1);
        assert_eq!(sensor.transport().last_sent(), Some(&b"MZ\n"[..]));
        assert_eq!(sensor.transport().reply_lens.last(), Some(&4));

        reply(&mut sensor, b"MZ00");
        assert_eq!(sensor.state(), SessionState::Conf1);
        assert_eq!(sensor.transport().last_sent(), Some(&b"MS02\n"[..]));

        reply(&mut sensor, b"MS02\n00P\n");
        assert_eq!(sensor.state(), SessionState::Conf2);
        assert_eq!(sensor.transport().last_sent(), Some(&b"LR02\n"[..]));

        reply(&mut sensor, b"LR02\n00P\n");
        assert_eq!(sensor.state(), SessionState::WaitReady);

        tick(&mut sensor, 1);
        assert_eq!(sensor.transport().last_sent(), Some(&b"MZ\n"[..]));
        reply(&mut sensor, b"MZ00");
        assert_eq!(sensor.state(), SessionState::WaitStartAck);
        assert_eq!(sensor.transport().last_sent(), Some(&b"DS\n"[..]));
        assert_eq!(sensor.transport().continuous_starts, 0);

        reply(&mut sensor, b"DS00P\n");
        assert_eq!(sensor.state(), SessionState::Running);
        assert_eq!(sensor.transport().continuous_starts, 1);

        // ticks while running send nothing
        let n_sent = sensor.transport().sent.len();
        tick(&mut sensor, 10);
        assert_eq!(sensor.transport().sent.len(), n_sent);
        assert_eq!(sensor.transport().continuous_starts, 1);
    }

    #[test]
    fn test_motor_not_ready_polls_again() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        sensor.request_run(1, 1).unwrap();
        tick(&mut sensor, 3);
        assert_eq!(sensor.transport().sent.len(), 1);

        reply(&mut sensor, b"MZ01");
        assert_eq!(sensor.state(), SessionState::PreconfWaitReady);
        tick(&mut sensor, 1);
        assert_eq!(sensor.transport().sent.len(), 2);
        assert_eq!(sensor.transport().last_sent(), Some(&b"MZ\n"[..]));

        reply(&mut sensor, b"MZ00");
        assert_eq!(sensor.state(), SessionState::Conf1);
        assert_eq!(sensor.transport().last_sent(), Some(&b"MS01\n"[..]));
    }

    #[test]
    fn test_mismatch_at_config_step_fails() {
        let scripts: [&[&[u8]]; 3] = [
            &[b"MZ00", b"MS02\n01Q\n"],
            &[b"MZ00", b"MS02\n00P\n", b"LR03\n00P\n"],
            &[b"MZ00", b"MS02\n00P\n", b"LR02\n00P\n", b"MZ00", b"DS11P\n"],
        ];
        for script in scripts {
            let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
            sensor.request_run(2, 2).unwrap();
            tick(&mut sensor, 3);
            for (i, data) in script.iter().enumerate() {
                if i == 3 {
                    // post-configuration poll
                    tick(&mut sensor, 1);
                }
                reply(&mut sensor, data);
            }
            assert_eq!(sensor.state(), SessionState::Error);
            assert!(matches!(
                sensor.last_error(),
                Some(SweepError::ProtocolMismatch { .. })
            ));
            assert_eq!(sensor.transport().continuous_starts, 0);
        }
    }

    #[test]
    fn test_reply_timeout() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        sensor.request_run(2, 2).unwrap();
        tick(&mut sensor, 3);

        // unanswered polls are repeated
        tick(&mut sensor, 3);
        assert_eq!(sensor.transport().sent.len(), 2);
        assert_eq!(sensor.state(), SessionState::PreconfWaitReady);

        reply(&mut sensor, b"MZ00");
        assert_eq!(sensor.state(), SessionState::Conf1);
        tick(&mut sensor, 2);
        assert_eq!(sensor.state(), SessionState::Conf1);
        tick(&mut sensor, 1);
        assert_eq!(sensor.state(), SessionState::Error);
        assert!(matches!(
            sensor.last_error(),
            Some(SweepError::TimeoutError())
        ));
    }

    #[test]
    fn test_run_after_error_restarts() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        sensor.request_run(2, 2).unwrap();
        tick(&mut sensor, 3);
        reply(&mut sensor, b"MZ00");
        reply(&mut sensor, b"XXXXXXXXX");
        assert_eq!(sensor.state(), SessionState::Error);

        // replies are ignored in Error
        reply(&mut sensor, b"MS02\n00P\n");
        assert_eq!(sensor.state(), SessionState::Error);

        sensor.request_run(2, 2).unwrap();
        assert_eq!(sensor.state(), SessionState::WaitPowered);
        assert!(sensor.last_error().is_none());
        run_to_running(&mut sensor);
    }

    #[test]
    fn test_stop() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);
        let stops = sensor.transport().stops;
        sensor.request_stop();
        assert_eq!(sensor.state(), SessionState::Off);
        assert!(!sensor.transport().powered);
        assert_eq!(sensor.transport().stops, stops + 1);

        // packets are ignored once stopped
        packet(&mut sensor, 0x01, 0, 100);
        assert_eq!(sensor.revolution, 0);
    }

    #[test]
    fn test_reconfigure_while_running() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);
        let stops = sensor.transport().stops;

        sensor.request_run(3, 1).unwrap();
        assert_eq!(sensor.state(), SessionState::Reconfigure);

        // packets still in flight are not decoded
        packet(&mut sensor, 0x01, 0, 100);
        assert_eq!(sensor.revolution, 0);

        tick(&mut sensor, 1);
        assert_eq!(sensor.transport().stops, stops + 1);
        assert_eq!(sensor.transport().last_sent(), Some(&b"DX\n"[..]));
        assert_eq!(sensor.transport().reply_lens.last(), Some(&6));

        reply(&mut sensor, b"DX00P\n");
        assert_eq!(sensor.state(), SessionState::PreconfWaitReady);
        tick(&mut sensor, 1);
        assert_eq!(sensor.transport().last_sent(), Some(&b"MZ\n"[..]));
        reply(&mut sensor, b"MZ00");
        assert_eq!(sensor.transport().last_sent(), Some(&b"MS03\n"[..]));
        reply(&mut sensor, b"MS03\n00P\n");
        assert_eq!(sensor.transport().last_sent(), Some(&b"LR01\n"[..]));
    }

    #[test]
    fn test_decode_sample() {
        let (mut sensor, _, store) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        packet(&mut sensor, 0x00, 0, 10);
        let (valid, x, y) = store
            .with_acquiring(|scan| (scan.samples[0].valid, scan.samples[0].x, scan.samples[0].y))
            .unwrap();
        assert!(valid);
        assert!(x.abs() <= 1);
        assert!((y - 100).abs() <= 1);

        // 90 degrees clockwise of the heading
        packet(&mut sensor, 0x00, 90 * 16, 10);
        let (x, y) = store
            .with_acquiring(|scan| (scan.samples[180].x, scan.samples[180].y))
            .unwrap();
        assert!((x - 100).abs() <= 1);
        assert!(y.abs() <= 1);
    }

    #[test]
    fn test_decode_uses_pose() {
        let (mut sensor, pose, store) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);
        pose.set(Pose::new(1000, -500, crate::geometry::ANG_90_DEG));

        packet(&mut sensor, 0x00, 0, 10);
        let (x, y) = store
            .with_acquiring(|scan| (scan.samples[0].x, scan.samples[0].y))
            .unwrap();
        assert!((x - 1100).abs() <= 1);
        assert!((y + 500).abs() <= 1);
    }

    #[test]
    fn test_no_return_keeps_position() {
        let (mut sensor, _, store) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        packet(&mut sensor, 0x00, 40, 300);
        let before = store.with_acquiring(|scan| scan.samples[5]).unwrap();
        assert!(before.valid);

        packet(&mut sensor, 0x00, 40, 1);
        let after = store.with_acquiring(|scan| scan.samples[5]).unwrap();
        assert!(!after.valid);
        assert_eq!((after.x, after.y), (before.x, before.y));
    }

    #[test]
    fn test_held_buffer_drops_samples() {
        let (mut sensor, _, store) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        let held = store.finished_scan();
        // the held buffer becomes the acquiring one
        packet(&mut sensor, 0x01, 0, 100);
        packet(&mut sensor, 0x00, 40, 300);
        packet(&mut sensor, 0x00, 48, 1);
        assert_eq!(sensor.state(), SessionState::Running);
        assert!(!held.samples[0].valid);
        assert_eq!(held.samples[5], Sample::default());
        assert_eq!(held.samples[6], Sample::default());
        drop(held);

        packet(&mut sensor, 0x00, 40, 300);
        let stored = store.with_acquiring(|scan| scan.samples[5].valid).unwrap();
        assert!(stored);
    }

    #[test]
    fn test_body_samples_invalid() {
        let (mut sensor, _, store) = make_sensor(OcclusionConfig::default());
        run_to_running(&mut sensor);

        // 150 mm straight ahead is beyond the front limit, sideways it is not
        packet(&mut sensor, 0x00, 0, 15);
        packet(&mut sensor, 0x00, 90 * 16, 15);
        let (front, side) = store
            .with_acquiring(|scan| (scan.samples[0].valid, scan.samples[180].valid))
            .unwrap();
        assert!(front);
        assert!(!side);
    }

    #[test]
    fn test_fault_budget() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        let mut bad = encode_packet(0x00, 8, 100);
        bad[6] = bad[6].wrapping_add(1);
        for _ in 0..5 {
            sensor.handle(Event::Packet(bad));
            assert_eq!(sensor.state(), SessionState::Running);
        }
        assert_eq!(sensor.fault_penalty, 100);
        sensor.handle(Event::Packet(bad));
        assert_eq!(sensor.state(), SessionState::Error);
        assert!(matches!(
            sensor.last_error(),
            Some(SweepError::ChecksumMismatch(..))
        ));
    }

    #[test]
    fn test_good_packets_pay_back_faults() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        let mut bad = encode_packet(0x00, 8, 100);
        bad[6] = bad[6].wrapping_add(1);
        for _ in 0..5 {
            sensor.handle(Event::Packet(bad));
        }
        packet(&mut sensor, 0x00, 8, 100);
        assert_eq!(sensor.fault_penalty, 99);
        // 99 + 20 is over budget
        sensor.handle(Event::Packet(bad));
        assert_eq!(sensor.state(), SessionState::Error);
    }

    #[test]
    fn test_sensor_fault_flags() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        for _ in 0..6 {
            packet(&mut sensor, 0x02, 8, 100);
        }
        assert_eq!(sensor.state(), SessionState::Error);
        assert_eq!(sensor.last_error_flags(), 0x02);
        assert!(matches!(sensor.last_error(), Some(SweepError::SensorFault(0x02))));
    }

    #[test]
    fn test_angle_out_of_range() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        packet(&mut sensor, 0x00, 720 * 8, 100);
        assert_eq!(sensor.fault_penalty, 20);
        assert_eq!(sensor.state(), SessionState::Running);
        for _ in 0..5 {
            packet(&mut sensor, 0x00, 720 * 8, 100);
        }
        assert_eq!(sensor.state(), SessionState::Error);
        assert!(matches!(
            sensor.last_error(),
            Some(SweepError::AngleOutOfRange(5760))
        ));
    }

    #[test]
    fn test_sync_swaps_once() {
        let (mut sensor, pose, store) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        let at_sync = Pose::new(100, 200, 0);
        pose.set(at_sync);
        packet(&mut sensor, 0x01, 0, 100);
        assert_eq!(sensor.revolution, 1);
        assert_eq!(store.snapshot().pose_at_end, at_sync);

        let start = store.with_acquiring(|scan| (scan.id, scan.pose_at_start)).unwrap();
        assert_eq!(start, (1, at_sync));

        // the sync sample belongs to the new revolution
        let sync_sample = store.with_acquiring(|scan| scan.samples[0]).unwrap();
        assert!(sync_sample.valid);
        assert!((sync_sample.y - 1200).abs() <= 1);

        pose.set(Pose::new(300, 400, 0));
        for angle in [8, 16, 24] {
            packet(&mut sensor, 0x00, angle, 100);
        }
        assert_eq!(sensor.revolution, 1);
        assert_eq!(store.snapshot().pose_at_end, at_sync);

        packet(&mut sensor, 0x01, 0, 100);
        assert_eq!(sensor.revolution, 2);
        let finished = store.snapshot();
        assert_eq!(finished.id, 1);
        assert_eq!(finished.pose_at_start, at_sync);
        assert_eq!(finished.pose_at_end, Pose::new(300, 400, 0));
        assert!(finished.samples[1].valid);
    }

    #[test]
    fn test_capture_reference() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::default());
        run_to_running(&mut sensor);

        sensor.capture_reference();
        // not recorded: the revolution has not started yet
        packet(&mut sensor, 0x00, 50 * 8, 5);
        packet(&mut sensor, 0x01, 0, 500);
        packet(&mut sensor, 0x00, 10 * 8, 5);
        assert_eq!(sensor.occlusion().mask().n_ignored(), 0);
        packet(&mut sensor, 0x01, 0, 500);

        let mask = sensor.occlusion().mask();
        assert_eq!(mask.n_ignored(), 3);
        assert!(mask.is_ignored(9));
        assert!(mask.is_ignored(10));
        assert!(mask.is_ignored(11));
        assert!(!mask.is_ignored(50));

        // live samples in masked slots are dropped whatever their range
        packet(&mut sensor, 0x00, 10 * 8, 300);
        packet(&mut sensor, 0x00, 100 * 8, 300);
        let (masked, clear) = sensor
            .store()
            .with_acquiring(|scan| (scan.samples[10].valid, scan.samples[100].valid))
            .unwrap();
        assert!(!masked);
        assert!(clear);
    }

    #[test]
    fn test_caller_supplied_mask() {
        let (mut sensor, _, _) = make_sensor(OcclusionConfig::default());
        let mut sweep = ReferenceSweep::new();
        sweep.record(0, 20);
        sensor.build_ignore_mask(&sweep);
        let mask = sensor.occlusion().mask();
        assert!(mask.is_ignored(719));
        assert!(mask.is_ignored(0));
        assert!(mask.is_ignored(1));
        assert_eq!(mask.n_ignored(), 3);
    }

    #[test]
    fn test_apply_correction() {
        let (mut sensor, pose, store) = make_sensor(OcclusionConfig::disabled());
        run_to_running(&mut sensor);

        packet(&mut sensor, 0x01, 0, 100);
        packet(&mut sensor, 0x00, 8, 100);
        packet(&mut sensor, 0x01, 0, 100);
        let before = store.snapshot();

        sensor.apply_correction(&PoseCorrection {
            dang: 0,
            dx: 10,
            dy: -20,
        });
        let after = store.snapshot();
        assert_eq!(after.samples[1].x, before.samples[1].x + 10);
        assert_eq!(after.samples[1].y, before.samples[1].y - 20);
        assert_eq!(after.pose_at_end, Pose::new(10, -20, 0));
        assert_eq!(pose.current_pose(), Pose::new(10, -20, 0));
    }
}
