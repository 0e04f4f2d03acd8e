#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// State of the sensor session, as driven by the protocol state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SessionState {
    /// Driver never initialized.
    #[default]
    Uninit,
    /// Sensor power is off.
    Off,
    /// Power enabled, waiting for the sensor to boot.
    WaitPowered,
    /// Polling until the motor settles at its power-on speed, before configuring.
    PreconfWaitReady,
    /// Motor speed command sent.
    Conf1,
    /// Sample rate command sent.
    Conf2,
    /// Polling until the motor settles at the configured speed.
    WaitReady,
    /// Start acquisition command sent.
    WaitStartAck,
    /// Streaming samples.
    Running,
    /// Stopping acquisition to apply new settings while powered.
    Reconfigure,
    /// Fatal fault. Only a new run or stop request leaves this state.
    Error,
}

impl SessionState {
    /// True while the configuration handshake is in progress.
    pub fn is_configuring(&self) -> bool {
        matches!(
            self,
            SessionState::WaitPowered
                | SessionState::PreconfWaitReady
                | SessionState::Conf1
                | SessionState::Conf2
                | SessionState::WaitReady
                | SessionState::WaitStartAck
                | SessionState::Reconfigure
        )
    }
}
