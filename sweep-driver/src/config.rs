use crate::occlusion::OcclusionConfig;
use std::time::Duration;

/// Timers of the configuration handshake, in ticks.
#[derive(Clone, Debug, PartialEq)]
pub struct Timing {
    /// Wait after power-on before the first contact.
    pub power_settle_ticks: u32,
    /// Wait before the first motor status poll.
    pub first_poll_ticks: u32,
    /// Wait between motor status polls while the motor is not stabilized.
    pub repoll_ticks: u32,
    /// Wait after configuring before polling the new motor speed.
    pub post_config_poll_ticks: u32,
    /// Time allowed for a reply.
    pub reply_timeout_ticks: u32,
}

impl Default for Timing {
    fn default() -> Self {
        // At the default 1 ms tick.
        Timing {
            power_settle_ticks: 2000,
            first_poll_ticks: 1000,
            repoll_ticks: 100,
            post_config_poll_ticks: 1000,
            reply_timeout_ticks: 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DriverConfig {
    pub baud_rate: u32,
    /// Revolutions per second, 1 to 5.
    pub sweep_rate: u8,
    /// Sample rate preset, 1 to 3.
    pub sample_mode: u8,
    pub tick_period: Duration,
    pub timing: Timing,
    pub occlusion: OcclusionConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        // 2 Hz with 750-800 samples/s gives 375-400 samples per revolution, which
        // never puts two samples into one half-degree slot.
        DriverConfig {
            baud_rate: 115200,
            sweep_rate: 2,
            sample_mode: 2,
            tick_period: Duration::from_millis(1),
            timing: Timing::default(),
            occlusion: OcclusionConfig::default(),
        }
    }
}
