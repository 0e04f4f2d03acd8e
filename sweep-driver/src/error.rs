use std::error::Error;
use std::fmt::{Debug, Display};
use std::{fmt, io};
use sweep_data::SessionState;

#[derive(Debug)]
pub enum SweepError {
    InvalidConfigRequest(u8, u8),
    ProtocolMismatch {
        state: SessionState,
        expected: String,
        actual: String,
    },
    ChecksumMismatch(u8, u8),
    SensorFault(u8),
    AngleOutOfRange(u16),
    TimeoutError(),
    Disconnected,
    SerialError(serialport::Error),
    IoError(io::Error),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SweepError::InvalidConfigRequest(rate, mode) => write!(
                f,
                "Sweep rate must be in 1..=5 and sample mode in 1..=3. Requested rate = {}, mode = {}.",
                rate, mode
            ),
            SweepError::ProtocolMismatch {
                state,
                expected,
                actual,
            } => write!(
                f,
                "Unexpected reply in state {:?}. Expected = {}, observed = {}.",
                state, expected, actual
            ),
            SweepError::ChecksumMismatch(expected, calculated) => write!(
                f,
                "Checksum mismatched. Calculated = {:02X}, expected = {:02X}.",
                calculated, expected
            ),
            SweepError::SensorFault(status) => write!(
                f,
                "Sensor reported an error. Status byte = {:#010b}. See the user manual for details.",
                status
            ),
            SweepError::AngleOutOfRange(angle) => write!(
                f,
                "Angle {} (1/16 degree) is outside of one revolution.",
                angle
            ),
            SweepError::TimeoutError() => write!(f, "Operation timed out"),
            SweepError::Disconnected => write!(f, "Driver threads are no longer running"),
            SweepError::IoError(err) => Display::fmt(&err, f),
            SweepError::SerialError(err) => Display::fmt(&err, f),
        }
    }
}

impl Error for SweepError {}

impl From<io::Error> for SweepError {
    fn from(err: io::Error) -> Self {
        SweepError::IoError(err)
    }
}

impl From<serialport::Error> for SweepError {
    fn from(err: serialport::Error) -> Self {
        SweepError::SerialError(err)
    }
}
