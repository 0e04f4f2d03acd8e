use crate::constants::{
    LIDAR_ANS_LENGTH_ACQ, LIDAR_ANS_LENGTH_MOTOR_STATUS, LIDAR_ANS_LENGTH_PARAM,
    LIDAR_CMD_MOTOR_SPEED, LIDAR_CMD_MOTOR_STATUS, LIDAR_CMD_SAMPLE_RATE, LIDAR_CMD_START_ACQ,
    LIDAR_CMD_STOP_ACQ, LIDAR_STATUS_OK, LINE_FEED,
};
use crate::error::SweepError;
use crate::numeric::{status_checksum, to_string, two_digits};
use sweep_data::SessionState;

/// ASCII commands understood by the sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Command {
    /// "Is the motor speed stabilized?"
    MotorStatus,
    /// Motor speed in Hz.
    MotorSpeed(u8),
    /// Sample rate preset.
    SampleRate(u8),
    StartAcquisition,
    StopAcquisition,
}

impl Command {
    fn code(&self) -> [u8; 2] {
        match self {
            Command::MotorStatus => LIDAR_CMD_MOTOR_STATUS,
            Command::MotorSpeed(_) => LIDAR_CMD_MOTOR_SPEED,
            Command::SampleRate(_) => LIDAR_CMD_SAMPLE_RATE,
            Command::StartAcquisition => LIDAR_CMD_START_ACQ,
            Command::StopAcquisition => LIDAR_CMD_STOP_ACQ,
        }
    }

    fn argument(&self) -> Option<u8> {
        match self {
            Command::MotorSpeed(v) | Command::SampleRate(v) => Some(*v),
            _ => None,
        }
    }

    /// Bytes to transmit, e.g. `MS02\n`.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut data = self.code().to_vec();
        if let Some(arg) = self.argument() {
            data.extend_from_slice(&two_digits(arg));
        }
        data.push(LINE_FEED);
        data
    }

    /// Number of bytes the sensor answers with.
    pub(crate) fn reply_len(&self) -> usize {
        match self {
            Command::MotorStatus => LIDAR_ANS_LENGTH_MOTOR_STATUS,
            Command::MotorSpeed(_) | Command::SampleRate(_) => LIDAR_ANS_LENGTH_PARAM,
            Command::StartAcquisition | Command::StopAcquisition => LIDAR_ANS_LENGTH_ACQ,
        }
    }

    /// Leading bytes of a successful reply.
    pub(crate) fn expected_reply(&self) -> Vec<u8> {
        match self {
            // The motor status reply carries no checksum, "00" means stabilized.
            Command::MotorStatus => [self.code(), LIDAR_STATUS_OK].concat(),
            Command::MotorSpeed(_) | Command::SampleRate(_) => {
                let mut reply = self.encode();
                reply.extend_from_slice(&LIDAR_STATUS_OK);
                reply.push(status_checksum(LIDAR_STATUS_OK));
                reply.push(LINE_FEED);
                reply
            }
            // Only the echo, status and checksum are checked, the terminator is not.
            Command::StartAcquisition | Command::StopAcquisition => {
                let mut reply = [self.code(), LIDAR_STATUS_OK].concat();
                reply.push(status_checksum(LIDAR_STATUS_OK));
                reply
            }
        }
    }
}

pub(crate) fn validate_reply(
    state: SessionState,
    command: &Command,
    reply: &[u8],
) -> Result<(), SweepError> {
    let expected = command.expected_reply();
    if reply.len() < expected.len() || reply[..expected.len()] != expected[..] {
        return Err(SweepError::ProtocolMismatch {
            state,
            expected: to_string(&expected),
            actual: to_string(reply),
        });
    }
    Ok(())
}
