pub(crate) const LINE_FEED: u8 = 0x0A;
pub const PACKET_SIZE: usize = 7;

pub(crate) const LIDAR_CMD_MOTOR_STATUS: [u8; 2] = *b"MZ";
pub(crate) const LIDAR_CMD_MOTOR_SPEED: [u8; 2] = *b"MS";
pub(crate) const LIDAR_CMD_SAMPLE_RATE: [u8; 2] = *b"LR";
pub(crate) const LIDAR_CMD_START_ACQ: [u8; 2] = *b"DS";
pub(crate) const LIDAR_CMD_STOP_ACQ: [u8; 2] = *b"DX";
pub(crate) const LIDAR_ANS_LENGTH_MOTOR_STATUS: usize = 4;
pub(crate) const LIDAR_ANS_LENGTH_PARAM: usize = 9;
pub(crate) const LIDAR_ANS_LENGTH_ACQ: usize = 6;
pub(crate) const LIDAR_STATUS_OK: [u8; 2] = *b"00";

pub(crate) const MIN_SWEEP_RATE: u8 = 1;
pub(crate) const MAX_SWEEP_RATE: u8 = 5;
pub(crate) const MIN_SAMPLE_MODE: u8 = 1;
pub(crate) const MAX_SAMPLE_MODE: u8 = 3;

// Packet status byte: bit 0 is the sync flag, the rest are error flags.
pub(crate) const STATUS_SYNC_BIT: u8 = 0b0000_0001;
pub(crate) const STATUS_ERROR_BITS: u8 = 0b1111_1110;
// Lengths below this are the sensor's "no return" sentinel.
pub(crate) const MIN_VALID_LENGTH_CM: i32 = 2;

// In the long run 1/20th of the packets may fail, in the short run 5 in a row.
pub(crate) const FAULT_PENALTY: u32 = 20;
pub(crate) const FAULT_BUDGET: u32 = 100;

