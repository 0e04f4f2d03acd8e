use crate::constants::{PACKET_SIZE, STATUS_ERROR_BITS, STATUS_SYNC_BIT};
use crate::error::SweepError;
use crate::numeric::{calc_checksum, to_u16};
use sweep_data::SLOTS_PER_SCAN;

/// One sample as sent by the sensor, before any geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RawSample {
    /// First sample of a new revolution.
    pub sync: bool,
    /// Angle in 1/16 degree.
    pub angle: u16,
    /// Distance in centimetres.
    pub distance: u16,
    #[allow(dead_code)] // Signal strength, not used for filtering yet
    pub quality: u8,
}

/// Checks checksum and error flags of a streaming packet.
///
/// Layout: status, angle (LE u16), distance (LE u16), signal quality, checksum.
pub(crate) fn validate_packet(packet: &[u8; PACKET_SIZE]) -> Result<RawSample, SweepError> {
    let calculated = calc_checksum(&packet[..PACKET_SIZE - 1]);
    let expected = packet[PACKET_SIZE - 1];
    if calculated != expected {
        return Err(SweepError::ChecksumMismatch(expected, calculated));
    }
    let status = packet[0];
    if status & STATUS_ERROR_BITS != 0 {
        return Err(SweepError::SensorFault(status));
    }
    Ok(RawSample {
        sync: status & STATUS_SYNC_BIT != 0,
        angle: to_u16(packet[1], packet[2]),
        distance: to_u16(packet[3], packet[4]),
        quality: packet[5],
    })
}

/// Half-degree slot of a sensor angle.
pub(crate) fn slot_index(angle: u16) -> Result<usize, SweepError> {
    let slot = (angle >> 3) as usize;
    if slot >= SLOTS_PER_SCAN {
        return Err(SweepError::AngleOutOfRange(angle));
    }
    Ok(slot)
}

#[cfg(test)]
pub(crate) fn encode_packet(status: u8, angle: u16, distance: u16) -> [u8; PACKET_SIZE] {
    let [a0, a1] = angle.to_le_bytes();
    let [d0, d1] = distance.to_le_bytes();
    let mut packet = [status, a0, a1, d0, d1, 0x40, 0];
    packet[6] = calc_checksum(&packet[..6]);
    packet
}
