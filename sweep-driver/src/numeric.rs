use crate::constants::LINE_FEED;

pub(crate) fn to_u16(lo: u8, hi: u8) -> u16 {
    ((hi as u16) << 8) | (lo as u16)
}

/// Sum of the payload bytes modulo 255, as the sensor computes it.
pub(crate) fn calc_checksum(payload: &[u8]) -> u8 {
    let sum: u32 = payload.iter().map(|&b| b as u32).sum();
    (sum % 255) as u8
}

/// Checksum character appended by the sensor to the two status digits of a reply.
pub(crate) fn status_checksum(status: [u8; 2]) -> u8 {
    ((status[0].wrapping_add(status[1])) & 0x3F) + 0x30
}

/// Two ASCII decimal digits. Values above 99 are not representable.
pub(crate) fn two_digits(value: u8) -> [u8; 2] {
    debug_assert!(value < 100);
    [b'0' + value / 10, b'0' + value % 10]
}

pub(crate) fn to_string(data: &[u8]) -> String {
    data.iter()
        .map(|&e| match e {
            LINE_FEED => "\\n".to_string(),
            0x20..=0x7E => (e as char).to_string(),
            _ => format!("<{:02X}>", e),
        })
        .collect::<Vec<_>>()
        .join("")
}
