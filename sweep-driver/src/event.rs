use crate::constants::PACKET_SIZE;

/// Inputs of the sensor state machine. Each one is handled to completion before
/// the next is looked at.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Periodic low-rate tick driving timers and polls.
    Tick,
    /// A complete reply to the last command.
    Reply(Vec<u8>),
    /// A complete streaming packet.
    Packet([u8; PACKET_SIZE]),
}
