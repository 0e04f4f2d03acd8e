use crate::constants::PACKET_SIZE;
use crate::error::SweepError;
use crate::event::Event;
use crate::numeric::calc_checksum;
use std::collections::VecDeque;

/// Byte transport to the sensor.
///
/// Replies and packets are not returned by these calls; they come back later as
/// [`Event`]s once the requested number of bytes has arrived.
pub trait Transport: Send {
    /// Transmits `command` and arms reception of a `reply_len` byte reply.
    fn send_command(&mut self, command: &[u8], reply_len: usize) -> Result<(), SweepError>;

    /// Switches reception to back-to-back packets of `PACKET_SIZE` bytes.
    fn start_continuous(&mut self) -> Result<(), SweepError>;

    /// Stops reception and drops any partial reply or packet.
    fn stop_reception(&mut self);

    /// Sensor power switch.
    fn set_power(&mut self, enabled: bool) -> Result<(), SweepError>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ReceiveMode {
    Idle,
    Reply(usize),
    Continuous,
}

/// Cuts the received byte stream into replies or packets, depending on what the
/// state machine asked for last.
///
/// Bytes left over after a reply stay buffered, so packets streamed right behind
/// a start acknowledge are kept. Replies start at the echo of their command;
/// anything ahead of it (packets still in flight) is skipped.
pub(crate) struct Framer {
    mode: ReceiveMode,
    echo: Vec<u8>,
    buffer: VecDeque<u8>,
    resyncing: bool,
}

fn find(buffer: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() {
        return Some(0);
    }
    buffer.windows(pattern.len()).position(|w| w == pattern)
}

impl Framer {
    pub(crate) fn new() -> Framer {
        Framer {
            mode: ReceiveMode::Idle,
            echo: Vec::new(),
            buffer: VecDeque::new(),
            resyncing: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn mode(&self) -> ReceiveMode {
        self.mode
    }

    /// Waits for a `len` byte reply to `command`. Older bytes cannot belong to it.
    pub(crate) fn expect_reply(&mut self, command: &[u8], len: usize) {
        self.buffer.clear();
        self.echo = command[..command.len().min(2)].to_vec();
        self.mode = ReceiveMode::Reply(len);
    }

    /// Frames packets from here on, starting with whatever is already buffered.
    pub(crate) fn start_continuous(&mut self) {
        self.resyncing = false;
        self.mode = ReceiveMode::Continuous;
    }

    pub(crate) fn stop(&mut self) {
        self.buffer.clear();
        self.mode = ReceiveMode::Idle;
    }

    pub(crate) fn extend(&mut self, data: &[u8]) {
        match self.mode {
            // nothing was asked for, the bytes are stale
            ReceiveMode::Idle => (),
            _ => self.buffer.extend(data),
        }
    }

    pub(crate) fn next_event(&mut self) -> Option<Event> {
        match self.mode {
            ReceiveMode::Idle => None,
            ReceiveMode::Reply(len) => self.next_reply(len),
            ReceiveMode::Continuous => self.next_packet(),
        }
    }

    fn next_reply(&mut self, len: usize) -> Option<Event> {
        let echo_len = self.echo.len();
        match find(self.buffer.make_contiguous(), &self.echo) {
            Some(start) => {
                self.buffer.drain(..start);
            }
            None => {
                // keep a tail that may be the start of a split echo
                let keep = echo_len.saturating_sub(1).min(self.buffer.len());
                let n_drop = self.buffer.len() - keep;
                self.buffer.drain(..n_drop);
                return None;
            }
        }
        if self.buffer.len() < len {
            return None;
        }
        let reply = self.buffer.drain(..len).collect::<Vec<_>>();
        self.mode = ReceiveMode::Idle;
        Some(Event::Reply(reply))
    }

    fn next_packet(&mut self) -> Option<Event> {
        loop {
            if self.buffer.len() < PACKET_SIZE {
                return None;
            }
            let mut packet = [0u8; PACKET_SIZE];
            for (dst, src) in packet.iter_mut().zip(self.buffer.iter()) {
                *dst = *src;
            }
            if calc_checksum(&packet[..PACKET_SIZE - 1]) == packet[PACKET_SIZE - 1] {
                self.buffer.drain(..PACKET_SIZE);
                self.resyncing = false;
                return Some(Event::Packet(packet));
            }
            // Slide one byte at a time until a checksum matches again. Only the
            // first bad frame is reported.
            self.buffer.pop_front();
            if !self.resyncing {
                self.resyncing = true;
                return Some(Event::Packet(packet));
            }
        }
    }
}
