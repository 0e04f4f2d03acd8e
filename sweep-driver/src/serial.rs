use crate::error::SweepError;
use crate::event::Event;
use crate::transport::{Framer, Transport};
use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;

pub(crate) fn open_port(port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, SweepError> {
    let port = serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(10))
        .open()?;
    Ok(port)
}

/// [`Transport`] over a serial port.
///
/// Bytes are read elsewhere and handed over with [`SerialTransport::receive`], so
/// the receive mode is always switched on the thread that consumes the frames.
/// The sensor power enable is driven by the DTR line.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    framer: Framer,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> SerialTransport {
        SerialTransport {
            port,
            framer: Framer::new(),
        }
    }

    /// Appends bytes read from the port.
    pub fn receive(&mut self, data: &[u8]) {
        self.framer.extend(data);
    }

    /// Next complete reply or packet, if any.
    pub fn next_event(&mut self) -> Option<Event> {
        self.framer.next_event()
    }
}

impl Transport for SerialTransport {
    fn send_command(&mut self, command: &[u8], reply_len: usize) -> Result<(), SweepError> {
        self.framer.expect_reply(command, reply_len);
        self.port.write_all(command)?;
        Ok(())
    }

    fn start_continuous(&mut self) -> Result<(), SweepError> {
        self.framer.start_continuous();
        Ok(())
    }

    fn stop_reception(&mut self) {
        self.framer.stop();
    }

    fn set_power(&mut self, enabled: bool) -> Result<(), SweepError> {
        self.port.write_data_terminal_ready(enabled)?;
        Ok(())
    }
}
