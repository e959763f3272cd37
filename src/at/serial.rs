//! [`SerialLink`] over a real serial port

use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Read, Write},
    time::Duration,
};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::{
    at::SerialLink,
    error::{self, Error},
};

/// Modem UART, 8N1 without flow control
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
}

impl Debug for SerialPortLink {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("name", &self.port.name())
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

impl SerialPortLink {
    /// Opens `path` at `baud_rate`
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, Error> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(5))
            .open()
            .map_err(|e| error::io(e.into()))?;
        Ok(Self { port })
    }

    /// Wraps an already opened port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, bytes)?;
        Write::flush(&mut self.port)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.port.bytes_to_read().map_err(io::Error::from)? == 0 {
            return Ok(0);
        }
        match Read::read(&mut self.port, buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}
