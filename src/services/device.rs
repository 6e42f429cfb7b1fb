use crate::models::ConnectionConfig;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Errors opening the serial device. This is the worker's only fatal condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("could not open {device}: {reason}")]
    Open { device: String, reason: String },
}

/// An open serial device, exclusively owned by the worker.
///
/// Dropping the value releases the device.
#[cfg_attr(test, mockall::automock)]
pub trait SerialDevice: Send {
    /// Number of bytes that can be read right now (never blocks)
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `max` bytes, waiting at most the configured poll timeout.
    ///
    /// May return fewer bytes than announced, including none.
    fn read_available(&mut self, max: usize) -> io::Result<Vec<u8>>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Opens devices for the worker; swapped for a fake in tests.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialDevice>, DeviceError>;
}

/// Real hardware through the `serialport` crate, 8N1 without flow control.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

impl DeviceOpener for SerialPortOpener {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialDevice>, DeviceError> {
        let port = serialport::new(config.device.as_str(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.poll_timeout)
            .open()
            .map_err(|e| DeviceError::Open {
                device: config.device.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Opened serial port {} at {} baud (poll timeout {:?})",
            config.device,
            config.baud_rate,
            config.poll_timeout
        );

        Ok(Box::new(SerialPortDevice {
            name: config.device.clone(),
            port,
        }))
    }
}

struct SerialPortDevice {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialDevice for SerialPortDevice {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let n = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(n as usize)
    }

    fn read_available(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; max];
        match self.port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}

impl Drop for SerialPortDevice {
    fn drop(&mut self) {
        tracing::debug!("Closing serial port {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_reports_name() {
        let config = ConnectionConfig::new("/nonexistent/atterm-unit-port", 9600);
        let err = match SerialPortOpener.open(&config) {
            Ok(_) => panic!("opening a non-existent device should fail"),
            Err(e) => e,
        };

        let text = err.to_string();
        assert!(text.starts_with("could not open /nonexistent/atterm-unit-port"));
    }
}
