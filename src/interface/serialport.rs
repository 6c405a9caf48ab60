use tracing::trace;

use super::DeviceInterface;
use crate::constants::{
    MAX_RESPONSE_SIZE, POST_RESET_BOOTUP_DELAY_MS, RESET_DTR_RTS_LOW_MS, SERIAL_TIMEOUT_MS,
};
use crate::error::TransportError;
use std::io::{Read, Write};

/// Serial port transport under one PPT session
pub(crate) struct SerialPortDevice {
    serial_port: Box<dyn serialport::SerialPort>,
}

impl SerialPortDevice {
    pub fn open(port: &str, baud: u32) -> Result<SerialPortDevice, TransportError> {
        let serial_port = serialport::new(port, baud)
            .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
            .dtr_on_open(false)
            .open()
            .map_err(|e| TransportError::Open {
                port: port.to_string(),
                source: e,
            })?;

        Ok(SerialPortDevice { serial_port })
    }
}

impl DeviceInterface for SerialPortDevice {
    fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
        self.serial_port.write_all(command)?;
        trace!("Sent bytes {:?}", command);
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut buffer = vec![0u8; MAX_RESPONSE_SIZE];

        let size = self
            .serial_port
            .read(&mut buffer)
            // Timeout reads are fine, just report no data
            .or_else(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    Ok(0)
                } else {
                    Err(e)
                }
            })?;

        buffer.truncate(size);
        trace!("Received bytes {:?}", buffer);
        Ok(buffer)
    }

    fn flush_buffers(&mut self) -> Result<(), TransportError> {
        self.serial_port.flush()?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.serial_port.write_data_terminal_ready(false)?;
        self.serial_port.write_request_to_send(false)?;

        std::thread::sleep(std::time::Duration::from_millis(RESET_DTR_RTS_LOW_MS));

        self.serial_port.write_data_terminal_ready(true)?;
        self.serial_port.write_request_to_send(true)?;

        std::thread::sleep(std::time::Duration::from_millis(POST_RESET_BOOTUP_DELAY_MS));
        Ok(())
    }
}
