pub mod serialport;

use crate::error::TransportError;

/// Byte-level transport under one PPT session. Exactly one session owns an
/// interface at a time; the protocol layer above it never shares it.
pub(crate) trait DeviceInterface: Send {
    /// Send raw bytes to the device
    fn send(&mut self, command: &[u8]) -> Result<(), TransportError>;

    /// Receive whatever bytes are available within the read timeout
    fn receive(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Flush send/receive buffers
    fn flush_buffers(&mut self) -> Result<(), TransportError>;

    /// Pulse DTR/RTS to reset the device into its bootloader
    fn reset(&mut self) -> Result<(), TransportError>;
}
