use thiserror::Error;

/// Failure at the raw serial transport layer. Always recovered locally
/// during scanning; surfaced through [`DeviceError`] everywhere else.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Could not open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial control line error: {0}")]
    Control(#[from] serialport::Error),
}

/// Failure of a device-level operation on an open PPT session.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("EEPROM error: {0}")]
    Eeprom(String),

    #[error("Firmware error: {0}")]
    Firmware(String),

    #[error("Short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
}

/// A classified, non-fatal probe failure on one port. Scans log these and
/// move on; they never abort the batch.
#[derive(Error, Debug)]
#[error("Port {port} is not a PPT of the requested version: {source}")]
pub struct ProbeError {
    pub port: String,
    #[source]
    pub source: DeviceError,
}

#[derive(Error, Debug)]
pub enum FlashError {
    #[error("No devices to flash")]
    NoDevices,
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Sink error: {0}")]
    Sink(#[from] std::io::Error),

    #[error("Live capture requires at least one sample")]
    NoSamples,
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;
