use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;

use crate::FirmwareImage;
use crate::error::DeviceResult;
use crate::interface::serialport::SerialPortDevice;
use crate::record::MeasurementRecord;

pub(crate) mod protocol;

use protocol::PinpointDevice;

/// PPT protocol generations that have been tested to work with pptman
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PptVersion {
    /// Original PINPoint units
    V3,

    /// Current production PINPoint units
    V4,
}

pub(crate) struct PptParams {
    pub baud: u32,
    pub version_tag: u8,
}

impl PptVersion {
    /// Per-generation link parameters, the version tag being what the unit
    /// reports during the handshake.
    pub(crate) fn params(self) -> PptParams {
        match self {
            PptVersion::V3 => PptParams {
                baud: 57600,
                version_tag: 0x03,
            },
            PptVersion::V4 => PptParams {
                baud: 115200,
                version_tag: 0x04,
            },
        }
    }

    /// Open `port` and handshake a PPT of this version, returning a live
    /// session handle. The port is released again if the handshake fails.
    pub fn connect(self, port: &str) -> DeviceResult<Box<dyn Pinpoint>> {
        let interface = SerialPortDevice::open(port, self.params().baud)?;
        let device = PinpointDevice::handshake(Box::new(interface), port, self)?;
        Ok(Box::new(device))
    }
}

impl fmt::Display for PptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PptVersion::V3 => write!(f, "V3"),
            PptVersion::V4 => write!(f, "V4"),
        }
    }
}

/// One live PPT session. Every operation the tool performs (serial-number
/// programming, flashing, live sampling, data export) goes through this
/// contract, so tests can stand in simulated units.
///
/// A handle owns its transport exclusively; moving it into a worker thread
/// is what guarantees no two threads ever talk to the same unit.
pub trait Pinpoint: Send + std::fmt::Debug {
    /// Port the session was opened on
    fn port(&self) -> &str;

    /// Protocol generation of the unit
    fn version(&self) -> PptVersion;

    /// Run the full bootloader entry, transfer and exit sequence
    fn write_firmware(&mut self, image: &FirmwareImage) -> DeviceResult<()>;

    /// Persist one configuration key on the unit
    fn write_eeprom_key(&mut self, key: &str, value: &str) -> DeviceResult<()>;

    /// Read the unit's full persisted configuration
    fn read_eeprom_config(&mut self) -> DeviceResult<BTreeMap<String, String>>;

    /// Total size in bytes of the recorded data buffer
    fn data_header(&mut self) -> DeviceResult<u32>;

    /// Bytes consumed from the buffer per record
    fn data_point_size(&self) -> u32;

    /// Next recorded sample, or `None` once the buffer is drained
    fn next_record(&mut self) -> DeviceResult<Option<MeasurementRecord>>;

    /// One freshly-taken live sample
    fn next_live_record(&mut self) -> DeviceResult<MeasurementRecord>;
}

/// Single-pass iterator over a unit's recorded data buffer. Fuses after the
/// end of the buffer or the first error.
pub struct DataRecords<'a> {
    device: &'a mut dyn Pinpoint,
    done: bool,
}

impl<'a> DataRecords<'a> {
    pub fn over(device: &'a mut dyn Pinpoint) -> Self {
        DataRecords {
            device,
            done: false,
        }
    }
}

impl Iterator for DataRecords<'_> {
    type Item = DeviceResult<MeasurementRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.device.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Bounded iterator over live samples. Fuses after `count` samples or the
/// first error.
pub struct LiveRecords<'a> {
    device: &'a mut dyn Pinpoint,
    remaining: usize,
    failed: bool,
}

impl<'a> LiveRecords<'a> {
    pub fn over(device: &'a mut dyn Pinpoint, count: usize) -> Self {
        LiveRecords {
            device,
            remaining: count,
            failed: false,
        }
    }
}

impl Iterator for LiveRecords<'_> {
    type Item = DeviceResult<MeasurementRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;
        match self.device.next_live_record() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
