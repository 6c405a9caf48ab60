use std::{fs::File, io::Read, path::Path};

pub use device::{Pinpoint, PptVersion};
use error::{DeviceError, DeviceResult};
use ihex::Reader;

pub mod constants;
pub mod device;
pub mod discovery;
pub mod error;
pub mod flash;
pub(crate) mod interface;
pub mod record;
pub mod stream;
#[cfg(test)]
pub(crate) mod testutil;
pub mod util;

/// Firmware ready for transfer: the flat binary decoded from an Intel HEX
/// image. Immutable once loaded, so concurrent flashers share it by
/// reference.
#[derive(Debug)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Load and decode an Intel HEX firmware file
    pub fn from_hex_file(path: &Path) -> DeviceResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| DeviceError::Firmware(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut hex_content = String::new();
        file.read_to_string(&mut hex_content).map_err(|e| {
            DeviceError::Firmware(format!("Could not read given hex file to string {:?}", e))
        })?;

        Self::from_hex_str(&hex_content)
    }

    /// Decode Intel HEX from a raw string
    pub fn from_hex_str(hex_content: &str) -> DeviceResult<Self> {
        let mut data = Vec::new();
        let parser = Reader::new(hex_content);
        for record in parser {
            match record {
                Ok(rec) => {
                    if let ihex::Record::Data { value, .. } = rec {
                        data.extend_from_slice(&value);
                    }
                }
                Err(e) => {
                    return Err(DeviceError::Firmware(format!(
                        "Failed parsing record in hex file {:?}",
                        e
                    )));
                }
            }
        }

        Ok(FirmwareImage { data })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        FirmwareImage { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
