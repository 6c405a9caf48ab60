//! Simulated PPT units for unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use crate::FirmwareImage;
use crate::device::{Pinpoint, PptVersion};
use crate::error::{DeviceError, DeviceResult};
use crate::record::MeasurementRecord;

pub(crate) fn record_with_accel(accel: f64) -> MeasurementRecord {
    MeasurementRecord {
        time: "2016-05-12 14:03:22".to_string(),
        latitude: 45.123456789,
        longitude: -71.987654321,
        altitude: 142,
        pressure: 101325,
        temperature: 21.57,
        humidity: 48.2,
        accel,
    }
}

/// Scriptable in-memory PPT. Fields are plain data so each test sets up
/// exactly the behavior it needs.
#[derive(Debug)]
pub(crate) struct MockPpt {
    pub port: String,
    pub version: PptVersion,
    pub records: VecDeque<MeasurementRecord>,
    pub header_bytes: u32,
    pub point_size: u32,
    /// Fail the Nth (0-based) record read instead of serving it
    pub fail_read_at: Option<usize>,
    pub fail_flash: bool,
    pub panic_on_flash: bool,
    /// Every completed flash attempt is logged with the thread that ran it
    pub flash_log: Arc<Mutex<Vec<(String, ThreadId)>>>,
    pub eeprom: BTreeMap<String, String>,
    served: usize,
}

impl MockPpt {
    pub fn new(port: &str) -> Self {
        MockPpt {
            port: port.to_string(),
            version: PptVersion::V4,
            records: VecDeque::new(),
            header_bytes: 0,
            point_size: 32,
            fail_read_at: None,
            fail_flash: false,
            panic_on_flash: false,
            flash_log: Arc::new(Mutex::new(Vec::new())),
            eeprom: BTreeMap::new(),
            served: 0,
        }
    }

    pub fn with_records(port: &str, records: Vec<MeasurementRecord>, point_size: u32) -> Self {
        let header_bytes = records.len() as u32 * point_size;
        MockPpt {
            records: records.into(),
            header_bytes,
            point_size,
            ..MockPpt::new(port)
        }
    }

    fn take_record(&mut self) -> DeviceResult<Option<MeasurementRecord>> {
        if self.fail_read_at == Some(self.served) {
            return Err(DeviceError::Protocol("simulated transport fault".to_string()));
        }
        self.served += 1;
        Ok(self.records.pop_front())
    }
}

impl Pinpoint for MockPpt {
    fn port(&self) -> &str {
        &self.port
    }

    fn version(&self) -> PptVersion {
        self.version
    }

    fn write_firmware(&mut self, _image: &FirmwareImage) -> DeviceResult<()> {
        if self.panic_on_flash {
            panic!("simulated flash panic");
        }

        // Long enough that concurrent attempts genuinely overlap
        std::thread::sleep(std::time::Duration::from_millis(20));

        self.flash_log
            .lock()
            .unwrap()
            .push((self.port.clone(), std::thread::current().id()));

        if self.fail_flash {
            Err(DeviceError::Firmware("simulated flash failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn write_eeprom_key(&mut self, key: &str, value: &str) -> DeviceResult<()> {
        self.eeprom.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read_eeprom_config(&mut self) -> DeviceResult<BTreeMap<String, String>> {
        Ok(self.eeprom.clone())
    }

    fn data_header(&mut self) -> DeviceResult<u32> {
        Ok(self.header_bytes)
    }

    fn data_point_size(&self) -> u32 {
        self.point_size
    }

    fn next_record(&mut self) -> DeviceResult<Option<MeasurementRecord>> {
        self.take_record()
    }

    fn next_live_record(&mut self) -> DeviceResult<MeasurementRecord> {
        self.take_record()?.ok_or_else(|| {
            DeviceError::Protocol("live sampling stopped responding".to_string())
        })
    }
}
