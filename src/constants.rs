pub(crate) const SERIAL_TIMEOUT_MS: u64 = 500;
pub(crate) const PROBE_TIMEOUT_MS: u64 = 100;
pub(crate) const MAX_RESPONSE_SIZE: usize = 1024;

/// Highest port index tried during a scan (exclusive).
pub(crate) const PORT_SCAN_LIMIT: u32 = 100;

pub(crate) const RESET_DTR_RTS_LOW_MS: u64 = 250;
pub(crate) const POST_RESET_BOOTUP_DELAY_MS: u64 = 100;
pub(crate) const INTER_PAGE_DELAY_MS: u64 = 4;

/// EEPROM key under which a unit's serial number is persisted.
pub const SERIAL_NUMBER_KEY: &str = "serialNumber";

/// Firmware page size accepted by the PPT bootloader, both versions.
pub(crate) const FLASH_PAGE_SIZE: usize = 128;
