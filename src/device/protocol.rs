use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{Pinpoint, PptParams, PptVersion};
use crate::FirmwareImage;
use crate::constants::{FLASH_PAGE_SIZE, INTER_PAGE_DELAY_MS};
use crate::error::{DeviceError, DeviceResult};
use crate::interface::DeviceInterface;
use crate::record::{MeasurementRecord, RECORD_LEN};

#[repr(u8)]
pub(crate) enum PptMessage {
    CmdHandshake = 0x68,
    CmdReadEeprom = 0x72,
    CmdWriteEeprom = 0x77,
    CmdDataHeader = 0x64,
    CmdReadRecord = 0x67,
    CmdLiveRecord = 0x6C,
    CmdEnterBoot = 0x62,
    CmdProgPage = 0x70,
    CmdExitBoot = 0x78,
    Eop = 0x0A,
    RespAck = 0x06,
    RespNak = 0x15,
    RespEnd = 0x04,
}

/// Consecutive timed-out reads tolerated before a response is declared short.
const MAX_EMPTY_READS: usize = 3;

/// Command/response machine for one PPT session. The protocol is lockstep:
/// every command is answered with an ACK/NAK (plus payload) before the next
/// command may be sent.
pub(crate) struct PinpointDevice {
    interface: Box<dyn DeviceInterface>,
    port: String,
    version: PptVersion,
    params: PptParams,
    pending: Vec<u8>,
}

impl std::fmt::Debug for PinpointDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinpointDevice")
            .field("port", &self.port)
            .field("version", &self.version)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl PinpointDevice {
    /// Validate that a PPT of the requested version is listening before
    /// handing out a session. Dropping the returned error path closes the
    /// underlying port.
    pub fn handshake(
        interface: Box<dyn DeviceInterface>,
        port: &str,
        version: PptVersion,
    ) -> DeviceResult<Self> {
        let mut device = PinpointDevice {
            interface,
            port: port.to_string(),
            version,
            params: version.params(),
            pending: Vec::new(),
        };

        device.interface.flush_buffers()?;
        device.send_command(&[PptMessage::CmdHandshake as u8, PptMessage::Eop as u8])?;

        let response = device.read_exact(2)?;
        if response[0] != PptMessage::RespAck as u8 {
            return Err(DeviceError::Handshake(format!(
                "unexpected response {:#04x} from {}",
                response[0], device.port
            )));
        }
        if response[1] != device.params.version_tag {
            return Err(DeviceError::Handshake(format!(
                "{} reports version tag {:#04x}, wanted {:#04x}",
                device.port, response[1], device.params.version_tag
            )));
        }

        debug!("Handshake complete on {} ({})", device.port, version);
        Ok(device)
    }

    #[cfg(test)]
    pub fn from_parts(
        interface: Box<dyn DeviceInterface>,
        port: &str,
        version: PptVersion,
    ) -> Self {
        PinpointDevice {
            interface,
            port: port.to_string(),
            version,
            params: version.params(),
            pending: Vec::new(),
        }
    }

    fn send_command(&mut self, command: &[u8]) -> DeviceResult<()> {
        self.interface.send(command)?;
        Ok(())
    }

    /// Block until `len` response bytes have arrived. Bytes past `len` are
    /// kept for the next read; the protocol is lockstep, so they belong to
    /// the payload following a status byte.
    fn read_exact(&mut self, len: usize) -> DeviceResult<Vec<u8>> {
        let mut empty_reads = 0;
        while self.pending.len() < len {
            let chunk = self.interface.receive()?;
            if chunk.is_empty() {
                empty_reads += 1;
                if empty_reads >= MAX_EMPTY_READS {
                    return Err(DeviceError::ShortRead {
                        expected: len,
                        got: self.pending.len(),
                    });
                }
            } else {
                empty_reads = 0;
                self.pending.extend_from_slice(&chunk);
            }
        }

        let rest = self.pending.split_off(len);
        Ok(std::mem::replace(&mut self.pending, rest))
    }

    fn expect_ack(&mut self, context: &str) -> DeviceResult<()> {
        let response = self.read_exact(1)?;
        match response[0] {
            b if b == PptMessage::RespAck as u8 => Ok(()),
            b if b == PptMessage::RespNak as u8 => Err(DeviceError::Protocol(format!(
                "device NAK during {context}"
            ))),
            other => Err(DeviceError::Protocol(format!(
                "unexpected byte {other:#04x} during {context}"
            ))),
        }
    }
}

impl Pinpoint for PinpointDevice {
    fn port(&self) -> &str {
        &self.port
    }

    fn version(&self) -> PptVersion {
        self.version
    }

    fn write_firmware(&mut self, image: &FirmwareImage) -> DeviceResult<()> {
        if image.is_empty() {
            return Err(DeviceError::Firmware(
                "refusing to flash an empty image".to_string(),
            ));
        }

        info!("Flashing {} bytes to {}", image.len(), self.port);

        // A DTR/RTS pulse drops the unit into its bootloader.
        self.interface.reset()?;
        self.pending.clear();
        self.send_command(&[PptMessage::CmdEnterBoot as u8, PptMessage::Eop as u8])?;
        self.expect_ack("bootloader entry")?;

        // Once the transfer starts it runs to completion or hard failure;
        // an interrupted transfer can leave the unit unbootable.
        for (index, page) in image.data().chunks(FLASH_PAGE_SIZE).enumerate() {
            let mut command = Vec::with_capacity(page.len() + 4);
            command.push(PptMessage::CmdProgPage as u8);
            command.extend_from_slice(&(page.len() as u16).to_be_bytes());
            command.extend_from_slice(page);
            command.push(PptMessage::Eop as u8);

            self.send_command(&command)?;
            self.expect_ack("page programming")?;
            debug!("Programmed page {} ({} bytes) on {}", index, page.len(), self.port);

            std::thread::sleep(std::time::Duration::from_millis(INTER_PAGE_DELAY_MS));
        }

        self.send_command(&[PptMessage::CmdExitBoot as u8, PptMessage::Eop as u8])?;
        self.expect_ack("bootloader exit")?;

        info!("Flash complete on {}", self.port);
        Ok(())
    }

    fn write_eeprom_key(&mut self, key: &str, value: &str) -> DeviceResult<()> {
        let payload_len = key.len() + 1 + value.len();
        if payload_len > u8::MAX as usize {
            return Err(DeviceError::Eeprom(format!(
                "entry too long for key {key}"
            )));
        }

        let mut command = Vec::with_capacity(payload_len + 3);
        command.push(PptMessage::CmdWriteEeprom as u8);
        command.push(payload_len as u8);
        command.extend_from_slice(key.as_bytes());
        command.push(b'=');
        command.extend_from_slice(value.as_bytes());
        command.push(PptMessage::Eop as u8);

        self.send_command(&command)?;
        self.expect_ack("EEPROM write")?;

        debug!("Wrote EEPROM key {} on {}", key, self.port);
        Ok(())
    }

    fn read_eeprom_config(&mut self) -> DeviceResult<BTreeMap<String, String>> {
        self.send_command(&[PptMessage::CmdReadEeprom as u8, PptMessage::Eop as u8])?;

        let header = self.read_exact(3)?;
        if header[0] != PptMessage::RespAck as u8 {
            return Err(DeviceError::Eeprom(format!(
                "unexpected response {:#04x} to config read",
                header[0]
            )));
        }

        let len = u16::from_be_bytes([header[1], header[2]]) as usize;
        let payload = self.read_exact(len)?;
        let text = String::from_utf8(payload)
            .map_err(|e| DeviceError::Eeprom(format!("config is not UTF-8: {e}")))?;

        let mut config = BTreeMap::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| DeviceError::Eeprom(format!("malformed config entry: {line}")))?;
            config.insert(key.to_string(), value.to_string());
        }

        Ok(config)
    }

    fn data_header(&mut self) -> DeviceResult<u32> {
        self.send_command(&[PptMessage::CmdDataHeader as u8, PptMessage::Eop as u8])?;

        let response = self.read_exact(5)?;
        if response[0] != PptMessage::RespAck as u8 {
            return Err(DeviceError::Protocol(format!(
                "unexpected response {:#04x} to data header request",
                response[0]
            )));
        }

        Ok(u32::from_be_bytes([
            response[1],
            response[2],
            response[3],
            response[4],
        ]))
    }

    fn data_point_size(&self) -> u32 {
        RECORD_LEN as u32
    }

    fn next_record(&mut self) -> DeviceResult<Option<MeasurementRecord>> {
        self.send_command(&[PptMessage::CmdReadRecord as u8, PptMessage::Eop as u8])?;

        let status = self.read_exact(1)?;
        match status[0] {
            b if b == PptMessage::RespAck as u8 => {
                let frame = self.read_exact(RECORD_LEN)?;
                Ok(Some(MeasurementRecord::from_frame(&frame)?))
            }
            b if b == PptMessage::RespEnd as u8 => Ok(None),
            other => Err(DeviceError::Protocol(format!(
                "unexpected byte {other:#04x} while reading records"
            ))),
        }
    }

    fn next_live_record(&mut self) -> DeviceResult<MeasurementRecord> {
        self.send_command(&[PptMessage::CmdLiveRecord as u8, PptMessage::Eop as u8])?;
        self.expect_ack("live sample")?;

        let frame = self.read_exact(RECORD_LEN)?;
        MeasurementRecord::from_frame(&frame)
    }
}
