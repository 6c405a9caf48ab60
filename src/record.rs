use crate::error::{DeviceError, DeviceResult};

/// Size of one measurement frame on the wire.
pub const RECORD_LEN: usize = 32;

/// CSV header row written before any data rows.
pub const CSV_HEADER: &str = "Time, Lat, Lon, Altitude, Pressure, Temperature, Humidity\r\n";

/// One sample as read off a PPT. The accel field is only used by the live
/// noise test and is not part of the CSV export.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub time: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,
    pub pressure: i32,
    pub temperature: f32,
    pub humidity: f32,
    pub accel: f64,
}

impl MeasurementRecord {
    /// Decode a 32-byte big-endian measurement frame.
    ///
    /// Layout: packed calendar time (u16 year, then month/day/hour/minute/
    /// second bytes, one pad byte), latitude and longitude as 1e-7 degree
    /// i32, altitude in meters (i32), pressure in Pa (i32), temperature in
    /// centi-degrees C (i16), humidity in deci-%RH (u16), accel in milli-g
    /// (i16), two reserved bytes.
    pub fn from_frame(frame: &[u8]) -> DeviceResult<Self> {
        if frame.len() < RECORD_LEN {
            return Err(DeviceError::ShortRead {
                expected: RECORD_LEN,
                got: frame.len(),
            });
        }

        let year = u16::from_be_bytes([frame[0], frame[1]]);
        let time = format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, frame[2], frame[3], frame[4], frame[5], frame[6]
        );

        let lat_e7 = i32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]);
        let lon_e7 = i32::from_be_bytes([frame[12], frame[13], frame[14], frame[15]]);
        let altitude = i32::from_be_bytes([frame[16], frame[17], frame[18], frame[19]]);
        let pressure = i32::from_be_bytes([frame[20], frame[21], frame[22], frame[23]]);
        let temp_centi = i16::from_be_bytes([frame[24], frame[25]]);
        let humid_deci = u16::from_be_bytes([frame[26], frame[27]]);
        let accel_milli = i16::from_be_bytes([frame[28], frame[29]]);

        Ok(MeasurementRecord {
            time,
            latitude: lat_e7 as f64 * 1e-7,
            longitude: lon_e7 as f64 * 1e-7,
            altitude,
            pressure,
            temperature: temp_centi as f32 / 100.0,
            humidity: humid_deci as f32 / 10.0,
            accel: accel_milli as f64 / 1000.0,
        })
    }

    /// Render one CSV data row: lat/lon to 8 decimal places, altitude and
    /// pressure as width-6 and width-7 integers, temperature to 2 decimals,
    /// humidity to 1 decimal. CRLF line ending to match the header.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{:.8},{:.8},{:6},{:7},{:.2},{:.1}\r\n",
            self.time,
            self.latitude,
            self.longitude,
            self.altitude,
            self.pressure,
            self.temperature,
            self.humidity
        )
    }
}

#[cfg(test)]
pub(crate) fn encode_frame(rec: &MeasurementRecord) -> Vec<u8> {
    // Inverse of from_frame, for scripting mock transports in tests. The
    // time string is re-parsed from its fixed rendering.
    let bytes = rec.time.as_bytes();
    let field = |range: std::ops::Range<usize>| -> u32 {
        std::str::from_utf8(&bytes[range])
            .unwrap()
            .parse()
            .unwrap()
    };

    let mut frame = Vec::with_capacity(RECORD_LEN);
    frame.extend_from_slice(&(field(0..4) as u16).to_be_bytes());
    frame.push(field(5..7) as u8);
    frame.push(field(8..10) as u8);
    frame.push(field(11..13) as u8);
    frame.push(field(14..16) as u8);
    frame.push(field(17..19) as u8);
    frame.push(0);
    frame.extend_from_slice(&((rec.latitude * 1e7).round() as i32).to_be_bytes());
    frame.extend_from_slice(&((rec.longitude * 1e7).round() as i32).to_be_bytes());
    frame.extend_from_slice(&rec.altitude.to_be_bytes());
    frame.extend_from_slice(&rec.pressure.to_be_bytes());
    frame.extend_from_slice(&((rec.temperature * 100.0).round() as i16).to_be_bytes());
    frame.extend_from_slice(&((rec.humidity * 10.0).round() as u16).to_be_bytes());
    frame.extend_from_slice(&((rec.accel * 1000.0).round() as i16).to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> MeasurementRecord {
        MeasurementRecord {
            time: "2016-05-12 14:03:22".to_string(),
            latitude: 45.123456789,
            longitude: -71.987654321,
            altitude: 142,
            pressure: 101325,
            temperature: 21.57,
            humidity: 48.2,
            accel: 1.002,
        }
    }

    #[test]
    fn frame_round_trip() {
        let rec = sample_record();
        let frame = encode_frame(&rec);
        assert_eq!(frame.len(), RECORD_LEN);

        let decoded = MeasurementRecord::from_frame(&frame).unwrap();
        assert_eq!(decoded.time, rec.time);
        assert!((decoded.latitude - rec.latitude).abs() < 1e-7);
        assert!((decoded.longitude - rec.longitude).abs() < 1e-7);
        assert_eq!(decoded.altitude, rec.altitude);
        assert_eq!(decoded.pressure, rec.pressure);
        assert!((decoded.temperature - rec.temperature).abs() < 0.01);
        assert!((decoded.humidity - rec.humidity).abs() < 0.1);
        assert!((decoded.accel - rec.accel).abs() < 0.001);
    }

    #[test]
    fn short_frame_is_rejected() {
        let err = MeasurementRecord::from_frame(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::ShortRead { expected: RECORD_LEN, got: 16 }
        ));
    }

    #[test]
    fn csv_row_precision_and_field_count() {
        let row = sample_record().csv_row();

        // Latitude rounds to exactly 8 decimal digits.
        assert!(row.contains("45.12345679"));
        assert!(row.ends_with("\r\n"));

        let fields: Vec<&str> = row.trim_end().split(',').collect();
        assert_eq!(fields.len(), 7);
        assert_eq!(fields.len(), CSV_HEADER.trim_end().split(',').count());

        assert_eq!(fields[3], "   142");
        assert_eq!(fields[4], " 101325");
        assert_eq!(fields[5], "21.57");
        assert_eq!(fields[6], "48.2");
    }
}
