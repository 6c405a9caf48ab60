use std::io::Write;

use tracing::info;

use crate::device::{DataRecords, LiveRecords, Pinpoint};
use crate::error::StreamError;
use crate::record::{CSV_HEADER, MeasurementRecord};

/// Destination for streamed records.
pub trait RecordSink {
    fn write_record(&mut self, record: &MeasurementRecord) -> Result<(), StreamError>;
}

/// CSV sink: header row on construction, one formatted row per record.
pub struct CsvSink<W: Write> {
    inner: W,
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut inner: W) -> Result<Self, StreamError> {
        inner.write_all(CSV_HEADER.as_bytes())?;
        Ok(CsvSink { inner })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write_record(&mut self, record: &MeasurementRecord) -> Result<(), StreamError> {
        self.inner.write_all(record.csv_row().as_bytes())?;
        Ok(())
    }
}

/// Drain a unit's recorded data buffer into `sink`. After each record the
/// progress callback receives (consumed bytes, total bytes), consumed
/// advancing by the unit's data point size against the buffer size read
/// up front. Returns the number of records written. A mid-stream device
/// failure aborts only this stream.
pub fn export(
    device: &mut dyn Pinpoint,
    sink: &mut dyn RecordSink,
    mut progress: impl FnMut(u64, u64),
) -> Result<u64, StreamError> {
    let total = device.data_header()? as u64;
    let step = device.data_point_size() as u64;

    let mut consumed = 0u64;
    let mut count = 0u64;

    for record in DataRecords::over(device) {
        let record = record?;
        sink.write_record(&record)?;

        consumed += step;
        count += 1;
        progress(consumed, total);
    }

    info!("Exported {} records", count);
    Ok(count)
}

/// Summary statistics over the accel field of a live capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Pull exactly `samples` live records, handing each to `on_sample` as it
/// arrives, then summarize the accel field as a post-pass.
pub fn live_capture(
    device: &mut dyn Pinpoint,
    samples: usize,
    mut on_sample: impl FnMut(&MeasurementRecord),
) -> Result<LiveSummary, StreamError> {
    if samples == 0 {
        return Err(StreamError::NoSamples);
    }

    let mut values = Vec::with_capacity(samples);
    for record in LiveRecords::over(device, samples) {
        let record = record?;
        on_sample(&record);
        values.push(record.accel);
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &value in &values {
        min = min.min(value);
        max = max.max(value);
        sum += value;
    }

    Ok(LiveSummary {
        min,
        max,
        mean: sum / values.len() as f64,
    })
}
