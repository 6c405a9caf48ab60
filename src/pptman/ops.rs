use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use pptman::FirmwareImage;
use pptman::constants::SERIAL_NUMBER_KEY;
use pptman::device::{Pinpoint, PptVersion};
use pptman::discovery::{self, PortNaming, ProbeEvent};
use pptman::flash::flash_all;
use pptman::stream::{self, CsvSink};
use pptman::util::create_progress_bar;

pub(crate) type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Options shared by every subcommand: which protocol version to probe for
/// and, optionally, a single port to use instead of scanning. Defaults live
/// here at the CLI boundary, never in the library.
#[derive(Parser, Debug, Clone)]
pub(crate) struct ConnectOptions {
    /// Protocol version to probe for
    #[clap(short = 'd', long, value_enum, default_value = "v4")]
    device_version: PptVersion,

    /// Probe a single serial port instead of scanning
    #[clap(short, long)]
    port: Option<String>,
}

fn report_probe(event: ProbeEvent<'_>) {
    match event {
        ProbeEvent::Attempt { port } => println!("Attempting to connect to {port} ..."),
        ProbeEvent::Connected { version, .. } => println!("Success ({version})."),
        ProbeEvent::Rejected { error, .. } => println!(
            "Failed: {}. Not a PINPoint of the requested version.",
            error.source
        ),
    }
}

impl ConnectOptions {
    fn registry(&self) -> Vec<Box<dyn Pinpoint>> {
        let version = self.device_version;
        let connect = move |port: &str| version.connect(port);

        match &self.port {
            Some(port) => {
                discovery::discover_with(std::slice::from_ref(port), &connect, &mut report_probe)
            }
            None => discovery::discover(&PortNaming::default(), &connect, &mut report_probe),
        }
    }

    fn first_device(&self) -> Result<Box<dyn Pinpoint>, Box<dyn std::error::Error>> {
        self.registry()
            .into_iter()
            .next()
            .ok_or_else(|| "No PPT units found".into())
    }
}

#[derive(Parser, Debug, Clone)]
pub(crate) struct ScanOptions {
    #[clap(flatten)]
    connect: ConnectOptions,
}

#[derive(Parser, Debug, Clone)]
pub(crate) struct SerialOptions {
    /// Serial number to persist on the unit
    number: u32,

    #[clap(flatten)]
    connect: ConnectOptions,
}

#[derive(Parser, Debug, Clone)]
pub(crate) struct FlashOptions {
    /// Firmware image (Intel HEX)
    #[clap(short, long, default_value = "isense.hex")]
    firmware: PathBuf,

    #[clap(flatten)]
    connect: ConnectOptions,
}

#[derive(Parser, Debug, Clone)]
pub(crate) struct NoiseOptions {
    /// Number of live samples to pull
    #[clap(short, long, default_value_t = 100)]
    samples: usize,

    #[clap(flatten)]
    connect: ConnectOptions,
}

#[derive(Parser, Debug, Clone)]
pub(crate) struct ExportOptions {
    #[clap(flatten)]
    connect: ConnectOptions,
}

pub(crate) fn handle_scan(opts: ScanOptions) -> CliResult {
    let mut devices = opts.connect.registry();
    if devices.is_empty() {
        println!("No PPT units found.");
        return Ok(());
    }

    for device in &mut devices {
        let serial = device
            .read_eeprom_config()
            .ok()
            .and_then(|config| config.get(SERIAL_NUMBER_KEY).cloned())
            .unwrap_or_else(|| "?".to_string());
        println!("{}  {}  serial {}", device.port(), device.version(), serial);
    }

    Ok(())
}

pub(crate) fn handle_serial(opts: SerialOptions) -> CliResult {
    let mut device = opts.connect.first_device()?;
    device.write_eeprom_key(SERIAL_NUMBER_KEY, &opts.number.to_string())?;
    println!("Wrote: {}", opts.number);
    Ok(())
}

pub(crate) fn handle_flash(opts: FlashOptions) -> CliResult {
    let image = FirmwareImage::from_hex_file(&opts.firmware)?;
    let devices = opts.connect.registry();
    let total = devices.len();

    let report = flash_all(devices, &image)?;

    for (port, outcome) in report.outcomes() {
        match outcome {
            Ok(()) => println!("{port}: OK"),
            Err(e) => println!("{port}: FAILED ({e})"),
        }
    }

    let failed = report.failed().count();
    if failed > 0 {
        return Err(format!("{failed} of {total} devices failed to flash").into());
    }

    Ok(())
}

pub(crate) fn handle_noise(opts: NoiseOptions) -> CliResult {
    let mut device = opts.connect.first_device()?;

    let summary = stream::live_capture(device.as_mut(), opts.samples, |record| {
        print!("{} ... ", record.accel);
        let _ = std::io::stdout().flush();
    })?;

    println!();
    println!("[{}, {}, {}]", summary.min, summary.max, summary.mean);
    Ok(())
}

pub(crate) fn handle_export(opts: ExportOptions) -> CliResult {
    let mut devices = opts.connect.registry();
    if devices.is_empty() {
        println!("No PPT units found.");
        return Ok(());
    }

    let total = devices.len();
    let mut failures = 0;
    for device in &mut devices {
        if let Err(e) = export_one(device.as_mut()) {
            warn!("Export from {} failed: {}", device.port(), e);
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(format!("{failures} of {total} exports failed").into());
    }

    Ok(())
}

fn export_one(device: &mut dyn Pinpoint) -> CliResult {
    let config = device.read_eeprom_config()?;
    let serial = config
        .get(SERIAL_NUMBER_KEY)
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    let name = format!("PPT#{serial}.csv");

    println!("Writing to {name}...");
    let mut sink = CsvSink::new(File::create(&name)?)?;

    let pb = create_progress_bar(0, &name);
    let count = stream::export(device, &mut sink, |consumed, length| {
        pb.set_length(length);
        pb.set_position(consumed);
    })?;
    pb.finish_and_clear();

    println!("{count} records written to {name}");
    Ok(())
}
