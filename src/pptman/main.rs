use clap::Parser;
use ops::{ExportOptions, FlashOptions, NoiseOptions, ScanOptions, SerialOptions};

mod ops;

#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
enum Cli {
    /// List discovered PPT units
    #[command(name = "scan")]
    Scan(ScanOptions),

    /// Program a serial number into the first discovered unit
    #[command(name = "serial", alias = "s")]
    Serial(SerialOptions),

    /// Flash firmware onto every discovered unit
    #[command(name = "flash", alias = "f")]
    Flash(FlashOptions),

    /// Live accelerometer noise test
    #[command(name = "noise", alias = "n")]
    Noise(NoiseOptions),

    /// Export each unit's recorded data to CSV
    #[command(name = "export", alias = "e")]
    Export(ExportOptions),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli {
        Cli::Scan(opts) => ops::handle_scan(opts),
        Cli::Serial(opts) => ops::handle_serial(opts),
        Cli::Flash(opts) => ops::handle_flash(opts),
        Cli::Noise(opts) => ops::handle_noise(opts),
        Cli::Export(opts) => ops::handle_export(opts),
    }
}
