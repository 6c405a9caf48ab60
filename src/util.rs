use indicatif::{ProgressBar, ProgressStyle};

/// Byte-oriented progress bar for firmware transfers and data exports.
/// Length may be 0 at construction and set once the device reports its
/// buffer size.
pub fn create_progress_bar(total_bytes: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_bytes);

    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%) {msg}")
            .expect("Failed to create progress bar")
            .progress_chars("#>-"),
    );
    pb.set_message(msg.to_owned());

    pb
}
