use std::thread;

use tracing::info;

use crate::FirmwareImage;
use crate::device::Pinpoint;
use crate::error::{DeviceError, DeviceResult, FlashError};

/// Per-device outcome of a batch flash, in registry order. Individual
/// failures are reported here, never swallowed.
pub struct FlashReport {
    outcomes: Vec<(String, DeviceResult<()>)>,
}

impl FlashReport {
    pub fn outcomes(&self) -> &[(String, DeviceResult<()>)] {
        &self.outcomes
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &DeviceError)> {
        self.outcomes
            .iter()
            .filter_map(|(port, outcome)| match outcome {
                Ok(()) => None,
                Err(e) => Some((port.as_str(), e)),
            })
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Flash every device with the same image. The last device is flashed on
/// the calling thread; each of the others runs on its own worker thread,
/// all sharing the image by reference. The scope's join barrier means this
/// cannot return while any flash is still in flight — an interrupted
/// transfer can leave a unit stuck in its bootloader.
///
/// One device failing never cancels the others; every outcome lands in the
/// report. A worker that panics is reported as that device's failure.
pub fn flash_all(
    mut devices: Vec<Box<dyn Pinpoint>>,
    image: &FirmwareImage,
) -> Result<FlashReport, FlashError> {
    let mut local = devices.pop().ok_or(FlashError::NoDevices)?;
    let workers = devices;

    info!(
        "Flashing {} device(s): {} worker(s) plus the calling thread",
        workers.len() + 1,
        workers.len()
    );

    let mut outcomes = Vec::with_capacity(workers.len() + 1);

    thread::scope(|scope| {
        let handles: Vec<_> = workers
            .into_iter()
            .map(|mut device| {
                let port = device.port().to_string();
                let handle = scope.spawn(move || device.write_firmware(image));
                (port, handle)
            })
            .collect();

        let local_port = local.port().to_string();
        let local_outcome = local.write_firmware(image);

        for (port, handle) in handles {
            let outcome = match handle.join() {
                Ok(outcome) => outcome,
                Err(_) => Err(DeviceError::Firmware(
                    "flash worker panicked".to_string(),
                )),
            };
            outcomes.push((port, outcome));
        }

        outcomes.push((local_port, local_outcome));
    });

    Ok(FlashReport { outcomes })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread::ThreadId;

    use super::*;
    use crate::testutil::MockPpt;

    fn image() -> FirmwareImage {
        FirmwareImage::from_bytes(vec![0xA5; 256])
    }

    fn fleet(
        count: usize,
        log: &Arc<Mutex<Vec<(String, ThreadId)>>>,
    ) -> Vec<Box<dyn Pinpoint>> {
        (0..count)
            .map(|i| {
                let mut ppt = MockPpt::new(&format!("p{i}"));
                ppt.flash_log = Arc::clone(log);
                Box::new(ppt) as Box<dyn Pinpoint>
            })
            .collect()
    }

    #[test]
    fn empty_registry_is_a_precondition_violation() {
        let result = flash_all(Vec::new(), &image());
        assert!(matches!(result, Err(FlashError::NoDevices)));
    }

    #[test]
    fn single_device_flashes_on_the_calling_thread() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let report = flash_all(fleet(1, &log), &image()).unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.len(), 1);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, std::thread::current().id());
    }

    #[test]
    fn larger_registries_split_into_workers_plus_local() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let report = flash_all(fleet(4, &log), &image()).unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.len(), 4);

        // The join barrier means every attempt has completed by now.
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);

        let caller = std::thread::current().id();
        let by_port: Vec<(&str, ThreadId)> =
            log.iter().map(|(p, id)| (p.as_str(), *id)).collect();

        // Last device ran on the calling thread, the rest did not.
        for (port, thread) in &by_port {
            if *port == "p3" {
                assert_eq!(*thread, caller);
            } else {
                assert_ne!(*thread, caller);
            }
        }

        // One dedicated thread per worker device.
        let worker_threads: HashSet<ThreadId> = by_port
            .iter()
            .filter(|(port, _)| *port != "p3")
            .map(|(_, id)| *id)
            .collect();
        assert_eq!(worker_threads.len(), 3);
    }

    #[test]
    fn one_failure_does_not_cancel_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut devices = fleet(4, &log);

        let mut bad = MockPpt::new("p1");
        bad.flash_log = Arc::clone(&log);
        bad.fail_flash = true;
        devices[1] = Box::new(bad);

        let report = flash_all(devices, &image()).unwrap();

        // Every device still received a complete attempt.
        assert_eq!(log.lock().unwrap().len(), 4);
        assert_eq!(report.len(), 4);
        assert!(!report.all_succeeded());

        let failed: Vec<&str> = report.failed().map(|(port, _)| port).collect();
        assert_eq!(failed, ["p1"]);
    }

    #[test]
    fn outcomes_preserve_registry_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let report = flash_all(fleet(3, &log), &image()).unwrap();

        let ports: Vec<&str> = report.outcomes().iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(ports, ["p0", "p1", "p2"]);
    }

    #[test]
    fn a_panicking_worker_becomes_a_reported_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut devices = fleet(3, &log);

        let mut bad = MockPpt::new("p0");
        bad.panic_on_flash = true;
        devices[0] = Box::new(bad);

        let report = flash_all(devices, &image()).unwrap();

        assert_eq!(report.len(), 3);
        let failed: Vec<&str> = report.failed().map(|(port, _)| port).collect();
        assert_eq!(failed, ["p0"]);
    }
}
