use tracing::{debug, info, warn};

use crate::constants::{PORT_SCAN_LIMIT, PROBE_TIMEOUT_MS};
use crate::device::{Pinpoint, PptVersion};
use crate::error::{DeviceError, ProbeError};

/// Candidate-port naming policy. Platform conventions differ only in the
/// prefix and first index; the scan range is the same everywhere.
#[derive(Debug, Clone)]
pub struct PortNaming {
    pub prefix: String,
    pub first: u32,
    pub limit: u32,
}

impl Default for PortNaming {
    #[cfg(windows)]
    fn default() -> Self {
        PortNaming {
            prefix: "COM".to_string(),
            first: 1,
            limit: PORT_SCAN_LIMIT,
        }
    }

    #[cfg(not(windows))]
    fn default() -> Self {
        PortNaming {
            prefix: "/dev/ttyUSB".to_string(),
            first: 0,
            limit: PORT_SCAN_LIMIT,
        }
    }
}

impl PortNaming {
    pub fn candidates(&self) -> impl Iterator<Item = String> + '_ {
        (self.first..self.first + self.limit).map(move |index| format!("{}{}", self.prefix, index))
    }
}

/// Every serial port in the naming range that can currently be opened, in
/// ascending index order. Each candidate is opened and immediately dropped,
/// so no port is left held when this returns; candidates that fail to open
/// (nonexistent, busy) are silently excluded. Never fails as a whole.
pub fn enumerate_ports(naming: &PortNaming) -> Vec<String> {
    let mut found = Vec::new();

    for name in naming.candidates() {
        let attempt = serialport::new(&name, 9600)
            .timeout(std::time::Duration::from_millis(PROBE_TIMEOUT_MS))
            .open();

        match attempt {
            Ok(port) => {
                // The handle must not outlive this iteration; a held port
                // would block the real probe that follows.
                drop(port);
                debug!("Port {} is present", name);
                found.push(name);
            }
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
            }
        }
    }

    found
}

/// Progress notifications emitted while probing, for the caller to render
/// however it likes.
pub enum ProbeEvent<'a> {
    Attempt { port: &'a str },
    Connected { port: &'a str, version: PptVersion },
    Rejected { port: &'a str, error: &'a ProbeError },
}

/// Try to establish a validated PPT session on `port` using the injected
/// constructor. Construction failures of any kind are classified as a
/// [`ProbeError`]; they never abort a scan.
pub fn probe<C>(
    port: &str,
    connect: &C,
    observer: &mut dyn FnMut(ProbeEvent),
) -> Result<Box<dyn Pinpoint>, ProbeError>
where
    C: Fn(&str) -> Result<Box<dyn Pinpoint>, DeviceError> + ?Sized,
{
    observer(ProbeEvent::Attempt { port });

    match connect(port) {
        Ok(device) => {
            observer(ProbeEvent::Connected {
                port,
                version: device.version(),
            });
            Ok(device)
        }
        Err(source) => {
            let error = ProbeError {
                port: port.to_string(),
                source,
            };
            observer(ProbeEvent::Rejected { port, error: &error });
            Err(error)
        }
    }
}

/// Probe every port in order, keeping the sessions that handshake. Order of
/// the result matches the order of `ports`; no two entries can share a port
/// because each successful probe holds its port exclusively.
pub fn discover_with<C>(
    ports: &[String],
    connect: &C,
    observer: &mut dyn FnMut(ProbeEvent),
) -> Vec<Box<dyn Pinpoint>>
where
    C: Fn(&str) -> Result<Box<dyn Pinpoint>, DeviceError> + ?Sized,
{
    let mut devices: Vec<Box<dyn Pinpoint>> = Vec::new();

    for port in ports {
        match probe(port, connect, observer) {
            Ok(device) => devices.push(device),
            Err(e) => warn!("{e}"),
        }
    }

    devices
}

/// The discovery entry point every operation builds on: enumerate candidate
/// ports, then probe each one.
pub fn discover<C>(
    naming: &PortNaming,
    connect: &C,
    observer: &mut dyn FnMut(ProbeEvent),
) -> Vec<Box<dyn Pinpoint>>
where
    C: Fn(&str) -> Result<Box<dyn Pinpoint>, DeviceError> + ?Sized,
{
    let ports = enumerate_ports(naming);
    info!("Found {} candidate ports", ports.len());
    discover_with(&ports, connect, observer)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::testutil::MockPpt;

    fn connect_subset(
        responders: &[&str],
    ) -> impl Fn(&str) -> Result<Box<dyn Pinpoint>, DeviceError> {
        let responders: BTreeSet<String> = responders.iter().map(|s| s.to_string()).collect();
        move |port: &str| {
            if responders.contains(port) {
                Ok(Box::new(MockPpt::new(port)) as Box<dyn Pinpoint>)
            } else {
                Err(DeviceError::Handshake("no response".to_string()))
            }
        }
    }

    fn ports(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn naming_policy_builds_indexed_candidates() {
        let naming = PortNaming {
            prefix: "/dev/ttyUSB".to_string(),
            first: 0,
            limit: 3,
        };
        let candidates: Vec<String> = naming.candidates().collect();
        assert_eq!(candidates, ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2"]);
    }

    #[test]
    fn discovery_keeps_exactly_the_responding_subset_in_order() {
        let all = ports(&["p0", "p1", "p2", "p3", "p4"]);
        let connect = connect_subset(&["p1", "p3"]);

        let devices = discover_with(&all, &connect, &mut |_| {});

        let found: Vec<&str> = devices.iter().map(|d| d.port()).collect();
        assert_eq!(found, ["p1", "p3"]);

        let unique: BTreeSet<&str> = found.iter().copied().collect();
        assert_eq!(unique.len(), devices.len());
    }

    #[test]
    fn discovery_of_nothing_is_empty_not_an_error() {
        let devices = discover_with(&ports(&["p0", "p1"]), &connect_subset(&[]), &mut |_| {});
        assert!(devices.is_empty());

        let devices = discover_with(&[], &connect_subset(&["p0"]), &mut |_| {});
        assert!(devices.is_empty());
    }

    #[test]
    fn every_port_gets_probed_despite_failures() {
        let all = ports(&["p0", "p1", "p2"]);
        let mut attempts = Vec::new();
        let mut rejections = 0;

        let devices = discover_with(&all, &connect_subset(&["p2"]), &mut |event| match event {
            ProbeEvent::Attempt { port } => attempts.push(port.to_string()),
            ProbeEvent::Rejected { .. } => rejections += 1,
            ProbeEvent::Connected { .. } => {}
        });

        assert_eq!(attempts, ["p0", "p1", "p2"]);
        assert_eq!(rejections, 2);
        assert_eq!(devices.len(), 1);
    }

    #[test]
    fn probe_classifies_failure_with_the_port_name() {
        let connect = connect_subset(&[]);
        let err = probe("p7", &connect, &mut |_| {}).unwrap_err();
        assert_eq!(err.port, "p7");
        assert!(matches!(err.source, DeviceError::Handshake(_)));
    }
}
