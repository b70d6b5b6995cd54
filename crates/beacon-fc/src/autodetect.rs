use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::address::LinkAddress;
use crate::mav::MavLink;
use crate::{FcConfig, FcError};

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub dev: String,
    pub baud: u32,
    pub elapsed_ms: u64,
    pub note: String,
}

pub fn default_candidate_devs() -> Vec<String> {
    let mut devs: Vec<String> = [
        "/dev/serial0",
        "/dev/ttyAMA0",
        "/dev/ttyS0",
        "/dev/ttyUSB0",
        "/dev/ttyUSB1",
        "/dev/ttyACM0",
        "/dev/ttyACM1",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    // USB adapters with unusual names
    if let Ok(ports) = tokio_serial::available_ports() {
        for p in ports {
            if !devs.contains(&p.port_name) {
                devs.push(p.port_name);
            }
        }
    }
    devs
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![57600, 115200, 230400, 921600]
}

/// Try every candidate device × baud until one yields an autopilot heartbeat.
pub fn find_autopilot(cfg: &FcConfig) -> Result<(String, u32, MavLink), FcError> {
    let devs = cfg.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
    let bauds = cfg.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
    let timeout = Duration::from_millis(cfg.heartbeat_timeout_ms);
    let mut probes = Vec::new();

    for dev in &devs {
        if !std::path::Path::new(dev).exists() {
            continue;
        }
        for &baud in &bauds {
            let start = Instant::now();
            let (note, link) = probe(dev, baud, timeout, cfg);
            let result = ProbeResult { dev: dev.clone(), baud, elapsed_ms: start.elapsed().as_millis() as u64, note };
            if let Some(link) = link {
                info!("fc autodetect: OK {} @ {} ({}ms)", dev, baud, result.elapsed_ms);
                return Ok((dev.clone(), baud, link));
            }
            warn!("fc autodetect: {} ({}ms)", result, result.elapsed_ms);
            probes.push(result);
        }
    }

    Err(FcError::Connection(no_autopilot(&probes)))
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}: {}", self.dev, self.baud, self.note)
    }
}

fn no_autopilot(probes: &[ProbeResult]) -> String {
    if probes.is_empty() {
        return "autodetect: no candidate serial device present".into();
    }
    let tried: Vec<String> = probes.iter().map(ProbeResult::to_string).collect();
    format!("autodetect: no heartbeat after {} probes [{}]", probes.len(), tried.join("; "))
}

fn probe(dev: &str, baud: u32, timeout: Duration, cfg: &FcConfig) -> (String, Option<MavLink>) {
    if let Err(e) = tokio_serial::new(dev, baud).open() {
        return (format!("open failed: {}", e), None);
    }
    let url = LinkAddress::Serial { dev: dev.to_string(), baud }.mavlink_url().unwrap_or_default();
    match MavLink::open(&url, cfg) {
        Ok(link) if link.wait_heartbeat(timeout) => ("heartbeat".into(), Some(link)),
        Ok(_) => ("no heartbeat".into(), None),
        Err(e) => (e.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_present_is_reported_as_such() {
        let cfg = FcConfig {
            candidate_devs: Some(vec!["/dev/beacon-search-no-such-tty".into()]),
            candidate_bauds: Some(vec![57600]),
            ..Default::default()
        };
        let err = find_autopilot(&cfg).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("no candidate serial device"), "{}", err);
    }

    #[test]
    fn failed_probes_are_listed() {
        let probes = vec![
            ProbeResult { dev: "/dev/ttyUSB0".into(), baud: 57600, elapsed_ms: 3, note: "no heartbeat".into() },
            ProbeResult { dev: "/dev/ttyUSB0".into(), baud: 115200, elapsed_ms: 3, note: "open failed: busy".into() },
        ];
        let msg = no_autopilot(&probes);
        assert!(msg.contains("2 probes"));
        assert!(msg.contains("/dev/ttyUSB0 @ 115200: open failed: busy"), "{}", msg);
    }
}
