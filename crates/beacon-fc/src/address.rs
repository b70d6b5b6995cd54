use std::fmt;
use std::str::FromStr;

use crate::FcError;

pub const DEFAULT_SERIAL_BAUD: u32 = 57600;

const MAVLINK_SCHEMES: [&str; 6] = ["udpin:", "udpout:", "udpbcast:", "tcpin:", "tcpout:", "serial:"];

/// Where the autopilot lives.
///
/// Accepts mavlink URLs as-is, plus the shorthand field operators type:
/// `/dev/ttyAMA0,57600`, `udp:0.0.0.0:14550`, bare `127.0.0.1:14551` (listen),
/// `auto` (probe serial ports) and `sim` (in-process simulated vehicle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAddress {
    Url(String),
    Serial { dev: String, baud: u32 },
    Auto,
    Sim,
}

impl LinkAddress {
    pub fn mavlink_url(&self) -> Option<String> {
        match self {
            Self::Url(u) => Some(u.clone()),
            Self::Serial { dev, baud } => Some(format!("serial:{}:{}", dev, baud)),
            Self::Auto | Self::Sim => None,
        }
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(u) => f.write_str(u),
            Self::Serial { dev, baud } => write!(f, "{} @ {}", dev, baud),
            Self::Auto => f.write_str("auto"),
            Self::Sim => f.write_str("sim"),
        }
    }
}

impl FromStr for LinkAddress {
    type Err = FcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = |why: &str| FcError::Address(s.to_string(), why.to_string());

        if s.is_empty() {
            return Err(bad("empty"));
        }
        match s {
            "sim" => return Ok(Self::Sim),
            "auto" => return Ok(Self::Auto),
            _ => {}
        }
        if MAVLINK_SCHEMES.iter().any(|p| s.starts_with(p)) {
            return Ok(Self::Url(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix("udp:") {
            check_host_port(rest).map_err(|e| bad(&e))?;
            return Ok(Self::Url(format!("udpin:{}", rest)));
        }
        if let Some(rest) = s.strip_prefix("tcp:") {
            check_host_port(rest).map_err(|e| bad(&e))?;
            return Ok(Self::Url(format!("tcpout:{}", rest)));
        }
        if s.starts_with("/dev/") || s.starts_with("COM") {
            return parse_serial(s).map_err(|e| bad(&e));
        }
        check_host_port(s).map_err(|e| bad(&e))?;
        Ok(Self::Url(format!("udpin:{}", s)))
    }
}

fn parse_serial(s: &str) -> Result<LinkAddress, String> {
    let split = s.rfind(',').or_else(|| s.rfind(':'));
    let (dev, baud) = match split {
        Some(i) => {
            let baud = s[i + 1..].parse::<u32>().map_err(|_| format!("baud {:?} is not a number", &s[i + 1..]))?;
            (&s[..i], baud)
        }
        None => (s, DEFAULT_SERIAL_BAUD),
    };
    if baud == 0 {
        return Err("baud must be > 0".into());
    }
    Ok(LinkAddress::Serial { dev: dev.to_string(), baud })
}

fn check_host_port(s: &str) -> Result<(), String> {
    let (host, port) = s.rsplit_once(':').ok_or_else(|| "expected host:port".to_string())?;
    if host.is_empty() {
        return Err("missing host".into());
    }
    port.parse::<u16>().map_err(|_| format!("port {:?} is not a number", port))?;
    Ok(())
}
