use serde::Deserialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::irq::EdgeIrq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    Up,
    Down,
    Off,
}

impl Pull {
    fn pinctrl_arg(self) -> &'static str {
        match self {
            Pull::Up => "pu",
            Pull::Down => "pd",
            Pull::Off => "pn",
        }
    }
}

/// A digital input the detector can sample. `true` means the line is in its
/// active state (polarity is handled by the implementation).
pub trait DigitalInput: Send {
    fn is_active(&mut self) -> io::Result<bool>;

    /// Block until the level may have changed. Inputs without a change
    /// notification just sleep `poll`.
    fn wait_change(&mut self, poll: Duration) {
        std::thread::sleep(poll);
    }
}

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";
const EXPORT_SETTLE: Duration = Duration::from_secs(1);
/// Longest block on the edge interrupt; bounds how late a stop is noticed.
const IRQ_WAIT: Duration = Duration::from_millis(100);

/// Input line through the legacy sysfs GPIO interface.
///
/// The value file is kept open and re-read from offset 0 on every sample,
/// which keeps a read well under the 500us sample spacing on a Pi Zero.
/// Between edges the line waits on the kernel's rising-edge interrupt; where
/// that cannot be set up it falls back to polling.
pub struct SysfsLine {
    gpio: u32,
    value: File,
    irq: Option<EdgeIrq>,
}

impl SysfsLine {
    pub fn configure(gpio: u32, bcm_pin: u32, pull: Pull, active_low: bool) -> io::Result<Self> {
        apply_pull(bcm_pin, pull);
        Self::configure_at(Path::new(SYSFS_GPIO_ROOT), gpio, active_low)
    }

    /// Export `gpio` under `root`, set it as input with the given polarity and open its value file.
    pub fn configure_at(root: &Path, gpio: u32, active_low: bool) -> io::Result<Self> {
        let dir = root.join(format!("gpio{}", gpio));
        if !dir.exists() {
            debug!("gpio{}: exporting", gpio);
            write_attr(&root.join("export"), &gpio.to_string())?;
            wait_for(&dir.join("direction"))?;
        }
        write_attr(&dir.join("direction"), "in")?;
        write_attr(&dir.join("active_low"), if active_low { "1" } else { "0" })?;
        let value = File::open(dir.join("value"))?;
        let irq = match request_rising_edge(&dir) {
            Ok(irq) => Some(irq),
            Err(e) => {
                warn!("gpio{}: no edge interrupt, polling instead: {}", gpio, e);
                None
            }
        };
        info!("gpio{}: configured as input (active_low={}, edge irq={})", gpio, active_low, irq.is_some());
        Ok(Self { gpio, value, irq })
    }

    pub fn gpio(&self) -> u32 {
        self.gpio
    }

    pub fn has_edge_irq(&self) -> bool {
        self.irq.is_some()
    }
}

fn request_rising_edge(dir: &Path) -> io::Result<EdgeIrq> {
    write_attr(&dir.join("edge"), "rising")?;
    EdgeIrq::open(&dir.join("value"))
}

impl DigitalInput for SysfsLine {
    fn is_active(&mut self) -> io::Result<bool> {
        let mut buf = [0u8; 1];
        self.value.seek(SeekFrom::Start(0))?;
        let n = self.value.read(&mut buf)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty gpio value"));
        }
        Ok(buf[0] == b'1')
    }

    fn wait_change(&mut self, poll: Duration) {
        let Some(irq) = self.irq.as_mut() else {
            std::thread::sleep(poll);
            return;
        };
        if let Err(e) = irq.wait(IRQ_WAIT) {
            warn!("gpio{}: edge interrupt failed, polling from now on: {}", self.gpio, e);
            self.irq = None;
        }
    }
}

fn write_attr(path: &Path, value: &str) -> io::Result<()> {
    let mut f = OpenOptions::new().write(true).truncate(true).open(path)?;
    f.write_all(value.as_bytes())
}

// udev needs a moment to fix permissions on a freshly exported pin
fn wait_for(path: &Path) -> io::Result<()> {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() > EXPORT_SETTLE {
            return Err(io::Error::new(io::ErrorKind::TimedOut, format!("{} did not appear", path.display())));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

/// sysfs has no pull-resistor control; the Pi's `pinctrl` tool does.
/// Best effort: a board without it keeps whatever the device tree set.
fn apply_pull(bcm_pin: u32, pull: Pull) {
    let out = Command::new("pinctrl")
        .args(["set", &bcm_pin.to_string(), "ip", pull.pinctrl_arg()])
        .output();
    match out {
        Ok(o) if o.status.success() => debug!("gpio bcm{}: pull {:?} applied", bcm_pin, pull),
        Ok(o) => warn!("pinctrl set pull failed for bcm{}: {}", bcm_pin, String::from_utf8_lossy(&o.stderr).trim()),
        Err(e) => warn!("pinctrl unavailable, pull for bcm{} left as-is: {}", bcm_pin, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn configures_existing_pin_and_reads_value() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("gpio17");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("direction"), "out").unwrap();
        fs::write(dir.join("active_low"), "0").unwrap();
        fs::write(dir.join("value"), "0\n").unwrap();

        let mut line = SysfsLine::configure_at(root.path(), 17, true).unwrap();
        assert_eq!(fs::read_to_string(dir.join("direction")).unwrap(), "in");
        assert_eq!(fs::read_to_string(dir.join("active_low")).unwrap(), "1");
        assert!(!line.is_active().unwrap());

        fs::write(dir.join("value"), "1\n").unwrap();
        assert!(line.is_active().unwrap());
        assert_eq!(line.gpio(), 17);
    }

    #[test]
    fn regular_files_fall_back_to_polling() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("gpio22");
        fs::create_dir(&dir).unwrap();
        for (attr, v) in [("direction", "out"), ("active_low", "0"), ("edge", "none"), ("value", "0\n")] {
            fs::write(dir.join(attr), v).unwrap();
        }

        // epoll refuses regular files, so only the edge request lands
        let mut line = SysfsLine::configure_at(root.path(), 22, false).unwrap();
        assert_eq!(fs::read_to_string(dir.join("edge")).unwrap(), "rising");
        assert!(!line.has_edge_irq());

        line.wait_change(Duration::from_millis(1));
        fs::write(dir.join("value"), "1\n").unwrap();
        assert!(line.is_active().unwrap());
    }

    #[test]
    fn missing_export_fails() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        assert!(SysfsLine::configure_at(&missing, 4, false).is_err());
    }
}
