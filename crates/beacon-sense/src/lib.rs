//! Beacon pulse detection on a digital input line.
//!
//! An edge watcher thread waits on the line (edge interrupt where the kernel
//! offers one, polling otherwise); every debounced rising edge is handed
//! to the [`BeaconDetector`], which oversamples the line for a short window and
//! either confirms the beacon (once per run) or discards the edge as noise.

pub mod detector;
pub mod edge;
mod irq;
pub mod line;
pub mod sensor;
pub mod signal;

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub use detector::{BeaconDetector, DetectorState, DetectorWindow, Verdict};
pub use line::{DigitalInput, Pull, SysfsLine};
pub use sensor::{BeaconSensor, ConfirmHook, GpioBeacon, ManualBeacon};
pub use signal::{BeaconSignal, Detection};

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("beacon config: {0}")]
    Config(String),
    #[error("gpio {pin}: {source}")]
    Gpio {
        pin: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("spawn beacon watcher: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub enable: bool,
    /// BCM pin number.
    pub pin: u32,
    /// Added to `pin` to get the sysfs GPIO number (non-zero on newer kernels / Pi 5).
    pub chip_base: u32,
    pub pull: Pull,
    pub active_low: bool,
    pub debounce_ms: u64,
    pub poll_interval_us: u64,
    pub sample_count: u32,
    pub sample_interval_us: u64,
    /// Window confirms when strictly more than this many samples read active.
    pub threshold: u32,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enable: true,
            pin: 17,
            chip_base: 0,
            pull: Pull::Down,
            active_low: false,
            debounce_ms: 100,
            poll_interval_us: 250,
            sample_count: 140,
            sample_interval_us: 500,
            threshold: 85,
        }
    }
}

impl BeaconConfig {
    pub fn validate(&self) -> Result<(), BeaconError> {
        if self.sample_count == 0 {
            return Err(BeaconError::Config("sample_count must be > 0".into()));
        }
        if self.threshold >= self.sample_count {
            return Err(BeaconError::Config(format!(
                "threshold {} can never be exceeded with {} samples",
                self.threshold, self.sample_count
            )));
        }
        if self.poll_interval_us == 0 {
            return Err(BeaconError::Config("poll_interval_us must be > 0".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_micros(self.sample_interval_us)
    }

    pub fn sysfs_number(&self) -> u32 {
        self.chip_base + self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_field_calibration() {
        let c = BeaconConfig::default();
        assert_eq!(c.pin, 17);
        assert_eq!(c.sample_count, 140);
        assert_eq!(c.threshold, 85);
        assert_eq!(c.debounce(), Duration::from_millis(100));
        assert_eq!(c.sample_interval(), Duration::from_micros(500));
        c.validate().unwrap();
    }

    #[test]
    fn unreachable_threshold_is_rejected() {
        let c = BeaconConfig { sample_count: 40, threshold: 40, ..Default::default() };
        assert!(matches!(c.validate(), Err(BeaconError::Config(_))));
        let c = BeaconConfig { sample_count: 0, threshold: 0, ..Default::default() };
        assert!(c.validate().is_err());
    }
}
