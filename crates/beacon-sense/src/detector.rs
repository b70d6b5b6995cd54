use std::io;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::line::DigitalInput;
use crate::signal::{BeaconSignal, Detection};
use crate::BeaconConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Sampling,
    Confirmed,
    /// A beacon has been confirmed; every later edge is ignored.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorWindow {
    pub sample_count: u32,
    pub hit_count: u32,
    pub threshold: u32,
}

impl DetectorWindow {
    pub fn is_hit(&self) -> bool {
        self.hit_count > self.threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Confirmed(Detection),
    Noise(DetectorWindow),
    /// Line was already inactive when the edge was handled.
    NotHeld,
    /// Detector is terminal.
    Ignored,
}

/// Oversampling filter run once per candidate edge.
#[derive(Debug)]
pub struct BeaconDetector {
    sample_count: u32,
    sample_interval: Duration,
    threshold: u32,
    state: DetectorState,
    signal: BeaconSignal,
}

impl BeaconDetector {
    pub fn new(cfg: &BeaconConfig, signal: BeaconSignal) -> Self {
        Self::with_window(cfg.sample_count, cfg.sample_interval(), cfg.threshold, signal)
    }

    pub fn with_window(sample_count: u32, sample_interval: Duration, threshold: u32, signal: BeaconSignal) -> Self {
        Self { sample_count, sample_interval, threshold, state: DetectorState::Idle, signal }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn on_edge<I: DigitalInput + ?Sized>(&mut self, input: &mut I) -> io::Result<Verdict> {
        if self.state == DetectorState::Terminal {
            return Ok(Verdict::Ignored);
        }
        if !input.is_active()? {
            debug!("beacon: edge not held, ignored");
            return Ok(Verdict::NotHeld);
        }

        self.state = DetectorState::Sampling;
        let window = match self.sample(input) {
            Ok(w) => w,
            Err(e) => {
                self.state = DetectorState::Idle;
                return Err(e);
            }
        };

        if !window.is_hit() {
            debug!("beacon: noise hits={}/{} threshold={}", window.hit_count, window.sample_count, window.threshold);
            self.state = DetectorState::Idle;
            return Ok(Verdict::Noise(window));
        }

        self.state = DetectorState::Confirmed;
        let detection = Detection { window, at: OffsetDateTime::now_utc() };
        if self.signal.confirm(detection) {
            info!("beacon: CONFIRMED hits={}/{} threshold={}", window.hit_count, window.sample_count, window.threshold);
        } else {
            warn!("beacon: confirmed again after signal was already set, ignoring");
        }
        self.state = DetectorState::Terminal;
        Ok(Verdict::Confirmed(detection))
    }

    fn sample<I: DigitalInput + ?Sized>(&self, input: &mut I) -> io::Result<DetectorWindow> {
        let mut hits = 0;
        for _ in 0..self.sample_count {
            if input.is_active()? {
                hits += 1;
            }
            if !self.sample_interval.is_zero() {
                std::thread::sleep(self.sample_interval);
            }
        }
        Ok(DetectorWindow { sample_count: self.sample_count, hit_count: hits, threshold: self.threshold })
    }
}
