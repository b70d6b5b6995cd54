use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::detector::{BeaconDetector, DetectorWindow, Verdict};
use crate::edge::EdgeWatch;
use crate::line::{DigitalInput, SysfsLine};
use crate::signal::{BeaconSignal, Detection};
use crate::{BeaconConfig, BeaconError};

/// Called once, on the detecting thread, right after the signal is set.
pub type ConfirmHook = Box<dyn Fn(&Detection) + Send + Sync>;

/// What the mission controller needs from a beacon source.
pub trait BeaconSensor: Send {
    /// Start watching. Calling it again is a no-op.
    fn arm(&mut self, on_confirm: ConfirmHook) -> Result<(), BeaconError>;
    fn signal(&self) -> BeaconSignal;
}

/// Beacon on a sysfs GPIO line, watched by a dedicated thread.
///
/// The line is configured in [`GpioBeacon::new`], so a missing or
/// inaccessible pin is reported before the vehicle leaves the ground.
pub struct GpioBeacon {
    cfg: BeaconConfig,
    line: Option<SysfsLine>,
    signal: BeaconSignal,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GpioBeacon {
    pub fn new(cfg: BeaconConfig) -> Result<Self, BeaconError> {
        cfg.validate()?;
        let line = open_line(&cfg)?;
        Ok(Self::with_line(cfg, line))
    }

    /// Use an already configured line.
    pub fn with_line(cfg: BeaconConfig, line: SysfsLine) -> Self {
        Self { cfg, line: Some(line), signal: BeaconSignal::new(), stop: Arc::new(AtomicBool::new(false)), handle: None }
    }
}

fn open_line(cfg: &BeaconConfig) -> Result<SysfsLine, BeaconError> {
    SysfsLine::configure(cfg.sysfs_number(), cfg.pin, cfg.pull, cfg.active_low)
        .map_err(|source| BeaconError::Gpio { pin: cfg.pin, source })
}

impl BeaconSensor for GpioBeacon {
    fn arm(&mut self, on_confirm: ConfirmHook) -> Result<(), BeaconError> {
        if self.handle.is_some() {
            warn!("beacon: already armed");
            return Ok(());
        }
        let line = match self.line.take() {
            Some(line) => line,
            None => open_line(&self.cfg)?,
        };
        debug!("beacon: watching gpio{}", line.gpio());
        let watch = EdgeWatch { poll_interval: self.cfg.poll_interval(), debounce: self.cfg.debounce() };
        let detector = BeaconDetector::new(&self.cfg, self.signal.clone());
        let stop = self.stop.clone();
        let pin = self.cfg.pin;

        let handle = std::thread::Builder::new()
            .name("beacon-watch".into())
            .spawn(move || watch_line(line, watch, detector, &stop, on_confirm, pin))
            .map_err(BeaconError::Spawn)?;
        self.handle = Some(handle);
        info!(
            "beacon: armed on bcm{} (debounce {}ms, {} samples @ {}us, threshold {})",
            pin, self.cfg.debounce_ms, self.cfg.sample_count, self.cfg.sample_interval_us, self.cfg.threshold
        );
        Ok(())
    }

    fn signal(&self) -> BeaconSignal {
        self.signal.clone()
    }
}

impl Drop for GpioBeacon {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn watch_line<I: DigitalInput>(
    mut line: I,
    watch: EdgeWatch,
    mut detector: BeaconDetector,
    stop: &AtomicBool,
    on_confirm: ConfirmHook,
    pin: u32,
) {
    let res = watch.run(&mut line, stop, |input| match detector.on_edge(input) {
        Ok(Verdict::Confirmed(det)) => {
            on_confirm(&det);
            ControlFlow::Break(())
        }
        Ok(Verdict::Ignored) => ControlFlow::Break(()),
        Ok(Verdict::Noise(_)) | Ok(Verdict::NotHeld) => ControlFlow::Continue(()),
        Err(e) => {
            warn!("beacon: sampling failed on bcm{}: {}", pin, e);
            ControlFlow::Continue(())
        }
    });
    if let Err(e) = res {
        error!("beacon: watcher on bcm{} stopped, beacon will NOT be detected: {}", pin, e);
    }
}

/// Beacon without hardware: fires only when told to. Used by the simulated
/// vehicle and in tests. Clones share state.
#[derive(Clone, Default)]
pub struct ManualBeacon {
    signal: BeaconSignal,
    armed: Arc<AtomicBool>,
    hook: Arc<Mutex<Option<ConfirmHook>>>,
}

impl ManualBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Deliver a detection as if the line had produced `window`. Returns false
    /// if not armed yet or a beacon was already confirmed.
    pub fn trigger(&self, window: DetectorWindow) -> bool {
        if !self.is_armed() {
            return false;
        }
        let det = Detection { window, at: time::OffsetDateTime::now_utc() };
        if !self.signal.confirm(det) {
            return false;
        }
        if let Ok(hook) = self.hook.lock() {
            if let Some(h) = hook.as_ref() {
                h(&det);
            }
        }
        true
    }
}

impl BeaconSensor for ManualBeacon {
    fn arm(&mut self, on_confirm: ConfirmHook) -> Result<(), BeaconError> {
        if self.armed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Ok(mut hook) = self.hook.lock() {
            *hook = Some(on_confirm);
        }
        Ok(())
    }

    fn signal(&self) -> BeaconSignal {
        self.signal.clone()
    }
}
