use std::sync::{Arc, OnceLock};
use time::OffsetDateTime;

use crate::detector::DetectorWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub window: DetectorWindow,
    pub at: OffsetDateTime,
}

/// Write-once, read-many slot shared between the watcher thread and the
/// mission loop. Only the first `confirm` lands; later ones are dropped.
#[derive(Debug, Clone, Default)]
pub struct BeaconSignal(Arc<OnceLock<Detection>>);

impl BeaconSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this call delivered the detection.
    pub fn confirm(&self, detection: Detection) -> bool {
        self.0.set(detection).is_ok()
    }

    pub fn get(&self) -> Option<Detection> {
        self.0.get().copied()
    }

    pub fn is_confirmed(&self) -> bool {
        self.0.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(hits: u32) -> Detection {
        Detection {
            window: DetectorWindow { sample_count: 10, hit_count: hits, threshold: 5 },
            at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn first_confirm_wins() {
        let s = BeaconSignal::new();
        let reader = s.clone();
        assert!(!reader.is_confirmed());
        assert!(s.confirm(detection(8)));
        assert!(!s.confirm(detection(9)));
        assert_eq!(reader.get().unwrap().window.hit_count, 8);
    }

    #[test]
    fn visible_across_threads() {
        let s = BeaconSignal::new();
        let writer = s.clone();
        std::thread::spawn(move || writer.confirm(detection(7))).join().unwrap();
        assert!(s.is_confirmed());
    }
}
