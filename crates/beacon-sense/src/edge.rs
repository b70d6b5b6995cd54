use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::line::DigitalInput;

const MAX_CONSECUTIVE_READ_ERRORS: u32 = 50;
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Rising-edge detector with a refractory (debounce) interval. The level is
/// compared after every [`DigitalInput::wait_change`].
#[derive(Debug, Clone, Copy)]
pub struct EdgeWatch {
    pub poll_interval: Duration,
    pub debounce: Duration,
}

impl EdgeWatch {
    /// Watches `input` until `stop` is set or `on_edge` breaks. `on_edge` runs on
    /// this thread and may sample the line itself; edges arriving within
    /// `debounce` of the last accepted one are dropped.
    pub fn run<I, F>(&self, input: &mut I, stop: &AtomicBool, mut on_edge: F) -> io::Result<()>
    where
        I: DigitalInput + ?Sized,
        F: FnMut(&mut I) -> ControlFlow<()>,
    {
        let mut prev = input.is_active()?;
        let mut last_edge: Option<Instant> = None;
        let mut errors = 0u32;

        while !stop.load(Ordering::Acquire) {
            input.wait_change(self.poll_interval);
            let level = match input.is_active() {
                Ok(l) => {
                    errors = 0;
                    l
                }
                Err(e) => {
                    errors += 1;
                    if errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        return Err(e);
                    }
                    warn!("beacon line read failed ({}/{}): {}", errors, MAX_CONSECUTIVE_READ_ERRORS, e);
                    std::thread::sleep(READ_ERROR_BACKOFF);
                    continue;
                }
            };

            let rising = level && !prev;
            prev = level;
            if !rising {
                continue;
            }
            let now = Instant::now();
            if last_edge.is_some_and(|t| now.duration_since(t) < self.debounce) {
                continue;
            }
            last_edge = Some(now);

            if on_edge(input).is_break() {
                return Ok(());
            }
            // the handler may have spent a while sampling
            prev = input.is_active().unwrap_or(prev);
        }
        Ok(())
    }
}
