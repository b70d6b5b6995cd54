use beacon_fc::{Autopilot, Connector, FlightMode};
use beacon_nav::inverse;
use beacon_sense::{BeaconSensor, BeaconSignal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::{AbortReason, MissionError, MissionParams, MissionReport, MissionState, Outcome, Plan, SuccessReason};

/// Longest uninterrupted sleep; bounds how late a stop request is noticed.
const NAP_SLICE: Duration = Duration::from_millis(50);

/// Why the search loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchEnd {
    PlanComplete,
    Beacon,
    Override(FlightMode),
    Interrupted,
}

pub struct MissionController<C: Connector> {
    connector: C,
    address: String,
    params: MissionParams,
    stop: Arc<AtomicBool>,
    history: Vec<MissionState>,
    targets_sent: usize,
    override_mode: Option<FlightMode>,
}

impl<C: Connector> MissionController<C> {
    pub fn new(connector: C, address: impl Into<String>, params: MissionParams, stop: Arc<AtomicBool>) -> Self {
        Self {
            connector,
            address: address.into(),
            params,
            stop,
            history: Vec::new(),
            targets_sent: 0,
            override_mode: None,
        }
    }

    /// Fly the mission to completion. Never panics on autopilot or beacon
    /// faults: they end up in the report's outcome.
    pub fn run(mut self, plan: Plan, beacon: &mut dyn BeaconSensor) -> MissionReport {
        let outcome = match self.fly(plan, beacon) {
            Ok(o) => o,
            Err(e) => {
                error!("mission: {}", e);
                Outcome::Error(e)
            }
        };
        self.enter(MissionState::Terminated);
        info!("mission: terminated {:?} after {} targets", outcome, self.targets_sent);
        MissionReport {
            outcome,
            history: self.history,
            targets_sent: self.targets_sent,
            override_mode: self.override_mode,
        }
    }

    fn fly(&mut self, plan: Plan, beacon: &mut dyn BeaconSensor) -> Result<Outcome, MissionError> {
        self.enter(MissionState::Connecting);
        let Some(link) = self.connect() else {
            return Ok(Outcome::Aborted(AbortReason::Interrupted));
        };
        let link = Arc::new(link);

        self.enter(MissionState::PreArmWait);
        if !self.wait_armable(&link) {
            return Ok(Outcome::Aborted(AbortReason::Interrupted));
        }
        link.set_groundspeed(self.params.fly_speed)?;
        link.set_mode(FlightMode::Guided)?;
        link.arm()?;
        link.takeoff(self.params.start_altitude)?;
        if !self.wait_takeoff(&link) {
            self.land(&link)?;
            return Ok(Outcome::Aborted(AbortReason::Interrupted));
        }
        self.enter(MissionState::TakenOff);

        self.enter(MissionState::Searching);
        let heading = link.heading();
        let origin = link.position();
        info!("mission: search from {} heading {:.1}", origin, heading);

        let hook_link = link.clone();
        let armed = beacon.arm(Box::new(move |det| {
            warn!(
                "beacon confirmed ({} of {} samples > {}), landing",
                det.window.hit_count, det.window.sample_count, det.window.threshold
            );
            if let Err(e) = hook_link.set_mode(FlightMode::Land) {
                error!("beacon: LAND command failed: {}", e);
            }
        }));
        if let Err(e) = armed {
            return Err(self.land_after_fault(&link, e.into()));
        }
        let signal = beacon.signal();

        let end = match self.search(&link, plan.into_source(heading), &signal) {
            Ok(end) => end,
            Err(e) => return Err(self.land_after_fault(&link, e)),
        };
        let outcome = match end {
            SearchEnd::PlanComplete => Outcome::Success(SuccessReason::PatternComplete),
            SearchEnd::Beacon => Outcome::Success(SuccessReason::BeaconConfirmed),
            SearchEnd::Interrupted => Outcome::Aborted(AbortReason::Interrupted),
            SearchEnd::Override(mode) => {
                warn!("mission: flight mode changed to {} by operator, giving up control", mode);
                self.override_mode = Some(mode);
                return Ok(Outcome::Aborted(AbortReason::ModeOverride));
            }
        };
        self.land(&link)?;
        Ok(outcome)
    }

    fn enter(&mut self, state: MissionState) {
        if let Some(prev) = self.history.last() {
            info!("mission: {:?} -> {:?}", prev, state);
        } else {
            info!("mission: {:?}", state);
        }
        self.history.push(state);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Sleep `d`, waking early if a stop is requested. Returns false if stopped.
    fn nap(&self, d: Duration) -> bool {
        let until = Instant::now() + d;
        loop {
            if self.stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            std::thread::sleep((until - now).min(NAP_SLICE));
        }
    }

    fn connect(&mut self) -> Option<C::Link> {
        let mut attempt = 0u32;
        loop {
            if self.stopped() {
                return None;
            }
            attempt += 1;
            match self.connector.connect(&self.address) {
                Ok(link) => {
                    info!("mission: connected to {} (attempt {})", self.address, attempt);
                    return Some(link);
                }
                Err(e) => {
                    warn!("mission: {}; retrying in {:?}", e, self.params.connect_retry);
                    if !self.nap(self.params.connect_retry) {
                        return None;
                    }
                }
            }
        }
    }

    fn wait_armable(&self, link: &C::Link) -> bool {
        let start = Instant::now();
        while !link.is_armable() {
            if start.elapsed() >= self.params.armable_limit {
                warn!("mission: vehicle not armable after {:?}, trying anyway", self.params.armable_limit);
                break;
            }
            info!("mission: waiting for vehicle to become armable");
            if !self.nap(self.params.wait_interval) {
                return false;
            }
        }
        !self.stopped()
    }

    fn wait_takeoff(&self, link: &C::Link) -> bool {
        let target = self.params.takeoff_reached();
        let start = Instant::now();
        loop {
            let alt = link.altitude();
            if alt >= target {
                info!("mission: reached {:.1}m", alt);
                return true;
            }
            if start.elapsed() >= self.params.takeoff_limit {
                warn!("mission: only {:.1}m after {:?}, continuing", alt, self.params.takeoff_limit);
                return true;
            }
            debug!("mission: climbing, {:.1}m of {:.1}m", alt, self.params.start_altitude);
            if !self.nap(self.params.wait_interval) {
                return false;
            }
        }
    }

    fn search(
        &mut self,
        link: &C::Link,
        mut source: Box<dyn beacon_nav::WaypointSource>,
        signal: &BeaconSignal,
    ) -> Result<SearchEnd, MissionError> {
        let mut current = link.position();
        loop {
            if let Some(end) = self.check(link, signal) {
                return Ok(end);
            }
            let Some(next) = source.next_waypoint(&current) else {
                info!("mission: search plan complete");
                return Ok(SearchEnd::PlanComplete);
            };
            let wp = next?;
            info!("mission: {:?} leg {} -> {}", wp.axis, wp.step_index, wp.target);
            link.send_position_target(&wp.target)?;
            self.targets_sent += 1;

            if let Some(end) = self.wait_arrival(link, signal) {
                return Ok(end);
            }
            current = link.position();
            if let Ok(off) = inverse(&current, &wp.target) {
                debug!("mission: arrived {:.1}m off target", off.distance_m);
            }
        }
    }

    /// Beacon first: the detector's own LAND must not read as an operator override.
    fn check(&self, link: &C::Link, signal: &BeaconSignal) -> Option<SearchEnd> {
        if signal.is_confirmed() {
            return Some(SearchEnd::Beacon);
        }
        if self.stopped() {
            return Some(SearchEnd::Interrupted);
        }
        match link.current_mode() {
            Some(FlightMode::Guided) | None => None,
            Some(other) => Some(SearchEnd::Override(other)),
        }
    }

    fn watch(&self, link: &C::Link, signal: &BeaconSignal, d: Duration) -> Option<SearchEnd> {
        let until = Instant::now() + d;
        loop {
            if let Some(end) = self.check(link, signal) {
                return Some(end);
            }
            let now = Instant::now();
            if now >= until {
                return None;
            }
            std::thread::sleep((until - now).min(self.params.speed_poll).min(NAP_SLICE));
        }
    }

    fn wait_arrival(&self, link: &C::Link, signal: &BeaconSignal) -> Option<SearchEnd> {
        if let Some(end) = self.watch(link, signal, self.params.settle) {
            return Some(end);
        }
        let start = Instant::now();
        loop {
            if let Some(end) = self.check(link, signal) {
                return Some(end);
            }
            let speed = link.groundspeed();
            if speed <= self.params.min_speed {
                return None;
            }
            if start.elapsed() >= self.params.arrival_limit {
                warn!("mission: still moving at {:.1}m/s after {:?}, next leg", speed, self.params.arrival_limit);
                return None;
            }
            if let Some(end) = self.watch(link, signal, self.params.speed_poll) {
                return Some(end);
            }
        }
    }

    /// Airborne in GUIDED with nobody steering: land best effort, keep the fault.
    fn land_after_fault(&mut self, link: &C::Link, fault: MissionError) -> MissionError {
        warn!("mission: {}, landing", fault);
        if let Err(e) = self.land(link) {
            error!("mission: LAND command failed: {}", e);
        }
        fault
    }

    fn land(&mut self, link: &C::Link) -> Result<(), MissionError> {
        self.enter(MissionState::Landing);
        link.set_mode(FlightMode::Land)?;
        Ok(())
    }
}
