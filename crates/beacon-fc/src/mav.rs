use beacon_proto::GeoPoint;
use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavType,
        PositionTargetTypemask, COMMAND_LONG_DATA, HEARTBEAT_DATA, SET_POSITION_TARGET_GLOBAL_INT_DATA,
    },
    MavConnection, MavHeader,
};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::address::LinkAddress;
use crate::autodetect;
use crate::mode::FlightMode;
use crate::state::Telemetry;
use crate::{Autopilot, Connector, FcConfig, FcError};

/// Position only: velocity, acceleration, yaw and yaw rate ignored.
const POSITION_ONLY: u16 = 0b0000_1111_1111_1000;

type Conn = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// MAVLink link to the autopilot.
///
/// A reader thread keeps [`Telemetry`] current and a second thread sends the
/// companion heartbeat. Both stop when the link is dropped (the reader after
/// its next message).
pub struct MavLink {
    conn: Conn,
    seq: Arc<AtomicU8>,
    sys_id: u8,
    comp_id: u8,
    target_sys: u8,
    target_comp: u8,
    telemetry: Arc<Mutex<Telemetry>>,
    stop: Arc<AtomicBool>,
}

impl MavLink {
    pub fn open(url: &str, cfg: &FcConfig) -> Result<Self, FcError> {
        let conn: Conn = mavlink::connect::<MavMessage>(url)
            .map(Arc::from)
            .map_err(|e| FcError::Connection(format!("mavlink connect {}: {}", url, e)))?;

        let link = Self {
            conn,
            seq: Arc::new(AtomicU8::new(0)),
            sys_id: cfg.sys_id,
            comp_id: cfg.comp_id,
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            telemetry: Arc::new(Mutex::new(Telemetry::default())),
            stop: Arc::new(AtomicBool::new(false)),
        };
        link.spawn_reader()?;
        link.spawn_heartbeat(cfg.send_heartbeat_hz)?;
        debug!("fc: opened {}", url);
        Ok(link)
    }

    fn spawn_reader(&self) -> Result<(), FcError> {
        let conn = self.conn.clone();
        let telemetry = self.telemetry.clone();
        let stop = self.stop.clone();
        std::thread::Builder::new()
            .name("fc-reader".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    match conn.recv() {
                        Ok((_hdr, msg)) => lock(&telemetry).apply(&msg),
                        Err(e) => {
                            debug!("fc: recv: {}", e);
                            std::thread::sleep(Duration::from_millis(10));
                        }
                    }
                }
            })
            .map_err(|e| FcError::Connection(format!("spawn reader: {}", e)))?;
        Ok(())
    }

    fn spawn_heartbeat(&self, hz: f32) -> Result<(), FcError> {
        let period = Duration::from_secs_f32(1.0 / hz.max(0.1));
        let conn = self.conn.clone();
        let stop = self.stop.clone();
        let seq = self.seq.clone();
        let (sys_id, comp_id) = (self.sys_id, self.comp_id);
        std::thread::Builder::new()
            .name("fc-heartbeat".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let hdr = header(&seq, sys_id, comp_id);
                    if let Err(e) = conn.send(&hdr, &companion_heartbeat()) {
                        debug!("fc: heartbeat send: {}", e);
                    }
                    std::thread::sleep(period);
                }
            })
            .map_err(|e| FcError::Connection(format!("spawn heartbeat: {}", e)))?;
        Ok(())
    }

    /// Blocks until an autopilot heartbeat has been seen or `timeout` passes.
    pub fn wait_heartbeat(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.telemetry().last_heartbeat.is_some() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        false
    }

    pub fn telemetry(&self) -> MutexGuard<'_, Telemetry> {
        lock(&self.telemetry)
    }

    fn send(&self, what: &'static str, msg: MavMessage) -> Result<(), FcError> {
        let hdr = header(&self.seq, self.sys_id, self.comp_id);
        self.conn.send(&hdr, &msg).map_err(|e| FcError::Command(what, e.to_string()))?;
        Ok(())
    }

    fn command(&self, what: &'static str, command: MavCmd, params: [f32; 7]) -> Result<(), FcError> {
        let cmd = COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        self.send(what, MavMessage::COMMAND_LONG(cmd))
    }
}

impl Drop for MavLink {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

impl Autopilot for MavLink {
    fn is_armable(&self) -> bool {
        self.telemetry().is_armable()
    }

    fn arm(&self) -> Result<(), FcError> {
        info!("fc: arming");
        self.command("arm", MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    fn set_mode(&self, mode: FlightMode) -> Result<(), FcError> {
        info!("fc: mode -> {}", mode);
        let base = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        self.command("set_mode", MavCmd::MAV_CMD_DO_SET_MODE, [base, mode.custom_mode() as f32, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    fn takeoff(&self, altitude_m: f64) -> Result<(), FcError> {
        info!("fc: takeoff to {:.1}m", altitude_m);
        self.command("takeoff", MavCmd::MAV_CMD_NAV_TAKEOFF, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude_m as f32])
    }

    fn set_groundspeed(&self, mps: f64) -> Result<(), FcError> {
        // speed type 1 = ground speed, throttle -1 = no change
        self.command("set_groundspeed", MavCmd::MAV_CMD_DO_CHANGE_SPEED, [1.0, mps as f32, -1.0, 0.0, 0.0, 0.0, 0.0])
    }

    fn send_position_target(&self, target: &GeoPoint) -> Result<(), FcError> {
        let (lat_int, lon_int) = target.to_e7();
        let msg = SET_POSITION_TARGET_GLOBAL_INT_DATA {
            time_boot_ms: 0,
            lat_int,
            lon_int,
            alt: target.alt as f32,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw: 0.0,
            yaw_rate: 0.0,
            type_mask: PositionTargetTypemask::from_bits_truncate(POSITION_ONLY),
            target_system: self.target_sys,
            target_component: self.target_comp,
            coordinate_frame: MavFrame::MAV_FRAME_GLOBAL_TERRAIN_ALT_INT,
        };
        self.send("position_target", MavMessage::SET_POSITION_TARGET_GLOBAL_INT(msg))
    }

    fn altitude(&self) -> f64 {
        self.telemetry().altitude()
    }

    fn groundspeed(&self) -> f64 {
        self.telemetry().groundspeed
    }

    fn heading(&self) -> f64 {
        self.telemetry().heading
    }

    fn position(&self) -> GeoPoint {
        self.telemetry().position.unwrap_or(GeoPoint::new(0.0, 0.0, 0.0))
    }

    fn current_mode(&self) -> Option<FlightMode> {
        self.telemetry().mode
    }
}

/// Opens [`MavLink`]s from operator addresses.
///
/// A link whose heartbeat wait timed out is kept and handed back on the next
/// attempt at the same address, so a listening UDP socket is bound only once.
pub struct MavConnector {
    cfg: FcConfig,
    pending: Mutex<Option<(String, MavLink)>>,
}

impl MavConnector {
    pub fn new(cfg: FcConfig) -> Self {
        Self { cfg, pending: Mutex::new(None) }
    }

    fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.heartbeat_timeout_ms)
    }
}

impl Connector for MavConnector {
    type Link = MavLink;

    fn connect(&self, address: &str) -> Result<MavLink, FcError> {
        let addr: LinkAddress = address.parse()?;
        match &addr {
            LinkAddress::Sim => {
                return Err(FcError::Address(address.to_string(), "sim is not a MAVLink address".into()))
            }
            LinkAddress::Auto => {
                let (dev, baud, link) = autodetect::find_autopilot(&self.cfg)?;
                info!("fc: autodetected {} @ {}", dev, baud);
                return Ok(link);
            }
            LinkAddress::Serial { dev, baud } => {
                // busy or missing device
                tokio_serial::new(dev.as_str(), *baud)
                    .open()
                    .map_err(|e| FcError::Connection(format!("open {}: {}", dev, e)))?;
            }
            LinkAddress::Url(_) => {}
        }
        let url = addr
            .mavlink_url()
            .ok_or_else(|| FcError::Address(address.to_string(), "no MAVLink url".into()))?;

        let reused = {
            let mut pending = lock(&self.pending);
            match pending.take() {
                Some((u, link)) if u == url => Some(link),
                _ => None,
            }
        };
        let link = match reused {
            Some(link) => link,
            None => MavLink::open(&url, &self.cfg)?,
        };

        if link.wait_heartbeat(self.heartbeat_timeout()) {
            info!("fc: heartbeat from {}", addr);
            Ok(link)
        } else {
            warn!("fc: no heartbeat from {} within {:?}", addr, self.heartbeat_timeout());
            *lock(&self.pending) = Some((url, link));
            Err(FcError::Connection(format!("no heartbeat from {}", addr)))
        }
    }
}

fn header(seq: &AtomicU8, system_id: u8, component_id: u8) -> MavHeader {
    MavHeader { system_id, component_id, sequence: seq.fetch_add(1, Ordering::Relaxed) }
}

fn companion_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
