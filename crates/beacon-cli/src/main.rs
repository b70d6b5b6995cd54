mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use beacon_fc::mav::MavConnector;
use beacon_fc::sim::{SimConnector, SimVehicle, SIM_HOME};
use beacon_fc::LinkAddress;
use beacon_mission::{MissionController, MissionReport, Outcome, Plan};
use beacon_nav::doctor as nav_doctor;
use beacon_nav::SearchPattern;
use beacon_proto::GeoPoint;
use beacon_sense::{BeaconSensor, GpioBeacon, ManualBeacon};

use config::Parameters;

#[derive(Debug, Parser)]
#[command(name = "beacon-search", version, about = "Beacon search mission controller")]
struct Cli {
    /// Autopilot address: mavlink URL, /dev/ttyX,BAUD, host:port, auto or sim.
    #[arg(long)]
    connect: Option<String>,

    /// Log level: trace, debug, info, warn(ing), error or critical.
    /// RUST_LOG takes precedence.
    #[arg(long, default_value = "warn", value_parser = parse_level)]
    log: Level,

    #[arg(long, default_value = "PARAMETERS.toml")]
    config: PathBuf,

    #[arg(long, default_value = "search.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fly the search (default).
    Run,
    /// Print the waypoints the search would fly from a given start.
    Plan {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        heading: f64,
    },
    /// Validate the parameter file.
    Doctor,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log, &cli.log_file) {
        eprintln!("error: {:#}", e);
        return ExitCode::FAILURE;
    }
    banner();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Accepts the level names of the old parameter sheets as well as tracing's.
fn parse_level(s: &str) -> Result<Level, String> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" | "critical" => Ok(Level::ERROR),
        _ => Err(format!("unknown log level {:?}", s)),
    }
}

fn init_logging(level: Level, path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .init();
    Ok(())
}

fn banner() {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = now
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"))
        .unwrap_or_else(|_| now.to_string());
    info!("beacon-search {} started at {}", env!("CARGO_PKG_VERSION"), stamp);
}

async fn dispatch(cli: Cli) -> Result<()> {
    let params = Parameters::load(&cli.config).context("load parameters")?;
    match cli.cmd.unwrap_or(Command::Run) {
        Command::Run => run(cli.connect, params).await,
        Command::Plan { lat, lon, heading } => plan(&params, GeoPoint::new(lat, lon, 0.0), heading),
        Command::Doctor => doctor(cli.connect.as_deref(), &params),
    }
}

fn checked_plan(params: &Parameters) -> Result<Plan> {
    let plan = params.plan();
    match &plan {
        Plan::Pattern(sp) => nav_doctor::check_search_parameters(sp)?,
        Plan::Route(r) => nav_doctor::check_route(r)?,
    }
    Ok(plan)
}

async fn run(connect: Option<String>, params: Parameters) -> Result<()> {
    let address = connect.context("--connect is required to fly")?;
    let link: LinkAddress = address.parse()?;
    let plan = checked_plan(&params)?;
    let mission = params.mission_params();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt: stopping mission");
            stop_on_signal.store(true, Ordering::Release);
        }
    });

    info!("run: connecting to {}", link);
    let report = match link {
        LinkAddress::Sim => {
            let connector = SimConnector::new(Arc::new(SimVehicle::new(SIM_HOME)));
            let mut beacon = ManualBeacon::new();
            tokio::task::spawn_blocking(move || {
                MissionController::new(connector, address, mission, stop).run(plan, &mut beacon)
            })
            .await
            .context("mission thread")?
        }
        _ => {
            let connector = MavConnector::new(params.fc.clone());
            let mut beacon: Box<dyn BeaconSensor> = if params.beacon.enable {
                Box::new(GpioBeacon::new(params.beacon.clone()).context("beacon")?)
            } else {
                warn!("run: beacon disabled, flying the plan blind");
                Box::new(ManualBeacon::new())
            };
            tokio::task::spawn_blocking(move || {
                MissionController::new(connector, address, mission, stop).run(plan, beacon.as_mut())
            })
            .await
            .context("mission thread")?
        }
    };
    finish(report)
}

fn finish(report: MissionReport) -> Result<()> {
    let MissionReport { outcome, history, targets_sent, override_mode } = report;
    info!("run: states {:?}", history);
    match outcome {
        Outcome::Success(reason) => {
            info!("run: {:?}, {} targets flown", reason, targets_sent);
            println!("mission complete: {:?} ({} targets)", reason, targets_sent);
            Ok(())
        }
        Outcome::Aborted(reason) => {
            let by = override_mode.map(|m| format!(" ({})", m)).unwrap_or_default();
            warn!("run: aborted {:?}{} after {} targets", reason, by, targets_sent);
            println!("mission aborted: {:?}{} ({} targets)", reason, by, targets_sent);
            Ok(())
        }
        Outcome::Error(e) => Err(anyhow::Error::new(e).context(format!("mission failed after {} targets", targets_sent))),
    }
}

fn plan(params: &Parameters, start: GeoPoint, heading: f64) -> Result<()> {
    let waypoints = match checked_plan(params)? {
        Plan::Pattern(sp) => SearchPattern::new(heading, sp).preview(start).context("pattern preview")?,
        Plan::Route(route) => {
            let mut source = route.into_source();
            let mut out = Vec::new();
            while let Some(wp) = beacon_nav::WaypointSource::next_waypoint(&mut source, &start) {
                out.push(wp?);
            }
            out
        }
    };

    let mut from = start;
    println!("start {}", start);
    for wp in &waypoints {
        let leg = beacon_nav::inverse(&from, &wp.target).context("leg length")?;
        println!(
            "{:>3} {:<8} {:>8.2}m @ {:>6.1}  -> {}",
            wp.step_index,
            format!("{:?}", wp.axis),
            leg.distance_m,
            leg.initial_bearing_deg,
            wp.target
        );
        from = wp.target;
    }
    info!("plan: {} waypoints", waypoints.len());
    Ok(())
}

fn doctor(connect: Option<&str>, params: &Parameters) -> Result<()> {
    info!("doctor: starting");

    checked_plan(params)?;
    anyhow::ensure!(
        params.meander_min_speed < params.fly_speed,
        "MEANDER_MIN_SPEED {} must be below FLY_SPEED {}",
        params.meander_min_speed,
        params.fly_speed
    );
    anyhow::ensure!(params.wait_timeout > 0.0, "WAIT_TIMEOUT must be > 0");

    if params.beacon.enable {
        let gpio = Path::new("/sys/class/gpio");
        if !gpio.exists() {
            warn!("doctor: {} missing, beacon line cannot be opened on this host", gpio.display());
            println!("doctor: warning: {} missing", gpio.display());
        }
    } else {
        warn!("doctor: beacon disabled");
    }

    if let Some(addr) = connect {
        let link: LinkAddress = addr.parse()?;
        if let LinkAddress::Serial { dev, .. } = &link {
            anyhow::ensure!(Path::new(dev).exists(), "serial device {} not found", dev);
        }
        info!("doctor: link address {} OK", link);
    }

    info!("doctor: OK");
    println!("doctor: OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_accept_old_names() {
        assert_eq!(parse_level("WARNING"), Ok(Level::WARN));
        assert_eq!(parse_level("warn"), Ok(Level::WARN));
        assert_eq!(parse_level("CRITICAL"), Ok(Level::ERROR));
        assert_eq!(parse_level("Info"), Ok(Level::INFO));
        assert!(parse_level("loud").is_err());
        assert!(parse_level("beacon=debug").is_err());
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["beacon-search"]).unwrap();
        assert_eq!(cli.log, Level::WARN);
        assert!(cli.cmd.is_none());
        assert!(Cli::try_parse_from(["beacon-search", "--log", "verbose"]).is_err());
    }
}
