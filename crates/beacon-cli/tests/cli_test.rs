use std::path::Path;
use std::process::{Command, Output};

const PARAMS: &str = r#"
WAIT_TIMEOUT = 1
CON_TIMEOUT = 5
FLY_SPEED = 2
START_ALTITUDE = 5
MEANDER_COUNT = 2
MEANDER_DISTANCE = 10
SEARCH_ANGLE = 60
FLY_ALTITUDE = 3
"#;

fn beacon_search(dir: &Path, params: &str, args: &[&str]) -> Output {
    beacon_search_at(dir, params, "info", args)
}

fn beacon_search_at(dir: &Path, params: &str, level: &str, args: &[&str]) -> Output {
    let cfg = dir.join("PARAMETERS.toml");
    std::fs::write(&cfg, params).unwrap();
    Command::new(env!("CARGO_BIN_EXE_beacon-search"))
        .arg("--config")
        .arg(&cfg)
        .arg("--log-file")
        .arg(dir.join("search.log"))
        .arg("--log")
        .arg(level)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn plan_prints_pattern_legs() {
    let dir = tempfile::tempdir().unwrap();
    let out = beacon_search(dir.path(), PARAMS, &["plan", "--lat", "53.476", "--lon", "9.93", "--heading", "0"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    let legs: Vec<&str> = stdout.lines().skip(1).collect();
    assert_eq!(legs.len(), 4, "{}", stdout);
    assert!(legs[0].contains("Forward") && legs[0].contains("10.00m"));
    assert!(legs[1].contains("Lateral") && legs[1].contains("5.77m"));
    assert!(legs[3].contains("17.32m"));
}

#[test]
fn plan_accepts_negative_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let out = beacon_search(dir.path(), PARAMS, &["plan", "--lat", "-33.9", "--lon", "-70.6", "--heading", "-45"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn log_file_is_appended() {
    let dir = tempfile::tempdir().unwrap();
    for _ in 0..2 {
        let out = beacon_search(dir.path(), PARAMS, &["doctor"]);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    }
    let log = std::fs::read_to_string(dir.path().join("search.log")).unwrap();
    assert_eq!(log.matches("started at").count(), 2, "{}", log);
}

#[test]
fn doctor_rejects_empty_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let params = PARAMS.replace("MEANDER_COUNT = 2", "MEANDER_COUNT = 0");
    let out = beacon_search(dir.path(), &params, &["doctor"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("MEANDER_COUNT"));
}

#[test]
fn missing_parameter_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let params = PARAMS.replace("FLY_ALTITUDE = 3\n", "");
    let out = beacon_search(dir.path(), &params, &["doctor"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("FLY_ALTITUDE"));
}

#[test]
fn run_needs_connect() {
    let dir = tempfile::tempdir().unwrap();
    let out = beacon_search(dir.path(), PARAMS, &["run"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("--connect"));
}

#[test]
fn simulated_flight_completes() {
    let dir = tempfile::tempdir().unwrap();
    let fast = PARAMS.replace("WAIT_TIMEOUT = 1", "WAIT_TIMEOUT = 0.01").replace("FLY_SPEED = 2", "FLY_SPEED = 2\nMEANDER_MIN_TIMEOUT = 0.01\nMEANDER_MIN_SPEED_TIMEOUT = 0.01");
    let out = beacon_search(dir.path(), &fast, &["--connect", "sim", "run"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("PatternComplete") && stdout.contains("4 targets"), "{}", stdout);
}

#[test]
fn python_style_log_level_still_logs() {
    let dir = tempfile::tempdir().unwrap();
    let params = format!("{}\n[beacon]\nenable = false\n", PARAMS);
    let out = beacon_search_at(dir.path(), &params, "WARNING", &["doctor"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let log = std::fs::read_to_string(dir.path().join("search.log")).unwrap();
    assert!(log.contains("beacon disabled"), "{}", log);
    assert!(!log.contains("started at"), "{}", log);
}

#[test]
fn unknown_log_level_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = beacon_search_at(dir.path(), PARAMS, "loud", &["doctor"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("loud"));
}
