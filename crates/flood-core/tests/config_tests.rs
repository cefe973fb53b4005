//! Scenario file loading and validation.

use std::time::Duration;

use flood_core::{FloodError, RampController, RunConfig, Scheme};
use test_utils::fixtures::scenarios;
use test_utils::write_temp_file;

#[test]
fn test_from_file_smoke_scenario() {
    let (_dir, path) = write_temp_file("smoke.yaml", scenarios::LOCAL_SMOKE);
    let config = RunConfig::from_file(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.scheme, Scheme::Ws);
    assert_eq!(config.target_vus, 5);
    assert_eq!(config.heartbeat_interval(), Duration::from_millis(500));

    let ramp = RampController::from_config(&config);
    assert_eq!(ramp.total_duration(), Duration::from_secs(6));
    assert_eq!(ramp.target(Duration::from_secs(3)), 5);
}

#[test]
fn test_from_file_reconnect_scenario() {
    let (_dir, path) = write_temp_file("reconnect.yaml", scenarios::RECONNECT);
    let config = RunConfig::from_file(&path).unwrap();
    config.validate().unwrap();

    assert!(config.reconnect);
    assert_eq!(config.total_session(), Duration::from_secs(150));
    assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
}

#[test]
fn test_zero_slice_rejected_at_startup() {
    let config = RunConfig::from_yaml(scenarios::ZERO_SLICE).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, FloodError::InvalidConfig { .. }));
    assert!(err.to_string().contains("slice_secs"));
}

#[test]
fn test_non_numeric_rejected_at_load() {
    let err = RunConfig::from_yaml(scenarios::NON_NUMERIC).unwrap_err();
    assert!(matches!(err, FloodError::Scenario(_)));
}

#[test]
fn test_missing_file() {
    let err = RunConfig::from_file("/nonexistent/flood.yaml").unwrap_err();
    assert!(matches!(err, FloodError::Io(_)));
}
