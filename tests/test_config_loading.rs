use std::io::Write;
use std::time::Duration;

use signalrig::config::ConfigLoader;
use signalrig::error::{ConfigError, SignalRigError};
use signalrig::signal::PhaseCatalog;

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn full_configuration_round_trips_into_typed_settings() {
    let file = yaml_file(
        r"
timing:
  red_clearance: 1s
  yellow: 4s
  idle_poll: 10s
  cycle_pause: 500ms
  command_stagger: 0
policy:
  base_green: 4
  per_vehicle: 3
  min_green: 6
  max_green: 30
  max_group_streak: 2
hardware:
  link: 192.168.4.20:5000
  connect_timeout: 3s
  ack_timeout: 250ms
  head_map: ABCDEF
  reconnect_interval: 30s
persistence:
  cycle_log: /var/lib/signalrig/cycles.jsonl
",
    );
    let result = ConfigLoader::new().load(file.path()).unwrap();
    let config = result.config;

    assert!(result.warnings.is_empty());
    assert_eq!(config.timing.red_clearance, Duration::from_secs(1));
    assert_eq!(config.timing.cycle_pause, Duration::from_millis(500));
    assert_eq!(config.timing.command_stagger, Duration::ZERO);
    assert_eq!(config.policy.green_time(2), 10);
    assert_eq!(config.policy.green_time(20), 30);
    assert_eq!(config.hardware.ack_timeout, Some(Duration::from_millis(250)));
    assert_eq!(config.hardware.reconnect_interval, Duration::from_secs(30));
    assert_eq!(
        config.hardware.parsed_head_map().unwrap().head(signalrig::signal::Lane::new(2).unwrap()),
        'C'
    );
    assert_eq!(
        config.persistence.cycle_log.as_deref(),
        Some(std::path::Path::new("/var/lib/signalrig/cycles.jsonl"))
    );
    assert_eq!(config.build_catalog().unwrap(), PhaseCatalog::standard());
}

#[test]
fn custom_catalog_is_built() {
    let file = yaml_file(
        r"
catalog:
  - id: 1
    name: NORTH
    lanes: [0, 1]
    group: AVENUE
  - id: 2
    name: SOUTH
    lanes: [2]
    group: AVENUE
  - id: 3
    name: EAST
    lanes: [3, 4]
    group: INTERSECTION
  - id: 4
    name: WEST
    lanes: [5]
    group: INTERSECTION
",
    );
    let config = ConfigLoader::new().load(file.path()).unwrap().config;
    let catalog = config.build_catalog().unwrap();
    assert_eq!(catalog.phases().len(), 4);
    assert_eq!(catalog.resolve("east").unwrap().lanes.len(), 2);
}

#[test]
fn paired_subphases_that_conflict_are_rejected() {
    let file = yaml_file(
        r"
catalog:
  - id: 1
    name: NORTH
    lanes: [1, 2]
    conflicts: [4, 5]
    group: AVENUE
  - id: 2
    name: SOUTH
    lanes: [4, 5]
    conflicts: [1, 2]
    group: AVENUE
",
    );
    let err = ConfigLoader::new().load(file.path()).unwrap_err();
    let ConfigError::ValidationError { errors, .. } = &err else {
        panic!("expected validation error, got {err}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "catalog");
    let message = &errors[0].message;
    assert!(message.contains("'NORTH' conflicts with lane 4("), "{message}");
    assert!(message.ends_with("of its partner 'SOUTH'"), "{message}");
}

#[test]
fn every_validation_error_is_reported_at_once() {
    let file = yaml_file(
        "policy:\n  min_green: 50\n  max_group_streak: 0\ntiming:\n  idle_poll: 0s\nhardware:\n  head_map: AAB\n",
    );
    let err = ConfigLoader::new().load(file.path()).unwrap_err();
    let ConfigError::ValidationError { errors, .. } = &err else {
        panic!("expected validation error, got {err}");
    };
    let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "policy.min_green",
            "policy.max_group_streak",
            "timing.idle_poll",
            "hardware.head_map"
        ]
    );
    assert_eq!(SignalRigError::from(err).exit_code(), 2);
}

#[test]
fn env_variables_are_substituted() {
    let file = yaml_file("hardware:\n  link: ${SIGNALRIG_IT_UNSET_HOST:-10.1.1.1}:7000\n");
    let config = ConfigLoader::new().load(file.path()).unwrap().config;
    assert_eq!(config.hardware.link.as_deref(), Some("10.1.1.1:7000"));
}

#[test]
fn unknown_keys_fail_to_parse() {
    let file = yaml_file("timing:\n  yelow: 3s\n");
    assert!(matches!(
        ConfigLoader::new().load(file.path()),
        Err(ConfigError::ParseError { .. })
    ));
}
