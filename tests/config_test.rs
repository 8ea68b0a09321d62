//! Configuration file round trips and validation
//!
//! Run with: cargo test --test config_test

use servofocus::config::{AngleRangeConfig, ServofocusConfig};
use servofocus::SweepError;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("servofocus.toml");

    let mut config = ServofocusConfig::default();
    config.sweep.threads = 6;
    config.sweep.mask_path = Some(PathBuf::from("/tmp/mask.png"));
    config.angles = AngleRangeConfig {
        start: 150,
        end: 30,
        step: 10,
    };
    config.autofocus.median_filter = false;

    config.save_to_file(&path).unwrap();
    assert!(path.exists());

    let loaded = ServofocusConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(loaded.validate().is_ok());
    assert_eq!(loaded.angles.sequence().unwrap().first(), 150);
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let loaded = ServofocusConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, ServofocusConfig::default());
}

#[test]
fn test_malformed_file_is_config_file_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[sweep\nthreads = ").unwrap();

    let err = ServofocusConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, SweepError::ConfigFile(_)));
    assert!(err.is_configuration());
}

#[test]
fn test_hand_written_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("servofocus.toml");
    std::fs::write(
        &path,
        r#"
[sweep]
resolution = [320, 240]
framerate = 15
seconds_per_degree = 0.01

[actuator]
device = "/dev/ttyUSB0"
baud = 115200
max_angle = 120

[angles]
start = 10
end = 110
step = 20
"#,
    )
    .unwrap();

    let config = ServofocusConfig::load_from_file(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.sweep.resolution().to_string(), "320x240");
    assert_eq!(config.sweep.threads, 4);
    assert_eq!(config.actuator.device, PathBuf::from("/dev/ttyUSB0"));
    assert_eq!(config.actuator.baud, 115200);
    assert_eq!(config.actuator.min_angle, 0);
    assert_eq!(
        config.angles.sequence().unwrap().as_slice(),
        &[10, 30, 50, 70, 90, 110]
    );
    assert!(config.autofocus.median_filter);
}

#[test]
fn test_angles_outside_actuator_range_rejected() {
    let mut config = ServofocusConfig::default();
    config.actuator.min_angle = 20;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("outside actuator range"));

    let mut config = ServofocusConfig::default();
    config.angles.step = 0;
    assert!(matches!(config.validate(), Err(SweepError::Config(_))));
}

#[test]
fn test_i2c_actuator_device_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("servofocus.toml");
    std::fs::write(&path, "[actuator]\ndevice = \"/dev/i2c-1\"\n").unwrap();

    let config = ServofocusConfig::load_from_file(&path).unwrap();
    assert_eq!(config.actuator.baud, 9600);
    let err = config.validate().unwrap_err();
    assert!(matches!(err, SweepError::Config(_)));
    assert!(err.to_string().contains("I2C"));
}
