//! Tests for loading and validating the host configuration file.

use std::fs;

use tempfile::tempdir;
use tilecast::config::{load_config, load_config_or_default, validate_config, Config};
use tilecast_core::{Lifecycle, PaddingMode, RateControl};

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tilecast.toml");
    fs::write(&path, content).unwrap();
    (dir, path)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn test_empty_file_is_default() {
    let (_dir, path) = write_config("");
    let config = load_config(&path).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.encoder.tile_width, 1920);
    assert_eq!(config.encoder.tile_height, 1088);
    assert_eq!(config.io.max_packet_size, 256 * 1024 * 1024);
}

#[test]
fn test_full_config() {
    let (_dir, path) = write_config(
        r#"
[encoder]
tile_width = 960
tile_height = 544
frame_rate = 59.94
lifecycle = "per_frame"
padding = "last_pixel"
max_b_frames = 2
timing_check = true
strict_timing = true
timing_tolerance_ms = 20

[encoder.rate_control]
mode = "bitrate"
bits_per_second = 40000000

[encoder.container]
min_capacity = 4096
max_size = 1048576

[decoder]
lifecycle = "per_frame"
max_push_retries = 8

[io]
max_packet_size = 2097152
debug_dump = "/tmp/tilecast-dump.bin"
"#,
    );
    let config = load_config(&path).unwrap();

    let encoder = &config.encoder;
    assert_eq!((encoder.tile_width, encoder.tile_height), (960, 544));
    assert_eq!(encoder.lifecycle, Lifecycle::PerFrame);
    assert_eq!(encoder.padding, PaddingMode::LastPixel);
    assert_eq!(
        encoder.rate_control,
        RateControl::Bitrate {
            bits_per_second: 40_000_000
        }
    );
    assert_eq!(encoder.container.min_capacity, 4096);
    assert_eq!(encoder.container.max_size, 1 << 20);
    assert!(encoder.strict_timing);
    assert_eq!(encoder.timing_tolerance_ms, 20);

    assert_eq!(config.decoder.lifecycle, Lifecycle::PerFrame);
    assert_eq!(config.decoder.max_push_retries, 8);
    assert_eq!(config.io.max_packet_size, 2 << 20);
    assert_eq!(
        config.io.debug_dump.as_deref(),
        Some(std::path::Path::new("/tmp/tilecast-dump.bin"))
    );
}

#[test]
fn test_partial_section_keeps_defaults() {
    let (_dir, path) = write_config("[encoder]\ntile_width = 640\n");
    let config = load_config(&path).unwrap();
    assert_eq!(config.encoder.tile_width, 640);
    assert_eq!(config.encoder.tile_height, 1088);
    assert_eq!(config.encoder.max_push_retries, 64);
    assert_eq!(config.decoder, Default::default());
}

#[test]
fn test_missing_file_fails() {
    let dir = tempdir().unwrap();
    let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_malformed_toml_fails() {
    let (_dir, path) = write_config("[encoder\ntile_width = ");
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_unknown_lifecycle_fails() {
    let (_dir, path) = write_config("[decoder]\nlifecycle = \"sometimes\"\n");
    assert!(load_config(&path).is_err());
}

#[test]
fn test_explicit_path_wins() {
    let (_dir, path) = write_config("[encoder]\ntile_width = 320\ntile_height = 240\n");
    let config = load_config_or_default(Some(&path)).unwrap();
    assert_eq!(config.encoder.tile_width, 320);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_default_config_is_valid() {
    validate_config(&Config::default()).unwrap();
}

#[test]
fn test_rejects_zero_tile() {
    let mut config = Config::default();
    config.encoder.tile_height = 0;
    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("Tile size must be positive"));
}

#[test]
fn test_rejects_odd_tile() {
    let mut config = Config::default();
    config.encoder.tile_width = 1919;
    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("even"));
}

#[test]
fn test_rejects_bad_frame_rate() {
    let mut config = Config::default();
    config.encoder.frame_rate = 0.0;
    assert!(validate_config(&config).is_err());
    config.encoder.frame_rate = f64::NAN;
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_rejects_quality_out_of_range() {
    let mut config = Config::default();
    config.encoder.rate_control = RateControl::Quality { level: 52 };
    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("Quality level"));

    config.encoder.rate_control = RateControl::Quality { level: 51 };
    validate_config(&config).unwrap();
}

#[test]
fn test_rejects_zero_bitrate() {
    let mut config = Config::default();
    config.encoder.rate_control = RateControl::Bitrate { bits_per_second: 0 };
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_rejects_inverted_container_limits() {
    let mut config = Config::default();
    config.encoder.container.min_capacity = 2048;
    config.encoder.container.max_size = 1024;
    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("min_capacity"));
}

#[test]
fn test_rejects_zero_packet_limit() {
    let mut config = Config::default();
    config.io.max_packet_size = 0;
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_strict_timing_without_check_is_allowed() {
    let mut config = Config::default();
    config.encoder.strict_timing = true;
    config.encoder.timing_check = false;
    validate_config(&config).unwrap();
}
