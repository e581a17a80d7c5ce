mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

use tilecast_core::RateControl;

/// Highest quality level accepted for the wrapped codec.
const MAX_QUALITY_LEVEL: u8 = 51;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./tilecast.toml",
        "~/.config/tilecast/config.toml",
        "/etc/tilecast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let encoder = &config.encoder;

    if encoder.tile_width == 0 || encoder.tile_height == 0 {
        anyhow::bail!(
            "Tile size must be positive, got {}x{}",
            encoder.tile_width,
            encoder.tile_height
        );
    }
    if encoder.tile_width % 2 != 0 || encoder.tile_height % 2 != 0 {
        anyhow::bail!(
            "Tile size must be even for 4:2:0 video, got {}x{}",
            encoder.tile_width,
            encoder.tile_height
        );
    }
    if !(encoder.frame_rate.is_finite() && encoder.frame_rate > 0.0) {
        anyhow::bail!("Frame rate must be positive, got {}", encoder.frame_rate);
    }

    match encoder.rate_control {
        RateControl::Quality { level } if level > MAX_QUALITY_LEVEL => {
            anyhow::bail!(
                "Quality level must be between 0 and {}, got {}",
                MAX_QUALITY_LEVEL,
                level
            );
        }
        RateControl::Bitrate { bits_per_second: 0 } => {
            anyhow::bail!("Bitrate must be positive");
        }
        _ => {}
    }

    if encoder.container.min_capacity > encoder.container.max_size {
        anyhow::bail!(
            "Container min_capacity ({}) exceeds max_size ({})",
            encoder.container.min_capacity,
            encoder.container.max_size
        );
    }

    if encoder.strict_timing && !encoder.timing_check {
        tracing::warn!("strict_timing has no effect while timing_check is disabled");
    }

    if config.io.max_packet_size == 0 {
        anyhow::bail!("io.max_packet_size cannot be 0");
    }

    Ok(())
}
