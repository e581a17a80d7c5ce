//! Encode and decode session settings.
//!
//! These are plain serde structs so the host can embed them in its own
//! configuration file. Every section defaults sensibly, so an empty table is
//! valid.

use serde::{Deserialize, Serialize};

use crate::geometry::TileGrid;

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// Rate control for the wrapped tile encoder. Bitrate and quality are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateControl {
    /// Target bitrate for the whole super-frame stream.
    Bitrate { bits_per_second: u64 },
    /// Constant quality level (codec-specific scale, 0 = best).
    Quality { level: u8 },
}

impl Default for RateControl {
    fn default() -> Self {
        RateControl::Quality { level: 23 }
    }
}

/// When the wrapped codec instance is created and torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// One instance lives for the whole stream.
    #[default]
    Continuous,
    /// A fresh instance per super-frame.
    PerFrame,
}

/// How tiles that run past the frame edge are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingMode {
    /// Replicate the nearest in-bounds sample of the same row or column.
    #[default]
    Edge,
    /// Replicate the frame's bottom-right sample everywhere.
    LastPixel,
}

// ---------------------------------------------------------------------------
// Container limits
// ---------------------------------------------------------------------------

/// Sizing of the merge buffer behind each container packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerLimits {
    /// Smallest buffer allocated when a super-frame opens.
    pub min_capacity: usize,
    /// Hard maximum a single container packet may reach.
    pub max_size: usize,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            min_capacity: 64 * 1024,
            max_size: 256 * 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Settings for a tile encode session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub tile_width: u32,
    pub tile_height: u32,
    pub rate_control: RateControl,
    pub frame_rate: f64,
    pub lifecycle: Lifecycle,
    /// Requested B-frames; forced to zero for codecs that cannot reorder
    /// single-tile streams losslessly.
    pub max_b_frames: u32,
    pub padding: PaddingMode,
    pub container: ContainerLimits,
    /// Compare super-frame closure cadence against the frame rate.
    pub timing_check: bool,
    /// Promote timing deviations to errors.
    pub strict_timing: bool,
    pub timing_tolerance_ms: u64,
    /// Push attempts before a codec that keeps answering "retry" is an error.
    pub max_push_retries: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            tile_width: 1920,
            tile_height: 1088,
            rate_control: RateControl::default(),
            frame_rate: 30.0,
            lifecycle: Lifecycle::default(),
            max_b_frames: 0,
            padding: PaddingMode::default(),
            container: ContainerLimits::default(),
            timing_check: false,
            strict_timing: false,
            timing_tolerance_ms: 100,
            max_push_retries: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Settings for a tile decode session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    pub lifecycle: Lifecycle,
    pub max_push_retries: u32,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            max_push_retries: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Wrapped codec configuration
// ---------------------------------------------------------------------------

/// Configuration handed to the wrapped single-tile codec when it is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct TileCodecConfig {
    pub width: u32,
    pub height: u32,
    /// GOP length; equals the tile count so each super-frame starts on a
    /// keyframe.
    pub gop_size: u32,
    pub keyframe_interval: u32,
    pub rate_control: RateControl,
    pub frame_rate: f64,
    pub max_b_frames: u32,
}

/// GOP length for `grid`. Sessions reject grids whose tile count does not
/// fit the container header, so saturation is never reached in practice.
fn gop_for(grid: &TileGrid) -> u32 {
    u32::try_from(grid.num_tiles()).unwrap_or(u32::MAX)
}

impl TileCodecConfig {
    /// Encoder configuration for one tile of `grid`.
    pub fn for_encoder(grid: &TileGrid, settings: &EncoderSettings) -> Self {
        let tiles = gop_for(grid);
        Self {
            width: grid.tile_width(),
            height: grid.tile_height(),
            gop_size: tiles,
            keyframe_interval: tiles,
            rate_control: settings.rate_control,
            frame_rate: settings.frame_rate,
            max_b_frames: settings.max_b_frames,
        }
    }

    /// Decoder configuration for one tile of `grid`.
    pub fn for_decoder(grid: &TileGrid) -> Self {
        let tiles = gop_for(grid);
        Self {
            width: grid.tile_width(),
            height: grid.tile_height(),
            gop_size: tiles,
            keyframe_interval: tiles,
            rate_control: RateControl::default(),
            frame_rate: 0.0,
            max_b_frames: 0,
        }
    }
}
