use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use tilecast_core::{DecoderSettings, EncoderSettings};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub encoder: EncoderSettings,

    #[serde(default)]
    pub decoder: DecoderSettings,

    #[serde(default)]
    pub io: IoConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IoConfig {
    /// Largest container packet accepted when reading a stream file
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Copy every emitted container packet to this file while encoding
    #[serde(default)]
    pub debug_dump: Option<PathBuf>,
}

fn default_max_packet_size() -> usize {
    256 * 1024 * 1024
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_packet_size: default_max_packet_size(),
            debug_dump: None,
        }
    }
}
