use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tilecast")]
#[command(author, version, about = "Tile-based transcoding for oversized video frames")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a raw I420 file into a tile stream
    Encode {
        /// Raw I420 input file
        #[arg(short, long)]
        input: PathBuf,

        /// Tile stream output file
        #[arg(short, long)]
        output: PathBuf,

        /// Frame width in pixels
        #[arg(long)]
        width: u32,

        /// Frame height in pixels
        #[arg(long)]
        height: u32,

        /// Tile width (overrides config)
        #[arg(long)]
        tile_width: Option<u32>,

        /// Tile height (overrides config)
        #[arg(long)]
        tile_height: Option<u32>,

        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,

        /// Print session statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode a tile stream back into raw I420
    Decode {
        /// Tile stream input file
        #[arg(short, long)]
        input: PathBuf,

        /// Raw I420 output file
        #[arg(short, long)]
        output: PathBuf,

        /// Print session statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the geometry and packet headers of a tile stream
    Inspect {
        /// Tile stream file
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
