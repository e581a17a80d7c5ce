mod cli;

use tilecast::{config, inspect, stream, yuv};
use tilecast_pipeline::{PacketSink, RawTileCodec, TileDecodeSession, TileEncodeSession};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tilecast=trace,tilecast_pipeline=trace,tilecast_bitstream=trace,tilecast_core=debug"
                .to_string()
        } else {
            "tilecast=info,tilecast_pipeline=info,tilecast_bitstream=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Encode {
            input,
            output,
            width,
            height,
            tile_width,
            tile_height,
            frames,
            json,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(w) = tile_width {
                config.encoder.tile_width = w;
            }
            if let Some(h) = tile_height {
                config.encoder.tile_height = h;
            }
            config::validate_config(&config)?;
            encode_file(&input, &output, width, height, frames, json, &config)
        }
        Commands::Decode {
            input,
            output,
            json,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            decode_file(&input, &output, json, &config)
        }
        Commands::Inspect { file, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            inspect_file(&file, json, &config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("tilecast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn encode_file(
    input: &Path,
    output: &Path,
    width: u32,
    height: u32,
    max_frames: Option<u64>,
    json: bool,
    config: &config::Config,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let source = File::open(input).with_context(|| format!("Failed to open {:?}", input))?;
    let mut reader = yuv::I420Reader::new(BufReader::new(source), width, height);

    let mut session = TileEncodeSession::new(RawTileCodec::new(), &config.encoder, width, height)
        .context("Failed to open encode session")?;
    if let Some(path) = &config.io.debug_dump {
        let dump = File::create(path)
            .with_context(|| format!("Failed to create debug dump {:?}", path))?;
        session = session.with_debug_sink(PacketSink::new(BufWriter::new(dump)));
        tracing::info!("Dumping container packets to {:?}", path);
    }

    let sink = File::create(output).with_context(|| format!("Failed to create {:?}", output))?;
    let mut writer = stream::StreamWriter::new(BufWriter::new(sink), &session.geometry_record())?;

    tracing::info!(
        "Encoding {:?} ({}x{}) as {} tiles of {}x{}",
        input,
        width,
        height,
        session.grid().num_tiles(),
        session.grid().tile_width(),
        session.grid().tile_height()
    );

    while max_frames.map_or(true, |limit| reader.frames() < limit) {
        let Some(frame) = reader.read_frame()? else {
            break;
        };
        if let Err(e) = session.encode_frame(&frame) {
            if e.is_stream_fatal() {
                session.abort();
                return Err(e).context("Encoding failed");
            }
            tracing::error!("Super-frame {} dropped: {}", reader.frames() - 1, e);
        }
        for packet in session.drain_packets() {
            writer.write_packet(&packet)?;
        }
    }

    if let Err(e) = session.finish() {
        if e.is_stream_fatal() {
            return Err(e).context("Encoding failed");
        }
        tracing::error!("Last super-frame dropped: {}", e);
    }
    for packet in session.drain_packets() {
        writer.write_packet(&packet)?;
    }
    let packets = writer.packets();
    writer.finish()?;

    let stats = session.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Frames: {}", stats.frames_in);
        println!("Packets: {}", packets);
        println!("Tiles: {}", stats.tiles_encoded);
        if stats.dropped_super_frames > 0 {
            println!("Dropped super-frames: {}", stats.dropped_super_frames);
        }
    }

    Ok(())
}

fn decode_file(input: &Path, output: &Path, json: bool, config: &config::Config) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let source = File::open(input).with_context(|| format!("Failed to open {:?}", input))?;
    let mut reader = stream::StreamReader::open(BufReader::new(source), config.io.max_packet_size)
        .with_context(|| format!("Failed to read stream header from {:?}", input))?;

    let mut session = TileDecodeSession::new(RawTileCodec::new(), &config.decoder);
    session.set_geometry(*reader.record())?;

    let sink = File::create(output).with_context(|| format!("Failed to create {:?}", output))?;
    let mut out = BufWriter::new(sink);

    let mut index = 0u64;
    while let Some(packet) = reader.next_packet()? {
        match session.decode_packet(&packet) {
            Ok(frame) => yuv::write_frame(&mut out, &frame)?,
            Err(e) if e.is_stream_fatal() => {
                session.abort();
                return Err(e).context("Decoding failed");
            }
            Err(e) => tracing::error!("Super-frame {} dropped: {}", index, e),
        }
        index += 1;
    }
    session.finish()?;
    out.flush()?;

    let stats = session.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Packets: {}", stats.packets_in);
        println!("Frames: {}", stats.frames_out);
        if stats.dropped_super_frames > 0 {
            println!("Dropped super-frames: {}", stats.dropped_super_frames);
        }
    }

    Ok(())
}

fn inspect_file(file: &Path, json: bool, config: &config::Config) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let source = File::open(file).with_context(|| format!("Failed to open {:?}", file))?;
    let report = inspect::inspect_stream(BufReader::new(source), config.io.max_packet_size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let g = &report.geometry;
    println!("Frame: {}x{}", g.coded_width, g.coded_height);
    println!("Tile: {}x{}", g.tile_width, g.tile_height);
    println!(
        "Grid: {}x{} ({} tiles, canvas {}x{})",
        report.tiles_x,
        report.tiles_y,
        report.tiles_x * report.tiles_y,
        report.canvas_width,
        report.canvas_height
    );
    println!("\nPackets: {}", report.packets.len());
    for packet in &report.packets {
        print!(
            "  [{}] {} bytes, {} tiles, {} pictures",
            packet.index, packet.bytes, packet.header.tile_count, packet.pictures
        );
        if !packet.consistent {
            print!(" [inconsistent]");
        }
        println!();
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let encoder = &config.encoder;
    println!("  Tile size: {}x{}", encoder.tile_width, encoder.tile_height);
    println!("  Rate control: {:?}", encoder.rate_control);
    println!("  Frame rate: {}", encoder.frame_rate);
    println!("  Lifecycle: {:?}", encoder.lifecycle);
    println!(
        "  Timing check: {} (strict: {})",
        encoder.timing_check, encoder.strict_timing
    );
    println!("  Max container size: {} bytes", encoder.container.max_size);

    Ok(())
}
