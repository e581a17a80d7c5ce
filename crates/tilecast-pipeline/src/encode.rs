//! Encode session: frame in, container packets out.

use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;
use tilecast_bitstream::{ContainerPacket, EncodedTile, SuperFrameMerger};
use tilecast_core::{
    EncoderSettings, Frame, GeometryRecord, PaddingMode, Result, TileCodecConfig, TileGrid,
};

use crate::codec::{EncoderAdapter, TileEncoderFactory};
use crate::sink::PacketSink;
use crate::tiler::tile_frame;

/// Counters for one encode session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncodeStats {
    pub frames_in: u64,
    pub tiles_encoded: u64,
    pub packets_out: u64,
    pub dropped_tiles: u64,
    pub dropped_super_frames: u64,
    pub codec_instances: u64,
    pub codec_retries: u64,
}

/// Tiles frames, drives the wrapped encoder, and merges its output into
/// one container packet per super-frame.
pub struct TileEncodeSession<F: TileEncoderFactory> {
    grid: TileGrid,
    padding: PaddingMode,
    adapter: EncoderAdapter<F>,
    merger: SuperFrameMerger,
    ready: VecDeque<ContainerPacket>,
    sink: Option<PacketSink>,
    sequence: u64,
    frames_in: u64,
    tiles_encoded: u64,
    packets_out: u64,
}

impl<F: TileEncoderFactory> TileEncodeSession<F> {
    /// Open a session for `width` x `height` input frames.
    pub fn new(factory: F, settings: &EncoderSettings, width: u32, height: u32) -> Result<Self> {
        let grid = TileGrid::new(width, height, settings.tile_width, settings.tile_height)?;
        let merger = SuperFrameMerger::new(&grid, settings)?;
        let config = TileCodecConfig::for_encoder(&grid, settings);
        tracing::info!(
            width,
            height,
            tile_width = grid.tile_width(),
            tile_height = grid.tile_height(),
            tiles = grid.num_tiles(),
            lifecycle = ?settings.lifecycle,
            "encode session opened"
        );
        Ok(Self {
            grid,
            padding: settings.padding,
            adapter: EncoderAdapter::new(factory, config, settings),
            merger,
            ready: VecDeque::new(),
            sink: None,
            sequence: 0,
            frames_in: 0,
            tiles_encoded: 0,
            packets_out: 0,
        })
    }

    /// Capture every emitted packet in `sink`.
    pub fn with_debug_sink(mut self, sink: PacketSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Side-channel record the decoder needs before the first packet.
    pub fn geometry_record(&self) -> GeometryRecord {
        self.grid.record()
    }

    /// Encode one frame.
    ///
    /// Its packet is emitted once the next super-frame starts, or on
    /// [`finish`](Self::finish). A merge error drops the affected
    /// super-frame; the session stays usable unless the error is
    /// stream-scoped.
    pub fn encode_frame(&mut self, frame: &Frame) -> Result<()> {
        let tiles = tile_frame(frame, &self.grid, self.padding)?;
        self.frames_in += 1;

        let base = self.sequence * tiles.len() as u64;
        self.sequence += 1;
        let mut encoded = Vec::with_capacity(tiles.len());
        for (index, tile) in tiles.iter().enumerate() {
            self.adapter.encode(tile, base + index as u64, &mut encoded)?;
        }
        self.adapter.end_super_frame(&mut encoded)?;
        self.merge(&encoded)
    }

    /// Feed every tile to the merger, keeping the GOP aligned even after a
    /// failure, and report the first error.
    fn merge(&mut self, encoded: &[EncodedTile]) -> Result<()> {
        let now = Instant::now();
        let mut first_error = None;
        for tile in encoded {
            self.tiles_encoded += 1;
            tracing::trace!(tag = tile.tag, bytes = tile.data.len(), keyframe = tile.keyframe, "tile encoded");
            if let Err(e) = self.merger.push(tile, now) {
                first_error.get_or_insert(e);
            }
        }
        self.collect()?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn collect(&mut self) -> Result<()> {
        while let Some(packet) = self.merger.pop_packet() {
            if let Some(sink) = self.sink.as_mut() {
                sink.write_packet(&packet)?;
            }
            self.packets_out += 1;
            self.ready.push_back(packet);
        }
        Ok(())
    }

    /// Take the oldest finished packet.
    pub fn pop_packet(&mut self) -> Option<ContainerPacket> {
        self.ready.pop_front()
    }

    /// Take all finished packets.
    pub fn drain_packets(&mut self) -> Vec<ContainerPacket> {
        self.ready.drain(..).collect()
    }

    /// End of stream: flush the encoder and close the last super-frame.
    pub fn finish(&mut self) -> Result<()> {
        let mut encoded = Vec::new();
        self.adapter.flush(&mut encoded)?;
        let merged = self.merge(&encoded);
        let flushed = self.merger.flush(Instant::now());
        self.collect()?;
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
        }
        let stats = self.stats();
        tracing::info!(
            frames = stats.frames_in,
            packets = stats.packets_out,
            dropped = stats.dropped_super_frames,
            "encode session finished"
        );
        merged.and(flushed)
    }

    /// Tear the stream down, discarding any partial super-frame.
    pub fn abort(&mut self) {
        self.merger.discard();
        self.adapter.discard();
        tracing::debug!("encode session aborted");
    }

    pub fn stats(&self) -> EncodeStats {
        let merge = self.merger.stats();
        EncodeStats {
            frames_in: self.frames_in,
            tiles_encoded: self.tiles_encoded,
            packets_out: self.packets_out,
            dropped_tiles: merge.dropped_tiles,
            dropped_super_frames: merge.dropped_super_frames,
            codec_instances: self.adapter.instances_opened(),
            codec_retries: self.adapter.retries(),
        }
    }
}
