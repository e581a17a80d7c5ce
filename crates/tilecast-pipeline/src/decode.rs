//! Decode session: container packets in, full frames out.

use serde::Serialize;
use tilecast_bitstream::router::split_access_units;
use tilecast_bitstream::{BitstreamRouter, ContainerHeader, ContainerPacket};
use tilecast_core::{
    DecoderSettings, Error, Frame, GeometryRecord, Lifecycle, Result, TileCodecConfig, TileGrid,
};

use crate::assembler::{assemble, crop, BlockCollection};
use crate::codec::{DecodedTile, DecoderAdapter, TileDecoderFactory};

/// Counters for one decode session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    pub packets_in: u64,
    pub frames_out: u64,
    pub tiles_decoded: u64,
    pub stale_tiles: u64,
    pub dropped_super_frames: u64,
    pub dropped_units: u64,
    pub codec_instances: u64,
    pub codec_retries: u64,
}

/// Per-stream state that exists once the geometry is known.
#[derive(Debug)]
struct StreamGeometry {
    record: GeometryRecord,
    grid: TileGrid,
    router: BitstreamRouter,
    blocks: BlockCollection,
}

/// Splits container packets into tile bitstreams, drives the wrapped
/// decoder, and reassembles its output.
pub struct TileDecodeSession<F: TileDecoderFactory> {
    adapter: DecoderAdapter<F>,
    geometry: Option<StreamGeometry>,
    sequence: u64,
    stats: DecodeStats,
}

impl<F: TileDecoderFactory> TileDecodeSession<F> {
    pub fn new(factory: F, settings: &DecoderSettings) -> Self {
        Self {
            adapter: DecoderAdapter::new(factory, settings),
            geometry: None,
            sequence: 0,
            stats: DecodeStats::default(),
        }
    }

    /// Install the side-channel geometry. Must happen before the first
    /// packet; repeating the same record is harmless, a different one is a
    /// geometry error.
    pub fn set_geometry(&mut self, record: GeometryRecord) -> Result<()> {
        if let Some(current) = &self.geometry {
            if current.record == record {
                return Ok(());
            }
            return Err(Error::geometry(format!(
                "geometry changed mid-stream: {:?} -> {:?}",
                current.record, record
            )));
        }
        let grid = TileGrid::from_record(&record)?;
        // Anything the container header cannot describe is rejected before
        // per-tile state is allocated.
        ContainerHeader::for_grid(&grid)?;
        self.adapter.configure(TileCodecConfig::for_decoder(&grid));
        tracing::info!(
            width = grid.frame_width(),
            height = grid.frame_height(),
            tile_width = grid.tile_width(),
            tile_height = grid.tile_height(),
            tiles = grid.num_tiles(),
            "decode session configured"
        );
        self.geometry = Some(StreamGeometry {
            record,
            router: BitstreamRouter::new(self.adapter.nal_codec(), grid.num_tiles()),
            blocks: BlockCollection::new(grid),
            grid,
        });
        Ok(())
    }

    pub fn grid(&self) -> Option<&TileGrid> {
        self.geometry.as_ref().map(|g| &g.grid)
    }

    /// Decode one super-frame into a display-size frame.
    ///
    /// On failure no frame is produced and all partial state of the
    /// super-frame is discarded.
    pub fn decode_packet(&mut self, packet: &ContainerPacket) -> Result<Frame> {
        self.stats.packets_in += 1;
        let result = self.decode_super_frame(packet);
        if let Some(state) = self.geometry.as_mut() {
            self.stats.dropped_units = state.router.dropped_units();
            if result.is_err() {
                state.router.reset();
                state.blocks.reset();
            }
        }
        match &result {
            Ok(_) => self.stats.frames_out += 1,
            Err(e) => {
                self.stats.dropped_super_frames += 1;
                tracing::warn!(error = %e, "super-frame dropped");
            }
        }
        result
    }

    fn decode_super_frame(&mut self, packet: &ContainerPacket) -> Result<Frame> {
        let state = self
            .geometry
            .as_mut()
            .ok_or_else(|| Error::geometry("container packet received before geometry record"))?;
        if !packet.header().matches(&state.grid) {
            return Err(Error::geometry(format!(
                "container header {:?} disagrees with stream geometry",
                packet.header()
            )));
        }
        let tiles = state.grid.num_tiles();
        if packet.tile_count() != tiles {
            tracing::debug!(declared = packet.tile_count(), expected = tiles, "header tile count differs from grid");
        }

        let sequence = self.sequence;
        self.sequence += 1;
        let base = sequence * tiles as u64;

        let mut decoded = Vec::with_capacity(tiles);
        for chunk in split_access_units(self.adapter.nal_codec(), packet.payload()) {
            let Some(submission) = state.router.route(chunk) else {
                continue;
            };
            if submission.first_index >= tiles {
                tracing::debug!(index = submission.first_index, "ignoring picture beyond the grid");
                continue;
            }
            self.adapter
                .decode(&submission.data, base + submission.first_index as u64, &mut decoded)?;
        }
        let routed = state.router.finish();

        // The null flush drains the decoder even when the super-frame is lost.
        if routed.is_err() || decoded.len() < tiles || self.adapter.lifecycle() == Lifecycle::PerFrame {
            if self.adapter.lifecycle() == Lifecycle::PerFrame {
                self.adapter.end_super_frame(&mut decoded)?;
            } else {
                self.adapter.flush(&mut decoded)?;
            }
        }
        routed?;

        for tile in decoded {
            self.place(tile, sequence)?;
        }
        let Some(state) = self.geometry.as_mut() else {
            return Err(Error::geometry("geometry lost during decode"));
        };
        let tiles = state.blocks.take()?;
        let canvas = assemble(&tiles, &state.grid)?;
        crop(&canvas, state.grid.frame_width(), state.grid.frame_height())
    }

    /// Store a decoded tile at the grid index its tag names.
    fn place(&mut self, tile: DecodedTile, sequence: u64) -> Result<()> {
        let Some(state) = self.geometry.as_mut() else {
            return Err(Error::geometry("decoded tile before geometry record"));
        };
        let tiles = state.grid.num_tiles() as u64;
        if tile.tag / tiles != sequence {
            self.stats.stale_tiles += 1;
            tracing::debug!(tag = tile.tag, sequence, "dropping tile from another super-frame");
            return Ok(());
        }
        self.stats.tiles_decoded += 1;
        state.blocks.add((tile.tag % tiles) as usize, &tile.frame)?;
        Ok(())
    }

    /// End of stream: drain the decoder. Tiles left over are discarded.
    pub fn finish(&mut self) -> Result<()> {
        let mut leftover = Vec::new();
        self.adapter.flush(&mut leftover)?;
        if !leftover.is_empty() {
            tracing::warn!(tiles = leftover.len(), "discarding tiles without a complete super-frame");
        }
        if let Some(state) = self.geometry.as_mut() {
            state.router.reset();
            state.blocks.reset();
        }
        let stats = self.stats();
        tracing::info!(
            packets = stats.packets_in,
            frames = stats.frames_out,
            dropped = stats.dropped_super_frames,
            "decode session finished"
        );
        Ok(())
    }

    /// Tear the stream down, discarding any partial super-frame.
    pub fn abort(&mut self) {
        if let Some(state) = self.geometry.as_mut() {
            state.router.reset();
            state.blocks.reset();
        }
        self.adapter.discard();
        tracing::debug!("decode session aborted");
    }

    pub fn stats(&self) -> DecodeStats {
        DecodeStats {
            codec_instances: self.adapter.instances_opened(),
            codec_retries: self.adapter.retries(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::TileEncodeSession;
    use crate::raw::RawTileCodec;
    use assert_matches::assert_matches;
    use tilecast_core::EncoderSettings;

    fn encode(width: u32, height: u32, frames: &[Frame]) -> (GeometryRecord, Vec<ContainerPacket>) {
        let settings = EncoderSettings {
            tile_width: 16,
            tile_height: 16,
            ..EncoderSettings::default()
        };
        let mut session = TileEncodeSession::new(RawTileCodec::new(), &settings, width, height).unwrap();
        for frame in frames {
            session.encode_frame(frame).unwrap();
        }
        session.finish().unwrap();
        (session.geometry_record(), session.drain_packets())
    }

    #[test]
    fn packet_before_geometry_is_rejected() {
        let (_, packets) = encode(16, 16, &[Frame::new(16, 16).unwrap()]);
        let mut session = TileDecodeSession::new(RawTileCodec::new(), &DecoderSettings::default());
        let err = session.decode_packet(&packets[0]).unwrap_err();
        assert_matches!(err, Error::Geometry(_));
        assert!(err.is_stream_fatal());
    }

    #[test]
    fn geometry_is_immutable() {
        let (record, _) = encode(16, 16, &[]);
        let mut session = TileDecodeSession::new(RawTileCodec::new(), &DecoderSettings::default());
        session.set_geometry(record).unwrap();
        session.set_geometry(record).unwrap();
        let other = GeometryRecord {
            coded_width: 32,
            ..record
        };
        assert_matches!(session.set_geometry(other), Err(Error::Geometry(_)));
    }

    #[test]
    fn geometry_beyond_header_limits_is_rejected() {
        let mut session = TileDecodeSession::new(RawTileCodec::new(), &DecoderSettings::default());
        let huge = GeometryRecord {
            tile_width: 2,
            tile_height: 2,
            coded_width: 4_000_000_000,
            coded_height: 4_000_000_000,
        };
        let err = session.set_geometry(huge).unwrap_err();
        assert_matches!(err, Error::Geometry(_));
        assert!(err.is_stream_fatal());

        let many_tiles = GeometryRecord {
            tile_width: 2,
            tile_height: 2,
            coded_width: 65_534,
            coded_height: 65_534,
        };
        assert_matches!(session.set_geometry(many_tiles), Err(Error::Geometry(_)));
        assert!(session.grid().is_none());

        let (record, _) = encode(16, 16, &[]);
        session.set_geometry(record).unwrap();
    }

    #[test]
    fn mismatched_header_is_geometry_error() {
        let (_, packets) = encode(32, 16, &[Frame::new(32, 16).unwrap()]);
        let (record, _) = encode(16, 16, &[]);
        let mut session = TileDecodeSession::new(RawTileCodec::new(), &DecoderSettings::default());
        session.set_geometry(record).unwrap();
        assert_matches!(session.decode_packet(&packets[0]), Err(Error::Geometry(_)));
    }

    #[test]
    fn decodes_in_order() {
        let mut frames = Vec::new();
        for value in [10u8, 20, 30] {
            let mut frame = Frame::new(40, 24).unwrap();
            frame.fill(value, value + 1, value + 2);
            frames.push(frame);
        }
        let (record, packets) = encode(40, 24, &frames);
        assert_eq!(packets.len(), 3);

        let mut session = TileDecodeSession::new(RawTileCodec::new(), &DecoderSettings::default());
        session.set_geometry(record).unwrap();
        for (packet, source) in packets.iter().zip(&frames) {
            assert_eq!(&session.decode_packet(packet).unwrap(), source);
        }
        session.finish().unwrap();
        let stats = session.stats();
        assert_eq!(stats.frames_out, 3);
        assert_eq!(stats.tiles_decoded, 18);
        // AUD and SEI for every tile.
        assert_eq!(stats.dropped_units, 36);
    }
}
