//! Encode-side merging of tile payloads into container packets.
//!
//! [`MergeBuffer`] is the growable byte buffer behind one packet.
//! [`SuperFrameMerger`] is the keyframe-driven segmenter in front of it: the
//! first keyframe opens a super-frame, every later keyframe closes the
//! current one and opens the next.

use std::collections::VecDeque;
use std::mem;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tilecast_core::{ContainerLimits, EncoderSettings, Error, Result, TileGrid};

use crate::container::{ContainerHeader, ContainerPacket, HEADER_LEN, TILE_COUNT_OFFSET};

/// One compressed tile as produced by the wrapped encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTile {
    /// Annex B payload.
    pub data: Bytes,
    /// The payload starts a new GOP.
    pub keyframe: bool,
    /// Tag passed in with the source tile.
    pub tag: u64,
}

// ---------------------------------------------------------------------------
// MergeBuffer
// ---------------------------------------------------------------------------

/// Growable buffer holding one super-frame behind a fixed header.
///
/// The tile count in the header is a placeholder until [`MergeBuffer::close`].
#[derive(Debug)]
pub struct MergeBuffer {
    buf: Vec<u8>,
    header: ContainerHeader,
    tile_count: u16,
    max_size: usize,
}

impl MergeBuffer {
    /// Allocate a buffer, write the header placeholder, and append the first
    /// payload.
    pub fn open(header: ContainerHeader, first: &[u8], limits: &ContainerLimits) -> Result<Self> {
        let needed = HEADER_LEN + first.len();
        if needed > limits.max_size {
            return Err(Error::Oversize {
                needed,
                max: limits.max_size,
            });
        }
        let capacity = needed.max(limits.min_capacity).min(limits.max_size);
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation { bytes: capacity })?;

        let placeholder = ContainerHeader {
            tile_count: 0,
            ..header
        };
        placeholder.put(&mut buf);

        let mut merge = Self {
            buf,
            header,
            tile_count: 0,
            max_size: limits.max_size,
        };
        merge.append(first)?;
        Ok(merge)
    }

    /// Append one tile payload, doubling capacity as needed.
    pub fn append(&mut self, payload: &[u8]) -> Result<()> {
        if self.tile_count == u16::MAX {
            return Err(Error::invalid_container("tile count exceeds 65535"));
        }
        self.reserve(payload.len())?;
        self.buf.extend_from_slice(payload);
        self.tile_count += 1;
        Ok(())
    }

    fn reserve(&mut self, extra: usize) -> Result<()> {
        let needed = self.buf.len() + extra;
        if needed <= self.buf.capacity() {
            return Ok(());
        }
        if needed > self.max_size {
            return Err(Error::Oversize {
                needed,
                max: self.max_size,
            });
        }
        let mut capacity = self.buf.capacity().max(HEADER_LEN);
        while capacity < needed {
            capacity = capacity.saturating_mul(2);
        }
        let capacity = capacity.min(self.max_size);
        self.buf
            .try_reserve_exact(capacity - self.buf.len())
            .map_err(|_| Error::Allocation { bytes: capacity })?;
        tracing::trace!(capacity, "merge buffer grown");
        Ok(())
    }

    /// Bytes written so far, header included.
    pub fn used(&self) -> usize {
        self.buf.len()
    }

    /// Bytes available before the next growth step.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Tile payloads appended so far.
    pub fn tile_count(&self) -> usize {
        usize::from(self.tile_count)
    }

    /// Patch the final tile count into the header and hand out the packet.
    pub fn close(mut self) -> ContainerPacket {
        self.buf[TILE_COUNT_OFFSET..TILE_COUNT_OFFSET + 2]
            .copy_from_slice(&self.tile_count.to_be_bytes());
        let header = ContainerHeader {
            tile_count: self.tile_count,
            ..self.header
        };
        ContainerPacket::from_parts(header, Bytes::from(self.buf))
    }
}

// ---------------------------------------------------------------------------
// Cadence monitor
// ---------------------------------------------------------------------------

/// Compares the interval between super-frame closures with the frame rate.
#[derive(Debug)]
pub struct CadenceMonitor {
    expected: Duration,
    tolerance: Duration,
    enabled: bool,
    strict: bool,
    last: Option<Instant>,
}

impl CadenceMonitor {
    pub fn new(settings: &EncoderSettings) -> Self {
        let rate_ok = settings.frame_rate.is_finite() && settings.frame_rate > 0.0;
        let expected = if rate_ok {
            Duration::from_secs_f64(1.0 / settings.frame_rate)
        } else {
            Duration::ZERO
        };
        Self {
            expected,
            tolerance: Duration::from_millis(settings.timing_tolerance_ms),
            enabled: settings.timing_check && rate_ok,
            strict: settings.strict_timing,
            last: None,
        }
    }

    /// Record a closure at `now`. A deviation beyond the tolerance is logged
    /// and, in strict mode, returned as [`Error::Timing`].
    pub fn observe(&mut self, now: Instant) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let Some(last) = self.last.replace(now) else {
            return Ok(());
        };
        let actual = now.saturating_duration_since(last);
        let deviation = if actual > self.expected {
            actual - self.expected
        } else {
            self.expected - actual
        };
        if deviation <= self.tolerance {
            return Ok(());
        }

        let expected_ms = self.expected.as_secs_f64() * 1000.0;
        let actual_ms = actual.as_secs_f64() * 1000.0;
        tracing::warn!(expected_ms, actual_ms, "super-frame cadence deviates from frame rate");
        if self.strict {
            return Err(Error::Timing {
                expected_ms,
                actual_ms,
            });
        }
        Ok(())
    }

    /// Forget the previous closure.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ---------------------------------------------------------------------------
// SuperFrameMerger
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum MergeState {
    /// No super-frame open; non-key tiles are dropped.
    WaitingForKeyframe,
    Accumulating(MergeBuffer),
}

/// Counters kept by the merger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub packets: u64,
    pub tiles: u64,
    pub dropped_tiles: u64,
    pub dropped_super_frames: u64,
}

/// Keyframe-driven super-frame segmenter.
///
/// Closed packets are queued and taken with [`SuperFrameMerger::pop_packet`],
/// so an error while opening the next super-frame never loses the previous
/// one.
#[derive(Debug)]
pub struct SuperFrameMerger {
    state: MergeState,
    header: ContainerHeader,
    limits: ContainerLimits,
    expected_tiles: usize,
    cadence: CadenceMonitor,
    ready: VecDeque<ContainerPacket>,
    stats: MergeStats,
}

impl SuperFrameMerger {
    pub fn new(grid: &TileGrid, settings: &EncoderSettings) -> Result<Self> {
        Ok(Self {
            state: MergeState::WaitingForKeyframe,
            header: ContainerHeader::for_grid(grid)?,
            limits: settings.container,
            expected_tiles: grid.num_tiles(),
            cadence: CadenceMonitor::new(settings),
            ready: VecDeque::new(),
            stats: MergeStats::default(),
        })
    }

    /// Feed one encoded tile observed at `now`.
    pub fn push(&mut self, tile: &EncodedTile, now: Instant) -> Result<()> {
        match mem::replace(&mut self.state, MergeState::WaitingForKeyframe) {
            MergeState::WaitingForKeyframe => {
                if !tile.keyframe {
                    self.stats.dropped_tiles += 1;
                    tracing::debug!(tag = tile.tag, "dropping tile outside a super-frame");
                    return Ok(());
                }
                self.open(tile)
            }
            MergeState::Accumulating(mut buffer) => {
                if tile.keyframe && buffer.tile_count() > 0 {
                    let closed = self.close(buffer, now);
                    let opened = self.open(tile);
                    return closed.and(opened);
                }
                match buffer.append(&tile.data) {
                    Ok(()) => {
                        self.stats.tiles += 1;
                        self.state = MergeState::Accumulating(buffer);
                        Ok(())
                    }
                    Err(e) => {
                        self.stats.dropped_super_frames += 1;
                        tracing::warn!(error = %e, "dropping super-frame");
                        Err(e)
                    }
                }
            }
        }
    }

    /// Close any open super-frame (end of stream).
    pub fn flush(&mut self, now: Instant) -> Result<()> {
        match mem::replace(&mut self.state, MergeState::WaitingForKeyframe) {
            MergeState::Accumulating(buffer) if buffer.tile_count() > 0 => self.close(buffer, now),
            _ => Ok(()),
        }
    }

    /// Drop any partially merged super-frame and queued packets.
    pub fn discard(&mut self) {
        if let MergeState::Accumulating(buffer) =
            mem::replace(&mut self.state, MergeState::WaitingForKeyframe)
        {
            tracing::debug!(tiles = buffer.tile_count(), "discarding partial super-frame");
        }
        self.ready.clear();
        self.cadence.reset();
    }

    /// Take the oldest closed packet.
    pub fn pop_packet(&mut self) -> Option<ContainerPacket> {
        self.ready.pop_front()
    }

    /// Tiles merged into the currently open super-frame.
    pub fn pending_tiles(&self) -> usize {
        match &self.state {
            MergeState::WaitingForKeyframe => 0,
            MergeState::Accumulating(buffer) => buffer.tile_count(),
        }
    }

    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, MergeState::Accumulating(_))
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    fn open(&mut self, tile: &EncodedTile) -> Result<()> {
        match MergeBuffer::open(self.header, &tile.data, &self.limits) {
            Ok(buffer) => {
                self.stats.tiles += 1;
                self.state = MergeState::Accumulating(buffer);
                Ok(())
            }
            Err(e) => {
                self.stats.dropped_super_frames += 1;
                tracing::warn!(error = %e, "cannot open super-frame");
                Err(e)
            }
        }
    }

    fn close(&mut self, buffer: MergeBuffer, now: Instant) -> Result<()> {
        let packet = buffer.close();
        if packet.tile_count() != self.expected_tiles {
            tracing::warn!(
                tiles = packet.tile_count(),
                expected = self.expected_tiles,
                "super-frame tile count differs from grid"
            );
        }
        if let Err(e) = self.cadence.observe(now) {
            self.stats.dropped_super_frames += 1;
            return Err(e);
        }
        tracing::debug!(tiles = packet.tile_count(), bytes = packet.len(), "super-frame closed");
        self.stats.packets += 1;
        self.ready.push_back(packet);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn grid() -> TileGrid {
        TileGrid::new(3840, 2160, 1920, 1088).unwrap()
    }

    fn tile(keyframe: bool, tag: u64, len: usize) -> EncodedTile {
        EncodedTile {
            data: Bytes::from(vec![tag as u8; len]),
            keyframe,
            tag,
        }
    }

    fn header() -> ContainerHeader {
        ContainerHeader::for_grid(&grid()).unwrap()
    }

    #[test]
    fn buffer_grows_by_doubling() {
        let limits = ContainerLimits {
            min_capacity: 16,
            max_size: 1 << 20,
        };
        let mut buffer = MergeBuffer::open(header(), &[1; 4], &limits).unwrap();
        assert!(buffer.capacity() >= 16);
        for size in [3usize, 100, 7, 1000, 0, 4096] {
            buffer.append(&vec![2; size]).unwrap();
            assert!(buffer.used() <= buffer.capacity());
        }
        assert_eq!(buffer.tile_count(), 7);
        let packet = buffer.close();
        assert_eq!(packet.tile_count(), 7);
        assert_eq!(&packet.as_bytes()[2..4], &[0, 7]);
        assert_eq!(packet.payload().len(), 4 + 3 + 100 + 7 + 1000 + 4096);
    }

    #[test]
    fn buffer_enforces_hard_maximum() {
        let limits = ContainerLimits {
            min_capacity: 16,
            max_size: 64,
        };
        let mut buffer = MergeBuffer::open(header(), &[0; 20], &limits).unwrap();
        buffer.append(&[0; 30]).unwrap();
        assert_matches!(
            buffer.append(&[0; 10]),
            Err(Error::Oversize { needed: 72, max: 64 })
        );
        assert_matches!(
            MergeBuffer::open(header(), &[0; 60], &limits),
            Err(Error::Oversize { .. })
        );
    }

    #[test]
    fn next_keyframe_closes_super_frame() {
        let mut merger = SuperFrameMerger::new(&grid(), &EncoderSettings::default()).unwrap();
        let now = Instant::now();
        for i in 0..4 {
            merger.push(&tile(i == 0, i, 8), now).unwrap();
        }
        assert!(merger.pop_packet().is_none());
        assert_eq!(merger.pending_tiles(), 4);

        merger.push(&tile(true, 4, 8), now).unwrap();
        let packet = merger.pop_packet().unwrap();
        assert_eq!(packet.tile_count(), 4);
        assert_eq!(packet.header().tile_count, 4);
        assert_eq!(merger.pending_tiles(), 1);
    }

    #[test]
    fn leading_non_key_tiles_are_dropped() {
        let mut merger = SuperFrameMerger::new(&grid(), &EncoderSettings::default()).unwrap();
        let now = Instant::now();
        merger.push(&tile(false, 0, 4), now).unwrap();
        merger.push(&tile(false, 1, 4), now).unwrap();
        assert!(!merger.is_accumulating());
        merger.push(&tile(true, 2, 4), now).unwrap();
        assert!(merger.is_accumulating());
        assert_eq!(merger.stats().dropped_tiles, 2);
    }

    #[test]
    fn flush_emits_partial_tail() {
        let mut merger = SuperFrameMerger::new(&grid(), &EncoderSettings::default()).unwrap();
        let now = Instant::now();
        merger.push(&tile(true, 0, 4), now).unwrap();
        merger.push(&tile(false, 1, 4), now).unwrap();
        merger.flush(now).unwrap();
        assert_eq!(merger.pop_packet().unwrap().tile_count(), 2);
        merger.flush(now).unwrap();
        assert!(merger.pop_packet().is_none());
    }

    #[test]
    fn oversize_drops_super_frame_until_next_keyframe() {
        let settings = EncoderSettings {
            container: ContainerLimits {
                min_capacity: 16,
                max_size: 40,
            },
            ..EncoderSettings::default()
        };
        let mut merger = SuperFrameMerger::new(&grid(), &settings).unwrap();
        let now = Instant::now();
        merger.push(&tile(true, 0, 10), now).unwrap();
        assert_matches!(merger.push(&tile(false, 1, 30), now), Err(Error::Oversize { .. }));
        merger.push(&tile(false, 2, 4), now).unwrap();
        merger.push(&tile(true, 3, 4), now).unwrap();
        merger.flush(now).unwrap();
        assert_eq!(merger.pop_packet().unwrap().tile_count(), 1);
        assert!(merger.pop_packet().is_none());
        assert_eq!(merger.stats().dropped_super_frames, 1);
    }

    #[test]
    fn strict_timing_rejects_late_super_frame() {
        let settings = EncoderSettings {
            frame_rate: 25.0,
            timing_check: true,
            strict_timing: true,
            timing_tolerance_ms: 100,
            ..EncoderSettings::default()
        };
        let mut merger = SuperFrameMerger::new(&grid(), &settings).unwrap();
        let start = Instant::now();
        merger.push(&tile(true, 0, 4), start).unwrap();
        merger.push(&tile(true, 1, 4), start).unwrap();
        merger.push(&tile(true, 2, 4), start + Duration::from_millis(40)).unwrap();
        assert_matches!(
            merger.push(&tile(true, 3, 4), start + Duration::from_millis(540)),
            Err(Error::Timing { .. })
        );
        assert!(merger.pop_packet().is_some());
        assert!(merger.pop_packet().is_some());
        assert!(merger.pop_packet().is_none());
        assert!(merger.is_accumulating());
    }

    #[test]
    fn lenient_timing_only_warns() {
        let settings = EncoderSettings {
            frame_rate: 25.0,
            timing_check: true,
            strict_timing: false,
            ..EncoderSettings::default()
        };
        let mut monitor = CadenceMonitor::new(&settings);
        let start = Instant::now();
        monitor.observe(start).unwrap();
        monitor.observe(start + Duration::from_secs(2)).unwrap();
    }
}
