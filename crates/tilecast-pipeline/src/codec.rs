//! Tile codec adapter.
//!
//! The wrapped single-tile codec is consumed through a push/pull contract:
//! input is pushed and either accepted or refused with [`PushStatus::Retry`]
//! until pending output has been pulled. The adapters own one codec instance,
//! open it lazily with the tile configuration, and apply the configured
//! [`Lifecycle`].

use std::thread;
use std::time::Duration;

use tilecast_bitstream::{EncodedTile, NalCodec};
use tilecast_core::{DecoderSettings, EncoderSettings, Error, Frame, Lifecycle, Result, TileCodecConfig};

/// Outcome of pushing input into a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Accepted,
    /// Input refused until output has been pulled.
    Retry,
}

/// A single-tile encoder instance.
pub trait TileEncoder {
    /// Submit one tile with an opaque tag returned on its packet.
    fn push_frame(&mut self, frame: &Frame, tag: u64) -> Result<PushStatus>;

    /// Signal end of input; all buffered packets become pullable.
    fn push_flush(&mut self) -> Result<PushStatus>;

    /// Take the next finished packet, if any.
    fn pull_packet(&mut self) -> Result<Option<EncodedTile>>;
}

/// Creates [`TileEncoder`] instances.
pub trait TileEncoderFactory {
    type Encoder: TileEncoder;

    fn open_encoder(&self, config: &TileCodecConfig) -> Result<Self::Encoder>;

    /// Whether the codec can use B-frames on single-tile streams without
    /// reordering output across super-frame boundaries.
    fn supports_reordering(&self) -> bool {
        false
    }
}

/// A decoded tile and the tag of the input that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    pub frame: Frame,
    pub tag: u64,
}

/// A single-tile decoder instance.
pub trait TileDecoder {
    /// Submit Annex B units holding one or more pictures.
    fn push_packet(&mut self, data: &[u8], tag: u64) -> Result<PushStatus>;

    /// Signal end of input (the null flush).
    fn push_flush(&mut self) -> Result<PushStatus>;

    fn pull_frame(&mut self) -> Result<Option<DecodedTile>>;
}

/// Creates [`TileDecoder`] instances.
pub trait TileDecoderFactory {
    type Decoder: TileDecoder;

    fn open_decoder(&self, config: &TileCodecConfig) -> Result<Self::Decoder>;

    /// Elementary-stream syntax the decoder consumes.
    fn nal_codec(&self) -> NalCodec;
}

/// Push with bounded retry. `push` is attempted, and on `Retry` `drain` is
/// called; if nothing was drained the loop backs off for a millisecond.
fn push_with_retry<C>(
    codec: &mut C,
    max_retries: u32,
    stage: &'static str,
    mut push: impl FnMut(&mut C) -> Result<PushStatus>,
    mut drain: impl FnMut(&mut C) -> Result<usize>,
) -> Result<u32> {
    let mut retries = 0;
    loop {
        match push(codec)? {
            PushStatus::Accepted => return Ok(retries),
            PushStatus::Retry => {
                retries += 1;
                if retries > max_retries {
                    return Err(Error::codec(
                        stage,
                        format!("input still refused after {max_retries} retries"),
                    ));
                }
                if drain(codec)? == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

fn drain_packets<E: TileEncoder>(encoder: &mut E, out: &mut Vec<EncodedTile>) -> Result<usize> {
    let before = out.len();
    while let Some(packet) = encoder.pull_packet()? {
        out.push(packet);
    }
    Ok(out.len() - before)
}

fn drain_frames<D: TileDecoder>(decoder: &mut D, out: &mut Vec<DecodedTile>) -> Result<usize> {
    let before = out.len();
    while let Some(tile) = decoder.pull_frame()? {
        out.push(tile);
    }
    Ok(out.len() - before)
}

// ---------------------------------------------------------------------------
// Encoder adapter
// ---------------------------------------------------------------------------

/// Owns the wrapped encoder for one stream.
pub struct EncoderAdapter<F: TileEncoderFactory> {
    factory: F,
    config: TileCodecConfig,
    lifecycle: Lifecycle,
    max_retries: u32,
    encoder: Option<F::Encoder>,
    opened: u64,
    retries: u64,
}

impl<F: TileEncoderFactory> EncoderAdapter<F> {
    pub fn new(factory: F, mut config: TileCodecConfig, settings: &EncoderSettings) -> Self {
        if config.max_b_frames > 0 && !factory.supports_reordering() {
            tracing::warn!(
                requested = config.max_b_frames,
                "tile codec cannot reorder, disabling B-frames"
            );
            config.max_b_frames = 0;
        }
        Self {
            factory,
            config,
            lifecycle: settings.lifecycle,
            max_retries: settings.max_push_retries,
            encoder: None,
            opened: 0,
            retries: 0,
        }
    }

    pub fn config(&self) -> &TileCodecConfig {
        &self.config
    }

    fn encoder(&mut self) -> Result<&mut F::Encoder> {
        if self.encoder.is_none() {
            let encoder = self
                .factory
                .open_encoder(&self.config)
                .map_err(|e| open_error("open", e))?;
            tracing::debug!(
                width = self.config.width,
                height = self.config.height,
                gop = self.config.gop_size,
                "tile encoder opened"
            );
            self.opened += 1;
            self.encoder = Some(encoder);
        }
        self.encoder
            .as_mut()
            .ok_or_else(|| Error::codec("open", "encoder unavailable"))
    }

    /// Encode one tile, appending every packet that becomes available.
    pub fn encode(&mut self, tile: &Frame, tag: u64, out: &mut Vec<EncodedTile>) -> Result<()> {
        let max = self.max_retries;
        let encoder = self.encoder()?;
        let retries = push_with_retry(
            encoder,
            max,
            "push",
            |e| e.push_frame(tile, tag),
            |e| drain_packets(e, out),
        )?;
        drain_packets(encoder, out)?;
        self.retries += u64::from(retries);
        Ok(())
    }

    /// Called after the last tile of a super-frame. In per-frame mode the
    /// encoder is flushed and closed.
    pub fn end_super_frame(&mut self, out: &mut Vec<EncodedTile>) -> Result<()> {
        if self.lifecycle == Lifecycle::PerFrame {
            self.flush(out)?;
            self.encoder = None;
        }
        Ok(())
    }

    /// Flush the open encoder and drain all remaining packets.
    pub fn flush(&mut self, out: &mut Vec<EncodedTile>) -> Result<()> {
        let max = self.max_retries;
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        let retries = push_with_retry(
            encoder,
            max,
            "flush",
            |e| e.push_flush(),
            |e| drain_packets(e, out),
        )?;
        drain_packets(encoder, out)?;
        self.retries += u64::from(retries);
        Ok(())
    }

    /// Drop the encoder without draining it.
    pub fn discard(&mut self) {
        self.encoder = None;
    }

    /// Codec instances opened so far.
    pub fn instances_opened(&self) -> u64 {
        self.opened
    }

    /// Push attempts answered with `Retry`.
    pub fn retries(&self) -> u64 {
        self.retries
    }
}

// ---------------------------------------------------------------------------
// Decoder adapter
// ---------------------------------------------------------------------------

/// Owns the wrapped decoder for one stream.
pub struct DecoderAdapter<F: TileDecoderFactory> {
    factory: F,
    config: Option<TileCodecConfig>,
    lifecycle: Lifecycle,
    max_retries: u32,
    decoder: Option<F::Decoder>,
    opened: u64,
    retries: u64,
}

impl<F: TileDecoderFactory> DecoderAdapter<F> {
    pub fn new(factory: F, settings: &DecoderSettings) -> Self {
        Self {
            factory,
            config: None,
            lifecycle: settings.lifecycle,
            max_retries: settings.max_push_retries,
            decoder: None,
            opened: 0,
            retries: 0,
        }
    }

    /// Set the tile configuration derived from the geometry record.
    pub fn configure(&mut self, config: TileCodecConfig) {
        self.config = Some(config);
        self.decoder = None;
    }

    pub fn nal_codec(&self) -> NalCodec {
        self.factory.nal_codec()
    }

    fn decoder(&mut self) -> Result<&mut F::Decoder> {
        if self.decoder.is_none() {
            let config = self
                .config
                .as_ref()
                .ok_or_else(|| Error::geometry("tile decoder used before geometry is known"))?;
            let decoder = self
                .factory
                .open_decoder(config)
                .map_err(|e| open_error("open", e))?;
            tracing::debug!(width = config.width, height = config.height, "tile decoder opened");
            self.opened += 1;
            self.decoder = Some(decoder);
        }
        self.decoder
            .as_mut()
            .ok_or_else(|| Error::codec("open", "decoder unavailable"))
    }

    /// Submit one routed chunk, appending every frame that becomes available.
    pub fn decode(&mut self, data: &[u8], tag: u64, out: &mut Vec<DecodedTile>) -> Result<()> {
        let max = self.max_retries;
        let decoder = self.decoder()?;
        let retries = push_with_retry(
            decoder,
            max,
            "push",
            |d| d.push_packet(data, tag),
            |d| drain_frames(d, out),
        )?;
        drain_frames(decoder, out)?;
        self.retries += u64::from(retries);
        Ok(())
    }

    /// Null flush: drain every frame still held by the decoder.
    pub fn flush(&mut self, out: &mut Vec<DecodedTile>) -> Result<()> {
        let max = self.max_retries;
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };
        let retries = push_with_retry(
            decoder,
            max,
            "flush",
            |d| d.push_flush(),
            |d| drain_frames(d, out),
        )?;
        drain_frames(decoder, out)?;
        self.retries += u64::from(retries);
        Ok(())
    }

    /// Called after a super-frame has been routed. In per-frame mode the
    /// decoder is flushed and closed.
    pub fn end_super_frame(&mut self, out: &mut Vec<DecodedTile>) -> Result<()> {
        if self.lifecycle == Lifecycle::PerFrame {
            self.flush(out)?;
            self.decoder = None;
        }
        Ok(())
    }

    pub fn discard(&mut self) {
        self.decoder = None;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn instances_opened(&self) -> u64 {
        self.opened
    }

    pub fn retries(&self) -> u64 {
        self.retries
    }
}

/// Construction failures are always adapter errors.
fn open_error(stage: &'static str, e: Error) -> Error {
    match e {
        Error::CodecAdapter { .. } => e,
        other => Error::codec(stage, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use tilecast_core::TileGrid;

    /// Refuses every push.
    struct Stubborn;

    impl TileEncoder for Stubborn {
        fn push_frame(&mut self, _: &Frame, _: u64) -> Result<PushStatus> {
            Ok(PushStatus::Retry)
        }
        fn push_flush(&mut self) -> Result<PushStatus> {
            Ok(PushStatus::Accepted)
        }
        fn pull_packet(&mut self) -> Result<Option<EncodedTile>> {
            Ok(None)
        }
    }

    struct StubbornFactory;

    impl TileEncoderFactory for StubbornFactory {
        type Encoder = Stubborn;
        fn open_encoder(&self, _: &TileCodecConfig) -> Result<Stubborn> {
            Ok(Stubborn)
        }
    }

    /// Accepts every other push, emitting one packet per accepted frame.
    #[derive(Default)]
    struct Alternating {
        refuse: bool,
        queued: Vec<u64>,
    }

    impl TileEncoder for Alternating {
        fn push_frame(&mut self, _: &Frame, tag: u64) -> Result<PushStatus> {
            self.refuse = !self.refuse;
            if self.refuse {
                return Ok(PushStatus::Retry);
            }
            self.queued.push(tag);
            Ok(PushStatus::Accepted)
        }
        fn push_flush(&mut self) -> Result<PushStatus> {
            Ok(PushStatus::Accepted)
        }
        fn pull_packet(&mut self) -> Result<Option<EncodedTile>> {
            Ok(self.queued.pop().map(|tag| EncodedTile {
                data: Bytes::new(),
                keyframe: tag == 0,
                tag,
            }))
        }
    }

    struct AlternatingFactory;

    impl TileEncoderFactory for AlternatingFactory {
        type Encoder = Alternating;
        fn open_encoder(&self, _: &TileCodecConfig) -> Result<Alternating> {
            Ok(Alternating::default())
        }
    }

    struct FailingFactory;

    impl TileEncoderFactory for FailingFactory {
        type Encoder = Stubborn;
        fn open_encoder(&self, _: &TileCodecConfig) -> Result<Stubborn> {
            Err(Error::Allocation { bytes: 1 })
        }
    }

    fn config(settings: &EncoderSettings) -> TileCodecConfig {
        let grid = TileGrid::new(64, 64, 32, 32).unwrap();
        TileCodecConfig::for_encoder(&grid, settings)
    }

    #[test]
    fn retry_is_bounded() {
        let settings = EncoderSettings {
            max_push_retries: 3,
            ..EncoderSettings::default()
        };
        let mut adapter = EncoderAdapter::new(StubbornFactory, config(&settings), &settings);
        let tile = Frame::new(32, 32).unwrap();
        let mut out = Vec::new();
        assert_matches!(
            adapter.encode(&tile, 0, &mut out),
            Err(Error::CodecAdapter { stage: "push", .. })
        );
    }

    #[test]
    fn retry_then_accept() {
        let settings = EncoderSettings::default();
        let mut adapter = EncoderAdapter::new(AlternatingFactory, config(&settings), &settings);
        let tile = Frame::new(32, 32).unwrap();
        let mut out = Vec::new();
        for tag in 0..4 {
            adapter.encode(&tile, tag, &mut out).unwrap();
        }
        let tags: Vec<u64> = out.iter().map(|t| t.tag).collect();
        assert_eq!(tags, vec![0, 1, 2, 3]);
        assert_eq!(adapter.retries(), 4);
    }

    #[test]
    fn b_frames_disabled_without_reordering() {
        let settings = EncoderSettings {
            max_b_frames: 2,
            ..EncoderSettings::default()
        };
        let adapter = EncoderAdapter::new(AlternatingFactory, config(&settings), &settings);
        assert_eq!(adapter.config().max_b_frames, 0);
        assert_eq!(adapter.config().gop_size, 4);
    }

    #[test]
    fn per_frame_lifecycle_reopens() {
        let settings = EncoderSettings {
            lifecycle: Lifecycle::PerFrame,
            ..EncoderSettings::default()
        };
        let mut adapter = EncoderAdapter::new(AlternatingFactory, config(&settings), &settings);
        let tile = Frame::new(32, 32).unwrap();
        let mut out = Vec::new();
        for _ in 0..3 {
            adapter.encode(&tile, 0, &mut out).unwrap();
            adapter.end_super_frame(&mut out).unwrap();
        }
        assert_eq!(adapter.instances_opened(), 3);
    }

    #[test]
    fn open_failure_is_adapter_error() {
        let settings = EncoderSettings::default();
        let mut adapter = EncoderAdapter::new(FailingFactory, config(&settings), &settings);
        let tile = Frame::new(32, 32).unwrap();
        let err = adapter.encode(&tile, 0, &mut Vec::new()).unwrap_err();
        assert_matches!(err, Error::CodecAdapter { stage: "open", .. });
        assert!(err.is_stream_fatal());
    }
}
