//! Lossless reference tile codec.
//!
//! Each tile becomes one H.264-style access unit:
//!
//! ```text
//! AUD, SEI, [SPS, PPS on keyframes], IDR or non-IDR slice
//! ```
//!
//! The slice payload is the raw I420 tile behind a 4-byte size prefix,
//! emulation-prevented and terminated by a stop byte. Nothing is
//! compressed; the codec exists so the tiling machinery can be exercised
//! bit-exactly and so hosts have a working default.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use tilecast_bitstream::nal::{self, h264, put_unit, NalClass};
use tilecast_bitstream::{EncodedTile, NalCodec, NalUnit};
use tilecast_core::{Error, Frame, Result, TileCodecConfig};

use crate::codec::{
    DecodedTile, PushStatus, TileDecoder, TileDecoderFactory, TileEncoder, TileEncoderFactory,
};

const STOP_BYTE: u8 = 0x80;
const SEI_USER_DATA_UNREGISTERED: u8 = 5;
const SEI_UUID: [u8; 16] = *b"tilecast-raw-v1\0";

/// Factory for the raw encoder and decoder.
#[derive(Debug, Clone, Copy)]
pub struct RawTileCodec {
    queue_depth: usize,
    latency: usize,
}

impl Default for RawTileCodec {
    fn default() -> Self {
        Self {
            queue_depth: 2,
            latency: 0,
        }
    }
}

impl RawTileCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Undrained outputs after which pushes are refused with `Retry`.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Encoded packets held back until this many later tiles were pushed
    /// (or the encoder is flushed).
    pub fn with_latency(mut self, frames: usize) -> Self {
        self.latency = frames;
        self
    }
}

impl TileEncoderFactory for RawTileCodec {
    type Encoder = RawTileEncoder;

    fn open_encoder(&self, config: &TileCodecConfig) -> Result<RawTileEncoder> {
        let (width, height) = tile_dims(config)?;
        Ok(RawTileEncoder {
            width,
            height,
            gop: u64::from(config.gop_size.max(1)),
            frame_index: 0,
            held: VecDeque::new(),
            queue_depth: self.queue_depth,
            latency: self.latency,
            draining: false,
        })
    }
}

impl TileDecoderFactory for RawTileCodec {
    type Decoder = RawTileDecoder;

    fn open_decoder(&self, config: &TileCodecConfig) -> Result<RawTileDecoder> {
        let (width, height) = tile_dims(config)?;
        Ok(RawTileDecoder {
            width,
            height,
            ready: VecDeque::new(),
            queue_depth: self.queue_depth,
        })
    }

    fn nal_codec(&self) -> NalCodec {
        NalCodec::H264
    }
}

fn tile_dims(config: &TileCodecConfig) -> Result<(u16, u16)> {
    match (u16::try_from(config.width), u16::try_from(config.height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(Error::codec(
            "open",
            format!("unsupported tile size {}x{}", config.width, config.height),
        )),
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

pub struct RawTileEncoder {
    width: u16,
    height: u16,
    gop: u64,
    frame_index: u64,
    held: VecDeque<EncodedTile>,
    queue_depth: usize,
    latency: usize,
    draining: bool,
}

impl RawTileEncoder {
    fn access_unit(&self, frame: &Frame, keyframe: bool) -> Bytes {
        let mut out = BytesMut::with_capacity(frame_len(frame) + 64);

        let pic_type = if keyframe { 0x10 } else { 0x30 };
        put_unit(&mut out, &[h264::header(0, h264::AUD), pic_type]);

        let mut message = vec![SEI_USER_DATA_UNREGISTERED, 20];
        message.extend_from_slice(&SEI_UUID);
        message.extend_from_slice(&(self.frame_index as u32).to_be_bytes());
        let mut sei = vec![h264::header(0, h264::SEI)];
        sei.extend(nal::add_emulation_prevention(&message));
        sei.push(STOP_BYTE);
        put_unit(&mut out, &sei);

        if keyframe {
            let mut sps = vec![h264::header(3, h264::SPS)];
            sps.extend(nal::add_emulation_prevention(&dims_payload(self.width, self.height)));
            sps.push(STOP_BYTE);
            put_unit(&mut out, &sps);
            put_unit(&mut out, &[h264::header(3, h264::PPS), 0xCE, STOP_BYTE]);
        }

        let mut raw = Vec::with_capacity(frame_len(frame) + 4);
        raw.extend_from_slice(&dims_payload(self.width, self.height));
        frame.write_i420(&mut raw);
        let slice_type = if keyframe { h264::IDR } else { h264::SLICE };
        out.put_slice(&nal::START_CODE);
        out.put_u8(h264::header(3, slice_type));
        out.put_slice(&nal::add_emulation_prevention(&raw));
        out.put_u8(STOP_BYTE);

        out.freeze()
    }
}

impl TileEncoder for RawTileEncoder {
    fn push_frame(&mut self, frame: &Frame, tag: u64) -> Result<PushStatus> {
        if frame.width() != u32::from(self.width) || frame.height() != u32::from(self.height) {
            return Err(Error::codec(
                "push",
                format!(
                    "tile is {}x{}, encoder configured for {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            ));
        }
        if self.draining || self.held.len() >= self.latency + self.queue_depth {
            return Ok(PushStatus::Retry);
        }
        let keyframe = self.frame_index % self.gop == 0;
        let data = self.access_unit(frame, keyframe);
        self.frame_index += 1;
        self.held.push_back(EncodedTile {
            data,
            keyframe,
            tag,
        });
        Ok(PushStatus::Accepted)
    }

    fn push_flush(&mut self) -> Result<PushStatus> {
        self.draining = true;
        self.frame_index = 0;
        Ok(PushStatus::Accepted)
    }

    fn pull_packet(&mut self) -> Result<Option<EncodedTile>> {
        if self.draining || self.held.len() > self.latency {
            let packet = self.held.pop_front();
            if self.held.is_empty() {
                self.draining = false;
            }
            return Ok(packet);
        }
        Ok(None)
    }
}

fn dims_payload(width: u16, height: u16) -> [u8; 4] {
    let [w0, w1] = width.to_be_bytes();
    let [h0, h1] = height.to_be_bytes();
    [w0, w1, h0, h1]
}

fn frame_len(frame: &Frame) -> usize {
    tilecast_core::frame::i420_len(frame.width(), frame.height())
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct RawTileDecoder {
    width: u16,
    height: u16,
    ready: VecDeque<DecodedTile>,
    queue_depth: usize,
}

impl RawTileDecoder {
    fn check_dims(&self, stage: &'static str, payload: &[u8]) -> Result<()> {
        let Some(dims) = payload.get(..4) else {
            return Err(Error::codec(stage, "missing dimensions"));
        };
        let width = u16::from_be_bytes([dims[0], dims[1]]);
        let height = u16::from_be_bytes([dims[2], dims[3]]);
        if (width, height) != (self.width, self.height) {
            return Err(Error::codec(
                stage,
                format!(
                    "stream carries {width}x{height} tiles, decoder configured for {}x{}",
                    self.width, self.height
                ),
            ));
        }
        Ok(())
    }

    fn decode_picture(&self, unit: &NalUnit<'_>) -> Result<Frame> {
        let raw = rbsp(unit);
        self.check_dims("decode", &raw)?;
        let width = u32::from(self.width);
        let height = u32::from(self.height);
        Frame::from_i420(width, height, &raw[4..]).map_err(|e| Error::codec("decode", e.to_string()))
    }
}

/// Unit payload with emulation prevention and stop byte removed.
fn rbsp(unit: &NalUnit<'_>) -> Vec<u8> {
    let mut raw = nal::remove_emulation_prevention(unit.payload(NalCodec::H264));
    if raw.last() == Some(&STOP_BYTE) {
        raw.pop();
    }
    raw
}

impl TileDecoder for RawTileDecoder {
    fn push_packet(&mut self, data: &[u8], tag: u64) -> Result<PushStatus> {
        if self.ready.len() >= self.queue_depth {
            return Ok(PushStatus::Retry);
        }
        let mut next_tag = tag;
        for unit in nal::parse_units(NalCodec::H264, data) {
            match unit.class {
                NalClass::PictureData => {
                    let frame = self.decode_picture(&unit)?;
                    self.ready.push_back(DecodedTile {
                        frame,
                        tag: next_tag,
                    });
                    next_tag += 1;
                }
                NalClass::ParameterSet if unit.nal_type == h264::SPS => {
                    self.check_dims("parameters", &rbsp(&unit))?;
                }
                _ => {}
            }
        }
        Ok(PushStatus::Accepted)
    }

    fn push_flush(&mut self) -> Result<PushStatus> {
        Ok(PushStatus::Accepted)
    }

    fn pull_frame(&mut self) -> Result<Option<DecodedTile>> {
        Ok(self.ready.pop_front())
    }
}
