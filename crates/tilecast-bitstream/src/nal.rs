//! H.264 / HEVC NAL unit framing.
//!
//! Tile payloads are Annex B byte streams: each unit is prefixed by a 3- or
//! 4-byte start code and opens with a unit-type header. Only the header is
//! interpreted here; slice data stays opaque.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// 4-byte Annex B start code.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Elementary-stream flavour of the wrapped tile codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NalCodec {
    #[default]
    H264,
    Hevc,
}

impl NalCodec {
    /// NAL header length in bytes.
    pub fn header_len(self) -> usize {
        match self {
            NalCodec::H264 => 1,
            NalCodec::Hevc => 2,
        }
    }

    /// Read the unit type from a NAL header. Returns `None` for truncated
    /// headers or a set forbidden_zero_bit.
    pub fn nal_type(self, header: &[u8]) -> Option<u8> {
        if header.len() < self.header_len() || header[0] & 0x80 != 0 {
            return None;
        }
        Some(match self {
            NalCodec::H264 => header[0] & 0x1F,
            NalCodec::Hevc => (header[0] >> 1) & 0x3F,
        })
    }

    /// Routing class of a unit type.
    pub fn classify(self, nal_type: u8) -> NalClass {
        match self {
            NalCodec::H264 => match nal_type {
                h264::SLICE..=h264::IDR => NalClass::PictureData,
                h264::SPS | h264::PPS | h264::SPS_EXT | h264::SUBSET_SPS => NalClass::ParameterSet,
                _ => NalClass::NonPictureFraming,
            },
            NalCodec::Hevc => match nal_type {
                0..=9 | 16..=21 => NalClass::PictureData,
                hevc::VPS..=hevc::PPS => NalClass::ParameterSet,
                _ => NalClass::NonPictureFraming,
            },
        }
    }

    /// Whether a unit type codes a random access (key) picture.
    pub fn is_keyframe_type(self, nal_type: u8) -> bool {
        match self {
            NalCodec::H264 => nal_type == h264::IDR,
            NalCodec::Hevc => (16..=21).contains(&nal_type),
        }
    }
}

/// H.264 unit types used by the tile codecs.
pub mod h264 {
    pub const SLICE: u8 = 1;
    pub const IDR: u8 = 5;
    pub const SEI: u8 = 6;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
    pub const AUD: u8 = 9;
    pub const SPS_EXT: u8 = 13;
    pub const SUBSET_SPS: u8 = 15;

    /// One-byte NAL header.
    pub fn header(nal_ref_idc: u8, nal_type: u8) -> u8 {
        ((nal_ref_idc & 0x03) << 5) | (nal_type & 0x1F)
    }
}

/// HEVC unit types used by the tile codecs.
pub mod hevc {
    pub const IDR_W_RADL: u8 = 19;
    pub const VPS: u8 = 32;
    pub const SPS: u8 = 33;
    pub const PPS: u8 = 34;
    pub const AUD: u8 = 35;
    pub const PREFIX_SEI: u8 = 39;

    /// Two-byte NAL header with layer 0 and temporal id 0.
    pub fn header(nal_type: u8) -> [u8; 2] {
        [(nal_type & 0x3F) << 1, 0x01]
    }
}

/// How the bitstream router treats a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalClass {
    /// Coded slice data; one per tile.
    PictureData,
    /// Parameter sets the tile decoder needs to parse picture data.
    ParameterSet,
    /// Delimiters, SEI, filler, end-of-sequence, and anything unknown.
    NonPictureFraming,
}

/// A NAL unit borrowed from an Annex B stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    /// Unit type from the header.
    pub nal_type: u8,
    /// Routing class of `nal_type`.
    pub class: NalClass,
    /// Unit bytes without start code, header included.
    pub data: &'a [u8],
}

impl<'a> NalUnit<'a> {
    /// Parse the header of a unit. Returns `None` if the header is invalid.
    pub fn parse(codec: NalCodec, data: &'a [u8]) -> Option<Self> {
        let nal_type = codec.nal_type(data)?;
        Some(Self {
            nal_type,
            class: codec.classify(nal_type),
            data,
        })
    }

    /// Bytes after the NAL header (still emulation-prevented).
    pub fn payload(&self, codec: NalCodec) -> &'a [u8] {
        self.data.get(codec.header_len()..).unwrap_or(&[])
    }
}

/// Byte offsets of one unit inside an Annex B stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitSpan {
    /// First byte of the start code.
    pub start: usize,
    /// First byte after the start code (the NAL header).
    pub body: usize,
    /// One past the last byte of the unit.
    pub end: usize,
}

/// Locate every unit of an Annex B byte stream.
///
/// A zero byte directly before `00 00 01` belongs to a 4-byte start code and
/// is not part of the preceding unit. Bytes before the first start code are
/// ignored. Spans may have an empty body.
pub fn scan_annex_b(data: &[u8]) -> Vec<UnitSpan> {
    // (start of start code, start of unit body)
    let mut marks = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let code_start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            marks.push((code_start, i + 3));
            i += 3;
            continue;
        }
        i += 1;
    }

    marks
        .iter()
        .enumerate()
        .map(|(idx, &(start, body))| UnitSpan {
            start,
            body,
            end: marks
                .get(idx + 1)
                .map(|&(next_start, _)| next_start)
                .unwrap_or(data.len()),
        })
        .collect()
}

/// Split an Annex B byte stream into non-empty unit bodies (start codes
/// removed).
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    scan_annex_b(data)
        .into_iter()
        .filter(|span| span.body < span.end)
        .map(|span| &data[span.body..span.end])
        .collect()
}

/// Split and parse an Annex B stream, skipping units with invalid headers.
pub fn parse_units(codec: NalCodec, data: &[u8]) -> Vec<NalUnit<'_>> {
    split_annex_b(data)
        .into_iter()
        .filter_map(|body| NalUnit::parse(codec, body))
        .collect()
}

/// Whether an Annex B stream contains a key picture.
pub fn contains_keyframe(codec: NalCodec, data: &[u8]) -> bool {
    parse_units(codec, data)
        .iter()
        .any(|unit| codec.is_keyframe_type(unit.nal_type))
}

/// Append one unit prefixed with a 4-byte start code.
pub fn put_unit<B: BufMut>(buf: &mut B, unit: &[u8]) {
    buf.put_slice(&START_CODE);
    buf.put_slice(unit);
}

/// Remove emulation prevention bytes (0x03) from a unit payload.
///
/// `00 00 03` is used to keep payload bytes from emulating a start code;
/// this drops the 0x03.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        result.push(byte);
    }

    result
}

/// Insert emulation prevention bytes so that no `00 00 0x` (x <= 3) run
/// appears in the payload.
pub fn add_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() + data.len() / 64 + 1);
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte <= 0x03 {
            result.push(0x03);
            zeros = 0;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        result.push(byte);
    }

    result
}
