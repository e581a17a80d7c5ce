//! Decode-side bitstream routing.
//!
//! A container payload is a concatenation of tile payloads. The router walks
//! its NAL units, keeps picture data and the parameter sets needed to parse
//! it, drops all other framing, and hands one re-framed submission per chunk
//! to the tile decoder.

use tilecast_core::{Error, Result};

use crate::nal::{put_unit, scan_annex_b, split_annex_b, NalClass, NalCodec, NalUnit};

/// Split a container payload into chunks holding exactly one picture unit
/// each, together with the units that precede it. Units after the last
/// picture form a trailing chunk without picture data.
pub fn split_access_units(codec: NalCodec, data: &[u8]) -> Vec<&[u8]> {
    let mut chunks = Vec::new();
    let mut chunk_start = None;

    for span in scan_annex_b(data) {
        let start = *chunk_start.get_or_insert(span.start);
        let is_picture = codec
            .nal_type(&data[span.body..span.end])
            .map(|t| codec.classify(t) == NalClass::PictureData)
            .unwrap_or(false);
        if is_picture {
            chunks.push(&data[start..span.end]);
            chunk_start = None;
        }
    }
    if let Some(start) = chunk_start {
        chunks.push(&data[start..]);
    }
    chunks
}

/// One input for the tile decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Re-framed Annex B units.
    pub data: Vec<u8>,
    /// Picture index (within the super-frame) of the first picture unit.
    pub first_index: usize,
    /// Number of picture units in `data`.
    pub pictures: usize,
}

/// Per-super-frame router from merged payload chunks to decoder inputs.
#[derive(Debug)]
pub struct BitstreamRouter {
    codec: NalCodec,
    expected: usize,
    found: usize,
    dropped_units: u64,
    /// Parameter sets seen since the last picture unit.
    pending: Vec<u8>,
}

impl BitstreamRouter {
    /// Router expecting `expected` picture units per super-frame.
    pub fn new(codec: NalCodec, expected: usize) -> Self {
        Self {
            codec,
            expected,
            found: 0,
            dropped_units: 0,
            pending: Vec::new(),
        }
    }

    /// Route one chunk. Returns a submission if the chunk contained picture
    /// data; parameter sets from a chunk without pictures are carried over
    /// to the next submission.
    pub fn route(&mut self, chunk: &[u8]) -> Option<Submission> {
        let first_index = self.found;
        let mut data = std::mem::take(&mut self.pending);
        let mut pictures = 0;
        let mut params_end = data.len();

        for unit in split_annex_b(chunk) {
            let Some(unit) = NalUnit::parse(self.codec, unit) else {
                self.dropped_units += 1;
                continue;
            };
            match unit.class {
                NalClass::PictureData => {
                    put_unit(&mut data, unit.data);
                    pictures += 1;
                    self.found += 1;
                    params_end = data.len();
                }
                NalClass::ParameterSet => {
                    put_unit(&mut data, unit.data);
                }
                NalClass::NonPictureFraming => {
                    self.dropped_units += 1;
                    tracing::trace!(nal_type = unit.nal_type, "dropping framing unit");
                }
            }
        }

        if pictures == 0 {
            self.pending = data;
            return None;
        }
        // Parameter sets after the last picture belong to the next one.
        self.pending = data.split_off(params_end);
        Some(Submission {
            data,
            first_index,
            pictures,
        })
    }

    /// Close the super-frame. Fails unless exactly the expected number of
    /// picture units was routed. The router is reset either way.
    pub fn finish(&mut self) -> Result<usize> {
        let found = std::mem::take(&mut self.found);
        self.pending.clear();
        if found != self.expected {
            return Err(Error::TileCountMismatch {
                expected: self.expected,
                found,
            });
        }
        Ok(found)
    }

    /// Forget any partially routed super-frame.
    pub fn reset(&mut self) {
        self.found = 0;
        self.pending.clear();
    }

    /// Picture units routed in the current super-frame.
    pub fn found(&self) -> usize {
        self.found
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Units discarded since the router was created.
    pub fn dropped_units(&self) -> u64 {
        self.dropped_units
    }
}
