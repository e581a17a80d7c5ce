//! tilecast-bitstream: elementary-stream framing and container packets.
//!
//! # Modules
//!
//! - `nal` - Annex B splitting, H.264/HEVC unit classification, emulation prevention
//! - `container` - Container packet header and parsing
//! - `merge` - Merge buffer, keyframe-driven super-frame segmentation, cadence checks
//! - `router` - Decode-side routing of picture units to the tile decoder
//!
//! # Architecture
//!
//! On the encode side each compressed tile is fed to a [`SuperFrameMerger`].
//! The first keyframe opens a super-frame; each subsequent keyframe closes it
//! into a [`ContainerPacket`] and opens the next one.
//!
//! On the decode side the packet payload is cut into per-picture chunks with
//! [`router::split_access_units`] and each chunk is passed through a
//! [`BitstreamRouter`], which strips framing units and counts pictures.

pub mod container;
pub mod merge;
pub mod nal;
pub mod router;

pub use container::{ContainerHeader, ContainerPacket};
pub use merge::{EncodedTile, MergeBuffer, MergeStats, SuperFrameMerger};
pub use nal::{NalClass, NalCodec, NalUnit};
pub use router::{BitstreamRouter, Submission};
