//! tilecast-pipeline: encode and decode oversized frames through a
//! single-tile codec.
//!
//! # Modules
//!
//! - `tiler` - Cuts a frame into padded tiles
//! - `assembler` - Block collection, canvas assembly, and crop
//! - `codec` - Push/pull codec traits and lifecycle adapters
//! - `raw` - Lossless reference tile codec
//! - `encode` / `decode` - Per-stream sessions tying everything together
//! - `sink` - Optional capture of emitted packets
//!
//! # Example
//!
//! ```
//! use tilecast_core::{DecoderSettings, EncoderSettings, Frame};
//! use tilecast_pipeline::{RawTileCodec, TileDecodeSession, TileEncodeSession};
//!
//! let settings = EncoderSettings { tile_width: 64, tile_height: 64, ..Default::default() };
//! let mut encoder = TileEncodeSession::new(RawTileCodec::new(), &settings, 100, 70)?;
//! let frame = Frame::new(100, 70)?;
//! encoder.encode_frame(&frame)?;
//! encoder.finish()?;
//!
//! let mut decoder = TileDecodeSession::new(RawTileCodec::new(), &DecoderSettings::default());
//! decoder.set_geometry(encoder.geometry_record())?;
//! for packet in encoder.drain_packets() {
//!     assert_eq!(decoder.decode_packet(&packet)?, frame);
//! }
//! # Ok::<(), tilecast_core::Error>(())
//! ```

pub mod assembler;
pub mod codec;
pub mod decode;
pub mod encode;
pub mod raw;
pub mod sink;
pub mod tiler;

pub use assembler::{assemble, crop, BlockCollection, Fill};
pub use codec::{
    DecodedTile, DecoderAdapter, EncoderAdapter, PushStatus, TileDecoder, TileDecoderFactory,
    TileEncoder, TileEncoderFactory,
};
pub use decode::{DecodeStats, TileDecodeSession};
pub use encode::{EncodeStats, TileEncodeSession};
pub use raw::RawTileCodec;
pub use sink::PacketSink;
pub use tiler::tile_frame;
