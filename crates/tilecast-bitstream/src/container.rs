//! Container packet format.
//!
//! One packet carries one super-frame:
//!
//! ```text
//! offset  size  field
//! 0       2     marker "TC"
//! 2       2     tile count
//! 4       2     frame width
//! 6       2     frame height
//! 8       2     tile width
//! 10      2     tile height
//! 12      ..    tile payloads, row-major, each an Annex B stream
//! ```
//!
//! All fields are big-endian. On byte-stream transports each packet is
//! preceded by its length as a big-endian `u32` (see
//! [`ContainerPacket::write_framed`]).

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, Bytes};
use serde::Serialize;
use tilecast_core::{Error, Result, TileGrid};

/// Packet marker bytes.
pub const MARKER: [u8; 2] = *b"TC";

/// Fixed header length.
pub const HEADER_LEN: usize = 12;

/// Byte offset of the tile count field, patched when a super-frame closes.
pub const TILE_COUNT_OFFSET: usize = 2;

/// Fixed header at the front of every container packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerHeader {
    pub tile_count: u16,
    pub frame_width: u16,
    pub frame_height: u16,
    pub tile_width: u16,
    pub tile_height: u16,
}

impl ContainerHeader {
    /// Header for a super-frame of `grid` with no tiles yet.
    ///
    /// Fails if any dimension or the tile count does not fit its `u16` field.
    pub fn for_grid(grid: &TileGrid) -> Result<Self> {
        let narrow = |name: &str, value: u32| {
            u16::try_from(value)
                .map_err(|_| Error::geometry(format!("{name} {value} does not fit the container header")))
        };
        let tiles = grid.num_tiles();
        if tiles > usize::from(u16::MAX) {
            return Err(Error::geometry(format!(
                "{tiles} tiles per super-frame, the container header holds at most {}",
                u16::MAX
            )));
        }
        Ok(Self {
            tile_count: 0,
            frame_width: narrow("frame width", grid.frame_width())?,
            frame_height: narrow("frame height", grid.frame_height())?,
            tile_width: narrow("tile width", grid.tile_width())?,
            tile_height: narrow("tile height", grid.tile_height())?,
        })
    }

    /// Write the header.
    pub fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&MARKER);
        buf.put_u16(self.tile_count);
        buf.put_u16(self.frame_width);
        buf.put_u16(self.frame_height);
        buf.put_u16(self.tile_width);
        buf.put_u16(self.tile_height);
    }

    /// Parse the header at the front of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::invalid_container(format!(
                "need {HEADER_LEN} header bytes, have {}",
                data.len()
            )));
        }
        let mut cursor = data;
        let mut marker = [0u8; 2];
        cursor.copy_to_slice(&mut marker);
        if marker != MARKER {
            return Err(Error::invalid_container(format!(
                "bad marker {:02x}{:02x}",
                marker[0], marker[1]
            )));
        }
        Ok(Self {
            tile_count: cursor.get_u16(),
            frame_width: cursor.get_u16(),
            frame_height: cursor.get_u16(),
            tile_width: cursor.get_u16(),
            tile_height: cursor.get_u16(),
        })
    }

    /// Whether the header geometry agrees with `grid`.
    pub fn matches(&self, grid: &TileGrid) -> bool {
        u32::from(self.frame_width) == grid.frame_width()
            && u32::from(self.frame_height) == grid.frame_height()
            && u32::from(self.tile_width) == grid.tile_width()
            && u32::from(self.tile_height) == grid.tile_height()
    }
}

/// A complete, self-describing super-frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPacket {
    header: ContainerHeader,
    data: Bytes,
}

impl ContainerPacket {
    /// Wrap already validated bytes. Used by the merge buffer.
    pub(crate) fn from_parts(header: ContainerHeader, data: Bytes) -> Self {
        Self { header, data }
    }

    /// Parse a packet received from transport.
    pub fn parse(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let header = ContainerHeader::parse(&data)?;
        Ok(Self { header, data })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Declared number of tile payloads.
    pub fn tile_count(&self) -> usize {
        usize::from(self.header.tile_count)
    }

    /// Concatenated tile payloads following the header.
    pub fn payload(&self) -> &[u8] {
        &self.data[HEADER_LEN..]
    }

    /// Entire packet including header.
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the packet preceded by its big-endian `u32` length.
    pub fn write_framed<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let len = u32::try_from(self.data.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet exceeds 4 GiB"))?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&self.data)
    }

    /// Read one length-prefixed packet. Returns `None` at a clean end of
    /// input; a truncated packet is an error.
    pub fn read_framed<R: Read + ?Sized>(reader: &mut R, max_size: usize) -> Result<Option<Self>> {
        let mut len_bytes = [0u8; 4];
        let mut filled = 0;
        while filled < len_bytes.len() {
            match reader.read(&mut len_bytes[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(Error::invalid_container(format!(
                        "truncated length prefix, got {filled} of 4 bytes"
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > max_size {
            return Err(Error::Oversize {
                needed: len,
                max: max_size,
            });
        }
        let mut data = tilecast_core::error::try_alloc_zeroed(len)?;
        reader.read_exact(&mut data).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::invalid_container(format!("truncated packet, expected {len} bytes"))
            } else {
                e.into()
            }
        })?;
        Self::parse(data).map(Some)
    }
}
