//! Tile grid arithmetic and the geometry side-channel record.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Row-major grid of fixed-size tiles covering a frame.
///
/// The grid is derived from the frame and tile dimensions and never stored
/// on the wire; both sides recompute it from the [`GeometryRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    frame_width: u32,
    frame_height: u32,
    tile_width: u32,
    tile_height: u32,
    tiles_x: u32,
    tiles_y: u32,
}

impl TileGrid {
    /// Compute the grid for a frame. Tile dimensions must be positive and
    /// even so that chroma tile origins stay on whole samples.
    pub fn new(frame_width: u32, frame_height: u32, tile_width: u32, tile_height: u32) -> Result<Self> {
        if frame_width == 0 || frame_height == 0 {
            return Err(Error::geometry(format!(
                "frame dimensions must be positive, got {frame_width}x{frame_height}"
            )));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(Error::geometry(format!(
                "tile dimensions must be positive, got {tile_width}x{tile_height}"
            )));
        }
        if tile_width % 2 != 0 || tile_height % 2 != 0 {
            return Err(Error::geometry(format!(
                "tile dimensions must be even for 4:2:0, got {tile_width}x{tile_height}"
            )));
        }
        Ok(Self {
            frame_width,
            frame_height,
            tile_width,
            tile_height,
            tiles_x: frame_width.div_ceil(tile_width),
            tiles_y: frame_height.div_ceil(tile_height),
        })
    }

    /// Grid described by a side-channel record.
    pub fn from_record(record: &GeometryRecord) -> Result<Self> {
        Self::new(
            record.coded_width,
            record.coded_height,
            record.tile_width,
            record.tile_height,
        )
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    /// Tiles per row.
    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    /// Tiles per column.
    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    /// Total number of tiles per super-frame.
    pub fn num_tiles(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    /// Width of the padded, tile-aligned canvas.
    pub fn canvas_width(&self) -> u32 {
        self.tiles_x * self.tile_width
    }

    /// Height of the padded, tile-aligned canvas.
    pub fn canvas_height(&self) -> u32 {
        self.tiles_y * self.tile_height
    }

    /// Grid position `(tx, ty)` of the tile at row-major `index`.
    pub fn position(&self, index: usize) -> (u32, u32) {
        let tx = (index % self.tiles_x as usize) as u32;
        let ty = (index / self.tiles_x as usize) as u32;
        (tx, ty)
    }

    /// Top-left luma sample of the tile at row-major `index`.
    pub fn origin(&self, index: usize) -> (u32, u32) {
        let (tx, ty) = self.position(index);
        (tx * self.tile_width, ty * self.tile_height)
    }

    /// Row-major index of the tile at `(tx, ty)`.
    pub fn index_of(&self, tx: u32, ty: u32) -> usize {
        ty as usize * self.tiles_x as usize + tx as usize
    }

    /// The side-channel record describing this grid.
    pub fn record(&self) -> GeometryRecord {
        GeometryRecord {
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            coded_width: self.frame_width,
            coded_height: self.frame_height,
        }
    }
}

/// Out-of-band geometry carried on the first transport unit of a stream.
///
/// `coded_width` x `coded_height` is the source frame size the decoder crops
/// back to; the padded canvas size follows from the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryRecord {
    pub tile_width: u32,
    pub tile_height: u32,
    pub coded_width: u32,
    pub coded_height: u32,
}

impl GeometryRecord {
    /// Encoded size in bytes.
    pub const SIZE: usize = 16;

    /// Serialize as four big-endian `u32` fields.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.tile_width.to_be_bytes());
        out[4..8].copy_from_slice(&self.tile_height.to_be_bytes());
        out[8..12].copy_from_slice(&self.coded_width.to_be_bytes());
        out[12..16].copy_from_slice(&self.coded_height.to_be_bytes());
        out
    }

    /// Parse a record, rejecting short input and zero fields.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::invalid_container(format!(
                "geometry record needs {} bytes, have {}",
                Self::SIZE,
                data.len()
            )));
        }
        let field = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let record = Self {
            tile_width: field(0),
            tile_height: field(4),
            coded_width: field(8),
            coded_height: field(12),
        };
        if record.tile_width == 0
            || record.tile_height == 0
            || record.coded_width == 0
            || record.coded_height == 0
        {
            return Err(Error::geometry(format!(
                "geometry record has zero field: {record:?}"
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uhd_in_four_tiles() {
        let grid = TileGrid::new(3840, 2160, 1920, 1088).unwrap();
        assert_eq!(grid.tiles_x(), 2);
        assert_eq!(grid.tiles_y(), 2);
        assert_eq!(grid.num_tiles(), 4);
        assert_eq!(grid.canvas_height(), 2176);
    }

    #[test]
    fn non_aligned_grid() {
        let grid = TileGrid::new(1000, 700, 256, 256).unwrap();
        assert_eq!((grid.tiles_x(), grid.tiles_y()), (4, 3));
        assert_eq!((grid.canvas_width(), grid.canvas_height()), (1024, 768));
        assert_eq!(grid.origin(5), (256, 256));
        assert_eq!(grid.index_of(3, 2), 11);
        assert_eq!(grid.position(11), (3, 2));
    }

    #[test]
    fn tile_count_formula() {
        for (w, h, tw, th) in [(1, 1, 2, 2), (17, 9, 4, 2), (640, 480, 640, 480), (641, 481, 64, 32)] {
            let grid = TileGrid::new(w, h, tw, th).unwrap();
            let expected = w.div_ceil(tw) as usize * h.div_ceil(th) as usize;
            assert_eq!(grid.num_tiles(), expected);
        }
    }

    #[test]
    fn odd_tile_rejected() {
        assert!(matches!(
            TileGrid::new(100, 100, 33, 32),
            Err(Error::Geometry(_))
        ));
        assert!(TileGrid::new(100, 100, 0, 32).is_err());
    }

    #[test]
    fn record_wire_layout() {
        let record = TileGrid::new(1000, 700, 256, 128).unwrap().record();
        let bytes = record.to_bytes();
        assert_eq!(&bytes[0..4], &[0, 0, 1, 0]);
        assert_eq!(&bytes[8..12], &1000u32.to_be_bytes());
        assert_eq!(GeometryRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn record_rejects_short_and_zero() {
        assert!(matches!(
            GeometryRecord::from_bytes(&[0u8; 8]),
            Err(Error::InvalidContainer(_))
        ));
        assert!(matches!(
            GeometryRecord::from_bytes(&[0u8; 16]),
            Err(Error::Geometry(_))
        ));
    }
}
