//! Reassembly of decoded tiles into a full frame.

use tilecast_core::{Error, Frame, Plane, Result, TileGrid};

/// Whether a [`BlockCollection`] holds every tile of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    Full,
    NotFull,
}

/// Decoded tiles of one super-frame, indexed by grid position.
#[derive(Debug)]
pub struct BlockCollection {
    grid: TileGrid,
    slots: Vec<Option<Frame>>,
    count: usize,
}

impl BlockCollection {
    pub fn new(grid: TileGrid) -> Self {
        Self {
            grid,
            slots: (0..grid.num_tiles()).map(|_| None).collect(),
            count: 0,
        }
    }

    /// Store a copy of `tile` at row-major `index`.
    ///
    /// A second tile for the same slot replaces the first.
    pub fn add(&mut self, index: usize, tile: &Frame) -> Result<Fill> {
        if index >= self.slots.len() {
            return Err(Error::geometry(format!(
                "tile index {index} outside a grid of {} tiles",
                self.slots.len()
            )));
        }
        if tile.width() != self.grid.tile_width() || tile.height() != self.grid.tile_height() {
            return Err(Error::geometry(format!(
                "decoded tile is {}x{}, expected {}x{}",
                tile.width(),
                tile.height(),
                self.grid.tile_width(),
                self.grid.tile_height()
            )));
        }
        let slot = &mut self.slots[index];
        if slot.is_some() {
            tracing::warn!(index, "duplicate tile replaces earlier one");
        } else {
            self.count += 1;
        }
        *slot = Some(tile.clone());
        Ok(self.fill())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    fn fill(&self) -> Fill {
        if self.is_full() {
            Fill::Full
        } else {
            Fill::NotFull
        }
    }

    /// Take all tiles in row-major order and reset the collection.
    ///
    /// Fails with [`Error::Reconstruction`] if any slot is empty; the
    /// collection is reset in that case too.
    pub fn take(&mut self) -> Result<Vec<Frame>> {
        let collected = std::mem::take(&mut self.count);
        let expected = self.slots.len();
        let tiles: Option<Vec<Frame>> = self.slots.iter_mut().map(Option::take).collect();
        tiles.ok_or(Error::Reconstruction { expected, collected })
    }

    /// Drop all collected tiles.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.count = 0;
    }
}

/// Stitch row-major `tiles` into the padded canvas of `grid`.
pub fn assemble(tiles: &[Frame], grid: &TileGrid) -> Result<Frame> {
    if tiles.len() != grid.num_tiles() {
        return Err(Error::Reconstruction {
            expected: grid.num_tiles(),
            collected: tiles.len(),
        });
    }
    let mut canvas = Frame::new(grid.canvas_width(), grid.canvas_height())?;

    for (index, tile) in tiles.iter().enumerate() {
        let (x0, y0) = grid.origin(index);
        for plane in Plane::ALL {
            let shift = plane.shift();
            let (cx, cy) = ((x0 >> shift) as usize, (y0 >> shift) as usize);
            let src = tile.plane(plane);
            let dst = canvas.plane_mut(plane);
            let w = src.width().min(dst.width() - cx);
            let h = src.height().min(dst.height() - cy);
            for y in 0..h {
                dst.row_mut(cy + y)[cx..cx + w].copy_from_slice(&src.row(y)[..w]);
            }
        }
    }
    Ok(canvas)
}

/// Copy the top-left `width` x `height` region of `frame`.
pub fn crop(frame: &Frame, width: u32, height: u32) -> Result<Frame> {
    if width > frame.width() || height > frame.height() {
        return Err(Error::geometry(format!(
            "cannot crop {}x{} frame to {width}x{height}",
            frame.width(),
            frame.height()
        )));
    }
    if width == frame.width() && height == frame.height() {
        return Ok(frame.clone());
    }
    let mut out = Frame::new(width, height)?;
    for plane in Plane::ALL {
        let src = frame.plane(plane);
        let dst = out.plane_mut(plane);
        let w = dst.width();
        for y in 0..dst.height() {
            dst.row_mut(y).copy_from_slice(&src.row(y)[..w]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        let mut frame = Frame::new(width, height).unwrap();
        frame.fill(value, value.wrapping_add(1), value.wrapping_add(2));
        frame
    }

    #[test]
    fn collection_fills_in_any_order() {
        let grid = TileGrid::new(64, 32, 32, 16).unwrap();
        let mut blocks = BlockCollection::new(grid);
        assert_eq!(blocks.add(3, &solid(32, 16, 3)).unwrap(), Fill::NotFull);
        assert_eq!(blocks.add(0, &solid(32, 16, 0)).unwrap(), Fill::NotFull);
        assert_eq!(blocks.add(3, &solid(32, 16, 9)).unwrap(), Fill::NotFull);
        assert_eq!(blocks.count(), 2);
        blocks.add(1, &solid(32, 16, 1)).unwrap();
        assert_eq!(blocks.add(2, &solid(32, 16, 2)).unwrap(), Fill::Full);

        let tiles = blocks.take().unwrap();
        assert_eq!(tiles[3].plane(Plane::Y).get(0, 0), 9);
        assert_eq!(blocks.count(), 0);
    }

    #[test]
    fn incomplete_take_is_reconstruction_error() {
        let grid = TileGrid::new(64, 32, 32, 16).unwrap();
        let mut blocks = BlockCollection::new(grid);
        blocks.add(0, &solid(32, 16, 0)).unwrap();
        assert_matches!(
            blocks.take(),
            Err(Error::Reconstruction {
                expected: 4,
                collected: 1
            })
        );
        assert_eq!(blocks.count(), 0);
    }

    #[test]
    fn add_rejects_bad_index_and_size() {
        let grid = TileGrid::new(64, 32, 32, 16).unwrap();
        let mut blocks = BlockCollection::new(grid);
        assert_matches!(blocks.add(4, &solid(32, 16, 0)), Err(Error::Geometry(_)));
        assert_matches!(blocks.add(0, &solid(16, 16, 0)), Err(Error::Geometry(_)));
    }

    #[test]
    fn assemble_places_tiles_and_crop_trims() {
        let grid = TileGrid::new(1000, 700, 256, 256).unwrap();
        let tiles: Vec<Frame> = (0..grid.num_tiles())
            .map(|i| solid(256, 256, i as u8 * 10))
            .collect();
        let canvas = assemble(&tiles, &grid).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (1024, 768));
        let y = canvas.plane(Plane::Y);
        assert_eq!(y.get(0, 0), 0);
        assert_eq!(y.get(300, 10), 10);
        assert_eq!(y.get(1023, 767), 110);
        assert_eq!(canvas.plane(Plane::U).get(200, 200), 51);

        let frame = crop(&canvas, 1000, 700).unwrap();
        assert_eq!((frame.width(), frame.height()), (1000, 700));
        assert_eq!(frame.plane(Plane::Y).get(999, 699), 110);
        assert_eq!(frame.plane(Plane::V).width(), 500);
    }

    #[test]
    fn crop_larger_than_frame_fails() {
        let frame = solid(16, 16, 0);
        assert_matches!(crop(&frame, 32, 16), Err(Error::Geometry(_)));
    }
}
