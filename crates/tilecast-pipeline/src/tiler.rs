//! Cutting a frame into a row-major grid of fixed-size tiles.

use tilecast_core::{Error, Frame, PaddingMode, Plane, PlaneBuffer, Result, TileGrid};

/// Split `frame` into `grid.num_tiles()` tiles in row-major order.
///
/// Tiles that run past the right or bottom edge are filled according to
/// `padding`; the filled region is cropped away after decoding.
pub fn tile_frame(frame: &Frame, grid: &TileGrid, padding: PaddingMode) -> Result<Vec<Frame>> {
    if frame.width() != grid.frame_width() || frame.height() != grid.frame_height() {
        return Err(Error::geometry(format!(
            "frame is {}x{}, stream geometry is {}x{}",
            frame.width(),
            frame.height(),
            grid.frame_width(),
            grid.frame_height()
        )));
    }
    (0..grid.num_tiles())
        .map(|index| extract_tile(frame, grid, index, padding))
        .collect()
}

/// Copy the tile at row-major `index` out of `frame`.
pub fn extract_tile(frame: &Frame, grid: &TileGrid, index: usize, padding: PaddingMode) -> Result<Frame> {
    let (x0, y0) = grid.origin(index);
    let mut tile = Frame::new(grid.tile_width(), grid.tile_height())?;

    for plane in Plane::ALL {
        let shift = plane.shift();
        let src = frame.plane(plane);
        let dst = tile.plane_mut(plane);
        copy_plane_region(
            src,
            dst,
            (x0 >> shift) as usize,
            (y0 >> shift) as usize,
            padding,
        );
    }
    Ok(tile)
}

fn copy_plane_region(src: &PlaneBuffer, dst: &mut PlaneBuffer, x0: usize, y0: usize, padding: PaddingMode) {
    let last_x = src.width() - 1;
    let last_y = src.height() - 1;
    let corner = src.get(last_x, last_y);
    let inside = src.width().saturating_sub(x0).min(dst.width());

    for j in 0..dst.height() {
        let sy = y0 + j;
        let row = dst.row_mut(j);
        match padding {
            PaddingMode::LastPixel if sy > last_y => row.fill(corner),
            PaddingMode::LastPixel => {
                row[..inside].copy_from_slice(&src.row(sy)[x0..x0 + inside]);
                row[inside..].fill(corner);
            }
            PaddingMode::Edge => {
                let src_row = src.row(sy.min(last_y));
                if inside > 0 {
                    row[..inside].copy_from_slice(&src_row[x0..x0 + inside]);
                }
                row[inside..].fill(src_row[last_x]);
            }
        }
    }
}
