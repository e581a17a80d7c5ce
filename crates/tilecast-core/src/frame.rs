//! Planar YUV 4:2:0 frames.
//!
//! A [`Frame`] owns three [`PlaneBuffer`]s: full-resolution luma and two
//! chroma planes at `ceil(w/2) x ceil(h/2)`. Each plane has its own row
//! stride, which may be wider than the visible width.

use std::fmt;

use crate::error::{try_alloc_zeroed, Error, Result};

/// Row alignment used by [`Frame::new`].
pub const DEFAULT_ALIGNMENT: usize = 16;

/// One of the three planes of a YUV 4:2:0 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    Y,
    U,
    V,
}

impl Plane {
    /// All planes in storage order.
    pub const ALL: [Plane; 3] = [Plane::Y, Plane::U, Plane::V];

    fn index(self) -> usize {
        match self {
            Plane::Y => 0,
            Plane::U => 1,
            Plane::V => 2,
        }
    }

    /// Horizontal and vertical subsampling shift for this plane.
    pub fn shift(self) -> u32 {
        match self {
            Plane::Y => 0,
            Plane::U | Plane::V => 1,
        }
    }
}

/// A single image plane with a row stride.
#[derive(Clone)]
pub struct PlaneBuffer {
    data: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
}

impl PlaneBuffer {
    fn alloc(width: usize, height: usize, alignment: usize) -> Result<Self> {
        let alignment = alignment.max(1);
        let stride = width.div_ceil(alignment) * alignment;
        let data = try_alloc_zeroed(stride * height)?;
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Visible width in samples.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Visible height in rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Distance in bytes between the starts of two rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Raw storage including stride padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Visible samples of row `y`.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Mutable visible samples of row `y`.
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Sample at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.stride + x]
    }

    /// Overwrite the sample at `(x, y)`.
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.stride + x] = value;
    }

    /// Set every visible sample to `value`.
    pub fn fill(&mut self, value: u8) {
        for y in 0..self.height {
            self.row_mut(y).fill(value);
        }
    }
}

impl fmt::Debug for PlaneBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaneBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish()
    }
}

impl PartialEq for PlaneBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && (0..self.height).all(|y| self.row(y) == other.row(y))
    }
}

impl Eq for PlaneBuffer {}

/// A planar YUV 4:2:0 image.
///
/// Equality compares visible samples only; stride padding is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    planes: [PlaneBuffer; 3],
}

impl Frame {
    /// Allocate a black-initialized (all zero) frame with the default row alignment.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::with_alignment(width, height, DEFAULT_ALIGNMENT)
    }

    /// Allocate a frame whose plane strides are multiples of `alignment`.
    pub fn with_alignment(width: u32, height: u32, alignment: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::geometry(format!(
                "frame dimensions must be positive, got {width}x{height}"
            )));
        }
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = chroma_dimensions(width, height);
        Ok(Self {
            width,
            height,
            planes: [
                PlaneBuffer::alloc(w, h, alignment)?,
                PlaneBuffer::alloc(cw, ch, alignment)?,
                PlaneBuffer::alloc(cw, ch, alignment)?,
            ],
        })
    }

    /// Build a frame from tightly packed I420 bytes (Y, then U, then V).
    pub fn from_i420(width: u32, height: u32, data: &[u8]) -> Result<Self> {
        let expected = i420_len(width, height);
        if data.len() != expected {
            return Err(Error::geometry(format!(
                "I420 buffer for {width}x{height} must be {expected} bytes, got {}",
                data.len()
            )));
        }
        let mut frame = Self::new(width, height)?;
        let mut offset = 0;
        for plane in Plane::ALL {
            let buf = frame.plane_mut(plane);
            for y in 0..buf.height() {
                let w = buf.width();
                buf.row_mut(y).copy_from_slice(&data[offset..offset + w]);
                offset += w;
            }
        }
        Ok(frame)
    }

    /// Append the frame as tightly packed I420 bytes.
    pub fn write_i420(&self, out: &mut Vec<u8>) {
        out.reserve(i420_len(self.width, self.height));
        for plane in Plane::ALL {
            let buf = self.plane(plane);
            for y in 0..buf.height() {
                out.extend_from_slice(buf.row(y));
            }
        }
    }

    /// The frame as tightly packed I420 bytes.
    pub fn to_i420(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_i420(&mut out);
        out
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane(&self, plane: Plane) -> &PlaneBuffer {
        &self.planes[plane.index()]
    }

    pub fn plane_mut(&mut self, plane: Plane) -> &mut PlaneBuffer {
        &mut self.planes[plane.index()]
    }

    /// Fill each plane with a constant value.
    pub fn fill(&mut self, y: u8, u: u8, v: u8) {
        self.plane_mut(Plane::Y).fill(y);
        self.plane_mut(Plane::U).fill(u);
        self.plane_mut(Plane::V).fill(v);
    }
}

/// Chroma plane dimensions for a 4:2:0 frame of the given size.
pub fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
    ((width as usize).div_ceil(2), (height as usize).div_ceil(2))
}

/// Size in bytes of a tightly packed I420 frame.
pub fn i420_len(width: u32, height: u32) -> usize {
    let (cw, ch) = chroma_dimensions(width, height);
    width as usize * height as usize + 2 * cw * ch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroma_rounds_up() {
        assert_eq!(chroma_dimensions(1000, 700), (500, 350));
        assert_eq!(chroma_dimensions(7, 5), (4, 3));
    }

    #[test]
    fn stride_is_aligned() {
        let frame = Frame::with_alignment(100, 10, 64).unwrap();
        let y = frame.plane(Plane::Y);
        assert_eq!(y.width(), 100);
        assert_eq!(y.stride(), 128);
        let u = frame.plane(Plane::U);
        assert_eq!(u.width(), 50);
        assert_eq!(u.stride(), 64);
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(matches!(Frame::new(0, 16), Err(Error::Geometry(_))));
    }

    #[test]
    fn i420_preserves_samples() {
        let len = i420_len(5, 3);
        assert_eq!(len, 15 + 2 * 3 * 2);
        let data: Vec<u8> = (0..len as u32).map(|v| v as u8).collect();
        let frame = Frame::from_i420(5, 3, &data).unwrap();
        assert_eq!(frame.plane(Plane::Y).get(4, 2), 14);
        assert_eq!(frame.plane(Plane::U).get(0, 0), 15);
        assert_eq!(frame.to_i420(), data);
    }

    #[test]
    fn i420_wrong_length() {
        assert!(Frame::from_i420(4, 4, &[0u8; 10]).is_err());
    }

    #[test]
    fn equality_ignores_stride_padding() {
        let mut a = Frame::with_alignment(6, 4, 1).unwrap();
        let mut b = Frame::with_alignment(6, 4, 32).unwrap();
        a.fill(10, 20, 30);
        b.fill(10, 20, 30);
        assert_eq!(a, b);
        b.plane_mut(Plane::V).set(2, 1, 31);
        assert_ne!(a, b);
    }
}
