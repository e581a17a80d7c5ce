//! Raw I420 files: tightly packed planar frames back to back.

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use tilecast_core::frame::i420_len;
use tilecast_core::Frame;

pub struct I420Reader<R: Read> {
    reader: R,
    width: u32,
    height: u32,
    buf: Vec<u8>,
    frames: u64,
}

impl<R: Read> I420Reader<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            buf: vec![0; i420_len(width, height)],
            frames: 0,
        }
    }

    /// Read the next frame. Returns `None` at end of input; a partial frame
    /// at the end is an error.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read input frame"),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < self.buf.len() {
            anyhow::bail!(
                "Input ends inside frame {}: got {} of {} bytes",
                self.frames,
                filled,
                self.buf.len()
            );
        }
        self.frames += 1;
        Ok(Some(Frame::from_i420(self.width, self.height, &self.buf)?))
    }

    /// Frames read so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Append `frame` as packed I420.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    writer
        .write_all(&frame.to_i420())
        .context("Failed to write output frame")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_to_back_frames() {
        let mut a = Frame::new(6, 4).unwrap();
        a.fill(1, 2, 3);
        let mut b = Frame::new(6, 4).unwrap();
        b.fill(4, 5, 6);
        let mut bytes = Vec::new();
        write_frame(&mut bytes, &a).unwrap();
        write_frame(&mut bytes, &b).unwrap();
        assert_eq!(bytes.len(), 2 * (24 + 6 + 6));

        let mut reader = I420Reader::new(&bytes[..], 6, 4);
        assert_eq!(reader.read_frame().unwrap(), Some(a));
        assert_eq!(reader.read_frame().unwrap(), Some(b));
        assert_eq!(reader.read_frame().unwrap(), None);
        assert_eq!(reader.frames(), 2);
    }

    #[test]
    fn partial_frame_is_an_error() {
        let bytes = vec![0u8; 40];
        let mut reader = I420Reader::new(&bytes[..], 6, 4);
        assert!(reader.read_frame().unwrap().is_some());
        assert!(reader.read_frame().is_err());
    }
}
