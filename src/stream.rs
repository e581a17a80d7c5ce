//! Tile-stream files.
//!
//! A stream file starts with the 16-byte geometry record, followed by
//! length-prefixed container packets until end of file.

use std::io::{self, Read, Write};

use tilecast_bitstream::ContainerPacket;
use tilecast_core::{Error, GeometryRecord, Result};

/// Writes the geometry record, then packets.
pub struct StreamWriter<W: Write> {
    writer: W,
    packets: u64,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(mut writer: W, record: &GeometryRecord) -> Result<Self> {
        writer.write_all(&record.to_bytes())?;
        Ok(Self { writer, packets: 0 })
    }

    pub fn write_packet(&mut self, packet: &ContainerPacket) -> Result<()> {
        packet.write_framed(&mut self.writer)?;
        self.packets += 1;
        Ok(())
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Reads the geometry record up front, then packets on demand.
#[derive(Debug)]
pub struct StreamReader<R: Read> {
    reader: R,
    record: GeometryRecord,
    max_packet_size: usize,
}

impl<R: Read> StreamReader<R> {
    pub fn open(mut reader: R, max_packet_size: usize) -> Result<Self> {
        let mut raw = [0u8; GeometryRecord::SIZE];
        reader.read_exact(&mut raw).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::invalid_container("stream ends before the geometry record")
            }
            _ => e.into(),
        })?;
        let record = GeometryRecord::from_bytes(&raw)?;
        Ok(Self {
            reader,
            record,
            max_packet_size,
        })
    }

    pub fn record(&self) -> &GeometryRecord {
        &self.record
    }

    /// Next packet, or `None` at end of stream.
    pub fn next_packet(&mut self) -> Result<Option<ContainerPacket>> {
        ContainerPacket::read_framed(&mut self.reader, self.max_packet_size)
    }
}

impl<R: Read> Iterator for StreamReader<R> {
    type Item = Result<ContainerPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}
