//! Optional capture of emitted container packets.

use std::fmt;
use std::io::Write;

use tilecast_bitstream::ContainerPacket;
use tilecast_core::Result;

/// Writes every packet handed to it, length-prefixed, to an injected writer.
///
/// A sink belongs to one session; nothing is shared between streams.
pub struct PacketSink {
    writer: Box<dyn Write + Send>,
    packets: u64,
    bytes: u64,
}

impl PacketSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            packets: 0,
            bytes: 0,
        }
    }

    pub fn write_packet(&mut self, packet: &ContainerPacket) -> Result<()> {
        packet.write_framed(&mut self.writer)?;
        self.packets += 1;
        self.bytes += packet.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Packets written so far.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Packet bytes written so far, length prefixes excluded.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl fmt::Debug for PacketSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketSink")
            .field("packets", &self.packets)
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}
