//! Summaries of tile-stream files.

use std::io::Read;

use serde::Serialize;
use tilecast_bitstream::nal::parse_units;
use tilecast_bitstream::{ContainerHeader, NalClass, NalCodec};
use tilecast_core::{GeometryRecord, Result, TileGrid};

use crate::stream::StreamReader;

#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub geometry: GeometryRecord,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub packets: Vec<PacketReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PacketReport {
    pub index: usize,
    pub bytes: usize,
    pub header: ContainerHeader,
    /// Picture units found in the payload.
    pub pictures: usize,
    /// The header agrees with the stream geometry and picture count.
    pub consistent: bool,
}

/// Read a whole stream and summarize every packet.
pub fn inspect_stream<R: Read>(reader: R, max_packet_size: usize) -> Result<StreamReport> {
    let mut stream = StreamReader::open(reader, max_packet_size)?;
    let geometry = *stream.record();
    let grid = TileGrid::from_record(&geometry)?;

    let mut packets = Vec::new();
    let mut index = 0;
    while let Some(packet) = stream.next_packet()? {
        let pictures = parse_units(NalCodec::H264, packet.payload())
            .iter()
            .filter(|u| u.class == NalClass::PictureData)
            .count();
        let header = *packet.header();
        packets.push(PacketReport {
            index,
            bytes: packet.len(),
            header,
            pictures,
            consistent: header.matches(&grid)
                && packet.tile_count() == grid.num_tiles()
                && pictures == grid.num_tiles(),
        });
        index += 1;
    }

    Ok(StreamReport {
        geometry,
        tiles_x: grid.tiles_x(),
        tiles_y: grid.tiles_y(),
        canvas_width: grid.canvas_width(),
        canvas_height: grid.canvas_height(),
        packets,
    })
}
