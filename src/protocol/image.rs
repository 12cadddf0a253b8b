//! Image packets (§3, §4.9). Designed from the generic/command/answer header
//! shapes that are present in the source; the image-answer classes themselves
//! were filtered out of the retrieved source as stubs (see `DESIGN.md`), so
//! the tiling fields here are chosen to satisfy §4.9's reassembly rule
//! ("frame ordering is strictly by sequence number... out-of-order tiles...
//! reassembled by offset") rather than copied from source layout.

use crate::codec;
use crate::error::{WireError, WireResult as Result};
use crate::protocol::header::{GenericHeader, GENERIC_HEADER_SIZE, PACKET_IMAGE};

/// Size in bytes of the image sub-header (`image_id`, `offset`, `chunk_length`, `is_last`).
pub const IMAGE_HEADER_SIZE: usize = 13;

/// One tile of a frame's pixel data.
#[derive(Debug, Clone)]
pub struct ImagePacket {
    pub camera_identifier: u8,
    /// Identifies which frame this tile belongs to; shared by every tile of one frame.
    pub image_id: u32,
    /// Byte offset of this tile within the assembled frame buffer.
    pub offset: u32,
    /// True if this is the last tile of the frame.
    pub is_last: bool,
    pub data: Vec<u8>,
}

impl ImagePacket {
    pub fn total_size(&self) -> usize {
        GENERIC_HEADER_SIZE + IMAGE_HEADER_SIZE + self.data.len()
    }

    pub fn total_write(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.total_size());
        let header = GenericHeader {
            packet_length: self.total_size() as u32,
            packet_identifier: PACKET_IMAGE,
            camera_identifier: self.camera_identifier,
        };
        header.write_specific(&mut buf);
        codec::write_uint32(&mut buf, self.image_id);
        codec::write_uint32(&mut buf, self.offset);
        codec::write_uint32(&mut buf, self.data.len() as u32);
        codec::write_uint8(&mut buf, if self.is_last { 1 } else { 0 });
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn read_total(header: GenericHeader, data: &[u8]) -> Result<Self> {
        let rest = &data[GENERIC_HEADER_SIZE..];
        if rest.len() < IMAGE_HEADER_SIZE {
            return Err(WireError::payload_too_short("ImageHeader", IMAGE_HEADER_SIZE, rest.len()));
        }
        let image_id = codec::read_uint32(rest, 0)?;
        let offset = codec::read_uint32(rest, 4)?;
        let chunk_length = codec::read_uint32(rest, 8)? as usize;
        let is_last = codec::read_uint8(rest, 12)? != 0;
        let tile_data = codec::read_raw_string(rest, IMAGE_HEADER_SIZE, chunk_length)?;

        let expected_total = GENERIC_HEADER_SIZE + IMAGE_HEADER_SIZE + chunk_length;
        if header.packet_length as usize != expected_total {
            return Err(WireError::unexpected_length("ImagePacket", expected_total, header.packet_length as usize));
        }

        Ok(Self { camera_identifier: header.camera_identifier, image_id, offset, is_last, data: tile_data })
    }
}

/// Reassembles tiles belonging to one `image_id` into a contiguous frame
/// buffer of `frame_size` bytes, tolerating out-of-order arrival (§4.9).
#[derive(Debug)]
pub struct FrameAssembler {
    image_id: u32,
    frame_size: usize,
    buffer: Vec<u8>,
    filled: Vec<bool>,
    chunk_granularity: usize,
    saw_last: bool,
}

impl FrameAssembler {
    pub fn new(image_id: u32, frame_size: usize, chunk_granularity: usize) -> Self {
        let chunk_granularity = chunk_granularity.max(1);
        let n_chunks = frame_size.div_ceil(chunk_granularity);
        Self {
            image_id,
            frame_size,
            buffer: vec![0u8; frame_size],
            filled: vec![false; n_chunks],
            chunk_granularity,
            saw_last: false,
        }
    }

    /// Absorb one tile. Returns an error if the tile belongs to a different
    /// image or would overflow the frame buffer.
    pub fn absorb(&mut self, tile: &ImagePacket) -> Result<()> {
        if tile.image_id != self.image_id {
            return Err(WireError::MalformedParameterLine(format!(
                "tile for image {} does not match frame {}",
                tile.image_id, self.image_id
            )));
        }
        let start = tile.offset as usize;
        let end = start + tile.data.len();
        if end > self.frame_size {
            return Err(WireError::MalformedParameterLine(format!(
                "tile [{start}, {end}) overflows frame of size {}",
                self.frame_size
            )));
        }
        self.buffer[start..end].copy_from_slice(&tile.data);
        let first_chunk = start / self.chunk_granularity;
        let last_chunk = (end.saturating_sub(1)) / self.chunk_granularity;
        for chunk in &mut self.filled[first_chunk..=last_chunk] {
            *chunk = true;
        }
        if tile.is_last {
            self.saw_last = true;
        }
        Ok(())
    }

    /// Whether every tile has arrived.
    pub fn is_complete(&self) -> bool {
        self.saw_last && self.filled.iter().all(|&f| f)
    }

    /// Consume the assembler, returning the completed frame buffer.
    pub fn into_frame(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let tile = ImagePacket { camera_identifier: 1, image_id: 7, offset: 0, is_last: true, data: vec![1, 2, 3, 4] };
        let bytes = tile.total_write();
        let header = GenericHeader::read_specific(&bytes).unwrap();
        let decoded = ImagePacket::read_total(header, &bytes).unwrap();
        assert_eq!(decoded.image_id, 7);
        assert_eq!(decoded.data, vec![1, 2, 3, 4]);
        assert!(decoded.is_last);
    }

    #[test]
    fn assembles_two_tiles_out_of_order() {
        let mut assembler = FrameAssembler::new(1, 8, 4);
        let second = ImagePacket { camera_identifier: 1, image_id: 1, offset: 4, is_last: true, data: vec![5, 6, 7, 8] };
        let first = ImagePacket { camera_identifier: 1, image_id: 1, offset: 0, is_last: false, data: vec![1, 2, 3, 4] };
        assembler.absorb(&second).unwrap();
        assert!(!assembler.is_complete());
        assembler.absorb(&first).unwrap();
        assert!(assembler.is_complete());
        assert_eq!(assembler.into_frame(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn rejects_tile_from_other_frame() {
        let mut assembler = FrameAssembler::new(1, 8, 4);
        let foreign = ImagePacket { camera_identifier: 1, image_id: 2, offset: 0, is_last: false, data: vec![0; 4] };
        assert!(assembler.absorb(&foreign).is_err());
    }
}
