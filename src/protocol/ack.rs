//! Acknowledgement packets (§3, §6).

use crate::codec;
use crate::error::{WireError, WireResult as Result};
use crate::protocol::header::{GenericHeader, GENERIC_HEADER_SIZE, PACKET_ACK};

pub const ACK_BODY_SIZE: usize = 2;

/// `{accepted: u16}`, non-zero = accepted.
#[derive(Debug, Clone, Copy)]
pub struct AckPacket {
    pub camera_identifier: u8,
    pub accepted: u16,
}

impl AckPacket {
    pub fn accepted(&self) -> bool {
        self.accepted != 0
    }

    pub fn total_size(&self) -> usize {
        GENERIC_HEADER_SIZE + ACK_BODY_SIZE
    }

    pub fn total_write(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.total_size());
        let header = GenericHeader {
            packet_length: self.total_size() as u32,
            packet_identifier: PACKET_ACK,
            camera_identifier: self.camera_identifier,
        };
        header.write_specific(&mut buf);
        codec::write_uint16(&mut buf, self.accepted);
        buf
    }

    pub fn read_total(header: GenericHeader, data: &[u8]) -> Result<Self> {
        let rest = &data[GENERIC_HEADER_SIZE..];
        if rest.len() < ACK_BODY_SIZE {
            return Err(WireError::payload_too_short("AckPacket", ACK_BODY_SIZE, rest.len()));
        }
        let expected_total = GENERIC_HEADER_SIZE + ACK_BODY_SIZE;
        if header.packet_length as usize != expected_total {
            return Err(WireError::unexpected_length("AckPacket", expected_total, header.packet_length as usize));
        }
        Ok(Self {
            camera_identifier: header.camera_identifier,
            accepted: codec::read_uint16(rest, 0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_accepted() {
        let ack = AckPacket { camera_identifier: 1, accepted: 1 };
        let bytes = ack.total_write();
        let header = GenericHeader::read_specific(&bytes).unwrap();
        let decoded = AckPacket::read_total(header, &bytes).unwrap();
        assert!(decoded.accepted());
    }

    #[test]
    fn round_trip_refused() {
        let ack = AckPacket { camera_identifier: 1, accepted: 0 };
        let bytes = ack.total_write();
        let header = GenericHeader::read_specific(&bytes).unwrap();
        let decoded = AckPacket::read_total(header, &bytes).unwrap();
        assert!(!decoded.accepted());
    }
}
