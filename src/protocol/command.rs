//! Command packets (§3, §6). `function_number` identifies the request kind;
//! the numeric values below are an internally-consistent assignment within
//! the 1000-1999 range mandated by §6 — see `DESIGN.md` for why no externally
//! authoritative values were available to copy.

use crate::codec;
use crate::error::{WireError, WireResult as Result};
use crate::protocol::header::{GenericHeader, GENERIC_HEADER_SIZE, PACKET_COMMAND};

pub mod function {
    pub const GET_STATUS: u16 = 1000;
    pub const GET_CAMERA_PARAMETERS: u16 = 1001;
    pub const GET_SETTINGS: u16 = 1002;
    pub const SET_EXPOSURE_TIME: u16 = 1003;
    pub const SET_ACQUISITION_TYPE: u16 = 1004;
    pub const SET_ACQUISITION_MODE: u16 = 1005;
    pub const SET_FORMAT_PARAMETERS: u16 = 1006;
    pub const SET_ROI: u16 = 1007;
    pub const SET_COOLING_VALUE: u16 = 1008;
    pub const SET_READOUT_SPEED: u16 = 1009;
    pub const CONFIGURE_PACKETS: u16 = 1010;
    pub const ACQUIRE: u16 = 1011;
    pub const TERMINATE_ACQUISITION: u16 = 1012;
    pub const RETRIEVE_IMAGE: u16 = 1013;
    pub const INQUIRE_ACQUISITION_STATUS: u16 = 1014;
    pub const SET_SINGLE_PARAMETER: u16 = 1015;
}

/// Size in bytes of the command sub-header (`function_number`, `specific_data_length`).
pub const COMMAND_HEADER_SIZE: usize = 4;

/// A command packet: generic header + command header + opaque payload (§3).
#[derive(Debug, Clone)]
pub struct CommandPacket {
    pub camera_identifier: u8,
    pub function_number: u16,
    pub payload: Vec<u8>,
}

impl CommandPacket {
    pub fn new(camera_identifier: u8, function_number: u16, payload: Vec<u8>) -> Self {
        Self { camera_identifier, function_number, payload }
    }

    /// Total packet size: generic header + command header + payload.
    pub fn total_size(&self) -> usize {
        GENERIC_HEADER_SIZE + COMMAND_HEADER_SIZE + self.payload.len()
    }

    /// Total write: the full wire encoding, ready to send.
    pub fn total_write(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.total_size());
        let header = GenericHeader {
            packet_length: self.total_size() as u32,
            packet_identifier: PACKET_COMMAND,
            camera_identifier: self.camera_identifier,
        };
        header.write_specific(&mut buf);
        self.write_specific(&mut buf);
        buf
    }

    /// Specific write: command header + payload only (no generic header).
    fn write_specific(&self, buf: &mut Vec<u8>) {
        codec::write_uint16(buf, self.function_number);
        codec::write_uint16(buf, self.payload.len() as u16);
        buf.extend_from_slice(&self.payload);
    }

    /// Total read: decode a command packet from a buffer that already had its
    /// generic header validated by the caller (commands are never received by
    /// this crate in practice — the server is the only command originator's
    /// peer — but decoding is kept symmetric for testability).
    pub fn read_total(header: GenericHeader, data: &[u8]) -> Result<Self> {
        let rest = &data[GENERIC_HEADER_SIZE..];
        if rest.len() < COMMAND_HEADER_SIZE {
            return Err(WireError::payload_too_short("CommandHeader", COMMAND_HEADER_SIZE, rest.len()));
        }
        let function_number = codec::read_uint16(rest, 0)?;
        let specific_data_length = codec::read_uint16(rest, 2)? as usize;
        let payload_start = COMMAND_HEADER_SIZE;
        let payload = codec::read_raw_string(rest, payload_start, specific_data_length)?;
        let expected_total = GENERIC_HEADER_SIZE + COMMAND_HEADER_SIZE + specific_data_length;
        if header.packet_length as usize != expected_total {
            return Err(WireError::unexpected_length("CommandPacket", expected_total, header.packet_length as usize));
        }
        Ok(Self { camera_identifier: header.camera_identifier, function_number, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cmd = CommandPacket::new(1, function::GET_STATUS, vec![]);
        let bytes = cmd.total_write();
        let header = GenericHeader::read_specific(&bytes).unwrap();
        assert_eq!(header.packet_identifier, PACKET_COMMAND);
        let decoded = CommandPacket::read_total(header, &bytes).unwrap();
        assert_eq!(decoded.function_number, function::GET_STATUS);
        assert_eq!(decoded.camera_identifier, 1);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn total_size_matches_header_field() {
        let cmd = CommandPacket::new(2, function::SET_EXPOSURE_TIME, vec![0, 0, 0, 100]);
        let bytes = cmd.total_write();
        let header = GenericHeader::read_specific(&bytes).unwrap();
        assert_eq!(header.packet_length as usize, cmd.total_size());
        assert_eq!(bytes.len(), cmd.total_size());
    }
}
