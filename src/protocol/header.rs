//! The generic packet header shared by every wire packet variant (§3, §6).

use crate::codec;
use crate::error::{WireError, WireResult as Result};

/// Wire value of `packet_identifier` for a command packet.
pub const PACKET_COMMAND: u8 = 1;
/// Wire value of `packet_identifier` for an acknowledgement packet.
pub const PACKET_ACK: u8 = 2;
/// Wire value of `packet_identifier` for a data-answer packet.
pub const PACKET_ANSWER: u8 = 3;
/// Wire value of `packet_identifier` for an image packet.
pub const PACKET_IMAGE: u8 = 4;

/// Size in bytes of the generic header on the wire.
pub const GENERIC_HEADER_SIZE: usize = 6;

/// `{packet_length, packet_identifier, camera_identifier}` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericHeader {
    pub packet_length: u32,
    pub packet_identifier: u8,
    pub camera_identifier: u8,
}

impl GenericHeader {
    /// Specific read: decode only the generic header's own fields.
    pub fn read_specific(data: &[u8]) -> Result<Self> {
        if data.len() < GENERIC_HEADER_SIZE {
            return Err(WireError::payload_too_short("GenericHeader", GENERIC_HEADER_SIZE, data.len()));
        }
        Ok(Self {
            packet_length: codec::read_uint32(data, 0)?,
            packet_identifier: codec::read_uint8(data, 4)?,
            camera_identifier: codec::read_uint8(data, 5)?,
        })
    }

    /// Specific write: encode only the generic header's own fields.
    pub fn write_specific(&self, buf: &mut Vec<u8>) {
        codec::write_uint32(buf, self.packet_length);
        codec::write_uint8(buf, self.packet_identifier);
        codec::write_uint8(buf, self.camera_identifier);
    }

    /// §3 invariant: `camera_identifier` must equal either the configured
    /// camera id or the reserved server value `0`.
    pub fn check_camera_identifier(&self, configured: u8) -> Result<()> {
        if self.camera_identifier == 0 || self.camera_identifier == configured {
            Ok(())
        } else {
            Err(WireError::UnexpectedCameraIdentifier {
                expected: configured,
                got: self.camera_identifier,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let header = GenericHeader {
            packet_length: 42,
            packet_identifier: PACKET_COMMAND,
            camera_identifier: 1,
        };
        let mut buf = Vec::new();
        header.write_specific(&mut buf);
        assert_eq!(buf.len(), GENERIC_HEADER_SIZE);
        let decoded = GenericHeader::read_specific(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn camera_identifier_accepts_server_and_configured() {
        let mut header = GenericHeader { packet_length: 6, packet_identifier: PACKET_ACK, camera_identifier: 0 };
        assert!(header.check_camera_identifier(3).is_ok());
        header.camera_identifier = 3;
        assert!(header.check_camera_identifier(3).is_ok());
        header.camera_identifier = 9;
        assert!(header.check_camera_identifier(3).is_err());
    }
}
