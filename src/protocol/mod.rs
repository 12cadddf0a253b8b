//! Wire packet taxonomy (§3). A generic header selects one of four variants;
//! decoding proceeds in stages exactly as in §4.1: read the generic header,
//! inspect its identifier, then decode the variant-specific body.
//!
//! Grounded on the teacher's versioned-enum dispatch pattern — a top-level
//! sum type whose `decode` matches on a discriminator and delegates to a
//! per-variant module — generalized from per-message-type dispatch on a
//! single byte to per-packet-kind dispatch on `packet_identifier` (and, one
//! level down, `data_type`).

pub mod ack;
pub mod answer;
pub mod command;
pub mod header;
pub mod image;

pub use ack::AckPacket;
pub use answer::{AnswerPacket, AnswerPayload, SettingsPayload};
pub use command::CommandPacket;
pub use header::{GenericHeader, GENERIC_HEADER_SIZE, PACKET_ACK, PACKET_ANSWER, PACKET_COMMAND, PACKET_IMAGE};
pub use image::{FrameAssembler, ImagePacket};

use crate::error::{WireError, WireResult as Result};

/// Group identifier routing key for the demultiplexer (§4.2). Acknowledgement
/// and image packets route to fixed sentinels; data answers route by
/// `data_type`, so the sentinels must fall outside the 2000-2999 data-type
/// range to avoid colliding with a real answer group.
pub type GroupId = u16;

pub const GROUP_ACK: GroupId = 0xFFFE;
pub const GROUP_IMAGE: GroupId = 0xFFFF;

/// A fully decoded wire packet (§3 sum type).
#[derive(Debug, Clone)]
pub enum Packet {
    Command(CommandPacket),
    Ack(AckPacket),
    Answer(AnswerPacket),
    Image(ImagePacket),
}

impl Packet {
    /// The demultiplexer group this packet routes to (§4.2), or `None` if the
    /// packet carries no routable kind (commands are never routed — they are
    /// only ever sent, never received, by this side of the protocol).
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Packet::Command(_) => None,
            Packet::Ack(_) => Some(GROUP_ACK),
            Packet::Answer(a) => Some(answer_group_id(a)),
            Packet::Image(_) => Some(GROUP_IMAGE),
        }
    }

    /// Stage-by-stage decode: generic header, then dispatch on
    /// `packet_identifier` to the matching variant's total read (§4.1).
    pub fn decode(data: &[u8], configured_camera_id: u8) -> Result<Self> {
        let header = GenericHeader::read_specific(data)?;
        header.check_camera_identifier(configured_camera_id)?;
        match header.packet_identifier {
            PACKET_COMMAND => Ok(Packet::Command(CommandPacket::read_total(header, data)?)),
            PACKET_ACK => Ok(Packet::Ack(AckPacket::read_total(header, data)?)),
            PACKET_ANSWER => Ok(Packet::Answer(AnswerPacket::read_total(header, data)?)),
            PACKET_IMAGE => Ok(Packet::Image(ImagePacket::read_total(header, data)?)),
            other => Err(WireError::UnknownPacketIdentifier { got: other }),
        }
    }

    pub fn total_size(&self) -> usize {
        match self {
            Packet::Command(p) => p.total_size(),
            Packet::Ack(p) => p.total_size(),
            Packet::Answer(p) => p.total_size(),
            Packet::Image(p) => p.total_size(),
        }
    }
}

fn answer_group_id(answer: &AnswerPacket) -> GroupId {
    match &answer.payload {
        AnswerPayload::Status(_) => answer::data_type::STATUS,
        AnswerPayload::CameraParameters(_) => answer::data_type::CAMERA_PARAMETERS,
        AnswerPayload::Settings(_) => answer::data_type::SETTINGS,
        AnswerPayload::AcquisitionStatus(_) => answer::data_type::ACQUISITION_STATUS,
        AnswerPayload::CommandDone => answer::data_type::COMMAND_DONE,
        AnswerPayload::GenericString(_) => answer::data_type::GENERIC_STRING,
        AnswerPayload::Unknown { data_type, .. } => *data_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::answer::AcquisitionStatusPayload;

    #[test]
    fn decode_dispatches_by_identifier() {
        let ack = AckPacket { camera_identifier: 1, accepted: 1 };
        let bytes = ack.total_write();
        match Packet::decode(&bytes, 1).unwrap() {
            Packet::Ack(a) => assert!(a.accepted()),
            other => panic!("expected Ack, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_wrong_camera_identifier() {
        let ack = AckPacket { camera_identifier: 9, accepted: 1 };
        let bytes = ack.total_write();
        assert!(Packet::decode(&bytes, 1).is_err());
    }

    #[test]
    fn decode_accepts_server_identifier() {
        let ack = AckPacket { camera_identifier: 0, accepted: 1 };
        let bytes = ack.total_write();
        assert!(Packet::decode(&bytes, 1).is_ok());
    }

    #[test]
    fn group_id_routes_answer_by_data_type() {
        let answer = AnswerPacket {
            camera_identifier: 1,
            error_code: 0,
            payload: AnswerPayload::AcquisitionStatus(AcquisitionStatusPayload { complete: true }),
        };
        let packet = Packet::Answer(answer);
        assert_eq!(packet.group_id(), Some(answer::data_type::ACQUISITION_STATUS));
    }
}
