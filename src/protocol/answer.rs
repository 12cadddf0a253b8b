//! Data-answer packets (§3, §6). `data_type` selects the payload shape.
//!
//! `GetStatus`/`GetCameraParameters` answers carry a text-keyed blob (parsed
//! by [`crate::params`]); `GetSettings` carries a structured binary payload
//! decoded directly here (§4.7: the two parsing paths are never interchanged).

use crate::codec;
use crate::error::{WireError, WireResult as Result};
use crate::protocol::header::{GenericHeader, GENERIC_HEADER_SIZE, PACKET_ANSWER};
use crate::types::AcquisitionType;

pub mod data_type {
    pub const STATUS: u16 = 2000;
    pub const CAMERA_PARAMETERS: u16 = 2001;
    pub const SETTINGS: u16 = 2002;
    pub const ACQUISITION_STATUS: u16 = 2003;
    pub const COMMAND_DONE: u16 = 2004;
    pub const GENERIC_STRING: u16 = 2005;
}

/// Size in bytes of the answer sub-header (`error_code`, `data_type`, `specific_data_length`).
pub const ANSWER_HEADER_SIZE: usize = 10;

/// Structured payload of a `GetSettings` answer (§4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SettingsPayload {
    pub exposure_time_msec: u32,
    pub nb_images_to_acquire: u32,
    pub serial_origin: i32,
    pub serial_length: i32,
    pub serial_binning: i32,
    pub parallel_origin: i32,
    pub parallel_length: i32,
    pub parallel_binning: i32,
    pub acquisition_type: i32,
}

impl SettingsPayload {
    pub const WIRE_SIZE: usize = 4 * 9;

    fn read(data: &[u8]) -> Result<Self> {
        Ok(Self {
            exposure_time_msec: codec::read_uint32(data, 0)?,
            nb_images_to_acquire: codec::read_uint32(data, 4)?,
            serial_origin: codec::read_int32(data, 8)?,
            serial_length: codec::read_int32(data, 12)?,
            serial_binning: codec::read_int32(data, 16)?,
            parallel_origin: codec::read_int32(data, 20)?,
            parallel_length: codec::read_int32(data, 24)?,
            parallel_binning: codec::read_int32(data, 28)?,
            acquisition_type: codec::read_int32(data, 32)?,
        })
    }

    fn write(&self, buf: &mut Vec<u8>) {
        codec::write_uint32(buf, self.exposure_time_msec);
        codec::write_uint32(buf, self.nb_images_to_acquire);
        codec::write_int32(buf, self.serial_origin);
        codec::write_int32(buf, self.serial_length);
        codec::write_int32(buf, self.serial_binning);
        codec::write_int32(buf, self.parallel_origin);
        codec::write_int32(buf, self.parallel_length);
        codec::write_int32(buf, self.parallel_binning);
        codec::write_int32(buf, self.acquisition_type);
    }

    pub fn acquisition_type(&self) -> Option<AcquisitionType> {
        AcquisitionType::from_wire(self.acquisition_type)
    }
}

/// `InquireAcquisitionStatus` answer payload: whether the exposure/readout cycle has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionStatusPayload {
    pub complete: bool,
}

/// Payload shape selected by `data_type` (§3).
#[derive(Debug, Clone)]
pub enum AnswerPayload {
    /// Raw text blob, `"group.key = value"` lines (§4.7). Parsed by [`crate::params`].
    Status(String),
    CameraParameters(String),
    Settings(SettingsPayload),
    AcquisitionStatus(AcquisitionStatusPayload),
    CommandDone,
    GenericString(String),
    /// A `data_type` this crate does not know how to parse; kept as raw bytes.
    Unknown { data_type: u16, raw: Vec<u8> },
}

/// A data-answer packet: generic header + answer header + typed payload (§3).
#[derive(Debug, Clone)]
pub struct AnswerPacket {
    pub camera_identifier: u8,
    pub error_code: i32,
    pub payload: AnswerPayload,
}

impl AnswerPacket {
    fn data_type(&self) -> u16 {
        match &self.payload {
            AnswerPayload::Status(_) => data_type::STATUS,
            AnswerPayload::CameraParameters(_) => data_type::CAMERA_PARAMETERS,
            AnswerPayload::Settings(_) => data_type::SETTINGS,
            AnswerPayload::AcquisitionStatus(_) => data_type::ACQUISITION_STATUS,
            AnswerPayload::CommandDone => data_type::COMMAND_DONE,
            AnswerPayload::GenericString(_) => data_type::GENERIC_STRING,
            AnswerPayload::Unknown { data_type, .. } => *data_type,
        }
    }

    fn specific_payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            AnswerPayload::Status(s) | AnswerPayload::CameraParameters(s) | AnswerPayload::GenericString(s) => {
                s.as_bytes().to_vec()
            }
            AnswerPayload::Settings(s) => {
                let mut buf = Vec::with_capacity(SettingsPayload::WIRE_SIZE);
                s.write(&mut buf);
                buf
            }
            AnswerPayload::AcquisitionStatus(s) => {
                let mut buf = Vec::new();
                codec::write_uint16(&mut buf, if s.complete { 1 } else { 0 });
                buf
            }
            AnswerPayload::CommandDone => Vec::new(),
            AnswerPayload::Unknown { raw, .. } => raw.clone(),
        }
    }

    pub fn total_size(&self) -> usize {
        GENERIC_HEADER_SIZE + ANSWER_HEADER_SIZE + self.specific_payload_bytes().len()
    }

    pub fn total_write(&self) -> Vec<u8> {
        let specific = self.specific_payload_bytes();
        let mut buf = Vec::with_capacity(GENERIC_HEADER_SIZE + ANSWER_HEADER_SIZE + specific.len());
        let header = GenericHeader {
            packet_length: (GENERIC_HEADER_SIZE + ANSWER_HEADER_SIZE + specific.len()) as u32,
            packet_identifier: PACKET_ANSWER,
            camera_identifier: self.camera_identifier,
        };
        header.write_specific(&mut buf);
        codec::write_int32(&mut buf, self.error_code);
        codec::write_uint16(&mut buf, self.data_type());
        codec::write_int32(&mut buf, specific.len() as i32);
        buf.extend_from_slice(&specific);
        buf
    }

    /// Total read: decode the answer sub-header then dispatch on `data_type`
    /// to decode the variant-specific payload (§4.1 staged decoding).
    pub fn read_total(header: GenericHeader, data: &[u8]) -> Result<Self> {
        let rest = &data[GENERIC_HEADER_SIZE..];
        if rest.len() < ANSWER_HEADER_SIZE {
            return Err(WireError::payload_too_short("AnswerHeader", ANSWER_HEADER_SIZE, rest.len()));
        }
        let error_code = codec::read_int32(rest, 0)?;
        let dtype = codec::read_uint16(rest, 4)?;
        let specific_data_length = codec::read_int32(rest, 6)?.max(0) as usize;
        let body = codec::read_raw_string(rest, ANSWER_HEADER_SIZE, specific_data_length)?;

        let expected_total = GENERIC_HEADER_SIZE + ANSWER_HEADER_SIZE + specific_data_length;
        if header.packet_length as usize != expected_total {
            return Err(WireError::unexpected_length("AnswerPacket", expected_total, header.packet_length as usize));
        }

        let payload = match dtype {
            data_type::STATUS => AnswerPayload::Status(String::from_utf8(body)?),
            data_type::CAMERA_PARAMETERS => AnswerPayload::CameraParameters(String::from_utf8(body)?),
            data_type::SETTINGS => {
                if body.len() < SettingsPayload::WIRE_SIZE {
                    return Err(WireError::payload_too_short("SettingsPayload", SettingsPayload::WIRE_SIZE, body.len())
                        .with_raw(&body));
                }
                AnswerPayload::Settings(SettingsPayload::read(&body)?)
            }
            data_type::ACQUISITION_STATUS => {
                let flag = codec::read_uint16(&body, 0)?;
                AnswerPayload::AcquisitionStatus(AcquisitionStatusPayload { complete: flag != 0 })
            }
            data_type::COMMAND_DONE => AnswerPayload::CommandDone,
            data_type::GENERIC_STRING => AnswerPayload::GenericString(String::from_utf8(body)?),
            other => AnswerPayload::Unknown { data_type: other, raw: body },
        };

        Ok(Self { camera_identifier: header.camera_identifier, error_code, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_status_text() {
        let answer = AnswerPacket {
            camera_identifier: 1,
            error_code: 0,
            payload: AnswerPayload::Status("server.flags = 5\n".to_string()),
        };
        let bytes = answer.total_write();
        let header = GenericHeader::read_specific(&bytes).unwrap();
        let decoded = AnswerPacket::read_total(header, &bytes).unwrap();
        match decoded.payload {
            AnswerPayload::Status(s) => assert_eq!(s, "server.flags = 5\n"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn round_trip_settings() {
        let settings = SettingsPayload {
            exposure_time_msec: 100,
            nb_images_to_acquire: 1,
            serial_origin: 0,
            serial_length: 2048,
            serial_binning: 1,
            parallel_origin: 0,
            parallel_length: 2048,
            parallel_binning: 1,
            acquisition_type: 0,
        };
        let answer = AnswerPacket { camera_identifier: 1, error_code: 0, payload: AnswerPayload::Settings(settings) };
        let bytes = answer.total_write();
        let header = GenericHeader::read_specific(&bytes).unwrap();
        let decoded = AnswerPacket::read_total(header, &bytes).unwrap();
        match decoded.payload {
            AnswerPayload::Settings(s) => assert_eq!(s, settings),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn nonzero_error_code_preserved() {
        let answer = AnswerPacket { camera_identifier: 1, error_code: 7, payload: AnswerPayload::CommandDone };
        let bytes = answer.total_write();
        let header = GenericHeader::read_specific(&bytes).unwrap();
        let decoded = AnswerPacket::read_total(header, &bytes).unwrap();
        assert_eq!(decoded.error_code, 7);
    }
}
