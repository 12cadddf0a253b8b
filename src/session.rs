//! High-level command vocabulary built on top of the [`CommandEngine`]
//! (§4.6, §4.7): one method per wire operation the driver issues, each
//! either fire-and-forget, ack-only, or ack-then-answer depending on what
//! §4.6 says that function number needs.
//!
//! Grounded on the setter/getter surface of `CameraControl` in
//! `original_source/src/CameraControl.cpp` (`updateStatus`,
//! `initCameraParameters`, `updateSettings`) plus the command catalogue in
//! §3/§6; the numeric payload shapes for the `Set*` commands are this
//! crate's own encoding (no wire-exact layout survived in the retrieved
//! source for those — see `DESIGN.md`).

use std::sync::Arc;

use crate::codec;
use crate::command_engine::CommandEngine;
use crate::error::{CameraError, Result};
use crate::params::{AxisRoi, ParameterCache};
use crate::protocol::answer::{data_type, AcquisitionStatusPayload, AnswerPayload};
use crate::protocol::command::function;
use crate::types::AcquisitionType;

/// Bundles the command engine and the parameter cache it keeps current.
/// Shared by the updater worker, the acquisition driver, and the host-facing
/// [`crate::camera::Camera`] façade (§5: all three read/write through the
/// same serialized engine).
pub struct Session {
    engine: Arc<CommandEngine>,
    cache: Arc<ParameterCache>,
}

impl Session {
    pub fn new(engine: Arc<CommandEngine>, cache: Arc<ParameterCache>) -> Self {
        Self { engine, cache }
    }

    pub fn cache(&self) -> &Arc<ParameterCache> {
        &self.cache
    }

    /// §4.7 initial fill: `GetCameraParameters` then parse the text blob.
    pub fn fetch_camera_parameters(&self) -> Result<()> {
        let answer = self.engine.send_command_wait_answer(
            function::GET_CAMERA_PARAMETERS,
            Vec::new(),
            data_type::CAMERA_PARAMETERS,
        )?;
        match answer.payload {
            AnswerPayload::CameraParameters(blob) => self.cache.apply_camera_parameters(&blob),
            other => Err(wrong_payload("CameraParameters", &other)),
        }
    }

    /// §4.7, §4.8 periodic refresh: `GetStatus` then parse `server.flags`.
    pub fn update_status(&self) -> Result<()> {
        let answer =
            self.engine
                .send_command_wait_answer(function::GET_STATUS, Vec::new(), data_type::STATUS)?;
        match answer.payload {
            AnswerPayload::Status(blob) => self.cache.apply_status(&blob),
            other => Err(wrong_payload("Status", &other)),
        }
    }

    /// §4.7, §4.8 periodic refresh: `GetSettings` structured payload.
    pub fn update_settings(&self) -> Result<()> {
        let answer = self.engine.send_command_wait_answer(
            function::GET_SETTINGS,
            Vec::new(),
            data_type::SETTINGS,
        )?;
        match answer.payload {
            AnswerPayload::Settings(settings) => {
                self.cache.apply_settings(&settings);
                Ok(())
            }
            other => Err(wrong_payload("Settings", &other)),
        }
    }

    pub fn set_exposure_time_ms(&self, exposure_time_ms: u32) -> Result<()> {
        let mut payload = Vec::new();
        codec::write_uint32(&mut payload, exposure_time_ms);
        self.engine.send_command(function::SET_EXPOSURE_TIME, payload)
    }

    pub fn set_acquisition_type(&self, acquisition_type: AcquisitionType) -> Result<()> {
        let mut payload = Vec::new();
        codec::write_int32(&mut payload, acquisition_type.to_wire());
        self.engine.send_command(function::SET_ACQUISITION_TYPE, payload)
    }

    /// §4.9: `StartAcq` always forces single-image acquisition mode.
    pub fn set_single_image_acquisition_mode(&self) -> Result<()> {
        let mut payload = Vec::new();
        codec::write_uint16(&mut payload, 0); // 0 = SingleImage
        self.engine.send_command(function::SET_ACQUISITION_MODE, payload)
    }

    pub fn set_nb_frames(&self, nb_frames: u32) -> Result<()> {
        let mut payload = Vec::new();
        codec::write_uint32(&mut payload, nb_frames);
        self.engine.send_command(function::SET_FORMAT_PARAMETERS, payload)
    }

    pub fn set_roi(&self, serial: AxisRoi, parallel: AxisRoi) -> Result<()> {
        let mut payload = Vec::new();
        codec::write_int32(&mut payload, serial.origin);
        codec::write_int32(&mut payload, serial.length);
        codec::write_int32(&mut payload, serial.binning);
        codec::write_int32(&mut payload, parallel.origin);
        codec::write_int32(&mut payload, parallel.length);
        codec::write_int32(&mut payload, parallel.binning);
        self.engine.send_command(function::SET_ROI, payload)
    }

    pub fn set_cooling_value(&self, cooling_value: i32) -> Result<()> {
        let mut payload = Vec::new();
        codec::write_int32(&mut payload, cooling_value);
        self.engine.send_command(function::SET_COOLING_VALUE, payload)?;
        self.cache.record_cooling_value(cooling_value);
        Ok(())
    }

    pub fn set_readout_speed(&self, readout_speed: u16) -> Result<()> {
        let mut payload = Vec::new();
        codec::write_uint16(&mut payload, readout_speed);
        self.engine.send_command(function::SET_READOUT_SPEED, payload)?;
        self.cache.record_readout_speed(readout_speed);
        Ok(())
    }

    pub fn configure_packets(&self, pixels_per_packet: u32, delay_us: u32) -> Result<()> {
        let mut payload = Vec::new();
        codec::write_uint32(&mut payload, pixels_per_packet);
        codec::write_uint32(&mut payload, delay_us);
        self.engine.send_command(function::CONFIGURE_PACKETS, payload)
    }

    /// §4.9: issue `Acquire`. Acceptance (not completion) is all this call
    /// confirms; the caller polls [`Session::inquire_acquisition_status`].
    pub fn acquire(&self) -> Result<()> {
        self.engine.send_command(function::ACQUIRE, Vec::new())
    }

    /// §4.9 `* --StopAcq→ Idle`.
    pub fn terminate_acquisition(&self) -> Result<()> {
        self.engine.send_command(function::TERMINATE_ACQUISITION, Vec::new())
    }

    /// §4.9 Retrieve state: ack only — the image tiles themselves arrive
    /// out-of-band through the image queue, not as a data answer.
    pub fn retrieve_image(&self) -> Result<()> {
        self.engine.send_command(function::RETRIEVE_IMAGE, Vec::new())
    }

    pub fn inquire_acquisition_status(&self) -> Result<AcquisitionStatusPayload> {
        let answer = self.engine.send_command_wait_answer(
            function::INQUIRE_ACQUISITION_STATUS,
            Vec::new(),
            data_type::ACQUISITION_STATUS,
        )?;
        match answer.payload {
            AnswerPayload::AcquisitionStatus(status) => Ok(status),
            other => Err(wrong_payload("AcquisitionStatus", &other)),
        }
    }
}

fn wrong_payload(expected: &'static str, got: &AnswerPayload) -> CameraError {
    CameraError::state(format!("expected {expected} answer payload, got {got:?}"))
}
