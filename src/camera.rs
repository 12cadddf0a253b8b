//! Host-facing façade (§1, §6, §9 singletons: "implement as an owned
//! instance... workers receive non-owning lifetime-bounded references").
//!
//! [`Camera`] is constructed once per camera server by the host, owns the
//! connection and the three worker threads, and exposes the exposure/ROI/
//! trigger/acquisition vocabulary §6 describes as ordinary methods. Workers
//! are created in a fixed order on [`Camera::connect`] (receiver, updater,
//! acquisition driver) and torn down in reverse order by [`Camera::disconnect`]
//! — grounded on `CameraControl::init`/`release` in
//! `original_source/src/CameraControl.cpp`, which brings up and tears down
//! its three threads in exactly that order around the socket's lifetime.

use std::sync::{Arc, Mutex};

use crate::acquisition::{AcqState, AcquisitionDriver, AcquisitionParams, FrameSink};
use crate::command_engine::CommandEngine;
use crate::config::CameraConfig;
use crate::conn::Connection;
use crate::demux::Demultiplexer;
use crate::error::{CameraError, Result};
use crate::event::EventReporter;
use crate::params::{AxisRoi, CameraParameters, ParameterCache};
use crate::receiver::ReceiverWorker;
use crate::session::Session;
use crate::types::{DetectorStatus, TriggerMode};
use crate::updater::UpdaterWorker;

/// Everything that only exists while connected. Torn down, in this field
/// order's reverse, by [`Camera::disconnect`].
struct Connected {
    session: Arc<Session>,
    acquisition: AcquisitionDriver,
    updater: Arc<UpdaterWorker>,
    receiver: ReceiverWorker,
}

/// Acquisition parameters the host has configured for the *next*
/// `StartAcq`, applied when [`Camera::start_acquisition`] is called (§9 open
/// question: latency is a per-acquisition runtime parameter, not static
/// configuration — a host may legitimately want a different latency between
/// one run and the next without reconnecting).
struct PendingAcquisition {
    nb_frames: u32,
    trigger_mode: TriggerMode,
    latency_ms: u64,
}

impl Default for PendingAcquisition {
    fn default() -> Self {
        Self { nb_frames: 1, trigger_mode: TriggerMode::InternalTrigger, latency_ms: 0 }
    }
}

/// One camera server, owned for the lifetime of the connection (§1, §6).
pub struct Camera {
    config: CameraConfig,
    sink: Arc<dyn FrameSink>,
    reporter: Arc<dyn EventReporter>,
    pending: Mutex<PendingAcquisition>,
    connected: Mutex<Option<Connected>>,
}

impl Camera {
    pub fn new(config: CameraConfig, sink: Arc<dyn FrameSink>, reporter: Arc<dyn EventReporter>) -> Self {
        Self { config, sink, reporter, pending: Mutex::new(PendingAcquisition::default()), connected: Mutex::new(None) }
    }

    /// Connect, fetch the detector's identity and current settings, then
    /// bring the three workers up in order (§3, §9).
    pub fn connect(&self) -> Result<()> {
        let mut slot = self.connected.lock().unwrap();
        if slot.is_some() {
            return Err(CameraError::state("already connected"));
        }

        let send_conn = Connection::connect(
            (self.config.connection_address.as_str(), self.config.connection_port),
            self.config.connection_timeout(),
            self.config.reception_timeout(),
            self.config.camera_identifier,
        )?;
        let recv_conn = send_conn.try_clone()?;

        let demux = Arc::new(Demultiplexer::new(self.config.wait_packet_timeout()));
        let engine = Arc::new(CommandEngine::new(
            send_conn,
            demux.clone(),
            self.config.camera_identifier,
            self.config.wait_packet_timeout(),
        ));
        let cache = Arc::new(ParameterCache::new());
        let session = Arc::new(Session::new(engine, cache));

        let receiver = ReceiverWorker::spawn(recv_conn, demux.clone());

        session.configure_packets(self.config.image_packet_pixels_nb, self.config.image_packet_delay_us as u32)?;
        session.fetch_camera_parameters()?;
        session.update_status()?;
        session.update_settings()?;

        let updater = Arc::new(UpdaterWorker::spawn(session.clone(), self.config.data_update_delay()));
        let acquisition = AcquisitionDriver::spawn(
            session.clone(),
            demux,
            Arc::new(self.config.clone()),
            self.sink.clone(),
            self.reporter.clone(),
            updater.clone(),
        );

        *slot = Some(Connected { session, acquisition, updater, receiver });
        Ok(())
    }

    /// Tear the workers down in reverse creation order, then drop the
    /// connection (§3, §9).
    pub fn disconnect(&self) -> Result<()> {
        let connected = self.connected.lock().unwrap().take().ok_or_else(|| CameraError::state("not connected"))?;
        connected.acquisition.join();
        match Arc::try_unwrap(connected.updater) {
            Ok(updater) => updater.join(),
            Err(updater) => updater.request_stop(),
        }
        connected.receiver.join();
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.lock().unwrap().is_some()
    }

    fn with_session<T>(&self, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        let slot = self.connected.lock().unwrap();
        let connected = slot.as_ref().ok_or_else(|| CameraError::state("not connected"))?;
        f(&connected.session)
    }

    /// Coherent identity/settings snapshot (§3, §6).
    pub fn parameters(&self) -> Result<CameraParameters> {
        self.with_session(|session| Ok(session.cache().snapshot()))
    }

    /// Unified host-facing status (§6: `{Init, Ready, Exposure, Readout,
    /// Latency, Fault}`). While an acquisition is running, the driver's
    /// finer-grained state takes precedence over the cache's last polled
    /// `GetStatus` flags, since only the driver knows about `Readout` and
    /// `Latency`. Does not itself issue a `GetStatus` round-trip.
    pub fn status(&self) -> Result<DetectorStatus> {
        let slot = self.connected.lock().unwrap();
        let connected = slot.as_ref().ok_or_else(|| CameraError::state("not connected"))?;
        Ok(match connected.acquisition.state() {
            AcqState::Idle => connected.session.cache().latest_status(),
            AcqState::Exposure => DetectorStatus::Exposure,
            AcqState::Readout | AcqState::Retrieve => DetectorStatus::Readout,
            AcqState::Latency => DetectorStatus::Latency,
            AcqState::Error => DetectorStatus::Fault,
        })
    }

    /// Last-polled CCD temperature in degrees Celsius (§3 parameter cache).
    pub fn ccd_temperature(&self) -> Result<f64> {
        self.with_session(|session| Ok(session.cache().snapshot().ccd_temperature))
    }

    /// Detector identity and maximum image size (§6).
    pub fn detector_identity(&self) -> Result<(String, String)> {
        self.with_session(|session| {
            let snap = session.cache().snapshot();
            Ok((snap.model, snap.serial_number))
        })
    }

    pub fn max_image_size(&self) -> Result<(i32, i32)> {
        self.with_session(|session| {
            let snap = session.cache().snapshot();
            Ok((snap.width_max, snap.height_max))
        })
    }

    // ---- Exposure -----------------------------------------------------

    pub fn set_exposure_time_ms(&self, exposure_time_ms: u32) -> Result<()> {
        self.with_session(|session| session.set_exposure_time_ms(exposure_time_ms))
    }

    pub fn exposure_time_ms(&self) -> Result<u32> {
        self.with_session(|session| Ok(session.cache().snapshot().exposure_time_ms))
    }

    // ---- Trigger mode / frame count / latency (applied at next StartAcq) ----

    pub fn set_trigger_mode(&self, trigger_mode: TriggerMode) {
        self.pending.lock().unwrap().trigger_mode = trigger_mode;
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        self.pending.lock().unwrap().trigger_mode
    }

    pub fn set_nb_frames(&self, nb_frames: u32) {
        self.pending.lock().unwrap().nb_frames = nb_frames;
    }

    pub fn nb_frames(&self) -> u32 {
        self.pending.lock().unwrap().nb_frames
    }

    pub fn set_latency_ms(&self, latency_ms: u64) {
        self.pending.lock().unwrap().latency_ms = latency_ms;
    }

    pub fn latency_ms(&self) -> u64 {
        self.pending.lock().unwrap().latency_ms
    }

    // ---- ROI / binning --------------------------------------------------

    /// Set the region of interest (§6: "set ROI as four integers"): origin
    /// and length along each axis, preserving the currently configured
    /// binning. The wire command carries all six fields together, so this
    /// reads the cached binning before resending the full `SetRoi` command.
    pub fn set_roi(&self, origin_x: i32, length_x: i32, origin_y: i32, length_y: i32) -> Result<()> {
        self.with_session(|session| {
            let snap = session.cache().snapshot();
            let serial = AxisRoi { origin: origin_x, length: length_x, binning: snap.serial.binning };
            let parallel = AxisRoi { origin: origin_y, length: length_y, binning: snap.parallel.binning };
            session.set_roi(serial, parallel)
        })
    }

    pub fn roi(&self) -> Result<(AxisRoi, AxisRoi)> {
        self.with_session(|session| {
            let snap = session.cache().snapshot();
            Ok((snap.serial, snap.parallel))
        })
    }

    /// Set binning along each axis (§6), preserving the currently configured
    /// origin/length.
    pub fn set_binning(&self, binning_x: i32, binning_y: i32) -> Result<()> {
        self.with_session(|session| {
            let snap = session.cache().snapshot();
            let serial = AxisRoi { binning: binning_x, ..snap.serial };
            let parallel = AxisRoi { binning: binning_y, ..snap.parallel };
            session.set_roi(serial, parallel)
        })
    }

    pub fn binning(&self) -> Result<(i32, i32)> {
        self.with_session(|session| {
            let snap = session.cache().snapshot();
            Ok((snap.serial.binning, snap.parallel.binning))
        })
    }

    // ---- Cooling / readout speed -----------------------------------------

    /// §6 "cooling on/off". This crate encodes the on/off switch as the
    /// `SetCoolingValue` command's all-or-nothing payload (0 = off, 1 = on);
    /// no finer-grained cooling setpoint survived in the retrieved source
    /// (see `DESIGN.md`).
    pub fn set_cooling_enabled(&self, enabled: bool) -> Result<()> {
        self.with_session(|session| session.set_cooling_value(if enabled { 1 } else { 0 }))
    }

    pub fn cooling_enabled(&self) -> Result<bool> {
        self.with_session(|session| Ok(session.cache().snapshot().cooling_value != 0))
    }

    pub fn set_readout_speed(&self, readout_speed: u16) -> Result<()> {
        self.with_session(|session| session.set_readout_speed(readout_speed))
    }

    pub fn readout_speed(&self) -> Result<u16> {
        self.with_session(|session| Ok(session.cache().snapshot().readout_speed))
    }

    // ---- Acquisition ------------------------------------------------------

    /// §4.9 `Idle --StartAcq→ Exposure`: applies the pending trigger
    /// mode/frame count/latency, derives the frame size from the currently
    /// cached ROI and pixel depth, and starts the driver. Returns once the
    /// driver has actually begun, not once acquisition has finished.
    pub fn start_acquisition(&self) -> Result<()> {
        let pending = {
            let p = self.pending.lock().unwrap();
            AcquisitionParams {
                nb_frames: p.nb_frames,
                trigger_mode: p.trigger_mode,
                latency_ms: p.latency_ms,
                frame_size_bytes: 0,
            }
        };

        let slot = self.connected.lock().unwrap();
        let connected = slot.as_ref().ok_or_else(|| CameraError::state("not connected"))?;
        let snap = connected.session.cache().snapshot();
        let params = AcquisitionParams { frame_size_bytes: frame_size_bytes(&snap), ..pending };
        connected.acquisition.start_acq(params)
    }

    /// §4.9 `* --StopAcq→ Idle`: blocks until the driver has returned to
    /// `Idle` or `Error`.
    pub fn stop_acquisition(&self) -> Result<()> {
        let slot = self.connected.lock().unwrap();
        let connected = slot.as_ref().ok_or_else(|| CameraError::state("not connected"))?;
        connected.acquisition.stop_acq();
        Ok(())
    }

    pub fn acquisition_state(&self) -> Result<AcqState> {
        let slot = self.connected.lock().unwrap();
        let connected = slot.as_ref().ok_or_else(|| CameraError::state("not connected"))?;
        Ok(connected.acquisition.state())
    }

    pub fn nb_frames_acquired(&self) -> Result<u32> {
        let slot = self.connected.lock().unwrap();
        let connected = slot.as_ref().ok_or_else(|| CameraError::state("not connected"))?;
        Ok(connected.acquisition.nb_frames_acquired())
    }
}

/// One assembled frame's size in bytes from the cached ROI and pixel depth
/// (§4.9: "derived by the caller from the current ROI and pixel depth").
fn frame_size_bytes(snapshot: &CameraParameters) -> usize {
    let width = (snapshot.serial.length / snapshot.serial.binning.max(1)).max(0) as usize;
    let height = (snapshot.parallel.length / snapshot.parallel.binning.max(1)).max(0) as usize;
    let bytes_per_pixel = (snapshot.pixel_depth as usize).div_ceil(8).max(1);
    width * height * bytes_per_pixel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_accounts_for_binning_and_pixel_depth() {
        let snap = CameraParameters {
            serial: AxisRoi { origin: 0, length: 2048, binning: 2 },
            parallel: AxisRoi { origin: 0, length: 2048, binning: 2 },
            pixel_depth: 16,
            ..Default::default()
        };
        assert_eq!(frame_size_bytes(&snap), 1024 * 1024 * 2);
    }

    #[test]
    fn pending_acquisition_defaults_to_single_internal_trigger() {
        let pending = PendingAcquisition::default();
        assert_eq!(pending.nb_frames, 1);
        assert_eq!(pending.trigger_mode, TriggerMode::InternalTrigger);
        assert_eq!(pending.latency_ms, 0);
    }
}
