//! Parameter cache (§4.7): holds the last-known detector identity and
//! settings, and parses the text-keyed parameter blobs the peer sends back
//! from `GetCameraParameters` and `GetStatus`.
//!
//! Grounded on `CameraControl::initCameraParameters`/`updateStatus`/
//! `updateSettings` in `original_source/src/CameraControl.cpp`: each line of
//! the text blob matches `"group.key = value"`; a field is extracted by
//! finding the line with the right group/key pair and taking the substring
//! after the delimiter. `GetSettings` instead returns the structured
//! [`crate::protocol::SettingsPayload`] decoded directly by the wire codec.

use std::sync::RwLock;

use crate::error::{CameraError, Result};
use crate::protocol::SettingsPayload;
use crate::types::{AcquisitionType, DetectorStatus};

const DELIMITER: char = '=';

/// Find the line whose key (left of `=`, trimmed) equals `group.key`.
fn find_line<'a>(blob: &'a str, group: &str, key: &str) -> Option<&'a str> {
    let needle = format!("{group}.{key}");
    blob.lines().find(|line| {
        line.split(DELIMITER)
            .next()
            .map(|k| k.trim() == needle)
            .unwrap_or(false)
    })
}

/// Extract the value substring after the delimiter, trimmed and with
/// surrounding quotes stripped if present.
fn value_of(line: &str) -> Result<&str> {
    let value = line
        .split_once(DELIMITER)
        .map(|(_, v)| v.trim())
        .ok_or_else(|| CameraError::protocol(format!("malformed parameter line: {line:?}")))?;
    Ok(value.trim_matches('"'))
}

fn find_value<'a>(blob: &'a str, group: &str, key: &str) -> Result<&'a str> {
    let line = find_line(blob, group, key)
        .ok_or_else(|| CameraError::protocol(format!("missing key {group}.{key}")))?;
    value_of(line)
}

fn find_int(blob: &str, group: &str, key: &str) -> Result<i64> {
    find_value(blob, group, key)?
        .parse()
        .map_err(|_| CameraError::protocol(format!("non-numeric value for {group}.{key}")))
}

/// Status bits carried by `server.flags` (§4.7).
mod flags {
    pub const CAMERA_CONNECTED: i64 = 0x01;
    pub const CONFIGURATION_ERROR: i64 = 0x02;
    pub const ACQUISITION_IN_PROGRESS: i64 = 0x04;
}

/// Map `server.flags` to a [`DetectorStatus`] (§4.7 table).
fn status_from_flags(flags_value: i64) -> DetectorStatus {
    if flags_value & flags::CAMERA_CONNECTED == 0 {
        return DetectorStatus::Fault;
    }
    if flags_value & flags::CONFIGURATION_ERROR != 0 {
        return DetectorStatus::Fault;
    }
    if flags_value & flags::ACQUISITION_IN_PROGRESS != 0 {
        DetectorStatus::Exposure
    } else {
        DetectorStatus::Ready
    }
}

/// Region of interest, expressed per axis as origin/length/binning (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AxisRoi {
    pub origin: i32,
    pub length: i32,
    pub binning: i32,
}

/// Snapshot of everything the cache knows (§3 data model).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CameraParameters {
    pub model: String,
    pub serial_number: String,
    pub width_max: i32,
    pub height_max: i32,
    pub pixel_depth: i32,
    pub exposure_time_ms: u32,
    pub nb_images_to_acquire: u32,
    pub acquisition_type: Option<AcquisitionType>,
    pub serial: AxisRoi,
    pub parallel: AxisRoi,
    pub cooling_value: i32,
    pub ccd_temperature: f64,
    pub readout_speed: u16,
    pub latest_status: DetectorStatus,
}

/// Mutex-free reader/writer cache of camera identity and settings (§5: "the
/// parameter cache is readable by any thread; writers hold the command mutex
/// for the full ack-then-answer round-trip" — so at most one writer is ever
/// active, but many readers may run concurrently with it).
pub struct ParameterCache {
    state: RwLock<CameraParameters>,
}

impl ParameterCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CameraParameters {
                latest_status: DetectorStatus::Init,
                ..Default::default()
            }),
        }
    }

    /// Coherent multi-field snapshot (§5: "callers that need a coherent
    /// multi-field snapshot must read after an `updateSettings` call
    /// returns" — this is exactly that read).
    pub fn snapshot(&self) -> CameraParameters {
        self.state.read().unwrap().clone()
    }

    pub fn latest_status(&self) -> DetectorStatus {
        self.state.read().unwrap().latest_status
    }

    /// Parse a `GetCameraParameters` text blob and fill identity fields (§4.7).
    pub fn apply_camera_parameters(&self, blob: &str) -> Result<()> {
        let model = find_value(blob, "factory", "instrument_model")?.to_string();
        let serial_number = find_value(blob, "factory", "instrument_serial_number")?.to_string();
        let width_max = find_int(blob, "factory", "instrument_serial_size")? as i32;
        let height_max = find_int(blob, "factory", "instrument_parallel_size")? as i32;
        let pixel_depth = find_int(blob, "miscellaneous", "bits_per_pixel")? as i32;

        let mut state = self.state.write().unwrap();
        state.model = model;
        state.serial_number = serial_number;
        state.width_max = width_max;
        state.height_max = height_max;
        state.pixel_depth = pixel_depth;
        Ok(())
    }

    /// Parse a `GetStatus` text blob and update `latest_status` (§4.7).
    pub fn apply_status(&self, blob: &str) -> Result<()> {
        let flags_value = find_int(blob, "server", "flags")?;
        let new_status = status_from_flags(flags_value);
        self.state.write().unwrap().latest_status = new_status;
        Ok(())
    }

    /// Apply a structured `GetSettings` answer (§4.7).
    pub fn apply_settings(&self, settings: &SettingsPayload) {
        let mut state = self.state.write().unwrap();
        state.exposure_time_ms = settings.exposure_time_msec;
        state.nb_images_to_acquire = settings.nb_images_to_acquire;
        state.serial = AxisRoi {
            origin: settings.serial_origin,
            length: settings.serial_length,
            binning: settings.serial_binning,
        };
        state.parallel = AxisRoi {
            origin: settings.parallel_origin,
            length: settings.parallel_length,
            binning: settings.parallel_binning,
        };
        state.acquisition_type = settings.acquisition_type();
    }

    pub fn force_status(&self, status: DetectorStatus) {
        self.state.write().unwrap().latest_status = status;
    }

    /// `SetCoolingValue`/`SetReadoutSpeed` are write-only on the wire (no
    /// answer payload echoes them back, and neither `GetStatus` nor
    /// `GetSettings` reports them — see `DESIGN.md`), so the cache records
    /// the host's last commanded value rather than anything read from the
    /// peer.
    pub fn record_cooling_value(&self, cooling_value: i32) {
        self.state.write().unwrap().cooling_value = cooling_value;
    }

    pub fn record_readout_speed(&self, readout_speed: u16) {
        self.state.write().unwrap().readout_speed = readout_speed;
    }
}

impl Default for ParameterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS_BLOB: &str = "factory.instrument_model = \"SI1100\"\n\
factory.instrument_serial_number = \"SN-42\"\n\
factory.instrument_serial_size = 2048\n\
factory.instrument_parallel_size = 2048\n\
miscellaneous.bits_per_pixel = 16\n";

    #[test]
    fn parses_camera_parameters_blob() {
        let cache = ParameterCache::new();
        cache.apply_camera_parameters(PARAMS_BLOB).unwrap();
        let snap = cache.snapshot();
        assert_eq!(snap.model, "SI1100");
        assert_eq!(snap.serial_number, "SN-42");
        assert_eq!(snap.width_max, 2048);
        assert_eq!(snap.height_max, 2048);
        assert_eq!(snap.pixel_depth, 16);
    }

    #[test]
    fn missing_key_is_protocol_error() {
        let cache = ParameterCache::new();
        assert!(cache.apply_camera_parameters("factory.instrument_model = \"X\"\n").is_err());
    }

    #[test]
    fn status_maps_connected_and_acquiring_to_exposure() {
        let cache = ParameterCache::new();
        cache.apply_status("server.flags = 5\n").unwrap(); // connected | acquiring
        assert_eq!(cache.latest_status(), DetectorStatus::Exposure);
    }

    #[test]
    fn status_maps_connected_idle_to_ready() {
        let cache = ParameterCache::new();
        cache.apply_status("server.flags = 1\n").unwrap();
        assert_eq!(cache.latest_status(), DetectorStatus::Ready);
    }

    #[test]
    fn status_maps_configuration_error_to_fault() {
        let cache = ParameterCache::new();
        cache.apply_status("server.flags = 3\n").unwrap(); // connected | config error
        assert_eq!(cache.latest_status(), DetectorStatus::Fault);
    }

    #[test]
    fn status_maps_disconnected_to_fault() {
        let cache = ParameterCache::new();
        cache.apply_status("server.flags = 0\n").unwrap();
        assert_eq!(cache.latest_status(), DetectorStatus::Fault);
    }

    #[test]
    fn settings_payload_populates_roi_and_exposure() {
        let cache = ParameterCache::new();
        let settings = SettingsPayload {
            exposure_time_msec: 250,
            nb_images_to_acquire: 3,
            serial_origin: 0,
            serial_length: 1024,
            serial_binning: 2,
            parallel_origin: 0,
            parallel_length: 1024,
            parallel_binning: 2,
            acquisition_type: 0,
        };
        cache.apply_settings(&settings);
        let snap = cache.snapshot();
        assert_eq!(snap.exposure_time_ms, 250);
        assert_eq!(snap.nb_images_to_acquire, 3);
        assert_eq!(snap.serial, AxisRoi { origin: 0, length: 1024, binning: 2 });
        assert_eq!(snap.acquisition_type, Some(AcquisitionType::Light));
    }
}
