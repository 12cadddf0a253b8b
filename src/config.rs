//! Driver configuration (§6, §9 `CameraControlInit`).
//!
//! Grounded on `original_source/include/CameraControlInit.h`: a plain
//! parameter bundle the host constructs once and hands to the camera core.
//! Field names follow that structure one-for-one; this crate exposes it as
//! an ordinary owned struct rather than the source's friend-class setter
//! bundle (§9 singletons: "implement as an owned instance... do not
//! replicate global-variable semantics").

use std::time::Duration;

/// Everything needed to connect to and drive one camera server.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Camera identifier on the wire; starts at 1 (§3, §6).
    pub camera_identifier: u8,
    pub connection_address: String,
    pub connection_port: u16,
    pub connection_timeout_sec: u64,
    pub reception_timeout_sec: u64,
    pub wait_packet_timeout_sec: u64,
    pub maximum_readout_time_sec: u64,
    pub delay_to_check_acq_end_ms: u64,
    pub inquire_acq_status_delay_ms: u64,
    pub data_update_delay_ms: u64,
    pub image_packet_pixels_nb: u32,
    pub image_packet_delay_us: u64,
}

impl CameraConfig {
    pub fn new(connection_address: impl Into<String>, connection_port: u16) -> Self {
        Self {
            camera_identifier: 1,
            connection_address: connection_address.into(),
            connection_port,
            connection_timeout_sec: 5,
            reception_timeout_sec: 5,
            wait_packet_timeout_sec: 5,
            maximum_readout_time_sec: 30,
            delay_to_check_acq_end_ms: 50,
            inquire_acq_status_delay_ms: 50,
            data_update_delay_ms: 1000,
            image_packet_pixels_nb: 65536,
            image_packet_delay_us: 0,
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_sec)
    }

    pub fn reception_timeout(&self) -> Duration {
        Duration::from_secs(self.reception_timeout_sec)
    }

    pub fn wait_packet_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_packet_timeout_sec)
    }

    pub fn maximum_readout_time(&self) -> Duration {
        Duration::from_secs(self.maximum_readout_time_sec)
    }

    pub fn delay_to_check_acq_end(&self) -> Duration {
        Duration::from_millis(self.delay_to_check_acq_end_ms)
    }

    pub fn inquire_acq_status_delay(&self) -> Duration {
        Duration::from_millis(self.inquire_acq_status_delay_ms)
    }

    pub fn data_update_delay(&self) -> Duration {
        Duration::from_millis(self.data_update_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_convert_from_configured_units() {
        let cfg = CameraConfig::new("localhost", 10000);
        assert_eq!(cfg.connection_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.inquire_acq_status_delay(), Duration::from_millis(50));
    }
}
