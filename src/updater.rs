//! Updater worker (§4.8): periodically re-reads status and settings.
//!
//! Grounded on `CameraUpdateDataThread.cpp`: a `force_stop` flag, a fixed
//! per-tick delay read from the shared config, and `updateData()` (here
//! split into the two session calls it actually performs) called once per
//! iteration. §4.8 adds one refinement the source doesn't need: the updater
//! suspends itself while the acquisition driver owns status polling, via a
//! shared `suspended` flag, so the two workers never race to issue commands
//! that, while individually safe under the command-engine mutex, would
//! otherwise interleave unpredictably with the acquisition driver's own
//! polling cadence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::session::Session;

pub struct UpdaterWorker {
    force_stop: Arc<AtomicBool>,
    suspended: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl UpdaterWorker {
    pub fn spawn(session: Arc<Session>, tick: Duration) -> Self {
        let force_stop = Arc::new(AtomicBool::new(false));
        let suspended = Arc::new(AtomicBool::new(false));
        let stop_flag = force_stop.clone();
        let suspend_flag = suspended.clone();

        let handle = std::thread::Builder::new()
            .name("si-updater".into())
            .spawn(move || {
                log::debug!("updater worker starting");
                while !stop_flag.load(Ordering::Relaxed) {
                    if !suspend_flag.load(Ordering::Relaxed) {
                        if let Err(e) = session.update_status() {
                            log::warn!("updater: GetStatus failed, will retry next tick: {e}");
                        }
                        if let Err(e) = session.update_settings() {
                            log::warn!("updater: GetSettings failed, will retry next tick: {e}");
                        }
                    }
                    std::thread::sleep(tick);
                }
                log::debug!("updater worker stopped");
            })
            .expect("failed to spawn updater worker thread");

        Self { force_stop, suspended, handle: Some(handle) }
    }

    /// Suspend/resume periodic polling (§4.8: "suspended... while an
    /// acquisition is in progress if the acquisition driver owns status
    /// polling itself").
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Relaxed);
    }

    pub fn request_stop(&self) {
        self.force_stop.store(true, Ordering::Relaxed);
    }

    pub fn join(mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UpdaterWorker {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
