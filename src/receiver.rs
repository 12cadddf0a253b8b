//! Receiver worker (§4.5): a dedicated thread that owns the socket's read
//! half and does nothing but parse one packet at a time and route it into
//! the demultiplexer.
//!
//! Grounded on `CameraReceiveDataThread.cpp`: a `force_stop` flag polled
//! once per loop iteration, a single long-running loop body, and the rule
//! that a non-timeout socket error is fatal to the thread while a timeout is
//! not (§4.5, §8 scenario 6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::conn::Connection;
use crate::demux::Demultiplexer;
use crate::error::CameraError;

/// Handle to the running receiver thread. Dropping this does not stop the
/// thread; call [`ReceiverWorker::stop`] and join explicitly (§3 lifecycle:
/// "workers... torn down in reverse order before `disconnect()`").
pub struct ReceiverWorker {
    force_stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiverWorker {
    /// Spawn the worker. It owns `conn` for its entire lifetime — no other
    /// thread may read from this connection (§5: "the receiver has sole
    /// read access").
    pub fn spawn(mut conn: Connection, demux: Arc<Demultiplexer>) -> Self {
        let force_stop = Arc::new(AtomicBool::new(false));
        let stop_flag = force_stop.clone();

        let handle = std::thread::Builder::new()
            .name("si-receiver".into())
            .spawn(move || {
                log::debug!("receiver worker starting");
                while !stop_flag.load(Ordering::Relaxed) {
                    match conn.recv_packet() {
                        Ok(packet) => demux.route(packet),
                        Err(CameraError::Timeout { .. }) => {
                            log::debug!("receiver worker: reception timeout, continuing");
                            continue;
                        }
                        Err(e) => {
                            log::error!("receiver worker: fatal transport/decode error: {e}");
                            break;
                        }
                    }
                }
                log::debug!("receiver worker stopped");
            })
            .expect("failed to spawn receiver worker thread");

        Self { force_stop, handle: Some(handle) }
    }

    /// Set the stop flag. The loop exits at its next socket-read return
    /// (within one reception timeout), never asynchronously (§5 cancellation
    /// model).
    pub fn request_stop(&self) {
        self.force_stop.store(true, Ordering::Relaxed);
    }

    /// Request stop and block until the thread has exited.
    pub fn join(mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReceiverWorker {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
