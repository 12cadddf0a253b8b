//! Acquisition driver (§4.9): the state machine that drives one exposure at
//! a time from `prepare` through `expose → readout → retrieve → latency`
//! and repeats for `nb_frames`.
//!
//! Grounded on `CameraAcqThread.cpp`'s thread shape — a `force_stop` flag
//! polled once per loop iteration, reset at the top of `execStartAcq`, and
//! a command/status handshake the caller blocks on (`startAcq` calls
//! `sendCmd` then `waitNotStatus(Idle)`) — generalized from its single
//! `updateData()`-per-tick body into the full multi-phase cycle §4.9
//! describes (the per-phase detail was not present in the retrieved
//! source; see `DESIGN.md`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::CameraConfig;
use crate::demux::Demultiplexer;
use crate::error::{CameraError, Result};
use crate::event::{EventReporter, HwEvent};
use crate::protocol::image::FrameAssembler;
use crate::protocol::Packet;
use crate::session::Session;
use crate::types::{DetectorStatus, TriggerMode};
use crate::updater::UpdaterWorker;

/// Driver state (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqState {
    Idle,
    Exposure,
    Readout,
    Retrieve,
    Latency,
    Error,
}

/// Parameters for one `StartAcq` (§4.9, §6 host-facing contract).
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionParams {
    pub nb_frames: u32,
    pub trigger_mode: TriggerMode,
    pub latency_ms: u64,
    /// Size in bytes of one assembled frame, derived by the caller from the
    /// current ROI and pixel depth.
    pub frame_size_bytes: usize,
}

/// Host-provided sink for assembled frames (§6 "receive assembled frames
/// via a buffer-manager callback"). The concrete buffer manager is out of
/// scope (§1); this crate only defines the call shape.
pub trait FrameSink: Send + Sync {
    fn deliver_frame(&self, frame_index: u32, data: Vec<u8>);
}

enum DriverCommand {
    Start(AcquisitionParams),
}

/// The acquisition state machine, running on its own worker thread.
pub struct AcquisitionDriver {
    state: Arc<Mutex<AcqState>>,
    state_cond: Arc<Condvar>,
    force_stop: Arc<AtomicBool>,
    frames_acquired: Arc<Mutex<u32>>,
    cmd_tx: Option<mpsc::Sender<DriverCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl AcquisitionDriver {
    pub fn spawn(
        session: Arc<Session>,
        demux: Arc<Demultiplexer>,
        config: Arc<CameraConfig>,
        sink: Arc<dyn FrameSink>,
        reporter: Arc<dyn EventReporter>,
        updater: Arc<UpdaterWorker>,
    ) -> Self {
        let state = Arc::new(Mutex::new(AcqState::Idle));
        let state_cond = Arc::new(Condvar::new());
        let force_stop = Arc::new(AtomicBool::new(false));
        let frames_acquired = Arc::new(Mutex::new(0u32));
        let (cmd_tx, cmd_rx) = mpsc::channel::<DriverCommand>();

        let worker_state = state.clone();
        let worker_cond = state_cond.clone();
        let worker_stop = force_stop.clone();
        let worker_frames = frames_acquired.clone();

        let handle = std::thread::Builder::new()
            .name("si-acquisition".into())
            .spawn(move || {
                log::debug!("acquisition driver starting");
                for cmd in cmd_rx {
                    let DriverCommand::Start(params) = cmd;
                    run_acquisition(
                        params,
                        &session,
                        &demux,
                        &config,
                        &sink,
                        &reporter,
                        &updater,
                        &worker_state,
                        &worker_cond,
                        &worker_stop,
                        &worker_frames,
                    );
                }
                log::debug!("acquisition driver stopped");
            })
            .expect("failed to spawn acquisition driver thread");

        Self { state, state_cond, force_stop, frames_acquired, cmd_tx: Some(cmd_tx), handle: Some(handle) }
    }

    pub fn state(&self) -> AcqState {
        *self.state.lock().unwrap()
    }

    pub fn nb_frames_acquired(&self) -> u32 {
        *self.frames_acquired.lock().unwrap()
    }

    /// §4.9 `Idle --StartAcq→ Exposure`. Returns once the driver has left
    /// `Idle` (i.e. has actually begun, not once the whole acquisition has
    /// finished).
    pub fn start_acq(&self, params: AcquisitionParams) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if *state != AcqState::Idle {
                return Err(CameraError::state(format!("start_acq called while driver is {state:?}")));
            }
        }
        self.force_stop.store(false, Ordering::Relaxed);
        self.cmd_tx
            .as_ref()
            .expect("cmd_tx only taken by join/drop, which consume the driver")
            .send(DriverCommand::Start(params))
            .map_err(|_| CameraError::state("acquisition driver thread is gone"))?;

        let mut state = self.state.lock().unwrap();
        while *state == AcqState::Idle {
            state = self.state_cond.wait(state).unwrap();
        }
        Ok(())
    }

    /// §4.9 `* --StopAcq→ Idle`. Sets the stop flag and blocks until the
    /// driver leaves its run loop (observed within one
    /// `inquire_acq_status_delay_ms` tick, §8 scenario 4).
    pub fn stop_acq(&self) {
        self.force_stop.store(true, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        while *state != AcqState::Idle && *state != AcqState::Error {
            state = self.state_cond.wait(state).unwrap();
        }
    }

    pub fn join(mut self) {
        self.force_stop.store(true, Ordering::Relaxed);
        // Drop the real sender, not a clone, so the worker's `for cmd in
        // cmd_rx` (blocked in `recv()` while idle) sees the channel close and
        // returns — `force_stop` alone is not observed while idle-blocked.
        self.cmd_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AcquisitionDriver {
    fn drop(&mut self) {
        self.force_stop.store(true, Ordering::Relaxed);
        self.cmd_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_acquisition(
    params: AcquisitionParams,
    session: &Session,
    demux: &Demultiplexer,
    config: &CameraConfig,
    sink: &Arc<dyn FrameSink>,
    reporter: &Arc<dyn EventReporter>,
    updater: &UpdaterWorker,
    state: &Mutex<AcqState>,
    state_cond: &Condvar,
    force_stop: &AtomicBool,
    frames_acquired: &Mutex<u32>,
) {
    let set_state = |s: AcqState| {
        *state.lock().unwrap() = s;
        state_cond.notify_all();
    };

    // §4.8: the updater's periodic GetStatus/GetSettings polling would race
    // unpredictably with this driver's own InquireAcquisitionStatus polling,
    // so it stands down for the duration of the acquisition and resumes
    // however the acquisition ends (success, stop request, or error).
    updater.set_suspended(true);
    run_acquisition_body(
        params,
        session,
        demux,
        config,
        sink,
        reporter,
        &set_state,
        force_stop,
        frames_acquired,
    );
    updater.set_suspended(false);
}

#[allow(clippy::too_many_arguments)]
fn run_acquisition_body(
    params: AcquisitionParams,
    session: &Session,
    demux: &Demultiplexer,
    config: &CameraConfig,
    sink: &Arc<dyn FrameSink>,
    reporter: &Arc<dyn EventReporter>,
    set_state: &dyn Fn(AcqState),
    force_stop: &AtomicBool,
    frames_acquired: &Mutex<u32>,
) {
    if let Err(e) = prepare(params, session) {
        reporter.report_event(HwEvent::error(format!("acquisition prepare failed: {e}")));
        session.cache().force_status(DetectorStatus::Fault);
        set_state(AcqState::Error);
        return;
    }
    *frames_acquired.lock().unwrap() = 0;

    for frame_index in 1..=params.nb_frames {
        if force_stop.load(Ordering::Relaxed) {
            break;
        }

        set_state(AcqState::Exposure);
        let frame_start = Instant::now();

        if let Err(e) = session.acquire() {
            reporter.report_event(HwEvent::error(format!("Acquire rejected: {e}")));
            set_state(AcqState::Error);
            return;
        }

        match wait_for_exposure_and_readout(session, config, force_stop) {
            Ok(true) => {}
            Ok(false) => {
                // Stop requested mid-poll.
                break;
            }
            Err(e) => {
                reporter.report_event(HwEvent::error(format!("readout wait failed: {e}")));
                set_state(AcqState::Error);
                return;
            }
        }

        set_state(AcqState::Readout);
        set_state(AcqState::Retrieve);
        match retrieve_frame(session, demux, config, frame_index, params.frame_size_bytes) {
            Ok(data) => {
                sink.deliver_frame(frame_index, data);
                *frames_acquired.lock().unwrap() += 1;
            }
            Err(e) => {
                reporter.report_event(HwEvent::error(format!("image retrieval failed: {e}")));
                set_state(AcqState::Error);
                return;
            }
        }

        if force_stop.load(Ordering::Relaxed) {
            break;
        }

        if frame_index < params.nb_frames {
            set_state(AcqState::Latency);
            // §4.9: period is exposure + readout + latency regardless of
            // retrieval duration — compute the sleep from the frame's start.
            let target = frame_start + Duration::from_millis(params.latency_ms);
            while !force_stop.load(Ordering::Relaxed) {
                let now = Instant::now();
                if now >= target {
                    break;
                }
                std::thread::sleep((target - now).min(Duration::from_millis(20)));
            }
        }
    }

    let _ = session.terminate_acquisition();
    set_state(AcqState::Idle);
}

fn prepare(params: AcquisitionParams, session: &Session) -> Result<()> {
    session.set_single_image_acquisition_mode()?;
    session.set_acquisition_type(params.trigger_mode.to_acquisition_type())?;
    session.set_nb_frames(params.nb_frames)?;
    Ok(())
}

/// Poll `InquireAcquisitionStatus` until the peer reports completion or the
/// maximum readout deadline elapses (§4.9). Returns `Ok(false)` if the
/// caller's stop flag was observed first.
fn wait_for_exposure_and_readout(
    session: &Session,
    config: &CameraConfig,
    force_stop: &AtomicBool,
) -> Result<bool> {
    let deadline = Instant::now() + config.maximum_readout_time();
    loop {
        if force_stop.load(Ordering::Relaxed) {
            return Ok(false);
        }
        if Instant::now() >= deadline {
            return Err(CameraError::timeout("acquisition readout"));
        }
        let status = session.inquire_acquisition_status()?;
        if status.complete {
            return Ok(true);
        }
        std::thread::sleep(config.inquire_acq_status_delay());
    }
}

/// §4.9 Retrieve state: send `RetrieveImage`, then drain the image queue for
/// tiles belonging to `frame_index` until the frame is complete or the wait
/// timeout elapses with no tile in sight.
fn retrieve_frame(
    session: &Session,
    demux: &Demultiplexer,
    config: &CameraConfig,
    frame_index: u32,
    frame_size_bytes: usize,
) -> Result<Vec<u8>> {
    session.retrieve_image()?;

    let granularity = (config.image_packet_pixels_nb as usize).max(1) * 2;
    let mut assembler = FrameAssembler::new(frame_index, frame_size_bytes, granularity);
    let queue = demux.image_queue();
    let deadline = Instant::now() + config.maximum_readout_time();

    while !assembler.is_complete() {
        let Some(Packet::Image(tile)) = queue.take_until(deadline) else {
            return Err(CameraError::timeout("image tile"));
        };
        if tile.image_id != frame_index {
            log::warn!("dropping stray tile for image {} while assembling frame {frame_index}", tile.image_id);
            continue;
        }
        assembler.absorb(&tile).map_err(CameraError::from)?;
    }

    Ok(assembler.into_frame())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_engine::CommandEngine;
    use crate::conn::Connection;
    use crate::params::ParameterCache;
    use crate::protocol::answer::AcquisitionStatusPayload;
    use crate::protocol::image::ImagePacket;
    use crate::protocol::{AckPacket, AnswerPacket, AnswerPayload};
    use std::net::TcpListener;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        frames: StdMutex<Vec<(u32, Vec<u8>)>>,
    }

    impl FrameSink for RecordingSink {
        fn deliver_frame(&self, frame_index: u32, data: Vec<u8>) {
            self.frames.lock().unwrap().push((frame_index, data));
        }
    }

    struct NullReporter;
    impl EventReporter for NullReporter {
        fn report_event(&self, _event: HwEvent) {}
    }

    fn harness() -> (Arc<Session>, Arc<Demultiplexer>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (_server_sock, _) = listener.accept().unwrap();

        let conn = Connection::from_stream(client, Duration::from_secs(1), 1).unwrap();
        let demux = Arc::new(Demultiplexer::new(Duration::from_millis(200)));
        let engine = Arc::new(CommandEngine::new(conn, demux.clone(), 1, Duration::from_millis(200)));
        let cache = Arc::new(ParameterCache::new());
        (Arc::new(Session::new(engine, cache)), demux)
    }

    #[test]
    fn retrieve_frame_assembles_two_tiles() {
        let (session, demux) = harness();
        demux.route(Packet::Ack(AckPacket { camera_identifier: 1, accepted: 1 }));
        demux.route(Packet::Image(ImagePacket {
            camera_identifier: 1,
            image_id: 1,
            offset: 0,
            is_last: false,
            data: vec![1, 2, 3, 4],
        }));
        demux.route(Packet::Image(ImagePacket {
            camera_identifier: 1,
            image_id: 1,
            offset: 4,
            is_last: true,
            data: vec![5, 6, 7, 8],
        }));

        let config = CameraConfig::new("localhost", 10000);
        let frame = retrieve_frame(&session, &demux, &config, 1, 8).unwrap();
        assert_eq!(frame, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn wait_for_readout_returns_once_answer_reports_complete() {
        let (session, demux) = harness();
        demux.route(Packet::Ack(AckPacket { camera_identifier: 1, accepted: 1 }));
        demux.route(Packet::Answer(AnswerPacket {
            camera_identifier: 1,
            error_code: 0,
            payload: AnswerPayload::AcquisitionStatus(AcquisitionStatusPayload { complete: true }),
        }));
        let config = CameraConfig::new("localhost", 10000);
        let stop = AtomicBool::new(false);
        assert!(wait_for_exposure_and_readout(&session, &config, &stop).unwrap());
    }

    #[test]
    fn stop_flag_short_circuits_readout_wait() {
        let (session, _demux) = harness();
        let config = CameraConfig::new("localhost", 10000);
        let stop = AtomicBool::new(true);
        assert!(!wait_for_exposure_and_readout(&session, &config, &stop).unwrap());
    }
}
