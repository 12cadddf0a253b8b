//! Connect to a camera server, run a short single-frame acquisition, and
//! print status and frame-delivery events as they happen.
//!
//! Usage: cargo run --example event_loop -- <host> <port>

use std::env;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sigl2::{
    AcqState, Camera, CameraConfig, CameraError, EventReporter, FrameSink, HwEvent, TriggerMode,
};

struct PrintingSink;

impl FrameSink for PrintingSink {
    fn deliver_frame(&self, frame_index: u32, data: Vec<u8>) {
        println!("frame #{frame_index} delivered: {} bytes", data.len());
    }
}

struct PrintingReporter;

impl EventReporter for PrintingReporter {
    fn report_event(&self, event: HwEvent) {
        println!("[{:?}] {}", event.level, event.description);
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), CameraError> {
    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u16 = args.next().and_then(|s| s.parse().ok()).unwrap_or(10000);

    let config = CameraConfig::new(host, port);
    let camera = Camera::new(config, Arc::new(PrintingSink), Arc::new(PrintingReporter));

    println!("connecting...");
    camera.connect()?;

    let (model, serial) = camera.detector_identity()?;
    let (width, height) = camera.max_image_size()?;
    println!("connected to {model} (serial {serial}), max image {width}x{height}");
    println!("status: {:?}", camera.status()?);

    camera.set_exposure_time_ms(100)?;
    camera.set_trigger_mode(TriggerMode::InternalTrigger);
    camera.set_nb_frames(1);

    println!("starting acquisition...");
    camera.start_acquisition()?;

    loop {
        let state = camera.acquisition_state()?;
        println!("acquisition state: {state:?}");
        if state == AcqState::Idle || state == AcqState::Error {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    println!("frames acquired: {}", camera.nb_frames_acquired()?);
    camera.disconnect()?;
    println!("disconnected.");
    Ok(())
}
