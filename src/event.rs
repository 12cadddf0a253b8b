//! Host event channel (§6, §7: "All errors are reported through the host
//! event channel with `{source=Hardware, level=Info|Error, domain=Camera}`
//! and a human-readable description").
//!
//! Grounded on the `Event(Hardware, Event::Info, Event::Camera,
//! Event::Default, text)` / `reportEvent()` calls in
//! `original_source/src/CameraAcqThread.cpp`,
//! `CameraReceiveDataThread.cpp` and `CameraUpdateDataThread.cpp` — every
//! worker's error path constructs one of these and hands it to the same
//! reporter. The host's concrete reporter is out of scope (§1); this crate
//! only defines the interface workers call into.

/// Always `Hardware` for this driver; kept as an enum so the host's binding
/// layer can match on it without relying on a raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDomain {
    Camera,
}

/// One reported event, handed to the host's [`EventReporter`].
#[derive(Debug, Clone)]
pub struct HwEvent {
    pub source: EventSource,
    pub level: EventLevel,
    pub domain: EventDomain,
    pub description: String,
}

impl HwEvent {
    pub fn info(description: impl Into<String>) -> Self {
        Self { source: EventSource::Hardware, level: EventLevel::Info, domain: EventDomain::Camera, description: description.into() }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self { source: EventSource::Hardware, level: EventLevel::Error, domain: EventDomain::Camera, description: description.into() }
    }
}

/// Host-provided sink for driver-originated events (§6 "error events via an
/// event reporter"). Implemented by the host framework; out of scope here.
pub trait EventReporter: Send + Sync {
    fn report_event(&self, event: HwEvent);
}

/// An [`EventReporter`] that only logs (§9: ambient logging stack), useful
/// as a default when the host hasn't wired one up yet.
pub struct LoggingEventReporter;

impl EventReporter for LoggingEventReporter {
    fn report_event(&self, event: HwEvent) {
        match event.level {
            EventLevel::Info => log::info!("[{:?}/{:?}] {}", event.source, event.domain, event.description),
            EventLevel::Error => log::error!("[{:?}/{:?}] {}", event.source, event.domain, event.description),
        }
    }
}
