use std::fmt;
use std::io;
use thiserror::Error;

/// Errors arising from wire protocol parsing and encoding (§7 DecodeError).
#[derive(Debug, Error)]
pub enum WireError {
    #[error("payload too short for {msg_type}: need {need} bytes, got {got}{}", format_raw_suffix(raw))]
    PayloadTooShort {
        msg_type: &'static str,
        need: usize,
        got: usize,
        /// Raw payload bytes for debug context.
        raw: Vec<u8>,
    },

    #[error("unexpected payload length for {msg_type}: expected {expected}, got {got}{}", format_raw_suffix(raw))]
    UnexpectedLength {
        msg_type: &'static str,
        expected: usize,
        got: usize,
        /// Raw payload bytes for debug context.
        raw: Vec<u8>,
    },

    #[error("unknown packet identifier 0x{got:02X}")]
    UnknownPacketIdentifier { got: u8 },

    #[error("unknown data type {got}")]
    UnknownDataType { got: u16 },

    #[error("camera identifier {got} does not match configured id {expected} or server id 0")]
    UnexpectedCameraIdentifier { expected: u8, got: u8 },

    #[error("malformed parameter line: {0:?}")]
    MalformedParameterLine(String),

    #[error("invalid string payload: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),
}

impl WireError {
    /// Create a `PayloadTooShort` error (raw bytes filled in later via `with_raw`).
    pub(crate) fn payload_too_short(msg_type: &'static str, need: usize, got: usize) -> Self {
        Self::PayloadTooShort { msg_type, need, got, raw: Vec::new() }
    }

    /// Create an `UnexpectedLength` error (raw bytes filled in later via `with_raw`).
    pub(crate) fn unexpected_length(msg_type: &'static str, expected: usize, got: usize) -> Self {
        Self::UnexpectedLength { msg_type, expected, got, raw: Vec::new() }
    }

    /// Attach raw payload bytes to decode-phase errors for diagnostics.
    pub fn with_raw(self, payload: &[u8]) -> Self {
        match self {
            Self::PayloadTooShort { msg_type, need, got, .. } => {
                Self::PayloadTooShort { msg_type, need, got, raw: payload.to_vec() }
            }
            Self::UnexpectedLength { msg_type, expected, got, .. } => {
                Self::UnexpectedLength { msg_type, expected, got, raw: payload.to_vec() }
            }
            other => other,
        }
    }
}

/// Format raw bytes as a suffix like " | 9E 00 03 ..." (empty if no bytes).
fn format_raw_suffix(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let limit = 16;
    let hex: String = raw.iter().take(limit).map(|b| format!("{b:02X}")).collect();
    let ellipsis = if raw.len() > limit { "..." } else { "" };
    format!(" | {hex}{ellipsis}")
}

pub type WireResult<T> = std::result::Result<T, WireError>;

/// Top-level failure domain for the camera core (§7): wraps `WireError` and
/// adds the transport/timeout/protocol/state cases that only make sense above
/// the codec layer.
#[derive(Debug)]
pub enum CameraError {
    /// Malformed header, length mismatch, unknown identifier/data type.
    Decode(WireError),
    /// Socket create/connect/send/recv failure (non-timeout).
    Transport(io::Error),
    /// recv timeout, queue-wait timeout, acquisition-readout deadline.
    Timeout { what: &'static str },
    /// Command rejected (`ack.accepted == 0`) or data answer with non-zero `error_code`.
    Protocol { detail: String },
    /// Operation invalid in the current state (e.g. start while already running).
    State { detail: String },
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::Decode(e) => write!(f, "decode error: {e}"),
            CameraError::Transport(e) => write!(f, "transport error: {e}"),
            CameraError::Timeout { what } => write!(f, "timeout waiting for {what}"),
            CameraError::Protocol { detail } => write!(f, "protocol error: {detail}"),
            CameraError::State { detail } => write!(f, "invalid state: {detail}"),
        }
    }
}

impl std::error::Error for CameraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CameraError::Decode(e) => Some(e),
            CameraError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WireError> for CameraError {
    fn from(e: WireError) -> Self {
        CameraError::Decode(e)
    }
}

impl From<io::Error> for CameraError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                CameraError::Timeout { what: "socket read" }
            }
            _ => CameraError::Transport(e),
        }
    }
}

impl CameraError {
    pub fn protocol(detail: impl Into<String>) -> Self {
        CameraError::Protocol { detail: detail.into() }
    }

    pub fn state(detail: impl Into<String>) -> Self {
        CameraError::State { detail: detail.into() }
    }

    pub fn timeout(what: &'static str) -> Self {
        CameraError::Timeout { what }
    }
}

pub type Result<T> = std::result::Result<T, CameraError>;
