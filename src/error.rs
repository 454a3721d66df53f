use std::path::PathBuf;
use thiserror::Error;

use crate::worker::protocol::RequestKind;

/// A frame violated the ingestion contract. Raised only where frames enter the
/// pipeline; the numeric code downstream never sees a malformed frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("{field} has {actual} values, expected {expected}")]
    WrongLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{field}[{index}] is not a finite number")]
    NonFinite { field: &'static str, index: usize },
    #[error("amplitude[{index}] = {value} is outside [-1, 1]")]
    OutOfRange { index: usize, value: f32 },
    #[error("malformed frame: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkerError {
    #[error("{kind} request timed out after {waited_ms} ms")]
    Timeout { kind: RequestKind, waited_ms: u64 },
    #[error("{kind} request failed: {message}")]
    Failed { kind: RequestKind, message: String },
    #[error("worker pool disconnected")]
    Disconnected,
    #[error("session was cancelled")]
    Cancelled,
    #[error("request was superseded by a newer one")]
    Superseded,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to probe audio format of {path}: {source}")]
    Probe {
        path: PathBuf,
        source: symphonia::core::errors::Error,
    },
    #[error("no audio track found in {0}")]
    NoAudioTrack(PathBuf),
    #[error("unknown sample rate in {0}")]
    UnknownSampleRate(PathBuf),
    #[error("decoder error: {0}")]
    Decoder(#[from] symphonia::core::errors::Error),
    #[error("{0} decoded to zero samples")]
    Empty(PathBuf),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
