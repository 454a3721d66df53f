//! Crowd-engagement scoring for a live DJ set.
//!
//! Capture frames flow through feature extraction and beat detection
//! (inline or on worker threads), are scored into four engagement metrics,
//! kept in a bounded history for trend analysis, and finally drive the
//! ranking of candidate tracks for the next transition.

pub mod audio;
pub mod clock;
pub mod config;
pub mod engagement;
pub mod error;
pub mod recommend;
pub mod session;
pub mod worker;

pub use config::Config;
pub use session::{CaptureSession, SessionSnapshot, StopHandle, TickOutcome, TickRecord};
