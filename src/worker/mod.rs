//! Where per-frame analysis runs: inline on the capture thread or on a pool
//! of background threads, behind one request/response interface.

pub mod bridge;
pub mod protocol;

use std::collections::HashMap;
use std::sync::Arc;

use crate::audio::AudioFrame;
use crate::error::WorkerError;

pub use bridge::WorkerBridge;
pub use protocol::{AnalysisData, Analysers, RequestKind, WorkerReply, WorkerRequest, WorkerResponse};

/// At most one request per kind is outstanding. Submitting a kind again
/// supersedes the earlier request; its response is dropped if it ever shows up.
pub trait AnalysisBackend {
    /// Queue `kind` for `frame` and return the request id.
    fn submit(&mut self, kind: RequestKind, frame: Arc<AudioFrame>) -> Result<u64, WorkerError>;

    /// Block until the outstanding request of `kind` is answered.
    /// `WorkerError::Cancelled` when the last request of that kind was issued
    /// before a `cancel`, `WorkerError::Superseded` when nothing else is
    /// outstanding.
    fn recv(&mut self, kind: RequestKind) -> Result<WorkerResponse, WorkerError>;

    /// Forget everything in flight. Responses issued before the call are
    /// ignored when they arrive.
    fn cancel(&mut self);

    /// Responses dropped as superseded or cancelled so far
    fn discarded(&self) -> u64 {
        0
    }
}

/// Why nothing is outstanding for `kind`: its last request predates a
/// cancel, or it was already answered, timed out or never made.
fn idle_error(
    submitted_in: &HashMap<RequestKind, u64>,
    kind: RequestKind,
    generation: u64,
) -> WorkerError {
    match submitted_in.get(&kind) {
        Some(&submitted) if submitted < generation => WorkerError::Cancelled,
        _ => WorkerError::Superseded,
    }
}

/// Computes each request on the calling thread as soon as it is submitted.
pub struct InlineBackend {
    analysers: Analysers,
    next_id: u64,
    generation: u64,
    submitted_in: HashMap<RequestKind, u64>,
    answered: HashMap<RequestKind, WorkerResponse>,
}

impl InlineBackend {
    pub fn new(analysers: Analysers) -> Self {
        Self {
            analysers,
            next_id: 0,
            generation: 0,
            submitted_in: HashMap::new(),
            answered: HashMap::new(),
        }
    }
}

impl AnalysisBackend for InlineBackend {
    fn submit(&mut self, kind: RequestKind, frame: Arc<AudioFrame>) -> Result<u64, WorkerError> {
        self.next_id += 1;
        let request = WorkerRequest {
            id: self.next_id,
            generation: self.generation,
            kind,
            frame,
        };
        self.submitted_in.insert(kind, self.generation);
        self.answered.insert(kind, self.analysers.respond(&request));
        Ok(request.id)
    }

    fn recv(&mut self, kind: RequestKind) -> Result<WorkerResponse, WorkerError> {
        self.answered
            .remove(&kind)
            .ok_or_else(|| idle_error(&self.submitted_in, kind, self.generation))
    }

    fn cancel(&mut self) {
        self.generation += 1;
        self.answered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamp: u64) -> Arc<AudioFrame> {
        Arc::new(AudioFrame::new(timestamp, vec![-80.0; 8], vec![0.25; 16]))
    }

    #[test]
    fn inline_answers_latest_submission() {
        let mut backend = InlineBackend::new(Analysers::default());
        backend.submit(RequestKind::AnalyzeFeatures, frame(100)).unwrap();
        let id = backend.submit(RequestKind::AnalyzeFeatures, frame(200)).unwrap();
        let resp = backend.recv(RequestKind::AnalyzeFeatures).unwrap();
        assert_eq!(resp.id, id);
        assert_eq!(resp.timestamp, 200);
        assert!(matches!(resp.into_data(), Ok(AnalysisData::Features(_))));
    }

    #[test]
    fn inline_recv_without_request() {
        let mut backend = InlineBackend::new(Analysers::default());
        assert_eq!(
            backend.recv(RequestKind::DetectBeats).unwrap_err(),
            WorkerError::Superseded
        );
        backend.submit(RequestKind::DetectBeats, frame(0)).unwrap();
        backend.cancel();
        assert_eq!(
            backend.recv(RequestKind::DetectBeats).unwrap_err(),
            WorkerError::Cancelled
        );

        // a fresh submission after the cancel is answered normally
        backend.submit(RequestKind::DetectBeats, frame(100)).unwrap();
        assert_eq!(backend.recv(RequestKind::DetectBeats).unwrap().generation, 1);
        assert_eq!(
            backend.recv(RequestKind::DetectBeats).unwrap_err(),
            WorkerError::Superseded
        );
    }
}
