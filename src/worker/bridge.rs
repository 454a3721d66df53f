use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::protocol::{Analysers, RequestKind, WorkerRequest, WorkerResponse};
use super::{idle_error, AnalysisBackend};
use crate::audio::AudioFrame;
use crate::error::WorkerError;

/// Id of the newest request per kind. 0 means nothing is wanted.
type LatestIds = Arc<[AtomicU64; 3]>;

/// Pool of analysis threads fed over channels.
///
/// The bridge lives on the controlling thread; workers only see requests and
/// send back responses. A response is accepted only if it answers the current
/// in-flight request of its kind and was issued in the current generation.
/// Everything else is counted as discarded.
pub struct WorkerBridge {
    requests: Option<Sender<WorkerRequest>>,
    responses: Receiver<WorkerResponse>,
    handles: Vec<JoinHandle<()>>,
    latest: LatestIds,
    in_flight: HashMap<RequestKind, u64>,
    /// Generation each kind was last submitted in
    submitted_in: HashMap<RequestKind, u64>,
    /// Accepted responses for kinds nobody has asked for yet
    ready: HashMap<RequestKind, WorkerResponse>,
    next_id: u64,
    generation: u64,
    timeout: Duration,
    discarded: u64,
}

impl WorkerBridge {
    pub fn new(workers: usize, analysers: Analysers, timeout: Duration) -> std::io::Result<Self> {
        let (request_tx, request_rx) = unbounded::<WorkerRequest>();
        let (response_tx, response_rx) = unbounded::<WorkerResponse>();
        let latest: LatestIds = Arc::new([AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)]);
        let analysers = Arc::new(analysers);

        let count = workers.max(1);
        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let latest = Arc::clone(&latest);
            let analysers = Arc::clone(&analysers);
            let handle = std::thread::Builder::new()
                .name(format!("crowdpulse-worker-{}", i))
                .spawn(move || worker_loop(rx, tx, latest, analysers))?;
            handles.push(handle);
        }
        log::info!("Started {} analysis workers", count);

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            handles,
            latest,
            in_flight: HashMap::new(),
            submitted_in: HashMap::new(),
            ready: HashMap::new(),
            next_id: 0,
            generation: 0,
            timeout,
            discarded: 0,
        })
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    fn is_current(&self, response: &WorkerResponse) -> bool {
        response.generation == self.generation
            && self.in_flight.get(&response.kind) == Some(&response.id)
    }
}

fn worker_loop(
    requests: Receiver<WorkerRequest>,
    responses: Sender<WorkerResponse>,
    latest: LatestIds,
    analysers: Arc<Analysers>,
) {
    for request in requests.iter() {
        if latest[request.kind.index()].load(Ordering::Acquire) != request.id {
            log::debug!("Skipping superseded {} request {}", request.kind, request.id);
            continue;
        }
        let response = analysers.respond(&request);
        if responses.send(response).is_err() {
            break;
        }
    }
}

impl AnalysisBackend for WorkerBridge {
    fn submit(&mut self, kind: RequestKind, frame: Arc<AudioFrame>) -> Result<u64, WorkerError> {
        let requests = self.requests.clone().ok_or(WorkerError::Disconnected)?;
        self.next_id += 1;
        let id = self.next_id;
        if let Some(old) = self.in_flight.insert(kind, id) {
            log::debug!("{} request {} superseded by {}", kind, old, id);
        }
        self.submitted_in.insert(kind, self.generation);
        self.ready.remove(&kind);
        self.latest[kind.index()].store(id, Ordering::Release);

        requests
            .send(WorkerRequest {
                id,
                generation: self.generation,
                kind,
                frame,
            })
            .map_err(|_| WorkerError::Disconnected)?;
        Ok(id)
    }

    fn recv(&mut self, kind: RequestKind) -> Result<WorkerResponse, WorkerError> {
        if let Some(response) = self.ready.remove(&kind) {
            return Ok(response);
        }
        if !self.in_flight.contains_key(&kind) {
            return Err(idle_error(&self.submitted_in, kind, self.generation));
        }

        let started = Instant::now();
        let deadline = started + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) => {
                    if !self.is_current(&response) {
                        self.discarded += 1;
                        log::debug!(
                            "Discarding stale {} response {} (generation {})",
                            response.kind,
                            response.id,
                            response.generation
                        );
                        continue;
                    }
                    self.in_flight.remove(&response.kind);
                    if response.kind == kind {
                        return Ok(response);
                    }
                    self.ready.insert(response.kind, response);
                }
                Err(RecvTimeoutError::Timeout) => {
                    // a late answer must not be taken for the next request
                    self.in_flight.remove(&kind);
                    self.latest[kind.index()].store(0, Ordering::Release);
                    return Err(WorkerError::Timeout {
                        kind,
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Err(WorkerError::Disconnected),
            }
        }
    }

    fn cancel(&mut self) {
        self.generation += 1;
        self.in_flight.clear();
        self.ready.clear();
        for slot in self.latest.iter() {
            slot.store(0, Ordering::Release);
        }
        log::debug!("Worker bridge moved to generation {}", self.generation);
    }

    fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        self.cancel();
        // closing the request channel ends every worker loop
        self.requests.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("Analysis worker panicked during shutdown");
            }
        }
    }
}
