use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{AudioFrame, BeatState, Features, FrameShape, FrameSource, SpectrumSummary};
use crate::config::Config;
use crate::engagement::{
    EngagementMetrics, EngagementScorer, HistoryBuffer, HistoryEntry, MetricWeights, TrendAnalyzer,
    TrendReport,
};
use crate::error::{InputError, WorkerError};
use crate::worker::{AnalysisBackend, AnalysisData, Analysers, InlineBackend, RequestKind, WorkerBridge};

/// Stops a running session from any thread. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Frames whose metrics reached the history
    pub applied: u64,
    /// Frames rejected at ingestion
    pub skipped: u64,
    /// Frames not newer than the last applied one
    pub stale: u64,
    /// Requests recomputed inline after a worker error
    pub fallbacks: u64,
    /// Worker responses dropped as superseded or cancelled
    pub discarded: u64,
}

/// Per-tick record emitted for every applied frame
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickRecord {
    pub timestamp: u64,
    pub metrics: EngagementMetrics,
    pub overall: u8,
    pub bpm: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    Applied(TickRecord),
    Skipped(InputError),
    Stale { timestamp: u64 },
    Stopped,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub last_timestamp: Option<u64>,
    pub metrics: Option<EngagementMetrics>,
    pub overall: Option<u8>,
    pub beat: BeatState,
    pub spectrum: Option<SpectrumSummary>,
    pub trend: TrendReport,
    pub history_len: usize,
    pub counters: SessionCounters,
    pub stopped: bool,
}

/// Drives frames through analysis, scoring and history.
///
/// History only ever moves forward in frame time: a frame whose timestamp is
/// not newer than the last applied one is counted as stale and dropped. Once
/// stopped, nothing that arrives later changes the session state.
pub struct CaptureSession {
    shape: FrameShape,
    interval: Duration,
    backend: Box<dyn AnalysisBackend + Send>,
    fallback: Analysers,
    scorer: EngagementScorer,
    weights: MetricWeights,
    history: HistoryBuffer,
    trend: TrendAnalyzer,
    beat: BeatState,
    spectrum: Option<SpectrumSummary>,
    last_applied: Option<HistoryEntry>,
    counters: SessionCounters,
    stop: StopHandle,
    cancelled: bool,
}

impl CaptureSession {
    pub fn new(config: &Config, backend: Box<dyn AnalysisBackend + Send>) -> Self {
        Self {
            shape: FrameShape::from_fft_size(config.capture.fft_size),
            interval: Duration::from_millis(config.capture.interval_ms.max(1)),
            backend,
            fallback: Analysers::new(config),
            scorer: EngagementScorer::new(&config.engagement, &config.analysis),
            weights: config.engagement.weights.clone(),
            history: HistoryBuffer::new(config.history.capacity),
            trend: TrendAnalyzer::new(&config.history),
            beat: BeatState::default(),
            spectrum: None,
            last_applied: None,
            counters: SessionCounters::default(),
            stop: StopHandle::default(),
            cancelled: false,
        }
    }

    /// Inline analysis when `workers.count` is 0, a worker pool otherwise.
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        let backend: Box<dyn AnalysisBackend + Send> = if config.workers.count == 0 {
            Box::new(InlineBackend::new(Analysers::new(config)))
        } else {
            Box::new(WorkerBridge::new(
                config.workers.count,
                Analysers::new(config),
                Duration::from_millis(config.workers.timeout_ms),
            )?)
        };
        Ok(Self::new(config, backend))
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&mut self) {
        self.stop.stop();
        self.cancel_in_flight();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn beat(&self) -> &BeatState {
        &self.beat
    }

    pub fn latest_metrics(&self) -> Option<EngagementMetrics> {
        self.last_applied.map(|e| e.metrics)
    }

    fn cancel_in_flight(&mut self) {
        if !self.cancelled {
            self.backend.cancel();
            self.cancelled = true;
            log::info!("Capture stopped after {} frames", self.counters.applied);
        }
    }

    fn is_stale(&self, timestamp: u64) -> bool {
        self.last_applied.map_or(false, |e| timestamp <= e.timestamp)
    }

    /// One capture tick.
    pub fn process(&mut self, frame: Result<AudioFrame, InputError>) -> TickOutcome {
        if self.is_stopped() {
            self.cancel_in_flight();
            return TickOutcome::Stopped;
        }

        let frame = match frame.and_then(|f| self.shape.validate(&f).map(|_| f)) {
            Ok(frame) => frame,
            Err(err) => {
                self.counters.skipped += 1;
                log::warn!("Skipping frame: {}", err);
                return TickOutcome::Skipped(err);
            }
        };
        if self.is_stale(frame.timestamp) {
            return self.discard_stale(frame.timestamp);
        }

        let frame = Arc::new(frame);
        for kind in RequestKind::ALL {
            if let Err(err) = self.backend.submit(kind, Arc::clone(&frame)) {
                log::warn!("Cannot submit {} request: {}", kind, err);
            }
        }
        let features = match self.await_data(RequestKind::AnalyzeFeatures, &frame) {
            Some(AnalysisData::Features(f)) => f,
            _ => self.fallback.features(&frame),
        };
        let beat = match self.await_data(RequestKind::DetectBeats, &frame) {
            Some(AnalysisData::Beats(b)) => b,
            _ => self.fallback.beats(&frame),
        };
        let spectrum = match self.await_data(RequestKind::AnalyzeSpectrum, &frame) {
            Some(AnalysisData::Spectrum(s)) => s,
            _ => self.fallback.spectrum(&frame),
        };

        // stop may have been requested while waiting on workers
        if self.is_stopped() {
            self.cancel_in_flight();
            return TickOutcome::Stopped;
        }
        if self.is_stale(frame.timestamp) {
            return self.discard_stale(frame.timestamp);
        }

        TickOutcome::Applied(self.apply(&frame, &features, beat, spectrum))
    }

    /// Worker answer for `kind`, or `None` when it has to be computed here.
    fn await_data(&mut self, kind: RequestKind, frame: &AudioFrame) -> Option<AnalysisData> {
        let result = self.backend.recv(kind).and_then(|response| {
            if response.timestamp == frame.timestamp {
                response.into_data()
            } else {
                Err(WorkerError::Superseded)
            }
        });
        self.counters.discarded = self.backend.discarded();
        match result {
            Ok(data) => Some(data),
            Err(err) => {
                self.counters.fallbacks += 1;
                log::warn!("{}; computing {} inline", err, kind);
                None
            }
        }
    }

    fn discard_stale(&mut self, timestamp: u64) -> TickOutcome {
        self.counters.stale += 1;
        log::warn!("Discarding stale frame at {} ms", timestamp);
        TickOutcome::Stale { timestamp }
    }

    fn apply(
        &mut self,
        frame: &AudioFrame,
        features: &Features,
        beat: BeatState,
        spectrum: SpectrumSummary,
    ) -> TickRecord {
        let metrics = self.scorer.score(frame, features);
        let entry = HistoryEntry {
            timestamp: frame.timestamp,
            metrics,
        };
        self.history.push(entry);
        self.last_applied = Some(entry);
        self.beat = beat;
        self.spectrum = Some(spectrum);
        self.counters.applied += 1;

        let record = TickRecord {
            timestamp: frame.timestamp,
            metrics,
            overall: metrics.overall(&self.weights),
            bpm: self.beat.bpm,
        };
        log::debug!(
            "t={} physical={} emotional={} mental={} spiritual={} bpm={}",
            record.timestamp,
            metrics.physical,
            metrics.emotional,
            metrics.mental,
            metrics.spiritual,
            record.bpm
        );
        record
    }

    /// Pull frames until the source ends or the session is stopped.
    /// With `realtime`, ticks are spaced by the capture interval.
    pub fn run<S, F>(&mut self, source: &mut S, realtime: bool, mut on_tick: F) -> SessionSnapshot
    where
        S: FrameSource + ?Sized,
        F: FnMut(&TickOutcome),
    {
        let mut next_tick = Instant::now();
        loop {
            if realtime {
                let now = Instant::now();
                if next_tick > now {
                    std::thread::sleep(next_tick - now);
                }
                next_tick += self.interval;
            }
            if self.is_stopped() {
                self.cancel_in_flight();
                break;
            }
            let Some(frame) = source.next_frame() else {
                break;
            };
            let outcome = self.process(frame);
            on_tick(&outcome);
            if outcome == TickOutcome::Stopped {
                break;
            }
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            last_timestamp: self.last_applied.map(|e| e.timestamp),
            metrics: self.latest_metrics(),
            overall: self.latest_metrics().map(|m| m.overall(&self.weights)),
            beat: self.beat.clone(),
            spectrum: self.spectrum.clone(),
            trend: self.trend.analyze(&self.history),
            history_len: self.history.len(),
            counters: self.counters.clone(),
            stopped: self.is_stopped(),
        }
    }
}
