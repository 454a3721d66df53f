use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::audio::{
    summarize_spectrum, AudioFrame, BeatDetector, BeatState, FeatureExtractor, Features,
    SpectrumSummary,
};
use crate::config::{AnalysisConfig, Config};
use crate::error::WorkerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    AnalyzeFeatures,
    DetectBeats,
    AnalyzeSpectrum,
}

impl RequestKind {
    pub const ALL: [RequestKind; 3] = [
        RequestKind::AnalyzeFeatures,
        RequestKind::DetectBeats,
        RequestKind::AnalyzeSpectrum,
    ];

    /// Dense index for per-kind tables
    pub fn index(&self) -> usize {
        match self {
            RequestKind::AnalyzeFeatures => 0,
            RequestKind::DetectBeats => 1,
            RequestKind::AnalyzeSpectrum => 2,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestKind::AnalyzeFeatures => "ANALYZE_FEATURES",
            RequestKind::DetectBeats => "DETECT_BEATS",
            RequestKind::AnalyzeSpectrum => "ANALYZE_SPECTRUM",
        };
        f.write_str(s)
    }
}

/// One unit of work. `id` correlates the response; `generation` ties it to
/// the session epoch it was issued in.
#[derive(Clone, Debug)]
pub struct WorkerRequest {
    pub id: u64,
    pub generation: u64,
    pub kind: RequestKind,
    pub frame: Arc<AudioFrame>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisData {
    Features(Features),
    Beats(BeatState),
    Spectrum(SpectrumSummary),
}

/// `{"status": "ok", "data": ...}` or `{"status": "error", "message": ...}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerReply {
    Ok { data: AnalysisData },
    Error { message: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: u64,
    pub generation: u64,
    pub kind: RequestKind,
    /// Timestamp of the frame the request was made for
    pub timestamp: u64,
    #[serde(flatten)]
    pub reply: WorkerReply,
}

impl WorkerResponse {
    pub fn into_data(self) -> Result<AnalysisData, WorkerError> {
        match self.reply {
            WorkerReply::Ok { data } => Ok(data),
            WorkerReply::Error { message } => Err(WorkerError::Failed {
                kind: self.kind,
                message,
            }),
        }
    }
}

/// The per-frame computations a request can ask for. Shared read-only by
/// every worker thread.
#[derive(Clone, Debug)]
pub struct Analysers {
    features: FeatureExtractor,
    beats: BeatDetector,
    analysis: AnalysisConfig,
    sample_rate: u32,
}

impl Default for Analysers {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Analysers {
    pub fn new(config: &Config) -> Self {
        let sample_rate = config.capture.sample_rate;
        Self {
            features: FeatureExtractor::new(sample_rate, &config.analysis),
            beats: BeatDetector::new(sample_rate, config.analysis.beat_threshold),
            analysis: config.analysis.clone(),
            sample_rate,
        }
    }

    pub fn features(&self, frame: &AudioFrame) -> Features {
        self.features.extract(frame)
    }

    pub fn beats(&self, frame: &AudioFrame) -> BeatState {
        self.beats.detect(&frame.amplitude)
    }

    pub fn spectrum(&self, frame: &AudioFrame) -> SpectrumSummary {
        summarize_spectrum(frame, self.sample_rate, &self.analysis)
    }

    pub fn run(&self, kind: RequestKind, frame: &AudioFrame) -> AnalysisData {
        match kind {
            RequestKind::AnalyzeFeatures => AnalysisData::Features(self.features(frame)),
            RequestKind::DetectBeats => AnalysisData::Beats(self.beats(frame)),
            RequestKind::AnalyzeSpectrum => AnalysisData::Spectrum(self.spectrum(frame)),
        }
    }

    /// `run`, with a panic turned into an error reply so a bad request can
    /// never take its worker down.
    pub fn reply(&self, kind: RequestKind, frame: &AudioFrame) -> WorkerReply {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run(kind, frame))) {
            Ok(data) => WorkerReply::Ok { data },
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "analysis panicked".to_string());
                WorkerReply::Error { message }
            }
        }
    }

    pub fn respond(&self, request: &WorkerRequest) -> WorkerResponse {
        WorkerResponse {
            id: request.id,
            generation: request.generation,
            kind: request.kind,
            timestamp: request.frame.timestamp,
            reply: self.reply(request.kind, &request.frame),
        }
    }
}
