use serde::Deserialize;
use std::path::Path;

use crate::engagement::scorer::{EmotionalWeights, MetricWeights};
use crate::recommend::engine::{Preset, ScoringWeights};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub engagement: EngagementConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// FFT size; frames carry `fft_size` samples and `fft_size / 2` bins.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Time smoothing of the analyser spectrum (0.0-1.0)
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    #[serde(default = "default_beat_threshold")]
    pub beat_threshold: f32,
    #[serde(default = "default_rolloff_fraction")]
    pub rolloff_fraction: f32,
    /// dB value mapped to magnitude 0.0
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    /// dB value mapped to magnitude 1.0
    #[serde(default = "default_max_db")]
    pub max_db: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngagementConfig {
    #[serde(default)]
    pub weights: MetricWeights,
    #[serde(default)]
    pub emotional: EmotionalWeights,
    /// RMS level (dBFS) treated as silence by the physical metric
    #[serde(default = "default_level_floor_db")]
    pub level_floor_db: f32,
    #[serde(default = "default_rhythm_window")]
    pub rhythm_window: usize,
    #[serde(default = "default_sustain_window")]
    pub sustain_window: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    #[serde(default = "default_forecast_horizon")]
    pub forecast_horizon: usize,
    /// Amplitude of the deterministic forecast jitter; 0 disables it.
    #[serde(default)]
    pub forecast_jitter: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendConfig {
    #[serde(default)]
    pub preset: Preset,
    /// Overrides the preset when present.
    #[serde(default)]
    pub weights: Option<ScoringWeights>,
    #[serde(default = "default_bpm_tolerance")]
    pub bpm_tolerance: f32,
    /// BPM distance beyond the tolerance at which the match reaches zero
    #[serde(default = "default_bpm_falloff")]
    pub bpm_falloff: f32,
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_compatible_genre_score")]
    pub compatible_genre_score: f32,
    #[serde(default = "default_other_genre_score")]
    pub other_genre_score: f32,
    /// Energy offset applied to the target in the direction of momentum
    #[serde(default = "default_momentum_step")]
    pub momentum_step: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Background worker threads; 0 runs extraction inline.
    #[serde(default)]
    pub count: usize,
    #[serde(default = "default_worker_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            fft_size: default_fft_size(),
            sample_rate: default_sample_rate(),
            smoothing: default_smoothing(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            silence_threshold: default_silence_threshold(),
            beat_threshold: default_beat_threshold(),
            rolloff_fraction: default_rolloff_fraction(),
            min_db: default_min_db(),
            max_db: default_max_db(),
        }
    }
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            weights: MetricWeights::default(),
            emotional: EmotionalWeights::default(),
            level_floor_db: default_level_floor_db(),
            rhythm_window: default_rhythm_window(),
            sustain_window: default_sustain_window(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
            trend_window: default_trend_window(),
            forecast_horizon: default_forecast_horizon(),
            forecast_jitter: 0.0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_ms: default_cache_ttl_ms(),
        }
    }
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            weights: None,
            bpm_tolerance: default_bpm_tolerance(),
            bpm_falloff: default_bpm_falloff(),
            recent_capacity: default_recent_capacity(),
            top_k: default_top_k(),
            compatible_genre_score: default_compatible_genre_score(),
            other_genre_score: default_other_genre_score(),
            momentum_step: default_momentum_step(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 0,
            timeout_ms: default_worker_timeout_ms(),
        }
    }
}

impl RecommendConfig {
    /// Effective weights: explicit table first, then the named preset.
    pub fn scoring_weights(&self) -> ScoringWeights {
        self.weights.clone().unwrap_or_else(|| self.preset.weights())
    }

    /// Select `preset` and drop any explicit weight table, which would
    /// otherwise shadow it.
    pub fn override_preset(&mut self, preset: Preset) {
        self.preset = preset;
        if self.weights.take().is_some() {
            log::info!("Preset {} replaces the configured scoring weights", preset);
        }
    }
}

fn default_interval_ms() -> u64 { 100 }
fn default_fft_size() -> usize { 2048 }
fn default_sample_rate() -> u32 { 44_100 }
fn default_smoothing() -> f32 { 0.8 }
fn default_silence_threshold() -> f32 { 0.1 }
fn default_beat_threshold() -> f32 { 0.15 }
fn default_rolloff_fraction() -> f32 { 0.85 }
fn default_min_db() -> f32 { -100.0 }
fn default_max_db() -> f32 { -30.0 }
fn default_level_floor_db() -> f32 { -60.0 }
fn default_rhythm_window() -> usize { 64 }
fn default_sustain_window() -> usize { 128 }
fn default_history_capacity() -> usize { 50 }
fn default_trend_window() -> usize { 5 }
fn default_forecast_horizon() -> usize { 3 }
fn default_cache_capacity() -> usize { 20 }
fn default_cache_ttl_ms() -> u64 { 3_600_000 }
fn default_bpm_tolerance() -> f32 { 8.0 }
fn default_bpm_falloff() -> f32 { 20.0 }
fn default_recent_capacity() -> usize { 50 }
fn default_top_k() -> usize { 5 }
fn default_compatible_genre_score() -> f32 { 0.7 }
fn default_other_genre_score() -> f32 { 0.4 }
fn default_momentum_step() -> f32 { 10.0 }
fn default_worker_timeout_ms() -> u64 { 500 }

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Cannot read config {}: {}", path.display(), e);
            return None;
        }
    };
    match Config::from_toml_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_documented_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.capture.interval_ms, 100);
        assert_eq!(cfg.capture.fft_size, 2048);
        assert_eq!(cfg.capture.sample_rate, 44_100);
        assert_eq!(cfg.history.capacity, 50);
        assert_eq!(cfg.cache.capacity, 20);
        assert_eq!(cfg.cache.ttl_ms, 3_600_000);
        assert_eq!(cfg.recommend.bpm_tolerance, 8.0);
        assert_eq!(cfg.recommend.recent_capacity, 50);
        assert_eq!(cfg.analysis.silence_threshold, 0.1);
        assert_eq!(cfg.analysis.beat_threshold, 0.15);
        assert_eq!(cfg.engagement.weights.physical, 0.3);
        assert_eq!(cfg.engagement.weights.spiritual, 0.2);
        assert_eq!(cfg.workers.count, 0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [cache]
            capacity = 2

            [recommend]
            preset = "layered"
            top_k = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cache.capacity, 2);
        assert_eq!(cfg.cache.ttl_ms, 3_600_000);
        assert_eq!(cfg.recommend.preset, Preset::Layered);
        assert_eq!(cfg.recommend.top_k, 3);
        assert_eq!(cfg.recommend.scoring_weights(), Preset::Layered.weights());
    }

    #[test]
    fn explicit_weights_override_preset() {
        let cfg = Config::from_toml_str(
            r#"
            [recommend.weights]
            energy = 1.0
            bpm = 0.0
            genre = 0.0
            "#,
        )
        .unwrap();
        let w = cfg.recommend.scoring_weights();
        assert_eq!(w.energy, 1.0);
        assert_eq!(w.bpm, 0.0);
        assert_eq!(w.novelty_penalty, ScoringWeights::default().novelty_penalty);
    }

    #[test]
    fn preset_override_clears_explicit_weights() {
        let mut cfg = Config::from_toml_str(
            r#"
            [recommend.weights]
            energy = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.recommend.scoring_weights().energy, 1.0);

        cfg.recommend.override_preset(Preset::Flat);
        assert!(cfg.recommend.weights.is_none());
        assert_eq!(cfg.recommend.preset, Preset::Flat);
        assert_eq!(cfg.recommend.scoring_weights(), Preset::Flat.weights());
    }

    #[test]
    fn load_config_reads_file_and_rejects_garbage() {
        let mut good = tempfile::NamedTempFile::new().unwrap();
        writeln!(good, "[history]\ncapacity = 7").unwrap();
        let cfg = load_config(good.path()).unwrap();
        assert_eq!(cfg.history.capacity, 7);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[history\ncapacity = ").unwrap();
        assert!(load_config(bad.path()).is_none());
        assert!(load_config(Path::new("/nonexistent/crowdpulse.toml")).is_none());
    }
}
