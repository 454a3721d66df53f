use serde::{Deserialize, Serialize};

use super::frame::AudioFrame;
use crate::config::AnalysisConfig;

/// Low-level descriptors of a single frame
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// RMS of the time-domain samples (linear)
    pub rms: f32,
    /// Magnitude-weighted mean bin index
    pub spectral_centroid: f32,
    /// Bin-to-bin change across the spectrum, divided by bin count
    pub spectral_flux: f32,
    /// Fraction of the spectrum (0.0-1.0) below which the rolloff energy sits
    pub spectral_rolloff: f32,
    pub zero_crossings: u32,
    /// Autocorrelation pitch estimate (Hz), 0 when none
    pub pitch: f32,
    /// Share of near-silent samples (0-100)
    pub silence_percentage: f32,
}

/// Turns one frame into `Features`. Every function is total: degenerate input
/// yields the documented neutral value instead of an error.
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    sample_rate: u32,
    silence_threshold: f32,
    rolloff_fraction: f32,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(44_100, &AnalysisConfig::default())
    }
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32, config: &AnalysisConfig) -> Self {
        Self {
            sample_rate,
            silence_threshold: config.silence_threshold,
            rolloff_fraction: config.rolloff_fraction,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn extract(&self, frame: &AudioFrame) -> Features {
        let features = Features {
            rms: rms(&frame.amplitude),
            spectral_centroid: spectral_centroid(&frame.frequency),
            spectral_flux: spectral_flux(&frame.frequency),
            spectral_rolloff: spectral_rolloff(&frame.frequency, self.rolloff_fraction),
            zero_crossings: zero_crossings(&frame.amplitude),
            pitch: pitch(&frame.amplitude, self.sample_rate),
            silence_percentage: silence_percentage(&frame.amplitude, self.silence_threshold),
        };
        log::trace!("Features @{}: {:?}", frame.timestamp, features);
        features
    }
}

#[inline]
pub(crate) fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    finite_or_zero((sum_sq / samples.len() as f64).sqrt() as f32)
}

pub fn spectral_centroid(bins: &[f32]) -> f32 {
    let total: f64 = bins.iter().map(|&b| b as f64).sum();
    if total == 0.0 {
        return 0.0;
    }
    let weighted: f64 = bins
        .iter()
        .enumerate()
        .map(|(i, &b)| b as f64 * i as f64)
        .sum();
    finite_or_zero((weighted / total) as f32)
}

pub fn spectral_flux(bins: &[f32]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = bins
        .windows(2)
        .map(|w| {
            let d = (w[1] - w[0]) as f64;
            d * d
        })
        .sum();
    finite_or_zero((sum_sq.sqrt() / bins.len() as f64) as f32)
}

/// Smallest `i / N` at which the cumulative |magnitude| of bins `0..=i`
/// reaches `fraction` of the total; 1.0 when it never does.
pub fn spectral_rolloff(bins: &[f32], fraction: f32) -> f32 {
    let total: f64 = bins.iter().map(|&b| b.abs() as f64).sum();
    let target = fraction as f64 * total;
    let mut cumulative = 0.0f64;
    for (i, &b) in bins.iter().enumerate() {
        cumulative += b.abs() as f64;
        if cumulative >= target {
            return i as f32 / bins.len() as f32;
        }
    }
    1.0
}

pub fn zero_crossings(samples: &[f32]) -> u32 {
    samples
        .windows(2)
        .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
        .count() as u32
}

/// Brute-force autocorrelation over every lag `1..M`. The earliest lag wins
/// ties and a lag is only taken when its correlation is positive.
pub fn pitch(samples: &[f32], sample_rate: u32) -> f32 {
    let n = samples.len();
    let mut best_lag = 0usize;
    let mut best_corr = 0.0f64;
    for lag in 1..n {
        let corr: f64 = samples[..n - lag]
            .iter()
            .zip(&samples[lag..])
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }
    if best_lag == 0 {
        0.0
    } else {
        sample_rate as f32 / best_lag as f32
    }
}

pub fn silence_percentage(samples: &[f32], threshold: f32) -> f32 {
    if samples.is_empty() {
        return 100.0;
    }
    let quiet = samples.iter().filter(|s| s.abs() < threshold).count();
    100.0 * quiet as f32 / samples.len() as f32
}
