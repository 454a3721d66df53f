use serde::{Deserialize, Serialize};

use crate::audio::features::{finite_or_zero, spectral_centroid, Features};
use crate::audio::frame::AudioFrame;
use crate::audio::spectrum::normalize_db;
use crate::config::{AnalysisConfig, EngagementConfig};

/// Four crowd-engagement scores, each 0-100
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub physical: u8,
    pub emotional: u8,
    pub mental: u8,
    pub spiritual: u8,
}

impl EngagementMetrics {
    pub fn new(physical: u8, emotional: u8, mental: u8, spiritual: u8) -> Self {
        Self {
            physical: physical.min(100),
            emotional: emotional.min(100),
            mental: mental.min(100),
            spiritual: spiritual.min(100),
        }
    }

    /// Weighted composite of the four metrics, 0-100
    pub fn overall(&self, weights: &MetricWeights) -> u8 {
        let total = weights.physical + weights.emotional + weights.mental + weights.spiritual;
        if total <= 0.0 {
            return 0;
        }
        let sum = weights.physical * self.physical as f32
            + weights.emotional * self.emotional as f32
            + weights.mental * self.mental as f32
            + weights.spiritual * self.spiritual as f32;
        to_score(sum / total)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    #[serde(default = "default_physical_weight")]
    pub physical: f32,
    #[serde(default = "default_emotional_weight")]
    pub emotional: f32,
    #[serde(default = "default_mental_weight")]
    pub mental: f32,
    #[serde(default = "default_spiritual_weight")]
    pub spiritual: f32,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            physical: default_physical_weight(),
            emotional: default_emotional_weight(),
            mental: default_mental_weight(),
            spiritual: default_spiritual_weight(),
        }
    }
}

/// Blend of the spectral terms behind the emotional metric
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionalWeights {
    #[serde(default = "default_energy_term")]
    pub energy: f32,
    #[serde(default = "default_centroid_term")]
    pub centroid: f32,
    #[serde(default = "default_flux_term")]
    pub flux: f32,
    #[serde(default = "default_rolloff_term")]
    pub rolloff: f32,
}

impl Default for EmotionalWeights {
    fn default() -> Self {
        Self {
            energy: default_energy_term(),
            centroid: default_centroid_term(),
            flux: default_flux_term(),
            rolloff: default_rolloff_term(),
        }
    }
}

fn default_physical_weight() -> f32 { 0.3 }
fn default_emotional_weight() -> f32 { 0.3 }
fn default_mental_weight() -> f32 { 0.2 }
fn default_spiritual_weight() -> f32 { 0.2 }
fn default_energy_term() -> f32 { 0.4 }
fn default_centroid_term() -> f32 { 0.3 }
fn default_flux_term() -> f32 { 0.2 }
fn default_rolloff_term() -> f32 { 0.1 }

/// Round and clamp into a 0-100 score. NaN maps to 0.
#[inline]
fn to_score(v: f32) -> u8 {
    finite_or_zero(v).round().clamp(0.0, 100.0) as u8
}

/// Maps one frame and its features onto `EngagementMetrics`.
///
/// All constants are tuning parameters taken from `EngagementConfig`; the
/// formulas only fix their shape.
#[derive(Clone, Debug)]
pub struct EngagementScorer {
    emotional: EmotionalWeights,
    level_floor_db: f32,
    rhythm_window: usize,
    sustain_window: usize,
    min_db: f32,
    max_db: f32,
}

impl Default for EngagementScorer {
    fn default() -> Self {
        Self::new(&EngagementConfig::default(), &AnalysisConfig::default())
    }
}

impl EngagementScorer {
    pub fn new(config: &EngagementConfig, analysis: &AnalysisConfig) -> Self {
        Self {
            emotional: config.emotional.clone(),
            level_floor_db: config.level_floor_db,
            rhythm_window: config.rhythm_window.max(1),
            sustain_window: config.sustain_window.max(1),
            min_db: analysis.min_db,
            max_db: analysis.max_db,
        }
    }

    pub fn score(&self, frame: &AudioFrame, features: &Features) -> EngagementMetrics {
        let magnitudes: Vec<f32> = frame
            .frequency
            .iter()
            .map(|&db| normalize_db(db, self.min_db, self.max_db))
            .collect();

        let physical = self.physical(features.rms);
        let emotional = self.emotional(&magnitudes, features);
        let mental = to_score(
            (self.rhythm_stability(&frame.amplitude) + frequency_complexity(&magnitudes)) / 2.0,
        );
        let spiritual = to_score(
            (harmonic_content(&magnitudes) + self.sustained_patterns(&frame.amplitude)) / 2.0,
        );

        EngagementMetrics {
            physical,
            emotional,
            mental,
            spiritual,
        }
    }

    /// RMS expressed as a signed level in [-1, 1] over the dB floor, then
    /// `(level + 1) * 50`.
    fn physical(&self, rms: f32) -> u8 {
        let floor = self.level_floor_db;
        let level = if floor < 0.0 {
            let db = (20.0 * rms.log10()).clamp(floor, 0.0);
            2.0 * (db - floor) / -floor - 1.0
        } else {
            rms.clamp(0.0, 1.0) * 2.0 - 1.0
        };
        to_score((level + 1.0) * 50.0)
    }

    fn emotional(&self, magnitudes: &[f32], features: &Features) -> u8 {
        if magnitudes.is_empty() {
            return 0;
        }
        let energy = magnitudes.iter().sum::<f32>() / magnitudes.len() as f32;
        let centroid = (spectral_centroid(magnitudes) / magnitudes.len() as f32).clamp(0.0, 1.0);
        let flux = features.spectral_flux.clamp(0.0, 1.0);
        let rolloff = features.spectral_rolloff.clamp(0.0, 1.0);
        let w = &self.emotional;
        to_score(
            100.0 * (w.energy * energy + w.centroid * centroid + w.flux * flux + w.rolloff * rolloff),
        )
    }

    /// Mean cosine similarity of successive fixed-size windows, negative
    /// correlation counted as zero, scaled to 0-100.
    fn rhythm_stability(&self, samples: &[f32]) -> f32 {
        let windows: Vec<&[f32]> = samples.chunks_exact(self.rhythm_window).collect();
        if windows.len() < 2 {
            return 0.0;
        }
        let total: f32 = windows
            .windows(2)
            .map(|pair| cosine_similarity(pair[0], pair[1]).max(0.0))
            .sum();
        (100.0 * total / (windows.len() - 1) as f32).clamp(0.0, 100.0)
    }

    /// Mean over full windows of the window's mean |amplitude|, scaled to 0-100.
    fn sustained_patterns(&self, samples: &[f32]) -> f32 {
        let means: Vec<f32> = samples
            .chunks_exact(self.sustain_window)
            .map(|w| w.iter().map(|s| s.abs()).sum::<f32>() / w.len() as f32)
            .collect();
        if means.is_empty() {
            return 0.0;
        }
        let mean = means.iter().sum::<f32>() / means.len() as f32;
        (100.0 * mean).clamp(0.0, 100.0)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum();
    let nb: f32 = b.iter().map(|x| x * x).sum();
    let denom = (na * nb).sqrt();
    if denom <= 0.0 {
        0.0
    } else {
        finite_or_zero(dot / denom)
    }
}

/// Population standard deviation of normalized bins; the largest possible
/// value for data in [0, 1] is 0.5, hence the 200x.
fn frequency_complexity(magnitudes: &[f32]) -> f32 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    let n = magnitudes.len() as f32;
    let mean = magnitudes.iter().sum::<f32>() / n;
    let variance = magnitudes.iter().map(|m| (m - mean).powi(2)).sum::<f32>() / n;
    (variance.sqrt() * 200.0).clamp(0.0, 100.0)
}

/// Strength of harmonics 2..=8 of the loudest bin in the lowest quarter.
fn harmonic_content(magnitudes: &[f32]) -> f32 {
    let quarter = magnitudes.len() / 4;
    if quarter == 0 {
        return 0.0;
    }
    let mut fundamental = 0usize;
    for (i, &m) in magnitudes[..quarter].iter().enumerate() {
        if m > magnitudes[fundamental] {
            fundamental = i;
        }
    }
    if fundamental == 0 {
        return 0.0;
    }
    let sum: f32 = (2..=8)
        .filter_map(|k| magnitudes.get(fundamental * k))
        .sum();
    (100.0 * sum / 7.0).clamp(0.0, 100.0)
}
