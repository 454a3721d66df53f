use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::features::{spectral_centroid, spectral_flux, spectral_rolloff};
use super::frame::{AudioFrame, DoubleBuffer};
use crate::config::{AnalysisConfig, CaptureConfig};

/// dB reported for a bin with no energy, kept finite so frames validate
pub const FLOOR_DB: f32 = -160.0;

/// Map a dB value onto [0, 1] across the analyser's dB window.
#[inline]
pub fn normalize_db(db: f32, min_db: f32, max_db: f32) -> f32 {
    let range = max_db - min_db;
    if range <= 0.0 || !db.is_finite() {
        return 0.0;
    }
    ((db - min_db) / range).clamp(0.0, 1.0)
}

/// Windowed FFT producing one dB spectrum per call, smoothed over time like a
/// live analyser node. Previous and current magnitudes live in a two-slot
/// arena so no allocation happens per frame.
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    hann: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    magnitudes: DoubleBuffer<Vec<f32>>,
    smoothing: f32,
}

impl SpectrumAnalyser {
    pub fn new(config: &CaptureConfig) -> Self {
        let fft_size = config.fft_size.max(2);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            hann: hann_window(fft_size),
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            magnitudes: DoubleBuffer::new(vec![0.0; fft_size / 2]),
            smoothing: config.smoothing.clamp(0.0, 1.0),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Analyse the most recent `fft_size` samples (zero-padded when short)
    /// and return `fft_size / 2` dB bins.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let n = self.fft_size;
        let start = samples.len().saturating_sub(n);
        let window = &samples[start..];
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let s = window.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * self.hann[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.smoothing;
        let scale = 1.0 / n as f32;
        let (previous, current) = self.magnitudes.split();
        for (j, mag) in current.iter_mut().enumerate() {
            let raw = self.scratch[j].norm() * scale;
            *mag = tau * previous[j] + (1.0 - tau) * raw;
        }
        self.magnitudes.swap();

        self.magnitudes
            .front()
            .iter()
            .map(|&m| {
                if m > 0.0 {
                    (20.0 * m.log10()).max(FLOOR_DB)
                } else {
                    FLOOR_DB
                }
            })
            .collect()
    }

    /// Build a frame from the trailing `fft_size` samples of `samples`.
    pub fn frame(&mut self, timestamp: u64, samples: &[f32]) -> AudioFrame {
        let frequency = self.process(samples);
        let start = samples.len().saturating_sub(self.fft_size);
        let mut amplitude: Vec<f32> = samples[start..].iter().map(|s| s.clamp(-1.0, 1.0)).collect();
        amplitude.resize(self.fft_size, 0.0);
        AudioFrame::new(timestamp, frequency, amplitude)
    }
}

/// Spectrum-only view of a frame, answered by `ANALYZE_SPECTRUM` requests
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSummary {
    pub spectral_centroid: f32,
    pub spectral_flux: f32,
    pub spectral_rolloff: f32,
    /// Band levels, normalized (0.0-1.0)
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
}

pub fn summarize_spectrum(frame: &AudioFrame, sample_rate: u32, config: &AnalysisConfig) -> SpectrumSummary {
    let bins = &frame.frequency;
    let half = bins.len();
    let normalized: Vec<f32> = bins
        .iter()
        .map(|&db| normalize_db(db, config.min_db, config.max_db))
        .collect();

    // bins span 0..nyquist
    let freq_resolution = if half == 0 {
        0.0
    } else {
        sample_rate as f32 / (2 * half) as f32
    };

    let band_energy = |low_hz: f32, high_hz: f32| -> f32 {
        if freq_resolution <= 0.0 {
            return 0.0;
        }
        let low_bin = (low_hz / freq_resolution) as usize;
        let high_bin = ((high_hz / freq_resolution) as usize).min(half);
        if low_bin >= high_bin {
            return 0.0;
        }
        let sum: f32 = normalized[low_bin..high_bin].iter().map(|&x| x * x).sum();
        (sum / (high_bin - low_bin) as f32).sqrt()
    };

    SpectrumSummary {
        spectral_centroid: spectral_centroid(bins),
        spectral_flux: spectral_flux(bins),
        spectral_rolloff: spectral_rolloff(bins, config.rolloff_fraction),
        bass: band_energy(20.0, 250.0),
        mid: band_energy(250.0, 4000.0),
        high: band_energy(4000.0, 20000.0),
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
