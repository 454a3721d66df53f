use serde::{Deserialize, Serialize};

/// Beat markers found in one amplitude batch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatState {
    /// Beats per minute, 0 when fewer than two markers were found
    pub bpm: u32,
    /// Sample indices of detected beats, ascending
    pub beat_markers: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct BeatDetector {
    sample_rate: u32,
    threshold: f32,
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(44_100, 0.15)
    }
}

impl BeatDetector {
    pub fn new(sample_rate: u32, threshold: f32) -> Self {
        Self {
            sample_rate,
            threshold,
        }
    }

    pub fn detect(&self, amplitude: &[f32]) -> BeatState {
        let beat_markers = self.markers(amplitude);
        let bpm = bpm_from_markers(&beat_markers, self.sample_rate);
        BeatState { bpm, beat_markers }
    }

    /// Strict local maxima above the threshold. The first and last samples
    /// have only one neighbour and are never markers.
    fn markers(&self, amplitude: &[f32]) -> Vec<usize> {
        if amplitude.len() < 3 {
            return Vec::new();
        }
        (1..amplitude.len() - 1)
            .filter(|&i| {
                let v = amplitude[i];
                v > self.threshold && v > amplitude[i - 1] && v > amplitude[i + 1]
            })
            .collect()
    }
}

fn bpm_from_markers(markers: &[usize], sample_rate: u32) -> u32 {
    if markers.len() < 2 || sample_rate == 0 {
        return 0;
    }
    // markers are ascending, so the mean interval telescopes to span / count
    let span = (markers[markers.len() - 1] - markers[0]) as f64;
    let mean_interval = span / (markers.len() - 1) as f64;
    if mean_interval <= 0.0 {
        return 0;
    }
    (60.0 / (mean_interval / sample_rate as f64)).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulses(len: usize, every: usize, height: f32) -> Vec<f32> {
        let mut samples = vec![0.0f32; len];
        let mut i = every / 2;
        while i < len {
            samples[i] = height;
            i += every;
        }
        samples
    }

    #[test]
    fn injected_peaks_give_expected_tempo() {
        for k in [22_050usize, 20_000, 17_640, 30_000] {
            let samples = pulses(k * 8, k, 0.9);
            let state = BeatDetector::default().detect(&samples);
            let expected = 60.0 * 44_100.0 / k as f64;
            assert!(
                (state.bpm as f64 - expected).abs() <= 1.0,
                "k={} bpm={} expected={}",
                k,
                state.bpm,
                expected
            );
            assert_eq!(state.beat_markers.len(), 8);
        }
    }

    #[test]
    fn quiet_peaks_are_ignored() {
        let samples = pulses(10_000, 1_000, 0.1);
        let state = BeatDetector::default().detect(&samples);
        assert!(state.beat_markers.is_empty());
        assert_eq!(state.bpm, 0);
    }

    #[test]
    fn plateau_is_not_a_strict_maximum() {
        let samples = [0.0, 0.5, 0.5, 0.0, 0.9, 0.0];
        let state = BeatDetector::default().detect(&samples);
        assert_eq!(state.beat_markers, vec![4]);
        assert_eq!(state.bpm, 0);
    }

    #[test]
    fn short_input_has_no_beats() {
        let detector = BeatDetector::default();
        assert_eq!(detector.detect(&[]), BeatState::default());
        assert_eq!(detector.detect(&[1.0, 0.0]), BeatState::default());
    }
}
