use serde::{Deserialize, Serialize};
use std::fmt;

use super::history::HistoryBuffer;
use crate::config::HistoryConfig;

/// Change in the physical metric across the trend window below which the
/// crowd counts as stable
const STABLE_BAND: f32 = 5.0;
const MOMENTUM_SCALE: f32 = 10.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendLabel {
    Rising,
    Falling,
    #[default]
    Stable,
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendLabel::Rising => "rising",
            TrendLabel::Falling => "falling",
            TrendLabel::Stable => "stable",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    /// Net physical change over the window, scaled and clamped to [-100, 100]
    pub momentum: f32,
    pub trend: TrendLabel,
    /// History indices of strict local maxima of the physical metric
    pub peaks: Vec<usize>,
    /// 0-100, lower when the recent window is noisy
    pub confidence: f32,
    /// Projected physical values for the next ticks, each 0-100
    pub forecast: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct TrendAnalyzer {
    window: usize,
    horizon: usize,
    jitter: f32,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}

impl TrendAnalyzer {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            window: config.trend_window.max(2),
            horizon: config.forecast_horizon,
            jitter: config.forecast_jitter.max(0.0),
        }
    }

    pub fn analyze(&self, history: &HistoryBuffer) -> TrendReport {
        let series: Vec<f32> = history
            .contents()
            .map(|e| e.metrics.physical as f32)
            .collect();
        let recent = &series[series.len().saturating_sub(self.window)..];

        let (first, last) = match (recent.first(), recent.last()) {
            (Some(&f), Some(&l)) => (f, l),
            _ => return TrendReport::default(),
        };

        // successive deltas telescope to last - first
        let net: f32 = recent.windows(2).map(|w| w[1] - w[0]).sum();
        let momentum = (net * MOMENTUM_SCALE).clamp(-100.0, 100.0);

        let change = last - first;
        let trend = if change.abs() < STABLE_BAND {
            TrendLabel::Stable
        } else if change > 0.0 {
            TrendLabel::Rising
        } else {
            TrendLabel::Falling
        };

        TrendReport {
            momentum,
            trend,
            peaks: peaks(&series),
            confidence: confidence(recent),
            forecast: self.forecast(recent),
        }
    }

    /// Least-squares line through the window, projected `horizon` steps and
    /// clamped to the metric range. Jitter, when configured, is a fixed
    /// function of the step so repeated calls agree.
    fn forecast(&self, recent: &[f32]) -> Vec<f32> {
        let n = recent.len() as f32;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = recent.iter().sum::<f32>() / n;
        let (mut sxy, mut sxx) = (0.0f32, 0.0f32);
        for (i, &y) in recent.iter().enumerate() {
            let dx = i as f32 - mean_x;
            sxy += dx * (y - mean_y);
            sxx += dx * dx;
        }
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };

        (1..=self.horizon)
            .map(|step| {
                let x = n - 1.0 + step as f32;
                let mut y = mean_y + slope * (x - mean_x);
                if self.jitter > 0.0 {
                    y += self.jitter * (step as f32 * 2.399_963).sin();
                }
                y.clamp(0.0, 100.0)
            })
            .collect()
    }
}

fn peaks(series: &[f32]) -> Vec<usize> {
    if series.len() < 3 {
        return Vec::new();
    }
    (1..series.len() - 1)
        .filter(|&i| series[i] > series[i - 1] && series[i] > series[i + 1])
        .collect()
}

fn confidence(recent: &[f32]) -> f32 {
    let n = recent.len() as f32;
    let mean = recent.iter().sum::<f32>() / n;
    let variance = recent.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (100.0 - variance.sqrt()).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::history::HistoryEntry;
    use crate::engagement::scorer::EngagementMetrics;

    fn history(values: &[u8]) -> HistoryBuffer {
        let mut h = HistoryBuffer::new(50);
        for (i, &v) in values.iter().enumerate() {
            h.push(HistoryEntry {
                timestamp: i as u64 * 100,
                metrics: EngagementMetrics::new(v, 50, 50, 50),
            });
        }
        h
    }

    #[test]
    fn rising_crowd() {
        let report = TrendAnalyzer::default().analyze(&history(&[40, 50, 60, 70, 80]));
        assert_eq!(report.trend, TrendLabel::Rising);
        assert!(report.momentum > 0.0);
        assert_eq!(report.momentum, 100.0);
        assert_eq!(report.forecast, vec![90.0, 100.0, 100.0]);
    }

    #[test]
    fn flat_crowd() {
        let report = TrendAnalyzer::default().analyze(&history(&[60; 8]));
        assert_eq!(report.trend, TrendLabel::Stable);
        assert!(report.momentum.abs() < f32::EPSILON);
        assert_eq!(report.confidence, 100.0);
        assert!(report.peaks.is_empty());
        assert_eq!(report.forecast, vec![60.0; 3]);
    }

    #[test]
    fn falling_crowd_within_window() {
        // only the last five entries count
        let report = TrendAnalyzer::default().analyze(&history(&[10, 90, 88, 86, 84, 80]));
        assert_eq!(report.trend, TrendLabel::Falling);
        assert_eq!(report.momentum, -100.0);
    }

    #[test]
    fn small_moves_are_stable() {
        let report = TrendAnalyzer::default().analyze(&history(&[50, 51, 52, 53, 54]));
        assert_eq!(report.trend, TrendLabel::Stable);
        assert_eq!(report.momentum, 40.0);
    }

    #[test]
    fn finds_strict_peaks() {
        let report = TrendAnalyzer::default().analyze(&history(&[10, 30, 20, 20, 40, 40, 10]));
        assert_eq!(report.peaks, vec![1]);
    }

    #[test]
    fn noisy_window_lowers_confidence() {
        let report = TrendAnalyzer::default().analyze(&history(&[0, 100, 0, 100, 0]));
        assert!(report.confidence < 60.0);
        assert!(report.confidence >= 0.0);
    }

    #[test]
    fn empty_history_is_neutral() {
        let report = TrendAnalyzer::default().analyze(&HistoryBuffer::new(5));
        assert_eq!(report, TrendReport::default());
        assert_eq!(report.confidence, 0.0);
    }

    #[test]
    fn jitter_is_deterministic() {
        let analyzer = TrendAnalyzer::new(&HistoryConfig {
            forecast_jitter: 2.0,
            ..HistoryConfig::default()
        });
        let h = history(&[50; 5]);
        let a = analyzer.analyze(&h).forecast;
        let b = analyzer.analyze(&h).forecast;
        assert_eq!(a, b);
        assert!(a.iter().any(|&v| v != 50.0));
        assert!(a.iter().all(|&v| (v - 50.0).abs() <= 2.0));
    }
}
