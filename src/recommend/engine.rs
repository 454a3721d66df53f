use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use super::recent::RecentIds;
use super::tables::{genres_compatible, mood_accepts, normalize_genre, MoodLabel};
use super::track::TrackCandidate;
use crate::config::{HistoryConfig, RecommendConfig};
use crate::engagement::{EngagementMetrics, HistoryBuffer, TrendAnalyzer, TrendLabel, TrendReport};

/// How the next track should move the room
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Build,
    Drop,
    Blend,
}

impl TransitionType {
    pub fn from_trend(trend: &TrendReport) -> Self {
        if trend.momentum > 30.0 && trend.trend == TrendLabel::Rising {
            TransitionType::Build
        } else if trend.momentum < -20.0 || trend.trend == TrendLabel::Falling {
            TransitionType::Drop
        } else {
            TransitionType::Blend
        }
    }

    fn fit(&self, energy: f32) -> f32 {
        match self {
            TransitionType::Build => {
                if energy > 70.0 { 1.0 } else { 0.5 }
            }
            TransitionType::Drop => {
                if energy < 50.0 { 1.0 } else { 0.5 }
            }
            TransitionType::Blend => 0.8,
        }
    }
}

/// Weights of the final score.
///
/// `energy`..`transition` form a normalized weighted sum. The `*_multiplier`
/// fields and `novelty_penalty` scale that sum by `1 - strength * (1 - score)`,
/// so a strength of 0 disables the factor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default)]
    pub energy: f32,
    #[serde(default)]
    pub bpm: f32,
    #[serde(default)]
    pub genre: f32,
    #[serde(default)]
    pub mood: f32,
    #[serde(default)]
    pub transition: f32,
    #[serde(default)]
    pub mood_multiplier: f32,
    #[serde(default)]
    pub transition_multiplier: f32,
    #[serde(default = "default_novelty_penalty")]
    pub novelty_penalty: f32,
}

fn default_novelty_penalty() -> f32 {
    0.5
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Preset::Classic.weights()
    }
}

/// Named weight tables. The scoring domain has no single right constant set,
/// so the variants are kept side by side instead of picking one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// energy .4, bpm .3, genre .3
    #[default]
    Classic,
    /// classic, with mood and transition fit as secondary multipliers
    Layered,
    /// every component in one additive sum
    Flat,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Classic, Preset::Layered, Preset::Flat];

    pub fn weights(&self) -> ScoringWeights {
        let classic = ScoringWeights {
            energy: 0.4,
            bpm: 0.3,
            genre: 0.3,
            mood: 0.0,
            transition: 0.0,
            mood_multiplier: 0.0,
            transition_multiplier: 0.0,
            novelty_penalty: default_novelty_penalty(),
        };
        match self {
            Preset::Classic => classic,
            Preset::Layered => ScoringWeights {
                mood_multiplier: 0.3,
                transition_multiplier: 0.3,
                ..classic
            },
            Preset::Flat => ScoringWeights {
                energy: 0.25,
                bpm: 0.2,
                genre: 0.15,
                mood: 0.2,
                transition: 0.2,
                ..classic
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Classic => "classic",
            Preset::Layered => "layered",
            Preset::Flat => "flat",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown preset '{}', expected one of: {}",
                    s,
                    Preset::ALL.map(|p| p.name()).join(", ")
                )
            })
    }
}

/// Tempos a playing track can plausibly have
pub const TEMPO_RANGE: RangeInclusive<f32> = 40.0..=250.0;

/// Frame-level BPM as a stand-in for the playing track's tempo. Beat
/// markers inside one short frame often follow the waveform period, so
/// anything outside `TEMPO_RANGE` is reported as unknown (0).
pub fn tempo_hint(detected_bpm: u32) -> f32 {
    let bpm = detected_bpm as f32;
    if TEMPO_RANGE.contains(&bpm) {
        bpm
    } else {
        if detected_bpm > 0 {
            log::warn!(
                "Detected {} BPM is not a plausible track tempo, treating tempo as unknown",
                detected_bpm
            );
        }
        0.0
    }
}

/// Everything the engine knows about the room when asked for a ranking
#[derive(Clone, Debug)]
pub struct RecommendationContext<'a> {
    pub metrics: EngagementMetrics,
    pub history: &'a HistoryBuffer,
    /// Tempo of the playing track, 0 when unknown
    pub current_bpm: f32,
    /// Genre of the playing track
    pub current_genre: Option<String>,
    /// Replaces the engine's configured weights for this call
    pub weights: Option<ScoringWeights>,
}

impl<'a> RecommendationContext<'a> {
    pub fn new(metrics: EngagementMetrics, history: &'a HistoryBuffer) -> Self {
        Self {
            metrics,
            history,
            current_bpm: 0.0,
            current_genre: None,
            weights: None,
        }
    }

    pub fn with_bpm(mut self, bpm: f32) -> Self {
        self.current_bpm = bpm;
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.current_genre = Some(genre.into());
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = Some(weights);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub energy: f32,
    pub bpm: f32,
    pub genre: f32,
    pub mood: f32,
    pub novelty: f32,
    pub transition: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackScore {
    pub track_id: String,
    pub components: ComponentScores,
    /// 0.0-1.0
    pub final_score: f32,
    pub transition: TransitionType,
    pub mood: MoodLabel,
}

/// Per-call values shared by every candidate
struct Targets<'w> {
    energy: f32,
    bpm: f32,
    genre: Option<String>,
    mood: MoodLabel,
    transition: TransitionType,
    weights: &'w ScoringWeights,
}

pub struct RecommendationEngine {
    weights: ScoringWeights,
    bpm_tolerance: f32,
    bpm_falloff: f32,
    compatible_genre_score: f32,
    other_genre_score: f32,
    momentum_step: f32,
    top_k: usize,
    trend: TrendAnalyzer,
    recent: RecentIds,
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new(&RecommendConfig::default(), &HistoryConfig::default())
    }
}

impl RecommendationEngine {
    pub fn new(config: &RecommendConfig, history: &HistoryConfig) -> Self {
        Self {
            weights: config.scoring_weights(),
            bpm_tolerance: config.bpm_tolerance.max(0.0),
            bpm_falloff: config.bpm_falloff,
            compatible_genre_score: config.compatible_genre_score,
            other_genre_score: config.other_genre_score,
            momentum_step: config.momentum_step,
            top_k: config.top_k,
            trend: TrendAnalyzer::new(history),
            recent: RecentIds::new(config.recent_capacity),
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn recent_ids(&self) -> &RecentIds {
        &self.recent
    }

    /// Score and order every candidate, best first. Equal scores fall back to
    /// ascending id. Does not touch the recent set.
    pub fn rank(&self, candidates: &[TrackCandidate], ctx: &RecommendationContext<'_>) -> Vec<TrackScore> {
        let trend = self.trend.analyze(ctx.history);
        let weights = ctx.weights.as_ref().unwrap_or(&self.weights);
        let targets = Targets {
            energy: self.target_energy(&ctx.metrics, &trend),
            bpm: ctx.current_bpm,
            genre: ctx.current_genre.as_deref().map(normalize_genre),
            mood: MoodLabel::from_metrics(&ctx.metrics),
            transition: TransitionType::from_trend(&trend),
            weights,
        };

        log::debug!(
            "Ranking {} candidates: target energy {:.0}, bpm {:.1}, mood {}, transition {:?}",
            candidates.len(),
            targets.energy,
            targets.bpm,
            targets.mood,
            targets.transition
        );

        let mut scores: Vec<TrackScore> = candidates
            .par_iter()
            .map(|c| self.score_candidate(c, &targets))
            .collect();

        scores.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        scores
    }

    /// Rank, keep the best `top_k` (configured default when `None`) and
    /// remember them as recently recommended.
    pub fn recommend(
        &mut self,
        candidates: &[TrackCandidate],
        ctx: &RecommendationContext<'_>,
        top_k: Option<usize>,
    ) -> Vec<TrackScore> {
        let mut ranked = self.rank(candidates, ctx);
        ranked.truncate(top_k.unwrap_or(self.top_k));
        for score in &ranked {
            self.recent.insert(&score.track_id);
        }
        if let Some(best) = ranked.first() {
            log::info!(
                "Recommended {} tracks, best {} ({:.3})",
                ranked.len(),
                best.track_id,
                best.final_score
            );
        }
        ranked
    }

    fn target_energy(&self, metrics: &EngagementMetrics, trend: &TrendReport) -> f32 {
        let physical = metrics.physical as f32;
        let nudge = if trend.momentum > 0.0 {
            self.momentum_step
        } else if trend.momentum < 0.0 {
            -self.momentum_step
        } else {
            0.0
        };
        (physical + nudge).clamp(0.0, 100.0)
    }

    fn score_candidate(&self, track: &TrackCandidate, targets: &Targets<'_>) -> TrackScore {
        let energy_level = if track.energy.is_finite() {
            track.energy.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let genre = normalize_genre(&track.genre);

        let components = ComponentScores {
            energy: (1.0 - (energy_level - targets.energy).abs() / 100.0).clamp(0.0, 1.0),
            bpm: self.bpm_match(track.bpm, targets.bpm),
            genre: self.genre_match(&genre, targets.genre.as_deref()),
            mood: if mood_accepts(targets.mood, &genre) { 1.0 } else { 0.5 },
            novelty: if self.recent.contains(&track.id) { 0.0 } else { 1.0 },
            transition: targets.transition.fit(energy_level),
        };

        TrackScore {
            track_id: track.id.clone(),
            final_score: combine(&components, targets.weights),
            components,
            transition: targets.transition,
            mood: targets.mood,
        }
    }

    fn bpm_match(&self, candidate: f32, current: f32) -> f32 {
        if !(candidate > 0.0 && current > 0.0) {
            return 0.5;
        }
        let diff = (candidate - current).abs();
        if diff <= self.bpm_tolerance {
            1.0
        } else if self.bpm_falloff <= 0.0 {
            0.0
        } else {
            (1.0 - (diff - self.bpm_tolerance) / self.bpm_falloff).max(0.0)
        }
    }

    fn genre_match(&self, candidate: &str, current: Option<&str>) -> f32 {
        match current {
            Some(current) if current == candidate => 1.0,
            Some(current) if genres_compatible(current, candidate) => self.compatible_genre_score,
            _ => self.other_genre_score,
        }
    }
}

fn combine(c: &ComponentScores, w: &ScoringWeights) -> f32 {
    let total = w.energy + w.bpm + w.genre + w.mood + w.transition;
    let additive = if total > 0.0 {
        (w.energy * c.energy
            + w.bpm * c.bpm
            + w.genre * c.genre
            + w.mood * c.mood
            + w.transition * c.transition)
            / total
    } else {
        0.0
    };
    let factor = |strength: f32, score: f32| 1.0 - strength.clamp(0.0, 1.0) * (1.0 - score);
    let score = additive
        * factor(w.mood_multiplier, c.mood)
        * factor(w.transition_multiplier, c.transition)
        * factor(w.novelty_penalty, c.novelty);
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::HistoryEntry;

    fn history(values: &[u8]) -> HistoryBuffer {
        let mut h = HistoryBuffer::new(50);
        for (i, &v) in values.iter().enumerate() {
            h.push(HistoryEntry {
                timestamp: i as u64,
                metrics: EngagementMetrics::new(v, 50, 50, 50),
            });
        }
        h
    }

    fn ids(scores: &[TrackScore]) -> Vec<&str> {
        scores.iter().map(|s| s.track_id.as_str()).collect()
    }

    #[test]
    fn bpm_tolerance_and_falloff() {
        let engine = RecommendationEngine::default();
        assert_eq!(engine.bpm_match(128.0, 124.0), 1.0);
        assert_eq!(engine.bpm_match(132.0, 124.0), 1.0);
        assert!((engine.bpm_match(142.0, 124.0) - 0.5).abs() < 1e-6);
        assert_eq!(engine.bpm_match(170.0, 124.0), 0.0);
        assert_eq!(engine.bpm_match(128.0, 0.0), 0.5);
    }

    #[test]
    fn implausible_detected_tempo_is_unknown() {
        assert_eq!(tempo_hint(126), 126.0);
        assert_eq!(tempo_hint(40), 40.0);
        assert_eq!(tempo_hint(0), 0.0);
        // a 440 Hz tone read as beats
        assert_eq!(tempo_hint(26_400), 0.0);

        let engine = RecommendationEngine::default();
        assert_eq!(engine.bpm_match(124.0, tempo_hint(26_400)), 0.5);
    }

    #[test]
    fn genre_match_levels() {
        let engine = RecommendationEngine::default();
        assert_eq!(engine.genre_match("house", Some("house")), 1.0);
        assert_eq!(engine.genre_match("disco", Some("house")), 0.7);
        assert_eq!(engine.genre_match("dubstep", Some("house")), 0.4);
        assert_eq!(engine.genre_match("house", None), 0.4);
    }

    #[test]
    fn transition_follows_trend() {
        let rising = TrendAnalyzer::default().analyze(&history(&[40, 50, 60, 70, 80]));
        assert_eq!(TransitionType::from_trend(&rising), TransitionType::Build);
        let falling = TrendAnalyzer::default().analyze(&history(&[80, 70, 60, 50, 40]));
        assert_eq!(TransitionType::from_trend(&falling), TransitionType::Drop);
        let flat = TrendAnalyzer::default().analyze(&history(&[60; 5]));
        assert_eq!(TransitionType::from_trend(&flat), TransitionType::Blend);
    }

    #[test]
    fn energy_target_follows_momentum() {
        let engine = RecommendationEngine::default();
        let h = history(&[40, 50, 60, 70, 80]);
        let metrics = EngagementMetrics::new(80, 50, 50, 50);
        let ctx = RecommendationContext::new(metrics, &h).with_bpm(126.0);
        let candidates = vec![
            TrackCandidate::new("calm", 126.0, 40.0, "house"),
            TrackCandidate::new("peak", 126.0, 90.0, "house"),
        ];
        let ranked = engine.rank(&candidates, &ctx);
        assert_eq!(ids(&ranked), vec!["peak", "calm"]);
        assert_eq!(ranked[0].components.energy, 1.0);
        assert_eq!(ranked[0].transition, TransitionType::Build);
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let engine = RecommendationEngine::default();
        let h = history(&[60; 5]);
        let ctx = RecommendationContext::new(EngagementMetrics::new(60, 50, 50, 50), &h);
        let candidates = vec![
            TrackCandidate::new("c", 120.0, 60.0, "house"),
            TrackCandidate::new("a", 120.0, 60.0, "house"),
            TrackCandidate::new("b", 120.0, 60.0, "house"),
        ];
        assert_eq!(ids(&engine.rank(&candidates, &ctx)), vec!["a", "b", "c"]);
    }

    #[test]
    fn recommended_tracks_lose_novelty_until_evicted() {
        let config = RecommendConfig {
            recent_capacity: 2,
            ..RecommendConfig::default()
        };
        let mut engine = RecommendationEngine::new(&config, &HistoryConfig::default());
        let h = history(&[60; 5]);
        let ctx = RecommendationContext::new(EngagementMetrics::new(60, 50, 50, 50), &h);
        let track = |id: &str| TrackCandidate::new(id, 120.0, 60.0, "house");

        let first = engine.recommend(&[track("x")], &ctx, Some(1));
        assert_eq!(first[0].components.novelty, 1.0);
        let again = engine.rank(&[track("x")], &ctx);
        assert_eq!(again[0].components.novelty, 0.0);
        assert!(again[0].final_score < first[0].final_score);

        engine.recommend(&[track("y")], &ctx, Some(1));
        engine.recommend(&[track("z")], &ctx, Some(1));
        assert!(!engine.recent_ids().contains("x"));
        assert_eq!(engine.rank(&[track("x")], &ctx)[0].components.novelty, 1.0);
    }

    #[test]
    fn presets_parse_and_differ() {
        assert_eq!("Layered".parse::<Preset>().unwrap(), Preset::Layered);
        assert!("loud".parse::<Preset>().is_err());
        assert_ne!(Preset::Classic.weights(), Preset::Layered.weights());
        assert_eq!(ScoringWeights::default(), Preset::Classic.weights());
    }

    #[test]
    fn layered_preset_penalises_mood_mismatch() {
        let engine = RecommendationEngine::default();
        let h = history(&[60; 5]);
        // groovy room: house fits the mood, ambient does not
        let ctx = RecommendationContext::new(EngagementMetrics::new(60, 50, 50, 50), &h)
            .with_weights(Preset::Layered.weights());
        let ranked = engine.rank(
            &[
                TrackCandidate::new("amb", 120.0, 60.0, "ambient"),
                TrackCandidate::new("hou", 120.0, 60.0, "house"),
            ],
            &ctx,
        );
        assert_eq!(ids(&ranked), vec!["hou", "amb"]);
        assert!(ranked[0].final_score > ranked[1].final_score);
    }

    #[test]
    fn final_score_is_bounded() {
        let c = ComponentScores {
            energy: 1.0,
            bpm: 1.0,
            genre: 1.0,
            mood: 1.0,
            novelty: 1.0,
            transition: 1.0,
        };
        for preset in Preset::ALL {
            let s = combine(&c, &preset.weights());
            assert!((s - 1.0).abs() < 1e-5, "{} -> {}", preset, s);
        }
        let zero = ScoringWeights {
            energy: 0.0,
            bpm: 0.0,
            genre: 0.0,
            ..ScoringWeights::default()
        };
        assert_eq!(combine(&c, &zero), 0.0);
    }
}
