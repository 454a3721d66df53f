//! Next-track ranking against the current crowd state.

pub mod engine;
pub mod recent;
pub mod tables;
pub mod track;

pub use engine::{
    tempo_hint, ComponentScores, Preset, RecommendationContext, RecommendationEngine, ScoringWeights,
    TrackScore, TransitionType, TEMPO_RANGE,
};
pub use recent::RecentIds;
pub use tables::MoodLabel;
pub use track::{load_catalog, parse_catalog, TrackCandidate};
