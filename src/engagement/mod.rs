//! Crowd-engagement scoring and its rolling history.

pub mod history;
pub mod scorer;
pub mod trend;

pub use history::{HistoryBuffer, HistoryEntry};
pub use scorer::{EmotionalWeights, EngagementMetrics, EngagementScorer, MetricWeights};
pub use trend::{TrendAnalyzer, TrendLabel, TrendReport};
