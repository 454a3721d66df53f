use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engagement::EngagementMetrics;

/// Genres that mix well after the key genre. Lookups are lowercase.
const GENRE_COMPATIBILITY: &[(&str, &[&str])] = &[
    ("house", &["deep house", "tech house", "disco", "progressive house", "techno"]),
    ("deep house", &["house", "tech house", "downtempo", "progressive house"]),
    ("tech house", &["house", "techno", "deep house", "minimal"]),
    ("techno", &["tech house", "minimal", "industrial", "trance"]),
    ("minimal", &["techno", "tech house", "deep house"]),
    ("trance", &["progressive house", "techno", "edm", "psytrance"]),
    ("psytrance", &["trance", "techno"]),
    ("progressive house", &["house", "trance", "deep house", "edm"]),
    ("edm", &["progressive house", "trance", "dubstep", "pop"]),
    ("drum and bass", &["jungle", "breakbeat", "dubstep"]),
    ("jungle", &["drum and bass", "breakbeat"]),
    ("breakbeat", &["drum and bass", "hip hop", "jungle"]),
    ("dubstep", &["drum and bass", "edm", "trap"]),
    ("trap", &["hip hop", "dubstep"]),
    ("hip hop", &["r&b", "trap", "funk", "breakbeat"]),
    ("r&b", &["hip hop", "soul", "pop"]),
    ("pop", &["edm", "disco", "r&b"]),
    ("disco", &["funk", "house", "pop", "soul"]),
    ("funk", &["disco", "soul", "hip hop"]),
    ("soul", &["funk", "r&b", "disco"]),
    ("downtempo", &["ambient", "deep house", "chillout"]),
    ("ambient", &["downtempo", "chillout"]),
    ("chillout", &["ambient", "downtempo"]),
];

/// Coarse read of the room derived from the current metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodLabel {
    Driving,
    Euphoric,
    Uplifting,
    Deep,
    Groovy,
    Chill,
}

impl MoodLabel {
    /// First matching rule wins.
    pub fn from_metrics(m: &EngagementMetrics) -> Self {
        if m.physical > 75 && m.mental > 60 {
            MoodLabel::Driving
        } else if m.physical > 75 {
            MoodLabel::Euphoric
        } else if m.emotional > 65 {
            MoodLabel::Uplifting
        } else if m.mental > 60 {
            MoodLabel::Deep
        } else if m.physical < 40 {
            MoodLabel::Chill
        } else {
            MoodLabel::Groovy
        }
    }

    pub fn genres(&self) -> &'static [&'static str] {
        match self {
            MoodLabel::Driving => &["techno", "tech house", "drum and bass", "psytrance", "minimal"],
            MoodLabel::Euphoric => &["trance", "edm", "progressive house", "house", "pop"],
            MoodLabel::Uplifting => &["house", "disco", "progressive house", "pop", "soul"],
            MoodLabel::Deep => &["deep house", "minimal", "techno", "downtempo"],
            MoodLabel::Groovy => &["house", "funk", "disco", "tech house", "hip hop"],
            MoodLabel::Chill => &["ambient", "downtempo", "chillout", "deep house", "r&b"],
        }
    }
}

impl fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MoodLabel::Driving => "driving",
            MoodLabel::Euphoric => "euphoric",
            MoodLabel::Uplifting => "uplifting",
            MoodLabel::Deep => "deep",
            MoodLabel::Groovy => "groovy",
            MoodLabel::Chill => "chill",
        };
        f.write_str(s)
    }
}

pub fn normalize_genre(genre: &str) -> String {
    genre.trim().to_lowercase()
}

/// Whether `candidate` is listed as a good follow-up to `current`.
/// Both arguments are expected in `normalize_genre` form.
pub fn genres_compatible(current: &str, candidate: &str) -> bool {
    GENRE_COMPATIBILITY
        .iter()
        .find(|(key, _)| *key == current)
        .map_or(false, |(_, compatible)| compatible.contains(&candidate))
}

pub fn mood_accepts(mood: MoodLabel, genre: &str) -> bool {
    mood.genres().contains(&genre)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_rules_in_order() {
        assert_eq!(
            MoodLabel::from_metrics(&EngagementMetrics::new(80, 10, 70, 10)),
            MoodLabel::Driving
        );
        assert_eq!(
            MoodLabel::from_metrics(&EngagementMetrics::new(80, 90, 10, 10)),
            MoodLabel::Euphoric
        );
        assert_eq!(
            MoodLabel::from_metrics(&EngagementMetrics::new(50, 70, 70, 10)),
            MoodLabel::Uplifting
        );
        assert_eq!(
            MoodLabel::from_metrics(&EngagementMetrics::new(50, 20, 70, 10)),
            MoodLabel::Deep
        );
        assert_eq!(
            MoodLabel::from_metrics(&EngagementMetrics::new(20, 20, 20, 10)),
            MoodLabel::Chill
        );
        assert_eq!(
            MoodLabel::from_metrics(&EngagementMetrics::new(50, 50, 50, 50)),
            MoodLabel::Groovy
        );
    }

    #[test]
    fn compatibility_is_directional_lookup() {
        assert!(genres_compatible("house", "disco"));
        assert!(!genres_compatible("house", "dubstep"));
        assert!(!genres_compatible("polka", "house"));
        assert_eq!(normalize_genre("  Deep House "), "deep house");
    }

    #[test]
    fn every_compatible_genre_is_known() {
        // a typo in the table would silently never match
        let known: Vec<&str> = GENRE_COMPATIBILITY.iter().map(|(k, _)| *k).collect();
        for (_, compatible) in GENRE_COMPATIBILITY {
            for genre in compatible.iter() {
                assert!(
                    known.contains(genre) || *genre == "industrial",
                    "unknown genre {}",
                    genre
                );
            }
        }
    }
}
