use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CatalogError;

/// A track offered by the catalog. Read-only to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackCandidate {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub bpm: f32,
    /// Energy level, 0-100
    pub energy: f32,
    pub genre: String,
    #[serde(default)]
    pub mood_tags: Vec<String>,
    /// Opaque handle for previews (URL, file path, ...)
    #[serde(default)]
    pub preview_ref: Option<String>,
}

impl TrackCandidate {
    pub fn new(id: impl Into<String>, bpm: f32, energy: f32, genre: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            artist: String::new(),
            bpm,
            energy,
            genre: genre.into(),
            mood_tags: Vec::new(),
            preview_ref: None,
        }
    }
}

/// Parse a JSON array of tracks.
pub fn parse_catalog(content: &str, path: &Path) -> Result<Vec<TrackCandidate>, CatalogError> {
    serde_json::from_str(content).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_catalog(path: &Path) -> Result<Vec<TrackCandidate>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let tracks = parse_catalog(&content, path)?;
    log::info!("Loaded {} candidate tracks from {}", tracks.len(), path.display());
    Ok(tracks)
}
