use clap::Parser;
use std::path::PathBuf;

use crowdpulse::recommend::Preset;

#[derive(Parser, Debug)]
#[command(name = "crowdpulse", about = "Live crowd-engagement scoring and next-track recommendation")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG), replayed as a live capture
    pub input: Option<PathBuf>,

    /// Read capture frames from a JSON-lines file instead of decoding audio
    #[arg(long, conflicts_with = "input")]
    pub frames: Option<PathBuf>,

    /// Candidate tracks (JSON array)
    #[arg(short, long)]
    pub catalog: Option<PathBuf>,

    /// Genre of the track currently playing
    #[arg(short, long)]
    pub genre: Option<String>,

    /// Tempo of the track currently playing; defaults to the detected BPM
    #[arg(long)]
    pub bpm: Option<f32>,

    /// Number of recommendations to print
    #[arg(short = 'k', long, default_value_t = 5)]
    pub top_k: usize,

    /// Background analysis threads (0 = analyse on the capture thread)
    #[arg(short, long, default_value_t = 0)]
    pub workers: usize,

    /// Capture tick in milliseconds
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,

    /// Scoring preset (classic, layered, flat)
    #[arg(short, long, default_value_t = Preset::Classic)]
    pub preset: Preset,

    /// Config file path (default: ./crowdpulse.toml or ~/.config/crowdpulse/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write one JSON line per applied tick to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pace ticks at the capture interval instead of running flat out
    #[arg(long)]
    pub realtime: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// List scoring presets and exit
    #[arg(long)]
    pub list_presets: bool,
}
