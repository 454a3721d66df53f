mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use cli::Cli;
use crowdpulse::audio::{load_cached, AudioBufferCache, DecodedFrameSource, FrameSource, JsonFrameSource};
use crowdpulse::config::{self, Config};
use crowdpulse::recommend::{
    load_catalog, tempo_hint, Preset, RecommendationContext, RecommendationEngine, TrackScore,
};
use crowdpulse::{CaptureSession, SessionSnapshot, TickOutcome};

#[derive(Serialize)]
struct Report<'a> {
    session: &'a SessionSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recommendations: Vec<TrackScore>,
}

fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("crowdpulse.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("crowdpulse").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("crowdpulse").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    if cli.list_presets {
        println!("Available presets:");
        for preset in Preset::ALL {
            let w = preset.weights();
            println!(
                "  {:<10} energy {:.2}  bpm {:.2}  genre {:.2}  mood {:.2}  transition {:.2}  (mood x{:.2}, transition x{:.2}, novelty x{:.2})",
                preset.name(),
                w.energy,
                w.bpm,
                w.genre,
                w.mood,
                w.transition,
                w.mood_multiplier,
                w.transition_multiplier,
                w.novelty_penalty
            );
        }
        return Ok(());
    }

    let preset_on_cli = cli.preset != Preset::Classic;
    let mut config = Config::default();
    if let Some(ref path) = find_config(cli.config.clone()) {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.interval_ms == 100 { cli.interval_ms = cfg.capture.interval_ms; }
            if cli.workers == 0 { cli.workers = cfg.workers.count; }
            if cli.top_k == 5 { cli.top_k = cfg.recommend.top_k; }
            if cli.preset == Preset::Classic { cli.preset = cfg.recommend.preset; }
            config = cfg;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    config.capture.interval_ms = cli.interval_ms;
    config.workers.count = cli.workers;
    config.recommend.top_k = cli.top_k;
    if preset_on_cli {
        config.recommend.override_preset(cli.preset);
    } else {
        config.recommend.preset = cli.preset;
    }

    let mut source: Box<dyn FrameSource> = if let Some(ref frames) = cli.frames {
        log::info!("Reading frames from {}", frames.display());
        let file = File::open(frames)
            .with_context(|| format!("Cannot open frame file {}", frames.display()))?;
        Box::new(JsonFrameSource::new(BufReader::new(file)))
    } else {
        let input = cli.input.as_ref().context("Input audio file or --frames is required")?;
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        log::info!("Decoding {}", input.display());
        let cache = AudioBufferCache::new(&config.cache);
        let audio = load_cached(&cache, input)
            .with_context(|| format!("Cannot decode {}", input.display()))?;
        log::info!(
            "Decoded {:.1}s at {} Hz",
            audio.duration_secs(),
            audio.sample_rate
        );
        config.capture.sample_rate = audio.sample_rate;
        Box::new(DecodedFrameSource::new(audio, &config.capture))
    };

    let mut session = CaptureSession::from_config(&config).context("Cannot start analysis workers")?;
    log::info!(
        "Capture: {} ms ticks, FFT {}, {} workers, preset {}",
        config.capture.interval_ms,
        config.capture.fft_size,
        config.workers.count,
        config.recommend.preset
    );

    let mut ticks_out = match cli.output {
        Some(ref path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        )),
        None => None,
    };

    let pb = match source.remaining() {
        Some(n) => {
            let pb = ProgressBar::new(n as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ticks ({eta} remaining)")?
                    .progress_chars("=>-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut write_error: Option<std::io::Error> = None;
    let snapshot = session.run(source.as_mut(), cli.realtime, |outcome| {
        pb.inc(1);
        if let (TickOutcome::Applied(record), Some(out)) = (outcome, ticks_out.as_mut()) {
            if write_error.is_some() {
                return;
            }
            let line = serde_json::to_string(record).map_err(std::io::Error::from);
            if let Err(e) = line.and_then(|l| writeln!(out, "{}", l)) {
                write_error = Some(e);
            }
        }
    });
    pb.finish_with_message("Capture complete");

    if let Some(e) = write_error {
        return Err(e).context("Failed to write tick output");
    }
    if let Some(mut out) = ticks_out {
        out.flush().context("Failed to write tick output")?;
    }

    log::info!(
        "Applied {} frames ({} skipped, {} stale, {} inline fallbacks)",
        snapshot.counters.applied,
        snapshot.counters.skipped,
        snapshot.counters.stale,
        snapshot.counters.fallbacks
    );

    let recommendations = match cli.catalog {
        Some(ref path) => {
            let tracks = load_catalog(path)?;
            let mut engine = RecommendationEngine::new(&config.recommend, &config.history);
            let metrics = snapshot.metrics.unwrap_or_default();
            let bpm = cli.bpm.unwrap_or_else(|| tempo_hint(snapshot.beat.bpm));
            let mut ctx = RecommendationContext::new(metrics, session.history()).with_bpm(bpm);
            if let Some(ref genre) = cli.genre {
                ctx = ctx.with_genre(genre.as_str());
            }
            engine.recommend(&tracks, &ctx, Some(cli.top_k))
        }
        None => Vec::new(),
    };

    let report = Report {
        session: &snapshot,
        recommendations,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
