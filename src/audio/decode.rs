use std::path::{Path, PathBuf};
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::cache::AudioBufferCache;
use crate::error::DecodeError;

/// Decoded mono PCM
#[derive(Clone, Debug, PartialEq)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Average interleaved `channels`-wide frames into mono samples.
/// A trailing partial frame is averaged over the channels it has.
pub fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.reserve(interleaved.len() / channels + 1);
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

/// The first playable track of a file with its decoder attached
struct PcmStream {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
}

impl PcmStream {
    fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = std::fs::File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        let reader = symphonia::default::get_probe()
            .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|source| DecodeError::Probe {
                path: path.to_path_buf(),
                source,
            })?
            .format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::NoAudioTrack(path.to_path_buf()))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::UnknownSampleRate(path.to_path_buf()))?;
        let channels = track.codec_params.channels.map_or(1, |c| c.count());
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        log::debug!(
            "{}: track {}, {} channel(s) at {} Hz",
            path.display(),
            track_id,
            channels,
            sample_rate
        );
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            decoder,
            track_id,
            channels,
            sample_rate,
        })
    }

    /// Append the next packet's audio to `mono`. `false` once the stream ends.
    fn pull_into(&mut self, mono: &mut Vec<f32>) -> Result<bool, DecodeError> {
        let packet = match self.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != self.track_id {
            return Ok(true);
        }

        let block = match self.decoder.decode(&packet) {
            Ok(block) => block,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Dropping corrupt packet in {}: {}", self.path.display(), msg);
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };

        let mut buffer = SampleBuffer::<f32>::new(block.frames() as u64, *block.spec());
        buffer.copy_interleaved_ref(block);
        downmix_into(buffer.samples(), self.channels, mono);
        Ok(true)
    }
}

/// Decode the first audio track of `path` into mono PCM.
pub fn decode_audio(path: &Path) -> Result<AudioData, DecodeError> {
    let mut stream = PcmStream::open(path)?;
    let mut samples = Vec::new();
    while stream.pull_into(&mut samples)? {}

    if samples.is_empty() {
        return Err(DecodeError::Empty(path.to_path_buf()));
    }
    Ok(AudioData {
        samples,
        sample_rate: stream.sample_rate,
    })
}

/// Decoded audio for `path` through `cache`, keyed by the canonical path so
/// different spellings of one file share an entry.
pub fn load_cached(cache: &AudioBufferCache, path: &Path) -> Result<Arc<AudioData>, DecodeError> {
    let key = std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned();
    cache.get_or_decode(&key, || decode_audio(path))
}
