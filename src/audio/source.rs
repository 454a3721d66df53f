use std::io::BufRead;
use std::sync::Arc;

use super::decode::AudioData;
use super::frame::AudioFrame;
use super::spectrum::SpectrumAnalyser;
use crate::config::CaptureConfig;
use crate::error::InputError;

/// Supplier of capture ticks. `None` ends the session; an `Err` is a frame
/// that could not be read and is skipped.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Result<AudioFrame, InputError>>;

    /// Number of frames still to come, when known
    fn remaining(&self) -> Option<usize> {
        None
    }
}

/// Replays decoded audio as if it were captured live, one frame per tick.
pub struct DecodedFrameSource {
    audio: Arc<AudioData>,
    analyser: SpectrumAnalyser,
    interval_ms: u64,
    tick: u64,
}

impl DecodedFrameSource {
    pub fn new(audio: Arc<AudioData>, config: &CaptureConfig) -> Self {
        Self {
            audio,
            analyser: SpectrumAnalyser::new(config),
            interval_ms: config.interval_ms.max(1),
            tick: 0,
        }
    }

    fn sample_position(&self, tick: u64) -> usize {
        let ms = tick * self.interval_ms;
        (ms as u128 * self.audio.sample_rate as u128 / 1000) as usize
    }

    fn total_ticks(&self) -> u64 {
        let duration_ms =
            self.audio.samples.len() as u128 * 1000 / self.audio.sample_rate.max(1) as u128;
        duration_ms as u64 / self.interval_ms + 1
    }
}

impl FrameSource for DecodedFrameSource {
    fn next_frame(&mut self) -> Option<Result<AudioFrame, InputError>> {
        if self.tick >= self.total_ticks() {
            return None;
        }
        let end = self.sample_position(self.tick).min(self.audio.samples.len());
        let timestamp = self.tick * self.interval_ms;
        self.tick += 1;
        Some(Ok(self.analyser.frame(timestamp, &self.audio.samples[..end])))
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.total_ticks().saturating_sub(self.tick) as usize)
    }
}

/// Reads frames in their JSON wire form, one per line. Blank lines are skipped.
pub struct JsonFrameSource<R> {
    lines: std::io::Lines<R>,
}

impl<R: BufRead> JsonFrameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> FrameSource for JsonFrameSource<R> {
    fn next_frame(&mut self) -> Option<Result<AudioFrame, InputError>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(InputError::Malformed(e.to_string()))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(AudioFrame::from_json(&line));
        }
    }
}

/// In-memory source, mostly for tests and embedding
pub struct VecFrameSource {
    frames: std::vec::IntoIter<Result<AudioFrame, InputError>>,
}

impl VecFrameSource {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self::with_results(frames.into_iter().map(Ok).collect())
    }

    pub fn with_results(frames: Vec<Result<AudioFrame, InputError>>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Option<Result<AudioFrame, InputError>> {
        self.frames.next()
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decoded_source_ticks_at_interval() {
        let audio = Arc::new(AudioData {
            samples: vec![0.25; 44_100],
            sample_rate: 44_100,
        });
        let mut source = DecodedFrameSource::new(audio, &CaptureConfig::default());
        assert_eq!(source.remaining(), Some(11));

        let mut timestamps = Vec::new();
        while let Some(frame) = source.next_frame() {
            let frame = frame.unwrap();
            assert_eq!(frame.amplitude.len(), 2048);
            assert_eq!(frame.frequency.len(), 1024);
            timestamps.push(frame.timestamp);
        }
        assert_eq!(timestamps.len(), 11);
        assert_eq!(timestamps[1], 100);
        assert_eq!(*timestamps.last().unwrap(), 1000);
        assert_eq!(source.remaining(), Some(0));
    }

    #[test]
    fn json_source_surfaces_malformed_lines() {
        let input = concat!(
            r#"{"timestamp":1,"frequency":[-50.0],"amplitude":[0.0,0.1]}"#,
            "\n\n",
            "not json\n",
            r#"{"timestamp":2,"frequency":[-50.0],"amplitude":[0.0,0.1]}"#,
            "\n"
        );
        let mut source = JsonFrameSource::new(Cursor::new(input));
        assert_eq!(source.next_frame().unwrap().unwrap().timestamp, 1);
        assert!(matches!(source.next_frame(), Some(Err(InputError::Malformed(_)))));
        assert_eq!(source.next_frame().unwrap().unwrap().timestamp, 2);
        assert!(source.next_frame().is_none());
    }
}
