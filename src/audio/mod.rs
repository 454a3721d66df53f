//! Signal side of the pipeline: frames, per-frame features, beats, spectra,
//! capture sources, decoding and the decoded-buffer cache.

pub mod beat;
pub mod cache;
pub mod decode;
pub mod features;
pub mod frame;
pub mod source;
pub mod spectrum;

pub use beat::{BeatDetector, BeatState};
pub use cache::AudioBufferCache;
pub use decode::{decode_audio, downmix_into, load_cached, AudioData};
pub use features::{FeatureExtractor, Features};
pub use frame::{AudioFrame, DoubleBuffer, FrameShape};
pub use source::{DecodedFrameSource, FrameSource, JsonFrameSource, VecFrameSource};
pub use spectrum::{summarize_spectrum, SpectrumAnalyser, SpectrumSummary};
