pub mod audio;
pub mod errors;
pub mod segmenter;

pub use audio::{AudioChunk, AudioFormat, AudioStream, SpeechBackend, SpeechRequest};
pub use errors::{Result, VoiceError};
pub use segmenter::{SegmenterConfig, SentenceSegmenter};
