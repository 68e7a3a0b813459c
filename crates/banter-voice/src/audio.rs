use crate::errors::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Encoding of the samples carried in an [`AudioChunk`]. The core never
/// inspects the payload; the tag travels with each chunk so a transport
/// layer can decode without out-of-band negotiation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    PcmI16,
    Wav,
    Opus,
}

impl AudioFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PcmI16 => "pcm_i16",
            Self::Wav => "wav",
            Self::Opus => "opus",
        }
    }
}

/// One unit of synthesized audio as produced by a [`SpeechBackend`].
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub payload: Vec<u8>,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
}

/// Lazy, finite, non-restartable sequence of audio chunks for one segment.
pub type AudioStream = BoxStream<'static, Result<AudioChunk>>;

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn stream_speech(&self, request: SpeechRequest) -> Result<AudioStream>;
}
