use thiserror::Error;

pub type Result<T> = std::result::Result<T, VoiceError>;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),
}
