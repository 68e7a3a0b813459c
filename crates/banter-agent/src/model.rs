use crate::errors::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOutput {
    pub text: String,
}

/// Lazy, finite, non-restartable sequence of text tokens.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Opaque text-generation capability. `generate` is single-shot;
/// `stream_text` yields tokens as they are produced.
#[async_trait]
pub trait TextBackend: Send + Sync {
    async fn generate(&self, request: TextRequest) -> Result<TextOutput>;

    async fn stream_text(&self, request: TextRequest) -> Result<TokenStream>;
}
