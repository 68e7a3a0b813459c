//! Ordered wire events emitted while a turn runs. A listener observes a
//! sequence ending in exactly one terminal `done` or `error` event.

use crate::conversation::Reaction;
use banter_voice::AudioFormat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// All collected reactions, sent once before the speaker decision.
    Reactions { reactions: Vec<Reaction> },
    /// The chosen speaker, sent once after the decision.
    Speaker {
        participant_id: String,
        name: String,
        reason: String,
    },
    /// One generation token, relayed as soon as it arrives.
    TextToken { token: String },
    /// A complete segment handed to synthesis.
    SentenceReady { text: String, index: usize },
    /// One synthesized audio unit. `chunk_index` is global and strictly
    /// increasing within the turn.
    AudioChunk {
        chunk_index: u64,
        sentence_index: usize,
        #[serde(with = "base64_payload")]
        payload: Vec<u8>,
        format: AudioFormat,
        sample_rate: u32,
        channels: u16,
    },
    /// Terminal success.
    Done {
        full_text: String,
        turn: usize,
        reactions: Vec<Reaction>,
        reason: String,
        total_chunks: u64,
        total_sentences: usize,
    },
    /// Terminal failure. Nothing follows.
    Error { code: String, message: String },
}

mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
