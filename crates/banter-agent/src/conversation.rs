use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A conversation member, immutable for the duration of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: String,
    pub archetype: String,
    pub behavior_prompt: String,
    #[serde(default)]
    pub world_context: Option<String>,
    /// Synthesis voice override; the engine default is used when absent.
    #[serde(default)]
    pub voice: Option<String>,
}

/// A participant's short response to the latest message. Produced fresh
/// each turn and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub participant_id: String,
    pub text: String,
    pub wants_to_speak: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Character,
    User,
    Narrator,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::User => "user",
            Self::Narrator => "narrator",
        }
    }
}

/// One appended utterance in a conversation's ordered history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    #[serde(default)]
    pub participant_id: Option<String>,
    pub content: String,
    pub created_at: u64,
}

impl Turn {
    pub fn character(participant_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Character,
            participant_id: Some(participant_id.into()),
            content: content.into(),
            created_at: now_unix_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            participant_id: None,
            content: content.into(),
            created_at: now_unix_millis(),
        }
    }

    pub fn narrator(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Narrator,
            participant_id: None,
            content: content.into(),
            created_at: now_unix_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Ended,
}

/// Ordered turn history plus admission state. Owned by the persistence
/// collaborator; the core reads and appends through [`crate::store`] only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub turns: Vec<Turn>,
    pub status: ConversationStatus,
    pub participant_ids: Vec<String>,
    pub max_turns: usize,
}

impl Conversation {
    /// Last character utterance's participant, if any. That participant is
    /// excluded from the next reaction round.
    pub fn last_speaker_id(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::Character)
            .and_then(|turn| turn.participant_id.as_deref())
    }

    /// Content of the most recent turn regardless of role; the stimulus
    /// participants react to.
    pub fn latest_message(&self) -> Option<&str> {
        self.turns.last().map(|turn| turn.content.as_str())
    }
}

pub fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
