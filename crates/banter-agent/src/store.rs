//! Persistence collaborator interfaces and in-memory reference
//! implementations.
//!
//! The engine only ever reads and appends through these traits; the
//! in-memory store guards its map with an explicit `RwLock` and re-checks
//! admission invariants under the write lock, which makes `append_turn` the
//! serialization point for turn requests racing on one conversation.

use crate::conversation::{Conversation, ConversationStatus, Participant, Turn};
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(&self, id: &str) -> Result<Conversation>;

    /// Append one turn. Returns the new turn count.
    async fn append_turn(&self, id: &str, turn: Turn) -> Result<usize>;

    async fn update_status(&self, id: &str, status: ConversationStatus) -> Result<()>;
}

#[async_trait]
pub trait ParticipantRegistry: Send + Sync {
    async fn get_participant(&self, id: &str) -> Result<Participant>;
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh active conversation.
    pub async fn create_conversation(
        &self,
        participant_ids: Vec<String>,
        max_turns: usize,
    ) -> Conversation {
        let conversation = Conversation {
            id: format!("conv_{}", uuid::Uuid::new_v4().simple()),
            turns: Vec::new(),
            status: ConversationStatus::Active,
            participant_ids,
            max_turns,
        };
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        conversation
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Conversation not found: {id}")))
    }

    async fn append_turn(&self, id: &str, turn: Turn) -> Result<usize> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("Conversation not found: {id}")))?;

        if conversation.status != ConversationStatus::Active {
            return Err(EngineError::Validation(format!(
                "Conversation {id} has ended"
            )));
        }
        if conversation.turns.len() >= conversation.max_turns {
            return Err(EngineError::Validation(format!(
                "Conversation {id} reached its turn limit ({})",
                conversation.max_turns
            )));
        }

        conversation.turns.push(turn);
        Ok(conversation.turns.len())
    }

    async fn update_status(&self, id: &str, status: ConversationStatus) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("Conversation not found: {id}")))?;
        conversation.status = status;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryParticipantRegistry {
    participants: RwLock<HashMap<String, Participant>>,
}

impl InMemoryParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, participant: Participant) {
        self.participants
            .write()
            .await
            .insert(participant.id.clone(), participant);
    }
}

#[async_trait]
impl ParticipantRegistry for InMemoryParticipantRegistry {
    async fn get_participant(&self, id: &str) -> Result<Participant> {
        self.participants
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Participant not found: {id}")))
    }
}
