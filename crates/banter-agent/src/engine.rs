//! One full conversation turn: validate, react, decide, stream, append.
//!
//! The engine owns terminal event emission: a caller observes an ordered
//! event sequence ending in exactly one `done` or `error`, never both.

use crate::conversation::{Conversation, ConversationStatus, Participant, Reaction, Turn};
use crate::errors::{EngineError, Result};
use crate::events::TurnEvent;
use crate::model::{TextBackend, TextRequest};
use crate::orchestrator::TurnOrchestrator;
use crate::pipeline::SpeechStreamPipeline;
use crate::reactions::ReactionCollector;
use crate::store::{ConversationStore, ParticipantRegistry};
use banter_voice::{SegmenterConfig, SpeechBackend};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub model: String,
    pub temperature: f32,
    pub reaction_max_tokens: usize,
    pub decision_max_tokens: usize,
    pub reply_max_tokens: Option<usize>,
    /// Default synthesis voice; a participant's `voice` field overrides it.
    pub voice: String,
    pub speed: f32,
    pub segmenter: SegmenterConfig,
    /// How many trailing turns go into the reply prompt.
    pub history_window: usize,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.8,
            reaction_max_tokens: 96,
            decision_max_tokens: 128,
            reply_max_tokens: Some(1024),
            voice: "narrator".to_string(),
            speed: 1.0,
            segmenter: SegmenterConfig::default(),
            history_window: 12,
        }
    }
}

/// Everything the engine learned while running one turn; the terminal
/// `done` event is built from this.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub turn_number: usize,
    pub speaker_id: String,
    pub speaker_name: String,
    pub reason: String,
    pub reactions: Vec<Reaction>,
    pub full_text: String,
    pub total_sentences: usize,
    pub total_chunks: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TurnEngine {
    pub options: TurnOptions,
}

impl TurnEngine {
    pub fn new(options: TurnOptions) -> Self {
        Self { options }
    }

    /// Run one turn on `conversation_id`, emitting ordered events into
    /// `events`. The returned error mirrors the terminal `error` event.
    pub async fn run_turn<C, R, T, S>(
        &self,
        conversation_id: &str,
        store: &C,
        registry: &R,
        text: &T,
        speech: &S,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<TurnReport>
    where
        C: ConversationStore + ?Sized,
        R: ParticipantRegistry + ?Sized,
        T: TextBackend + ?Sized,
        S: SpeechBackend + ?Sized,
    {
        match self
            .run_turn_inner(conversation_id, store, registry, text, speech, events)
            .await
        {
            Ok(report) => {
                let _ = events.send(TurnEvent::Done {
                    full_text: report.full_text.clone(),
                    turn: report.turn_number,
                    reactions: report.reactions.clone(),
                    reason: report.reason.clone(),
                    total_chunks: report.total_chunks,
                    total_sentences: report.total_sentences,
                });
                Ok(report)
            }
            Err(err) => {
                let _ = events.send(TurnEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_turn_inner<C, R, T, S>(
        &self,
        conversation_id: &str,
        store: &C,
        registry: &R,
        text: &T,
        speech: &S,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<TurnReport>
    where
        C: ConversationStore + ?Sized,
        R: ParticipantRegistry + ?Sized,
        T: TextBackend + ?Sized,
        S: SpeechBackend + ?Sized,
    {
        let conversation = store.get_conversation(conversation_id).await?;

        if conversation.status != ConversationStatus::Active {
            return Err(EngineError::Validation(format!(
                "Conversation {conversation_id} has ended"
            )));
        }
        if conversation.turns.len() >= conversation.max_turns {
            // Reaching the limit also ends the conversation.
            store
                .update_status(conversation_id, ConversationStatus::Ended)
                .await?;
            return Err(EngineError::Validation(format!(
                "Conversation {conversation_id} reached its turn limit ({})",
                conversation.max_turns
            )));
        }

        let mut roster = Vec::with_capacity(conversation.participant_ids.len());
        for participant_id in &conversation.participant_ids {
            roster.push(registry.get_participant(participant_id).await?);
        }
        if roster.is_empty() {
            return Err(EngineError::Validation(format!(
                "Conversation {conversation_id} has no participants"
            )));
        }

        let stimulus = conversation.latest_message();
        let last_speaker = conversation.last_speaker_id();

        let reactions = ReactionCollector
            .collect(
                text,
                &roster,
                stimulus,
                last_speaker,
                &self.options.model,
                self.options.temperature,
                self.options.reaction_max_tokens,
            )
            .await;
        let _ = events.send(TurnEvent::Reactions {
            reactions: reactions.clone(),
        });

        let (speaker_id, reason) = TurnOrchestrator
            .pick_speaker(
                text,
                &roster,
                &reactions,
                stimulus,
                &self.options.model,
                self.options.temperature,
                self.options.decision_max_tokens,
            )
            .await;
        let speaker = roster
            .iter()
            .find(|p| p.id == speaker_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Speaker not found: {speaker_id}")))?;
        info!(speaker = %speaker.id, %reason, "speaker selected");
        let _ = events.send(TurnEvent::Speaker {
            participant_id: speaker.id.clone(),
            name: speaker.name.clone(),
            reason: reason.clone(),
        });

        let pipeline = SpeechStreamPipeline {
            segmenter_config: self.options.segmenter,
            voice: speaker
                .voice
                .clone()
                .unwrap_or_else(|| self.options.voice.clone()),
            speed: self.options.speed,
        };
        let outcome = pipeline
            .run(
                text,
                speech,
                self.build_reply_request(&conversation, &speaker),
                events,
            )
            .await?;

        let turn_number = store
            .append_turn(
                conversation_id,
                Turn::character(speaker.id.clone(), outcome.full_text.clone()),
            )
            .await?;
        debug!(turn = turn_number, "turn appended");

        Ok(TurnReport {
            turn_number,
            speaker_id: speaker.id,
            speaker_name: speaker.name,
            reason,
            reactions,
            full_text: outcome.full_text,
            total_sentences: outcome.total_sentences,
            total_chunks: outcome.total_chunks,
        })
    }

    fn build_reply_request(&self, conversation: &Conversation, speaker: &Participant) -> TextRequest {
        let mut system_prompt = format!(
            "You are {} ({}, {}). {}",
            speaker.name, speaker.role, speaker.archetype, speaker.behavior_prompt
        );
        if let Some(world) = &speaker.world_context {
            system_prompt.push_str(&format!("\nWorld context: {world}"));
        }
        system_prompt.push_str(
            "\nSpeak your next line aloud, in character. No stage directions, no markdown.",
        );

        let mut prompt = String::from("Recent conversation:\n");
        let skip = conversation
            .turns
            .len()
            .saturating_sub(self.options.history_window);
        for turn in conversation.turns.iter().skip(skip) {
            let who = turn
                .participant_id
                .as_deref()
                .unwrap_or_else(|| turn.role.as_str());
            prompt.push_str(&format!("{who}: {}\n", turn.content));
        }
        if conversation.turns.is_empty() {
            prompt.push_str("(the scene has just opened)\n");
        }
        prompt.push_str(&format!("\n{}:", speaker.name));

        TextRequest {
            prompt,
            system_prompt,
            model: self.options.model.clone(),
            temperature: self.options.temperature,
            max_tokens: self.options.reply_max_tokens,
        }
    }
}
