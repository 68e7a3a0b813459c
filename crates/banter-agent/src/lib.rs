pub mod conversation;
pub mod engine;
pub mod errors;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod reactions;
pub mod store;

pub use conversation::{
    Conversation, ConversationStatus, Participant, Reaction, Turn, TurnRole,
};
pub use engine::{TurnEngine, TurnOptions, TurnReport};
pub use errors::{EngineError, Result};
pub use events::TurnEvent;
pub use model::{TextBackend, TextOutput, TextRequest, TokenStream};
pub use orchestrator::{SpeakerChoice, TurnOrchestrator};
pub use pipeline::{SpeechStreamPipeline, StreamOutcome};
pub use reactions::ReactionCollector;
pub use store::{
    ConversationStore, InMemoryConversationStore, InMemoryParticipantRegistry,
    ParticipantRegistry,
};
