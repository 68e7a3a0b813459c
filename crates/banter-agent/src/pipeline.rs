//! Streaming pipeline for one speaker's reply.
//!
//! A spawned producer task pulls the generation token stream and forwards
//! tagged messages into an unbounded, order-preserving channel. The consumer
//! (the `run` body) drains it sequentially: tokens are relayed immediately,
//! completed segments go to synthesis one at a time, and every audio unit is
//! relayed with a strictly increasing global chunk index. Token production
//! keeps filling the channel while a segment synthesizes; nothing else runs
//! concurrently, so the ordering guarantees fall out of the loop structure.

use crate::errors::{EngineError, Result};
use crate::events::TurnEvent;
use crate::model::{TextBackend, TextRequest};
use banter_voice::{SegmenterConfig, SentenceSegmenter, SpeechBackend, SpeechRequest};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Tagged messages the producer task forwards into the channel.
enum StreamMessage {
    Token(String),
    Done,
    Error(String),
}

/// Totals reported after a successful stream. The turn engine folds these
/// into the terminal `done` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub full_text: String,
    pub total_sentences: usize,
    pub total_chunks: u64,
}

/// Transient per-turn state: accumulated text, segment buffer, and the two
/// index counters. Created at turn start, dropped at turn end.
struct StreamSession {
    full_text: String,
    segmenter: SentenceSegmenter,
    next_sentence_index: usize,
    next_chunk_index: u64,
}

impl StreamSession {
    fn new(config: SegmenterConfig) -> Self {
        Self {
            full_text: String::new(),
            segmenter: SentenceSegmenter::new(config),
            next_sentence_index: 0,
            next_chunk_index: 0,
        }
    }
}

/// Aborts the producer when the consumer exits for any reason, including
/// the caller dropping the whole turn future.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Clone)]
pub struct SpeechStreamPipeline {
    pub segmenter_config: SegmenterConfig,
    pub voice: String,
    pub speed: f32,
}

impl SpeechStreamPipeline {
    /// Drive one generation stream through segmentation and synthesis,
    /// emitting ordered events. Returns the stream totals, or the first
    /// upstream failure; the caller owns terminal event emission.
    pub async fn run<T, S>(
        &self,
        text_backend: &T,
        speech_backend: &S,
        request: TextRequest,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<StreamOutcome>
    where
        T: TextBackend + ?Sized,
        S: SpeechBackend + ?Sized,
    {
        let mut token_stream = text_backend.stream_text(request).await?;
        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<StreamMessage>();

        let producer = tokio::spawn(async move {
            while let Some(item) = token_stream.next().await {
                let message = match item {
                    Ok(token) => StreamMessage::Token(token),
                    Err(err) => {
                        let _ = msg_tx.send(StreamMessage::Error(err.to_string()));
                        return;
                    }
                };
                if msg_tx.send(message).is_err() {
                    // Consumer is gone; stop pulling tokens.
                    return;
                }
            }
            let _ = msg_tx.send(StreamMessage::Done);
        });
        let _producer_guard = AbortOnDrop(producer);

        let mut session = StreamSession::new(self.segmenter_config);

        while let Some(message) = msg_rx.recv().await {
            match message {
                StreamMessage::Token(token) => {
                    session.full_text.push_str(&token);
                    // Latency-critical path: relay before any segmentation work.
                    let _ = events.send(TurnEvent::TextToken { token: token.clone() });
                    for segment in session.segmenter.push(&token) {
                        self.synthesize_segment(speech_backend, &mut session, segment, events)
                            .await?;
                    }
                }
                StreamMessage::Done => {
                    if let Some(segment) = session.segmenter.flush() {
                        self.synthesize_segment(speech_backend, &mut session, segment, events)
                            .await?;
                    }
                    debug!(
                        sentences = session.next_sentence_index,
                        chunks = session.next_chunk_index,
                        "speech stream complete"
                    );
                    return Ok(StreamOutcome {
                        full_text: session.full_text,
                        total_sentences: session.next_sentence_index,
                        total_chunks: session.next_chunk_index,
                    });
                }
                StreamMessage::Error(detail) => {
                    return Err(EngineError::Upstream(detail));
                }
            }
        }

        // Producer vanished without a terminal marker (panic or abort).
        warn!("token channel closed without completion marker");
        Err(EngineError::Upstream(
            "Token stream ended without completing".to_string(),
        ))
    }

    /// Synthesize one segment to completion: `sentence_ready`, then every
    /// audio chunk in order. The next segment does not start until this
    /// one's synthesis stream is exhausted.
    async fn synthesize_segment<S>(
        &self,
        speech_backend: &S,
        session: &mut StreamSession,
        segment: String,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<()>
    where
        S: SpeechBackend + ?Sized,
    {
        let sentence_index = session.next_sentence_index;
        session.next_sentence_index += 1;

        let _ = events.send(TurnEvent::SentenceReady {
            text: segment.clone(),
            index: sentence_index,
        });

        let mut audio = speech_backend
            .stream_speech(SpeechRequest {
                text: segment,
                voice: self.voice.clone(),
                speed: self.speed,
            })
            .await?;

        while let Some(chunk) = audio.next().await {
            let chunk = chunk?;
            let chunk_index = session.next_chunk_index;
            session.next_chunk_index += 1;
            let _ = events.send(TurnEvent::AudioChunk {
                chunk_index,
                sentence_index,
                payload: chunk.payload,
                format: chunk.format,
                sample_rate: chunk.sample_rate,
                channels: chunk.channels,
            });
        }

        Ok(())
    }
}
