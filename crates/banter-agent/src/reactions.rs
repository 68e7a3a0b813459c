//! Parallel reaction fan-out.
//!
//! Every roster member except the previous speaker is asked, concurrently,
//! how they react to the latest message. A participant whose request fails
//! is dropped from the result; the batch itself never fails.

use crate::conversation::{Participant, Reaction};
use crate::model::{TextBackend, TextRequest};
use crate::orchestrator::{strip_code_fences, truncate_chars};
use futures::future::join_all;
use tracing::{debug, warn};

const REACTION_SYSTEM_PROMPT: &str = "You are playing a character in a spoken scene. React to \
the latest message in one or two short sentences, in character. Reply with exactly two \
lines:\nreaction: <your reaction>\nwants_to_speak: <yes or no>";

const STIMULUS_MAX_CHARS: usize = 400;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReactionCollector;

impl ReactionCollector {
    /// Collect reactions from every non-excluded roster member. Always
    /// returns, possibly with an empty list.
    #[allow(clippy::too_many_arguments)]
    pub async fn collect<T>(
        &self,
        backend: &T,
        roster: &[Participant],
        stimulus: Option<&str>,
        exclude_participant: Option<&str>,
        model: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Vec<Reaction>
    where
        T: TextBackend + ?Sized,
    {
        let requests = roster
            .iter()
            .filter(|participant| Some(participant.id.as_str()) != exclude_participant)
            .map(|participant| async move {
                let request = TextRequest {
                    prompt: build_reaction_prompt(participant, stimulus),
                    system_prompt: REACTION_SYSTEM_PROMPT.to_string(),
                    model: model.to_string(),
                    temperature,
                    max_tokens: Some(max_tokens),
                };

                match backend.generate(request).await {
                    Ok(output) => Some(parse_reaction(&participant.id, &output.text)),
                    Err(err) => {
                        warn!(participant = %participant.id, "reaction request dropped: {err}");
                        None
                    }
                }
            });

        let reactions: Vec<Reaction> = join_all(requests).await.into_iter().flatten().collect();
        debug!(
            collected = reactions.len(),
            roster = roster.len(),
            "reaction round complete"
        );
        reactions
    }
}

fn build_reaction_prompt(participant: &Participant, stimulus: Option<&str>) -> String {
    let mut prompt = format!(
        "You are {} ({}, {}).\n{}\n",
        participant.name, participant.role, participant.archetype, participant.behavior_prompt
    );
    if let Some(world) = &participant.world_context {
        prompt.push_str(&format!("World context: {world}\n"));
    }
    prompt.push_str("\nLatest message:\n");
    prompt.push_str(&truncate_chars(
        stimulus.unwrap_or("(the scene has just opened)"),
        STIMULUS_MAX_CHARS,
    ));
    prompt.push_str("\n\nHow do you react, and do you want to speak next?");
    prompt
}

/// Best-effort extraction of `{reaction, wants_to_speak}`. An unparsable
/// but successful response degrades to the raw text with
/// `wants_to_speak = false` rather than dropping the participant.
fn parse_reaction(participant_id: &str, raw: &str) -> Reaction {
    let cleaned = strip_code_fences(raw);
    let cleaned = cleaned.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) {
        if let Some(text) = value.get("reaction").and_then(|v| v.as_str()) {
            let wants_to_speak = value
                .get("wants_to_speak")
                .map(parse_affirmative_value)
                .unwrap_or(false);
            return Reaction {
                participant_id: participant_id.to_string(),
                text: text.trim().to_string(),
                wants_to_speak,
            };
        }
    }

    let mut text = None;
    let mut wants_to_speak = None;
    for line in cleaned.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "reaction" if !value.is_empty() => {
                text.get_or_insert_with(|| value.to_string());
            }
            "wants_to_speak" | "speak" => {
                wants_to_speak.get_or_insert(parse_affirmative(value));
            }
            _ => {}
        }
    }

    Reaction {
        participant_id: participant_id.to_string(),
        text: text.unwrap_or_else(|| cleaned.to_string()),
        wants_to_speak: wants_to_speak.unwrap_or(false),
    }
}

fn parse_affirmative(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "y" | "1"
    )
}

fn parse_affirmative_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => parse_affirmative(s),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EngineError, Result};
    use crate::model::{TextOutput, TokenStream};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            name: id.to_uppercase(),
            role: "crew".to_string(),
            archetype: "stoic".to_string(),
            behavior_prompt: "Speak plainly.".to_string(),
            world_context: None,
            voice: None,
        }
    }

    /// Responds per participant name embedded in the prompt; participants
    /// listed in `failing` error out.
    struct RosterBackend {
        responses: HashMap<String, String>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl TextBackend for RosterBackend {
        async fn generate(&self, request: TextRequest) -> Result<TextOutput> {
            for id in &self.failing {
                if request.prompt.contains(&id.to_uppercase()) {
                    return Err(EngineError::Upstream(format!("{id} timed out")));
                }
            }
            for (id, response) in &self.responses {
                if request.prompt.contains(&id.to_uppercase()) {
                    return Ok(TextOutput {
                        text: response.clone(),
                    });
                }
            }
            Ok(TextOutput {
                text: "reaction: ...\nwants_to_speak: no".to_string(),
            })
        }

        async fn stream_text(&self, _request: TextRequest) -> Result<TokenStream> {
            unimplemented!("not used by the collector")
        }
    }

    #[tokio::test]
    async fn failing_participants_are_dropped_silently() {
        let roster = vec![participant("kara"), participant("dex"), participant("mo")];
        let backend = RosterBackend {
            responses: HashMap::from([
                (
                    "kara".to_string(),
                    "reaction: She frowns.\nwants_to_speak: yes".to_string(),
                ),
                (
                    "mo".to_string(),
                    "reaction: He shrugs.\nwants_to_speak: no".to_string(),
                ),
            ]),
            failing: vec!["dex".to_string()],
        };

        let reactions = ReactionCollector
            .collect(&backend, &roster, Some("We lost the signal."), None, "m", 0.9, 96)
            .await;

        assert_eq!(reactions.len(), 2);
        assert!(reactions.iter().all(|r| r.participant_id != "dex"));
        let kara = reactions
            .iter()
            .find(|r| r.participant_id == "kara")
            .expect("kara reacted");
        assert!(kara.wants_to_speak);
        assert_eq!(kara.text, "She frowns.");
    }

    #[tokio::test]
    async fn last_speaker_is_excluded() {
        let roster = vec![participant("kara"), participant("dex")];
        let backend = RosterBackend {
            responses: HashMap::new(),
            failing: Vec::new(),
        };

        let reactions = ReactionCollector
            .collect(&backend, &roster, None, Some("kara"), "m", 0.9, 96)
            .await;

        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].participant_id, "dex");
    }

    #[tokio::test]
    async fn all_failures_yield_an_empty_list() {
        let roster = vec![participant("kara"), participant("dex")];
        let backend = RosterBackend {
            responses: HashMap::new(),
            failing: vec!["kara".to_string(), "dex".to_string()],
        };

        let reactions = ReactionCollector
            .collect(&backend, &roster, None, None, "m", 0.9, 96)
            .await;
        assert!(reactions.is_empty());
    }

    #[test]
    fn parse_handles_json_and_degrades_gracefully() {
        let parsed = parse_reaction("kara", "{\"reaction\": \"A sharp laugh.\", \"wants_to_speak\": true}");
        assert_eq!(parsed.text, "A sharp laugh.");
        assert!(parsed.wants_to_speak);

        let degraded = parse_reaction("kara", "She just stares out the viewport.");
        assert_eq!(degraded.text, "She just stares out the viewport.");
        assert!(!degraded.wants_to_speak);
    }
}
