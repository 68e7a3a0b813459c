//! Next-speaker selection.
//!
//! One bounded decision request goes to the text backend; its free-form
//! response is parsed defensively and validated against the roster. Any
//! failure along the way folds into the same fallback chain, so the
//! operation never raises and always names a roster member.

use crate::conversation::{Participant, Reaction};
use crate::model::{TextBackend, TextRequest};
use tracing::{debug, warn};

const DECISION_SYSTEM_PROMPT: &str = "You are the director of a spoken scene between several \
characters. Given the roster, the latest message, and each character's reaction, pick who \
speaks next. Reply with exactly two lines:\nspeaker: <participant id>\nreason: <one short \
sentence>";

const STIMULUS_MAX_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerChoice {
    pub speaker: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TurnOrchestrator;

impl TurnOrchestrator {
    /// Decide who speaks next. Infallible: request failures, unparsable
    /// responses, and off-roster identifiers all fall through to the
    /// fallback chain.
    #[allow(clippy::too_many_arguments)]
    pub async fn pick_speaker<T>(
        &self,
        backend: &T,
        roster: &[Participant],
        reactions: &[Reaction],
        latest_message: Option<&str>,
        model: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> (String, String)
    where
        T: TextBackend + ?Sized,
    {
        let request = TextRequest {
            prompt: build_decision_prompt(roster, reactions, latest_message),
            system_prompt: DECISION_SYSTEM_PROMPT.to_string(),
            model: model.to_string(),
            temperature,
            max_tokens: Some(max_tokens),
        };

        match backend.generate(request).await {
            Ok(output) => match parse_speaker_decision(&output.text) {
                Some(choice) => {
                    if let Some(id) = resolve_roster_member(roster, &choice.speaker) {
                        debug!(speaker = %id, "speaker decision accepted");
                        return (id, choice.reason);
                    }
                    warn!(speaker = %choice.speaker, "decision named a non-roster speaker");
                    fallback_choice(roster, reactions, "decision named an unknown speaker")
                }
                None => {
                    warn!("speaker decision response was unparsable");
                    fallback_choice(roster, reactions, "decision response was unparsable")
                }
            },
            Err(err) => {
                warn!("speaker decision request failed: {err}");
                fallback_choice(roster, reactions, "decision request failed")
            }
        }
    }
}

fn build_decision_prompt(
    roster: &[Participant],
    reactions: &[Reaction],
    latest_message: Option<&str>,
) -> String {
    let mut prompt = String::from("Roster:\n");
    for participant in roster {
        prompt.push_str(&format!(
            "- {} — {} ({}, {})\n",
            participant.id, participant.name, participant.role, participant.archetype
        ));
    }

    prompt.push_str("\nLatest message:\n");
    prompt.push_str(&truncate_chars(
        latest_message.unwrap_or("(the scene has just opened)"),
        STIMULUS_MAX_CHARS,
    ));

    prompt.push_str("\n\nReactions:\n");
    if reactions.is_empty() {
        prompt.push_str("(none)\n");
    }
    for reaction in reactions {
        let intent = if reaction.wants_to_speak {
            "wants to speak"
        } else {
            "silent"
        };
        prompt.push_str(&format!(
            "- {} [{intent}]: {}\n",
            reaction.participant_id,
            truncate_chars(&reaction.text, 160)
        ));
    }

    prompt.push_str("\nWho speaks next?");
    prompt
}

/// Best-effort structured extraction of `{speaker, reason}` from a model
/// response. Pure so the fallback chain can be exercised without a backend.
pub fn parse_speaker_decision(raw: &str) -> Option<SpeakerChoice> {
    let cleaned = strip_code_fences(raw);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    // JSON object first: models asked for key/value lines still often
    // answer with `{"speaker": ..., "reason": ...}`.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) {
        let speaker = value
            .get("speaker")
            .or_else(|| value.get("speaker_id"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(speaker) = speaker {
            let reason = value
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("model decision")
                .trim()
                .to_string();
            return Some(SpeakerChoice {
                speaker: speaker.to_string(),
                reason,
            });
        }
    }

    let mut speaker = None;
    let mut reason = None;
    for line in cleaned.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            continue;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "speaker" | "speaker_id" | "next_speaker" => {
                speaker.get_or_insert_with(|| value.to_string());
            }
            "reason" => {
                reason.get_or_insert_with(|| value.to_string());
            }
            _ => {}
        }
    }

    speaker.map(|speaker| SpeakerChoice {
        speaker,
        reason: reason.unwrap_or_else(|| "model decision".to_string()),
    })
}

/// Accept an exact id, or a display-name match that maps back to an id.
fn resolve_roster_member(roster: &[Participant], candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    roster
        .iter()
        .find(|p| p.id == candidate)
        .or_else(|| {
            roster
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(candidate))
        })
        .map(|p| p.id.clone())
}

fn fallback_choice(
    roster: &[Participant],
    reactions: &[Reaction],
    cause: &str,
) -> (String, String) {
    for reaction in reactions {
        if !reaction.wants_to_speak {
            continue;
        }
        if roster.iter().any(|p| p.id == reaction.participant_id) {
            return (
                reaction.participant_id.clone(),
                format!("fallback ({cause}): first participant who wanted to speak"),
            );
        }
    }

    let first = roster
        .first()
        .map(|p| p.id.clone())
        .unwrap_or_default();
    (
        first,
        format!("fallback ({cause}): first roster member"),
    )
}

pub(crate) fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EngineError, Result};
    use crate::model::{TextOutput, TokenStream};
    use async_trait::async_trait;

    fn participant(id: &str, name: &str) -> Participant {
        Participant {
            id: id.to_string(),
            name: name.to_string(),
            role: "crew".to_string(),
            archetype: "stoic".to_string(),
            behavior_prompt: String::new(),
            world_context: None,
            voice: None,
        }
    }

    fn reaction(id: &str, wants_to_speak: bool) -> Reaction {
        Reaction {
            participant_id: id.to_string(),
            text: "hm".to_string(),
            wants_to_speak,
        }
    }

    struct ScriptedBackend {
        response: Result<&'static str>,
    }

    #[async_trait]
    impl TextBackend for ScriptedBackend {
        async fn generate(&self, _request: TextRequest) -> Result<TextOutput> {
            match &self.response {
                Ok(text) => Ok(TextOutput {
                    text: text.to_string(),
                }),
                Err(_) => Err(EngineError::Upstream("generation failed".to_string())),
            }
        }

        async fn stream_text(&self, _request: TextRequest) -> Result<TokenStream> {
            unimplemented!("not used by the orchestrator")
        }
    }

    #[test]
    fn parses_key_value_lines() {
        let choice = parse_speaker_decision("speaker: kara\nreason: she was addressed directly")
            .expect("parse");
        assert_eq!(choice.speaker, "kara");
        assert_eq!(choice.reason, "she was addressed directly");
    }

    #[test]
    fn parses_json_inside_code_fence() {
        let raw = "```json\n{\"speaker\": \"dex\", \"reason\": \"comic relief\"}\n```";
        let choice = parse_speaker_decision(raw).expect("parse");
        assert_eq!(choice.speaker, "dex");
        assert_eq!(choice.reason, "comic relief");
    }

    #[test]
    fn missing_reason_gets_a_default() {
        let choice = parse_speaker_decision("speaker: kara").expect("parse");
        assert_eq!(choice.reason, "model decision");
    }

    #[test]
    fn garbage_is_a_parse_failure() {
        assert!(parse_speaker_decision("I think someone should talk").is_none());
        assert!(parse_speaker_decision("").is_none());
    }

    #[tokio::test]
    async fn accepts_valid_roster_member() {
        let roster = vec![participant("kara", "Kara"), participant("dex", "Dex")];
        let backend = ScriptedBackend {
            response: Ok("speaker: dex\nreason: it is his move"),
        };

        let (speaker, reason) = TurnOrchestrator
            .pick_speaker(&backend, &roster, &[], Some("hello"), "m", 0.7, 128)
            .await;
        assert_eq!(speaker, "dex");
        assert_eq!(reason, "it is his move");
    }

    #[tokio::test]
    async fn unknown_speaker_falls_back_to_willing_reactor() {
        let roster = vec![participant("kara", "Kara"), participant("dex", "Dex")];
        let reactions = vec![reaction("kara", false), reaction("dex", true)];
        let backend = ScriptedBackend {
            response: Ok("speaker: ghost\nreason: not real"),
        };

        let (speaker, reason) = TurnOrchestrator
            .pick_speaker(&backend, &roster, &reactions, None, "m", 0.7, 128)
            .await;
        assert_eq!(speaker, "dex");
        assert!(reason.starts_with("fallback"));
    }

    #[tokio::test]
    async fn request_failure_falls_back_to_first_roster_member() {
        let roster = vec![participant("kara", "Kara"), participant("dex", "Dex")];
        let reactions = vec![reaction("kara", false)];
        let backend = ScriptedBackend {
            response: Err(EngineError::Upstream("down".to_string())),
        };

        let (speaker, reason) = TurnOrchestrator
            .pick_speaker(&backend, &roster, &reactions, None, "m", 0.7, 128)
            .await;
        assert_eq!(speaker, "kara");
        assert!(reason.starts_with("fallback"));
    }

    #[tokio::test]
    async fn display_name_resolves_to_id() {
        let roster = vec![participant("kara", "Kara")];
        let backend = ScriptedBackend {
            response: Ok("speaker: Kara\nreason: direct address"),
        };

        let (speaker, _) = TurnOrchestrator
            .pick_speaker(&backend, &roster, &[], None, "m", 0.7, 128)
            .await;
        assert_eq!(speaker, "kara");
    }
}
