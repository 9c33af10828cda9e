//! The Interactions API stream shape used for deep-research requests.
//!
//! Records arrive under an `event:` type; only `content.delta` events carry
//! renderable output: `{"delta":{"type":"text","text":..}}` for answer text
//! and `{"delta":{"type":"thought_summary","content":{"text":..}}}` for
//! thinking summaries.

use serde::{Deserialize, Serialize};

use super::delta::{push_text, DeltaVec, NormalizedDelta};

pub const DEEP_RESEARCH_AGENT: &str = "deep-research-pro-preview-12-2025";

const CONTENT_DELTA_EVENT: &str = "content.delta";

/// Body for an interactions request that runs the deep-research agent over
/// a single input prompt.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionsRequest {
    pub input: String,
    pub agent: &'static str,
    pub background: bool,
    pub stream: bool,
    pub agent_config: AgentConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub thinking_summaries: &'static str,
}

impl InteractionsRequest {
    #[must_use]
    pub fn deep_research(input: String) -> Self {
        Self {
            input,
            agent: DEEP_RESEARCH_AGENT,
            background: true,
            stream: true,
            agent_config: AgentConfig {
                kind: "deep-research",
                thinking_summaries: "auto",
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct InteractionsEvent {
    #[serde(default)]
    delta: Option<InteractionsDelta>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct InteractionsDelta {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<InteractionsDeltaContent>,
}

#[derive(Debug, Default, Deserialize)]
struct InteractionsDeltaContent {
    #[serde(default)]
    text: String,
}

/// Decode one interactions event. Returns `false` when the record matched
/// no part of the shape.
pub(crate) fn decode_event(
    event: Option<&str>,
    value: &serde_json::Value,
    out: &mut DeltaVec,
) -> bool {
    let Ok(parsed) = serde_json::from_value::<InteractionsEvent>(value.clone()) else {
        return false;
    };

    if let Some(error) = &parsed.error {
        let message = error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| error.to_string(), ToString::to_string);
        out.push(NormalizedDelta::StreamError { message });
        return true;
    }

    if event != Some(CONTENT_DELTA_EVENT) {
        return false;
    }
    let Some(delta) = &parsed.delta else {
        return false;
    };

    match delta.kind.as_str() {
        "text" => {
            if let Some(text) = &delta.text {
                push_text(out, text);
            }
            true
        }
        "thought_summary" => {
            if let Some(content) = &delta.content {
                if !content.text.trim().is_empty() {
                    out.push(NormalizedDelta::Reasoning(format!(
                        "\nThought: {}\n",
                        content.text
                    )));
                }
            }
            true
        }
        _ => false,
    }
}
