//! The "plain" OpenAI-compatible stream shape.
//!
//! Chunks look like
//! `{"choices":[{"delta":{"content":..,"reasoning_content":..,"function_calls":[..]},"index":0,"finish_reason":null}]}`,
//! with standalone metadata records `{"groundingMetadata":..}` /
//! `{"urlContextMetadata":..}` and error records `{"error":..}`.

use serde::Deserialize;

use super::delta::{push_reasoning, push_text, DeltaVec, NormalizedDelta};
use crate::message::FunctionCall;

#[derive(Debug, Default, Deserialize)]
struct PlainChunk {
    #[serde(default)]
    choices: Vec<PlainChoice>,
    #[serde(default, rename = "groundingMetadata")]
    grounding_metadata: Option<serde_json::Value>,
    #[serde(default, rename = "urlContextMetadata")]
    url_context_metadata: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct PlainChoice {
    #[serde(default)]
    delta: PlainDelta,
}

#[derive(Debug, Default, Deserialize)]
struct PlainDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    function_calls: Option<Vec<FunctionCall>>,
}

/// Decode one plain-shape chunk. Returns `false` when the payload matched
/// no part of the shape.
pub(crate) fn decode_chunk(value: &serde_json::Value, out: &mut DeltaVec) -> bool {
    let Ok(chunk) = serde_json::from_value::<PlainChunk>(value.clone()) else {
        return false;
    };

    if let Some(error) = &chunk.error {
        out.push(NormalizedDelta::StreamError {
            message: error_message(error),
        });
        return true;
    }

    // A metadata-only record is a standalone update, never merged into text.
    if chunk.grounding_metadata.is_some() || chunk.url_context_metadata.is_some() {
        out.push(NormalizedDelta::Metadata {
            grounding: chunk.grounding_metadata,
            url_context: chunk.url_context_metadata,
        });
        return true;
    }

    let Some(choice) = chunk.choices.first() else {
        return false;
    };

    // Content and reasoning may arrive in the same record; both are
    // forwarded, neither dropped in favor of the other.
    if let Some(content) = &choice.delta.content {
        push_text(out, content);
    }
    if let Some(reasoning) = &choice.delta.reasoning_content {
        push_reasoning(out, reasoning);
    }
    if let Some(calls) = &choice.delta.function_calls {
        for call in calls {
            out.push(NormalizedDelta::FunctionCall(call.clone()));
        }
    }
    true
}

fn error_message(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| other.to_string(), ToString::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> DeltaVec {
        let mut out = DeltaVec::new();
        assert!(decode_chunk(&value, &mut out));
        out
    }

    #[test]
    fn content_delta() {
        let out = decode(json!({
            "choices": [{"delta": {"content": "Hel"}, "index": 0, "finish_reason": null}]
        }));
        assert_eq!(out.as_slice(), [NormalizedDelta::Text("Hel".to_string())]);
    }

    #[test]
    fn content_and_reasoning_in_one_record_yield_two_events() {
        let out = decode(json!({
            "choices": [{"delta": {"content": "answer", "reasoning_content": "because"}}]
        }));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], NormalizedDelta::Text("answer".to_string()));
        assert_eq!(out[1], NormalizedDelta::Reasoning("because".to_string()));
    }

    #[test]
    fn empty_delta_fields_emit_nothing() {
        let out = decode(json!({
            "choices": [{"delta": {"content": "", "reasoning_content": "  "}}]
        }));
        assert!(out.is_empty());
    }

    #[test]
    fn function_call_deltas() {
        let out = decode(json!({
            "choices": [{"delta": {"function_calls": [
                {"name": "get_weather", "args": {"city": "SF"}}
            ]}}]
        }));
        match &out[0] {
            NormalizedDelta::FunctionCall(call) => {
                assert_eq!(call.name, "get_weather");
                assert_eq!(call.args["city"], "SF");
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn metadata_only_record() {
        let out = decode(json!({
            "groundingMetadata": {"groundingChunks": [{"web": {"uri": "http://x", "title": "X"}}]}
        }));
        match &out[0] {
            NormalizedDelta::Metadata {
                grounding: Some(grounding),
                url_context: None,
            } => {
                assert_eq!(grounding["groundingChunks"][0]["web"]["uri"], "http://x");
            }
            other => panic!("expected Metadata, got {other:?}"),
        }
    }

    #[test]
    fn error_record_with_object_message() {
        let out = decode(json!({"error": {"status": 503, "message": "overloaded"}}));
        assert_eq!(
            out.as_slice(),
            [NormalizedDelta::StreamError {
                message: "overloaded".to_string()
            }]
        );
    }

    #[test]
    fn error_record_with_string_message() {
        let out = decode(json!({"error": "quota exceeded"}));
        assert_eq!(
            out.as_slice(),
            [NormalizedDelta::StreamError {
                message: "quota exceeded".to_string()
            }]
        );
    }

    #[test]
    fn chunk_without_choices_is_unrecognized() {
        let mut out = DeltaVec::new();
        assert!(!decode_chunk(&json!({"id": "chatcmpl-1"}), &mut out));
        assert!(out.is_empty());
    }
}
