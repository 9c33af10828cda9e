//! Re-encoding of normalized deltas into the plain SSE shape the chat
//! client consumes.

use crate::util::push_json_string_escaped;

use super::delta::NormalizedDelta;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Encode one normalized delta as a plain SSE frame.
///
/// `StreamEnd` has no frame of its own (the caller emits [`DONE_FRAME`]);
/// metadata is encoded via [`encode_metadata_frame`] so the caller can
/// de-duplicate repeated upstream metadata first.
#[must_use]
pub fn encode_delta_frame(delta: &NormalizedDelta) -> Option<String> {
    match delta {
        NormalizedDelta::Text(text) => {
            let mut out = String::with_capacity(64 + text.len());
            out.push_str("data: {\"choices\":[{\"delta\":{\"content\":");
            push_json_string_escaped(&mut out, text);
            out.push_str("},\"index\":0,\"finish_reason\":null}]}\n\n");
            Some(out)
        }
        NormalizedDelta::Reasoning(text) => {
            let mut out = String::with_capacity(72 + text.len());
            out.push_str("data: {\"choices\":[{\"delta\":{\"reasoning_content\":");
            push_json_string_escaped(&mut out, text);
            out.push_str("},\"index\":0,\"finish_reason\":null}]}\n\n");
            Some(out)
        }
        NormalizedDelta::FunctionCall(call) => {
            let args = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string());
            let mut out = String::with_capacity(96 + call.name.len() + args.len());
            out.push_str("data: {\"choices\":[{\"delta\":{\"function_calls\":[{\"name\":");
            push_json_string_escaped(&mut out, &call.name);
            out.push_str(",\"args\":");
            out.push_str(&args);
            out.push_str("}]},\"index\":0,\"finish_reason\":null}]}\n\n");
            Some(out)
        }
        NormalizedDelta::Metadata {
            grounding,
            url_context,
        } => encode_metadata_frame(grounding.as_ref(), url_context.as_ref()),
        NormalizedDelta::StreamError { message } => {
            let mut out = String::with_capacity(32 + message.len());
            out.push_str("data: {\"error\":{\"message\":");
            push_json_string_escaped(&mut out, message);
            out.push_str("}}\n\n");
            Some(out)
        }
        NormalizedDelta::StreamEnd => None,
    }
}

/// Encode a standalone metadata frame carrying whichever blobs are present.
#[must_use]
pub fn encode_metadata_frame(
    grounding: Option<&serde_json::Value>,
    url_context: Option<&serde_json::Value>,
) -> Option<String> {
    if grounding.is_none() && url_context.is_none() {
        return None;
    }

    let mut body = serde_json::Map::new();
    if let Some(grounding) = grounding {
        body.insert("groundingMetadata".to_string(), grounding.clone());
    }
    if let Some(url_context) = url_context {
        body.insert("urlContextMetadata".to_string(), url_context.clone());
    }
    let json = serde_json::to_string(&serde_json::Value::Object(body)).ok()?;

    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(&json);
    out.push_str("\n\n");
    Some(out)
}
