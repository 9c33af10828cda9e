//! Provider-agnostic stream deltas and the per-shape normalization entry.

use smallvec::SmallVec;

use crate::message::FunctionCall;
use crate::observability::decode_stats;
use crate::stream::SseRecord;

/// The stream shape an upstream speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderStreamKind {
    /// OpenAI-compatible chunks: `{choices:[{delta:{content?, reasoning_content?, function_calls?}}]}`
    /// plus metadata-only records.
    Plain,
    /// Native Gemini chunks: candidate parts with `thought` flags, function
    /// calls, and grounding metadata.
    Gemini,
    /// Interactions API events: `content.delta` records carrying text or
    /// thought summaries.
    Interactions,
}

/// One normalized increment of an in-progress assistant message.
///
/// Events for a given message are applied strictly in emission order;
/// out-of-order application would corrupt the accumulated text.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedDelta {
    Text(String),
    Reasoning(String),
    FunctionCall(FunctionCall),
    Metadata {
        grounding: Option<serde_json::Value>,
        url_context: Option<serde_json::Value>,
    },
    StreamEnd,
    StreamError {
        message: String,
    },
}

pub type DeltaVec = SmallVec<[NormalizedDelta; 4]>;

/// Normalize one reassembled SSE record into zero or more deltas.
///
/// Empty and whitespace-only delta text yields nothing. A payload that
/// fails to parse as JSON is swallowed for that record only — the stream
/// continues — and the drop is counted. Well-formed records matching no
/// known shape are likewise counted and ignored.
pub fn normalize_record(record: &SseRecord, kind: ProviderStreamKind, out: &mut DeltaVec) {
    let payload = record.data.trim();
    if payload.is_empty() {
        return;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        decode_stats::record_swallowed(payload);
        return;
    };

    let recognized = match kind {
        ProviderStreamKind::Plain => super::plain::decode_chunk(&value, out),
        ProviderStreamKind::Gemini => super::gemini::decode_chunk(&value, out),
        ProviderStreamKind::Interactions => {
            super::interactions::decode_event(record.event.as_deref(), &value, out)
        }
    };

    if !recognized {
        decode_stats::record_unrecognized(payload);
    }
}

/// Push a text delta unless it is empty or whitespace-only.
pub(crate) fn push_text(out: &mut DeltaVec, text: &str) {
    if !text.trim().is_empty() {
        out.push(NormalizedDelta::Text(text.to_string()));
    }
}

/// Push a reasoning delta unless it is empty or whitespace-only.
pub(crate) fn push_reasoning(out: &mut DeltaVec, text: &str) {
    if !text.trim().is_empty() {
        out.push(NormalizedDelta::Reasoning(text.to_string()));
    }
}
