//! The relay HTTP surface: `POST /api/chat` accepts `{messages, settings}`,
//! opens the upstream stream through the adapter, and re-emits it as plain
//! SSE chunks the chat client understands.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapter::{ProviderAdapter, UpstreamStream};
use crate::error::format_error;
use crate::message::HistoryMessage;
use crate::protocol::encoder::{encode_delta_frame, encode_metadata_frame, DONE_FRAME};
use crate::protocol::{normalize_record, DeltaVec, NormalizedDelta, ProviderStreamKind};
use crate::settings::ChatSettings;
use crate::stream::{sse_record_stream, SseRecord};
use crate::util::next_request_id;

pub struct RelayState {
    pub adapter: Arc<ProviderAdapter>,
}

#[must_use]
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub settings: ChatSettings,
}

async fn chat_handler(
    State(state): State<Arc<RelayState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let request_id = next_request_id();
    info!(
        request_id = %request_id,
        provider = %request.settings.provider,
        model = %request.settings.model,
        turns = request.messages.len(),
        "chat request"
    );

    // Client disconnects propagate by dropping the response body, which
    // tears down the upstream connection; the token only guards the
    // pre-stream phase.
    let cancel = CancellationToken::new();
    let upstream = match state
        .adapter
        .send_chat(&request.messages, &request.settings, &cancel)
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            info!(request_id = %request_id, error = %err, "chat request failed");
            let (status, body) = format_error(&err);
            return (status, Json(body)).into_response();
        }
    };

    let headers = [
        (header::CONTENT_TYPE, "text/event-stream"),
        (header::CACHE_CONTROL, "no-cache"),
        (header::CONNECTION, "keep-alive"),
    ];
    (headers, Body::from_stream(relay_body(upstream))).into_response()
}

struct RelayFold {
    frames: Pin<Box<dyn Stream<Item = SseRecord> + Send>>,
    kind: ProviderStreamKind,
    pending: VecDeque<Bytes>,
    grounding: Option<serde_json::Value>,
    url_context: Option<serde_json::Value>,
    done: bool,
}

/// Re-encode the upstream record stream as plain SSE frames.
///
/// Metadata repeats across upstream chunks, so only the latest blob is
/// kept and re-emitted as one standalone record right before `[DONE]`.
fn relay_body(upstream: UpstreamStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let state = RelayFold {
        frames: Box::pin(sse_record_stream(upstream.bytes)),
        kind: upstream.kind,
        pending: VecDeque::new(),
        grounding: None,
        url_context: None,
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(bytes) = state.pending.pop_front() {
                return Some((Ok(bytes), state));
            }
            if state.done {
                return None;
            }

            match state.frames.next().await {
                Some(record) => {
                    let mut deltas = DeltaVec::new();
                    normalize_record(&record, state.kind, &mut deltas);
                    for delta in deltas.drain(..) {
                        match delta {
                            NormalizedDelta::Metadata {
                                grounding,
                                url_context,
                            } => {
                                if grounding.is_some() {
                                    state.grounding = grounding;
                                }
                                if url_context.is_some() {
                                    state.url_context = url_context;
                                }
                            }
                            other => {
                                let is_error =
                                    matches!(other, NormalizedDelta::StreamError { .. });
                                if let Some(frame) = encode_delta_frame(&other) {
                                    state.pending.push_back(Bytes::from(frame));
                                }
                                if is_error {
                                    state
                                        .pending
                                        .push_back(Bytes::from_static(DONE_FRAME.as_bytes()));
                                    state.done = true;
                                    break;
                                }
                            }
                        }
                    }
                }
                None => {
                    if let Some(frame) =
                        encode_metadata_frame(state.grounding.as_ref(), state.url_context.as_ref())
                    {
                        state.pending.push_back(Bytes::from(frame));
                    }
                    state
                        .pending
                        .push_back(Bytes::from_static(DONE_FRAME.as_bytes()));
                    state.done = true;
                }
            }
        }
    })
}
