//! Session lifecycle: one send/regenerate exchange at a time, folding
//! normalized deltas into the in-progress assistant message.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapter::ProviderAdapter;
use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::message::{Attachment, FunctionCall, Role};
use crate::protocol::{normalize_record, DeltaVec, NormalizedDelta};
use crate::settings::ChatSettings;
use crate::store::{MessagePatch, MessageStore, NewMessage};
use crate::stream::sse_record_stream;

/// Lifecycle phase of the active exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Sending,
    Streaming,
}

/// How an exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    Errored,
}

/// Cheap read-only view of the in-flight exchange.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub message_id: Option<u64>,
    pub content: String,
    pub reasoning: String,
}

/// Mutable state of the one in-flight exchange.
///
/// Mirrors the accumulated buffers so callers can inspect progress without
/// re-reading storage. Destroyed on completion, cancellation, or error.
struct ActiveSession {
    cancel: CancellationToken,
    phase: SessionPhase,
    message_id: Option<u64>,
    content: String,
    reasoning: String,
    function_calls: Vec<FunctionCall>,
}

enum Applied {
    Continue,
    Completed,
    Errored,
}

/// Drives one request/response exchange at a time against a message store.
///
/// At most one exchange is in flight: a send while one is active is
/// rejected, so the streaming message only ever has a single writer. All
/// state mutation happens on the task driving the stream; cancellation is
/// checked at every suspension point, so no event is applied after the
/// token fires.
pub struct SessionController<S> {
    store: Arc<S>,
    adapter: Arc<ProviderAdapter>,
    idle_timeout: Duration,
    active: Mutex<Option<ActiveSession>>,
}

impl<S: MessageStore> SessionController<S> {
    #[must_use]
    pub fn new(store: Arc<S>, adapter: Arc<ProviderAdapter>, server: &ServerConfig) -> Self {
        Self {
            store,
            adapter,
            idle_timeout: Duration::from_secs(server.stream_idle_timeout_secs),
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Snapshot of the in-flight exchange, if any.
    #[must_use]
    pub fn session(&self) -> Option<SessionView> {
        self.active.lock().as_ref().map(|active| SessionView {
            phase: active.phase,
            message_id: active.message_id,
            content: active.content.clone(),
            reasoning: active.reasoning.clone(),
        })
    }

    /// Request cancellation of the in-flight exchange. Returns `false` when
    /// nothing is streaming.
    pub fn cancel(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Send a new user turn and stream the assistant response into the store.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidRequest`] for an empty turn,
    /// [`ChatError::Busy`] while another exchange is in flight, and
    /// [`ChatError::Store`] when persistence fails. Upstream and
    /// configuration failures are not errors at this boundary: they are
    /// rendered as a synthetic assistant message and reported as
    /// [`SessionOutcome::Errored`].
    pub async fn send(
        &self,
        settings: &ChatSettings,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<SessionOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() && attachments.is_empty() {
            return Err(ChatError::InvalidRequest(
                "message must carry text or an attachment".to_string(),
            ));
        }

        self.begin()?;
        if let Err(err) = self.store.add_message(NewMessage {
            role: Role::User,
            content: text.to_string(),
            attachments,
            ..NewMessage::default()
        }) {
            self.release();
            return Err(err);
        }

        self.run_exchange(settings).await
    }

    /// Replay the last user turn, discarding the assistant response that
    /// followed it. The user message itself is never deleted.
    pub async fn regenerate(&self, settings: &ChatSettings) -> Result<SessionOutcome, ChatError> {
        self.begin()?;

        let messages = self.store.messages();
        let Some(last_user) = messages.iter().rev().find(|m| m.role == Role::User) else {
            self.release();
            return Err(ChatError::InvalidRequest(
                "no user turn to regenerate".to_string(),
            ));
        };
        if let Some(last) = messages.last() {
            if last.role == Role::Assistant && last.id > last_user.id {
                if let Err(err) = self.store.delete_message(last.id) {
                    self.release();
                    return Err(err);
                }
            }
        }

        self.run_exchange(settings).await
    }

    /// Rewrite a past message's content directly. Does not touch session
    /// state and performs no streaming.
    pub fn edit(&self, id: u64, content: impl Into<String>) -> Result<(), ChatError> {
        self.store.update_message(id, MessagePatch::content(content))
    }

    fn begin(&self) -> Result<(), ChatError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(ChatError::Busy);
        }
        *active = Some(ActiveSession {
            cancel: CancellationToken::new(),
            phase: SessionPhase::Sending,
            message_id: None,
            content: String::new(),
            reasoning: String::new(),
            function_calls: Vec::new(),
        });
        Ok(())
    }

    fn release(&self) {
        *self.active.lock() = None;
    }

    fn cancel_token(&self) -> CancellationToken {
        self.active
            .lock()
            .as_ref()
            .map(|active| active.cancel.clone())
            .unwrap_or_default()
    }

    async fn run_exchange(&self, settings: &ChatSettings) -> Result<SessionOutcome, ChatError> {
        let cancel = self.cancel_token();
        let history: Vec<_> = self
            .store
            .messages()
            .iter()
            .map(crate::message::ChatMessage::to_history)
            .collect();

        let upstream = match self.adapter.send_chat(&history, settings, &cancel).await {
            Ok(upstream) => upstream,
            Err(ChatError::Cancelled) => {
                self.release();
                return Ok(SessionOutcome::Cancelled);
            }
            Err(
                err @ (ChatError::Config(_)
                | ChatError::Upstream { .. }
                | ChatError::Transport(_)),
            ) => {
                // Recovered at this boundary: rendered as a synthetic
                // assistant message, no streaming placeholder is created.
                let result = self.store.add_message(NewMessage {
                    role: Role::Assistant,
                    content: err.user_facing_text(),
                    ..NewMessage::default()
                });
                self.release();
                result?;
                info!(error = %err, "exchange failed before streaming");
                return Ok(SessionOutcome::Errored);
            }
            Err(other) => {
                self.release();
                return Err(other);
            }
        };

        let message_id = match self.store.add_message(NewMessage {
            role: Role::Assistant,
            content: String::new(),
            model: Some(settings.model.clone()),
            ..NewMessage::default()
        }) {
            Ok(id) => id,
            Err(err) => {
                self.release();
                return Err(err);
            }
        };
        if let Some(active) = self.active.lock().as_mut() {
            active.message_id = Some(message_id);
        }

        let kind = upstream.kind;
        let mut frames = Box::pin(sse_record_stream(upstream.bytes));
        let mut deltas = DeltaVec::new();

        let outcome = 'stream: loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break 'stream SessionOutcome::Cancelled,
                next = tokio::time::timeout(self.idle_timeout, frames.next()) => {
                    match next {
                        Err(_) => {
                            // Idle reads map to the same transition as an
                            // upstream error.
                            if let Err(err) = self.append_error_note(message_id, "upstream read timed out") {
                                self.release();
                                return Err(err);
                            }
                            break 'stream SessionOutcome::Errored;
                        }
                        Ok(None) => {
                            match self.apply(message_id, NormalizedDelta::StreamEnd) {
                                Ok(_) => break 'stream SessionOutcome::Completed,
                                Err(err) => {
                                    self.release();
                                    return Err(err);
                                }
                            }
                        }
                        Ok(Some(record)) => {
                            self.mark_streaming();
                            deltas.clear();
                            normalize_record(&record, kind, &mut deltas);
                            for delta in deltas.drain(..) {
                                if cancel.is_cancelled() {
                                    break 'stream SessionOutcome::Cancelled;
                                }
                                match self.apply(message_id, delta) {
                                    Ok(Applied::Continue) => {}
                                    Ok(Applied::Completed) => break 'stream SessionOutcome::Completed,
                                    Ok(Applied::Errored) => break 'stream SessionOutcome::Errored,
                                    Err(err) => {
                                        self.release();
                                        return Err(err);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        };

        debug!(message_id, ?outcome, "exchange finished");
        self.release();
        Ok(outcome)
    }

    fn mark_streaming(&self) {
        if let Some(active) = self.active.lock().as_mut() {
            active.phase = SessionPhase::Streaming;
        }
    }

    /// Fold one normalized delta into the in-progress message and persist
    /// the increment. One store write per event: a crash mid-stream leaves
    /// the last fully-applied event durable.
    fn apply(&self, message_id: u64, delta: NormalizedDelta) -> Result<Applied, ChatError> {
        match delta {
            NormalizedDelta::Text(text) => {
                let content = {
                    let mut active = self.active.lock();
                    let Some(active) = active.as_mut() else {
                        return Ok(Applied::Continue);
                    };
                    active.content.push_str(&text);
                    active.content.clone()
                };
                self.store.update_message(
                    message_id,
                    MessagePatch {
                        content: Some(content),
                        ..MessagePatch::default()
                    },
                )?;
                Ok(Applied::Continue)
            }
            NormalizedDelta::Reasoning(text) => {
                let reasoning = {
                    let mut active = self.active.lock();
                    let Some(active) = active.as_mut() else {
                        return Ok(Applied::Continue);
                    };
                    active.reasoning.push_str(&text);
                    active.reasoning.clone()
                };
                self.store.update_message(
                    message_id,
                    MessagePatch {
                        reasoning_content: Some(reasoning),
                        ..MessagePatch::default()
                    },
                )?;
                Ok(Applied::Continue)
            }
            NormalizedDelta::FunctionCall(call) => {
                let calls = {
                    let mut active = self.active.lock();
                    let Some(active) = active.as_mut() else {
                        return Ok(Applied::Continue);
                    };
                    active.function_calls.push(call);
                    active.function_calls.clone()
                };
                self.store.update_message(
                    message_id,
                    MessagePatch {
                        function_calls: Some(calls),
                        ..MessagePatch::default()
                    },
                )?;
                Ok(Applied::Continue)
            }
            NormalizedDelta::Metadata {
                grounding,
                url_context,
            } => {
                self.store.update_message(
                    message_id,
                    MessagePatch {
                        grounding_metadata: grounding,
                        url_context_metadata: url_context,
                        ..MessagePatch::default()
                    },
                )?;
                Ok(Applied::Continue)
            }
            NormalizedDelta::StreamEnd => Ok(Applied::Completed),
            NormalizedDelta::StreamError { message } => {
                self.append_error_note(message_id, &message)?;
                Ok(Applied::Errored)
            }
        }
    }

    /// Append an error annotation to the in-flight message, preserving the
    /// partial content accumulated so far.
    fn append_error_note(&self, message_id: u64, message: &str) -> Result<(), ChatError> {
        let content = {
            let mut active = self.active.lock();
            let Some(active) = active.as_mut() else {
                return Ok(());
            };
            if active.content.is_empty() {
                active.content = format!("Error: {message}");
            } else {
                active.content.push_str("\n\nError: ");
                active.content.push_str(message);
            }
            active.content.clone()
        };
        self.store.update_message(
            message_id,
            MessagePatch {
                content: Some(content),
                ..MessagePatch::default()
            },
        )
    }
}
