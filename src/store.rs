use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ChatError;
use crate::message::{Attachment, ChatMessage, FunctionCall, Role};
use crate::util::unix_now_millis;

/// Fields of a message that have not yet been persisted.
///
/// The store assigns `id` and `created_at_ms`.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub reasoning_content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub function_calls: Vec<FunctionCall>,
    pub model: Option<String>,
}

impl NewMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Partial update applied to a persisted message.
///
/// Only the fields the streaming merge stage mutates are present; a `None`
/// field leaves the stored value untouched, so concurrent readers never see
/// unrelated fields clobbered by a full-object replace.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub grounding_metadata: Option<serde_json::Value>,
    pub url_context_metadata: Option<serde_json::Value>,
    pub function_calls: Option<Vec<FunctionCall>>,
}

impl MessagePatch {
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// Persistence collaborator for conversation turns.
///
/// The streaming pipeline only ever calls [`update_message`] with the field
/// subset in [`MessagePatch`], one write per applied delta, so a crash
/// mid-stream leaves the last fully-applied event durable.
///
/// [`update_message`]: MessageStore::update_message
pub trait MessageStore: Send + Sync {
    /// Persist a new message and return its id. Ids are locally unique and
    /// monotonically assigned.
    fn add_message(&self, message: NewMessage) -> Result<u64, ChatError>;

    /// Apply a partial update to an existing message.
    fn update_message(&self, id: u64, patch: MessagePatch) -> Result<(), ChatError>;

    fn delete_message(&self, id: u64) -> Result<(), ChatError>;

    /// Snapshot of all messages in insertion order.
    fn messages(&self) -> Vec<ChatMessage>;

    fn message(&self, id: u64) -> Option<ChatMessage>;
}

/// In-memory [`MessageStore`].
///
/// Stands in for the client's local database; all pipeline semantics
/// (monotonic ids, partial updates) match what the browser-side store does.
#[derive(Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<ChatMessage>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MessageStore for MemoryStore {
    fn add_message(&self, message: NewMessage) -> Result<u64, ChatError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stored = ChatMessage {
            id,
            role: message.role,
            content: message.content,
            reasoning_content: message.reasoning_content,
            attachments: message.attachments,
            grounding_metadata: None,
            url_context_metadata: None,
            function_calls: message.function_calls,
            function_responses: Vec::new(),
            model: message.model,
            created_at_ms: unix_now_millis(),
        };
        self.messages.write().push(stored);
        Ok(id)
    }

    fn update_message(&self, id: u64, patch: MessagePatch) -> Result<(), ChatError> {
        let mut messages = self.messages.write();
        let Some(message) = messages.iter_mut().find(|m| m.id == id) else {
            return Err(ChatError::Store(format!("no message with id {id}")));
        };

        if let Some(content) = patch.content {
            message.content = content;
        }
        if let Some(reasoning) = patch.reasoning_content {
            message.reasoning_content = Some(reasoning);
        }
        if let Some(grounding) = patch.grounding_metadata {
            message.grounding_metadata = Some(grounding);
        }
        if let Some(url_context) = patch.url_context_metadata {
            message.url_context_metadata = Some(url_context);
        }
        if let Some(calls) = patch.function_calls {
            message.function_calls = calls;
        }
        Ok(())
    }

    fn delete_message(&self, id: u64) -> Result<(), ChatError> {
        let mut messages = self.messages.write();
        let before = messages.len();
        messages.retain(|m| m.id != id);
        if messages.len() == before {
            return Err(ChatError::Store(format!("no message with id {id}")));
        }
        Ok(())
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    fn message(&self, id: u64) -> Option<ChatMessage> {
        self.messages.read().iter().find(|m| m.id == id).cloned()
    }
}
