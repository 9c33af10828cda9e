use serde::{Deserialize, Serialize};

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A file attached to a message.
///
/// `data` holds a data URL (`data:image/png;base64,...`) for binary
/// attachments; `content` holds extracted text for text-like attachments.
/// Exactly one of the two is normally set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A structured tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// One persisted turn in a conversation.
///
/// `content` and `reasoning_content` only grow while the message is the
/// active streaming target; they are never rewritten except by an explicit
/// user edit after the stream ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(
        default,
        rename = "groundingMetadata",
        skip_serializing_if = "Option::is_none"
    )]
    pub grounding_metadata: Option<serde_json::Value>,
    #[serde(
        default,
        rename = "urlContextMetadata",
        skip_serializing_if = "Option::is_none"
    )]
    pub url_context_metadata: Option<serde_json::Value>,
    #[serde(default, rename = "functionCalls", skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    /// Optional responses paired with `function_calls` by position.
    #[serde(
        default,
        rename = "functionResponses",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub function_responses: Vec<Option<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at_ms: u64,
}

/// A conversation turn as submitted to the provider adapter.
///
/// This is the wire shape the relay accepts in `POST /api/chat` bodies:
/// persisted messages minus the store-assigned fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, rename = "functionCalls", skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    #[serde(
        default,
        rename = "functionResponses",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub function_responses: Vec<Option<serde_json::Value>>,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl ChatMessage {
    #[must_use]
    pub fn to_history(&self) -> HistoryMessage {
        HistoryMessage {
            role: self.role,
            content: self.content.clone(),
            reasoning_content: self.reasoning_content.clone(),
            attachments: self.attachments.clone(),
            function_calls: self.function_calls.clone(),
            function_responses: self.function_responses.clone(),
        }
    }
}

impl HistoryMessage {
    /// A turn is sendable when it carries text or at least one attachment.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        !self.content.trim().is_empty() || !self.attachments.is_empty()
    }
}
