/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("A generation is already in progress")]
    Busy,
    #[error("{message}")]
    Upstream {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Generation cancelled")]
    Cancelled,
    #[error("Store error: {0}")]
    Store(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    Conflict,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl ChatError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChatError::Config(_) | ChatError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            ChatError::Busy => ErrorCategory::Conflict,
            ChatError::Upstream { status, .. } => category_from_upstream_status(*status),
            ChatError::Transport(_) | ChatError::Stream(_) | ChatError::Store(_) => {
                ErrorCategory::ServerError
            }
            ChatError::Cancelled => ErrorCategory::Unknown,
        }
    }

    /// The text shown to the user when this error is rendered as a synthetic
    /// assistant message: `Error: {message}` plus a debug suffix when the
    /// upstream error body carried `details`.
    #[must_use]
    pub fn user_facing_text(&self) -> String {
        match self {
            ChatError::Config(message) => format!("Error: {message}"),
            ChatError::Upstream {
                message,
                details: Some(details),
                ..
            } => {
                format!("Error: {message}\n\nDebug: {details}")
            }
            other => format!("Error: {other}"),
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::Conflict => http::StatusCode::CONFLICT,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Format an error for the relay's JSON error response, returning
/// (`status_code`, body).
///
/// The body shape is `{"error": message}` with an optional `details` field,
/// matching the error contract the chat client consumes.
#[must_use]
pub fn format_error(err: &ChatError) -> (http::StatusCode, serde_json::Value) {
    let status = match err {
        ChatError::Upstream { status, .. } => http::StatusCode::from_u16(*status)
            .unwrap_or_else(|_| http_status_for_category(err.category())),
        other => http_status_for_category(other.category()),
    };

    let mut body = serde_json::Map::new();
    body.insert(
        "error".to_string(),
        serde_json::Value::String(err.to_string()),
    );
    if let ChatError::Upstream {
        details: Some(details),
        ..
    } = err
    {
        body.insert("details".to_string(), details.clone());
    }

    (status, serde_json::Value::Object(body))
}

/// Build a [`ChatError::Upstream`] from a non-2xx initial response body.
///
/// The upstream error contract is `{error: {message} | string, details?}`;
/// the message is surfaced verbatim. Bodies that fail to parse as JSON are
/// surfaced as raw text, falling back to the status code alone when empty.
#[must_use]
pub fn upstream_error_from_body(status: u16, body: &str) -> ChatError {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return ChatError::Upstream {
            status,
            message: format!("Upstream returned HTTP {status}"),
            details: None,
        };
    }

    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return ChatError::Upstream {
            status,
            message: trimmed.to_string(),
            details: None,
        };
    };

    let message = match parsed.get("error") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(obj) => obj
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| obj.to_string(), ToString::to_string),
        None => trimmed.to_string(),
    };

    ChatError::Upstream {
        status,
        message,
        details: parsed.get("details").cloned(),
    }
}
