//! Provider adapter: turns a conversation plus a settings snapshot into one
//! outbound streaming request against a configured upstream.

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{ProviderConfig, ProviderWireKind, ServerConfig};
use crate::error::{upstream_error_from_body, ChatError};
use crate::message::HistoryMessage;
use crate::protocol::gemini::encode_request;
use crate::protocol::interactions::InteractionsRequest;
use crate::protocol::ProviderStreamKind;
use crate::settings::ChatSettings;

pub type UpstreamBytes = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

/// A successfully-opened upstream response stream, tagged with the shape
/// its records will arrive in.
pub struct UpstreamStream {
    pub kind: ProviderStreamKind,
    pub bytes: UpstreamBytes,
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Issues streaming chat requests against configured providers.
///
/// Holds no per-request state: everything request-scoped arrives in the
/// settings snapshot, and cancellation is the caller's token.
pub struct ProviderAdapter {
    client: reqwest::Client,
    providers: FxHashMap<String, ProviderConfig>,
}

impl ProviderAdapter {
    /// Build an adapter with connection pooling and timeouts from the server
    /// config.
    #[must_use]
    pub fn new(server: &ServerConfig, providers: &[ProviderConfig]) -> Self {
        let client = reqwest::Client::builder()
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(server.timeout))
            .build()
            .unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to build configured HTTP client, falling back to default client");
                reqwest::Client::new()
            });

        let providers = providers
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect();

        Self { client, providers }
    }

    /// Send one chat request and return the upstream byte stream.
    ///
    /// # Errors
    ///
    /// - [`ChatError::InvalidRequest`] when `history` is empty or its last
    ///   turn carries neither text nor attachments.
    /// - [`ChatError::Config`] when the selected provider is unknown or has
    ///   no credential in the settings snapshot — surfaced before any
    ///   network I/O.
    /// - [`ChatError::Upstream`] when the initial response is non-2xx; the
    ///   body's error message is surfaced verbatim, never as a partial
    ///   stream.
    /// - [`ChatError::Cancelled`] when `cancel` fires before the response
    ///   headers arrive.
    pub async fn send_chat(
        &self,
        history: &[HistoryMessage],
        settings: &ChatSettings,
        cancel: &CancellationToken,
    ) -> Result<UpstreamStream, ChatError> {
        let Some(last) = history.last() else {
            return Err(ChatError::InvalidRequest(
                "history must contain at least one turn".to_string(),
            ));
        };
        if !last.has_payload() {
            return Err(ChatError::InvalidRequest(
                "last turn must carry text or an attachment".to_string(),
            ));
        }

        let provider = self.providers.get(&settings.provider).ok_or_else(|| {
            ChatError::Config(format!("unknown provider '{}'", settings.provider))
        })?;
        let Some(api_key) = settings.api_key() else {
            return Err(ChatError::Config(format!(
                "{} API Key is required. Please update your Settings.",
                settings.provider
            )));
        };

        let (kind, request) = match provider.kind {
            ProviderWireKind::Gemini if settings.tools.deep_research => {
                let url = format!("{}/v1beta/interactions?alt=sse", provider.base_url);
                let body = InteractionsRequest::deep_research(last.content.clone());
                let request = self
                    .client
                    .post(url)
                    .header("x-goog-api-key", api_key)
                    .json(&body);
                (ProviderStreamKind::Interactions, request)
            }
            ProviderWireKind::Gemini => {
                let url = format!(
                    "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
                    provider.base_url, settings.model
                );
                let body = encode_request(history, settings);
                let request = self
                    .client
                    .post(url)
                    .header("x-goog-api-key", api_key)
                    .json(&body);
                (ProviderStreamKind::Gemini, request)
            }
            ProviderWireKind::Plain => {
                let body = serde_json::json!({
                    "messages": history,
                    "settings": settings,
                });
                let request = self
                    .client
                    .post(provider.base_url.clone())
                    .bearer_auth(api_key)
                    .json(&body);
                (ProviderStreamKind::Plain, request)
            }
        };

        debug!(
            provider = %settings.provider,
            model = %settings.model,
            kind = ?kind,
            turns = history.len(),
            "sending chat request"
        );

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ChatError::Cancelled),
            result = request.send() => {
                result.map_err(|err| ChatError::Transport(err.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_error_from_body(status.as_u16(), &body));
        }

        Ok(UpstreamStream {
            kind,
            bytes: Box::pin(response.bytes_stream()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderWireKind;

    fn adapter() -> ProviderAdapter {
        ProviderAdapter::new(
            &ServerConfig::default(),
            &[ProviderConfig {
                name: "google".to_string(),
                kind: ProviderWireKind::Gemini,
                base_url: "http://127.0.0.1:9".to_string(),
                description: String::new(),
            }],
        )
    }

    fn user_turn(content: &str) -> HistoryMessage {
        HistoryMessage {
            content: content.to_string(),
            ..HistoryMessage::default()
        }
    }

    #[tokio::test]
    async fn empty_history_is_invalid() {
        let err = adapter()
            .send_chat(&[], &ChatSettings::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn empty_last_turn_is_invalid() {
        let err = adapter()
            .send_chat(
                &[user_turn("  ")],
                &ChatSettings::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn missing_credential_fails_before_network() {
        // base_url points at a closed port: a config error proves no
        // connection was attempted.
        let err = adapter()
            .send_chat(
                &[user_turn("hi")],
                &ChatSettings::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            ChatError::Config(message) => {
                assert!(message.contains("google API Key is required"));
            }
            other => panic!("expected Config, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_provider_is_config_error() {
        let mut settings = ChatSettings::default();
        settings.provider = "nonexistent".to_string();
        settings
            .api_keys
            .insert("nonexistent".to_string(), "k".to_string());

        let err = adapter()
            .send_chat(&[user_turn("hi")], &settings, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let mut settings = ChatSettings::default();
        settings
            .api_keys
            .insert("google".to_string(), "k-123".to_string());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = adapter()
            .send_chat(&[user_turn("hi")], &settings, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Cancelled));
    }
}
