//! Native Gemini wire shapes: the `streamGenerateContent` request we build
//! from a conversation, and the streamed chunk shape we normalize.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::delta::{push_reasoning, push_text, DeltaVec, NormalizedDelta};
use crate::message::{FunctionCall, HistoryMessage, Role};
use crate::settings::ChatSettings;

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GeminiTool>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
pub enum GeminiPart {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "inlineData")]
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    #[serde(rename = "functionCall")]
    FunctionCall {
        name: String,
        args: serde_json::Value,
    },
    #[serde(rename = "functionResponse")]
    FunctionResponse {
        name: String,
        response: serde_json::Value,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmptyConfig {}

#[derive(Debug, Clone, Serialize)]
pub enum GeminiTool {
    #[serde(rename = "googleSearch")]
    GoogleSearch(EmptyConfig),
    /// Legacy search grounding for 1.5-generation models.
    #[serde(rename = "googleSearchRetrieval")]
    GoogleSearchRetrieval(EmptyConfig),
    #[serde(rename = "codeExecution")]
    CodeExecution(EmptyConfig),
    #[serde(rename = "functionDeclarations")]
    FunctionDeclarations(Vec<serde_json::Value>),
    #[serde(rename = "url_context")]
    UrlContext(EmptyConfig),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GeminiThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiThinkingConfig {
    pub include_thoughts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
}

// ---------------------------------------------------------------------------
// Request encoding
// ---------------------------------------------------------------------------

/// Encode a conversation plus settings into a `streamGenerateContent` body.
#[must_use]
pub fn encode_request(history: &[HistoryMessage], settings: &ChatSettings) -> GeminiRequest {
    let mut contents = Vec::with_capacity(history.len());
    for message in history {
        let mut parts = Vec::with_capacity(1 + message.attachments.len());

        let is_assistant = message.role == Role::Assistant;
        let include_reasoning = !settings.exclude_thinking_on_submit
            && is_assistant
            && message
                .reasoning_content
                .as_deref()
                .is_some_and(|r| !r.is_empty());

        // Reasoning is re-submitted as a quoted thought block; display always
        // uses the raw accumulated text.
        let text = if include_reasoning {
            let reasoning = message.reasoning_content.as_deref().unwrap_or_default();
            format!("<thought>\n{reasoning}\n</thought>\n\n{}", message.content)
        } else {
            message.content.clone()
        };
        if !text.is_empty() {
            parts.push(GeminiPart::Text(text));
        }

        for attachment in &message.attachments {
            if let Some(extracted) = &attachment.content {
                parts.push(GeminiPart::Text(format!(
                    "\n[File: {}]\n{extracted}\n",
                    attachment.name
                )));
            } else if let Some(data_url) = &attachment.data {
                if let Some((_, base64_data)) = data_url.split_once("base64,") {
                    parts.push(GeminiPart::InlineData {
                        mime_type: attachment.mime_type.clone(),
                        data: base64_data.to_string(),
                    });
                }
            }
        }

        if is_assistant {
            for call in &message.function_calls {
                parts.push(GeminiPart::FunctionCall {
                    name: call.name.clone(),
                    args: call.args.clone(),
                });
            }
        }

        // The API rejects completely empty parts.
        if parts.is_empty() {
            parts.push(GeminiPart::Text(" ".to_string()));
        }

        contents.push(GeminiContent {
            role: Some(if is_assistant { "model" } else { "user" }),
            parts,
        });

        // Responses paired by position with the calls above go into a
        // separate function-role turn following the model turn.
        let responses = paired_function_responses(message);
        if !responses.is_empty() {
            contents.push(GeminiContent {
                role: Some("function"),
                parts: responses,
            });
        }
    }

    let system_instruction = if settings.system_instruction.is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text(settings.system_instruction.clone())],
        })
    };

    GeminiRequest {
        contents,
        system_instruction,
        tools: build_tools(settings),
        generation_config: build_generation_config(settings),
    }
}

fn paired_function_responses(message: &HistoryMessage) -> Vec<GeminiPart> {
    let mut parts = Vec::new();
    for (index, response) in message.function_responses.iter().enumerate() {
        let Some(response) = response else { continue };
        let Some(call) = message.function_calls.get(index) else {
            continue;
        };
        parts.push(GeminiPart::FunctionResponse {
            name: call.name.clone(),
            response: response.clone(),
        });
    }
    parts
}

fn build_tools(settings: &ChatSettings) -> Vec<GeminiTool> {
    let mut tools = Vec::new();

    // URL context works best with search grounding also active, so search is
    // enabled whenever either toggle is on.
    let enable_search = settings.tools.google_search || settings.tools.url_context;
    if enable_search {
        if settings.model.contains("1.5") {
            tools.push(GeminiTool::GoogleSearchRetrieval(EmptyConfig {}));
        } else {
            tools.push(GeminiTool::GoogleSearch(EmptyConfig {}));
        }
    }

    if settings.tools.code_execution {
        tools.push(GeminiTool::CodeExecution(EmptyConfig {}));
    }

    if settings.tools.function_calling {
        if let Some(raw) = settings.function_declarations.as_deref() {
            match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
                Ok(declarations) if !declarations.is_empty() => {
                    tools.push(GeminiTool::FunctionDeclarations(declarations));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "failed to parse function declarations");
                }
            }
        }
    }

    if settings.tools.url_context {
        tools.push(GeminiTool::UrlContext(EmptyConfig {}));
    }

    tools
}

fn build_generation_config(settings: &ChatSettings) -> GeminiGenerationConfig {
    let thinking_config = if settings.thinking && !settings.model.contains("2.0-flash") {
        if settings.model.contains("gemini-3") {
            Some(GeminiThinkingConfig {
                include_thoughts: true,
                thinking_level: Some(settings.thinking_level.to_string()),
                thinking_budget: None,
            })
        } else {
            Some(GeminiThinkingConfig {
                include_thoughts: true,
                thinking_level: None,
                thinking_budget: Some(settings.thinking_budget),
            })
        }
    } else {
        None
    };

    GeminiGenerationConfig {
        temperature: settings.temperature,
        top_p: settings.advanced.top_p,
        top_k: settings.advanced.top_k,
        max_output_tokens: settings.advanced.max_output_tokens,
        stop_sequences: if settings.advanced.stop_sequences.is_empty() {
            None
        } else {
            Some(settings.advanced.stop_sequences.clone())
        },
        thinking_config,
    }
}

// ---------------------------------------------------------------------------
// Response chunk decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
    #[serde(default, rename = "groundingMetadata")]
    grounding_metadata: Option<serde_json::Value>,
    #[serde(default, rename = "urlContextMetadata")]
    url_context_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default, rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

/// Decode one native Gemini chunk. Returns `false` when the payload matched
/// no part of the shape.
pub(crate) fn decode_chunk(value: &serde_json::Value, out: &mut DeltaVec) -> bool {
    let Ok(chunk) = serde_json::from_value::<GeminiChunk>(value.clone()) else {
        return false;
    };

    if let Some(error) = &chunk.error {
        let message = error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| error.to_string(), ToString::to_string);
        out.push(NormalizedDelta::StreamError { message });
        return true;
    }

    let Some(candidate) = chunk.candidates.first() else {
        return false;
    };

    if let Some(content) = &candidate.content {
        for part in &content.parts {
            if let Some(call) = &part.function_call {
                out.push(NormalizedDelta::FunctionCall(call.clone()));
                continue;
            }
            let Some(text) = &part.text else { continue };
            if part.thought {
                push_reasoning(out, text);
            } else {
                push_text(out, text);
            }
        }
    }

    if candidate.grounding_metadata.is_some() || candidate.url_context_metadata.is_some() {
        out.push(NormalizedDelta::Metadata {
            grounding: candidate.grounding_metadata.clone(),
            url_context: candidate.url_context_metadata.clone(),
        });
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Attachment;
    use serde_json::json;

    fn user(content: &str) -> HistoryMessage {
        HistoryMessage {
            role: Role::User,
            content: content.to_string(),
            ..HistoryMessage::default()
        }
    }

    fn assistant(content: &str) -> HistoryMessage {
        HistoryMessage {
            role: Role::Assistant,
            content: content.to_string(),
            ..HistoryMessage::default()
        }
    }

    #[test]
    fn roles_remap_to_model_and_user() {
        let request = encode_request(
            &[user("hi"), assistant("hello"), user("more")],
            &ChatSettings::default(),
        );
        let roles: Vec<_> = request.contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec![Some("user"), Some("model"), Some("user")]);
    }

    #[test]
    fn reasoning_is_resubmitted_as_thought_block() {
        let mut turn = assistant("the answer");
        turn.reasoning_content = Some("chain of thought".to_string());
        let settings = ChatSettings {
            exclude_thinking_on_submit: false,
            ..ChatSettings::default()
        };

        let request = encode_request(&[user("q"), turn], &settings);
        match &request.contents[1].parts[0] {
            GeminiPart::Text(text) => {
                assert_eq!(text, "<thought>\nchain of thought\n</thought>\n\nthe answer");
            }
            other => panic!("expected text part, got {other:?}"),
        }
    }

    #[test]
    fn reasoning_is_dropped_when_excluded() {
        let mut turn = assistant("the answer");
        turn.reasoning_content = Some("chain of thought".to_string());

        let request = encode_request(&[user("q"), turn], &ChatSettings::default());
        match &request.contents[1].parts[0] {
            GeminiPart::Text(text) => assert_eq!(text, "the answer"),
            other => panic!("expected text part, got {other:?}"),
        }
    }

    #[test]
    fn attachments_become_text_and_inline_parts() {
        let mut turn = user("see files");
        turn.attachments = vec![
            Attachment {
                name: "notes.txt".to_string(),
                mime_type: "text/plain".to_string(),
                data: None,
                content: Some("extracted".to_string()),
            },
            Attachment {
                name: "pic.png".to_string(),
                mime_type: "image/png".to_string(),
                data: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
                content: None,
            },
        ];

        let request = encode_request(&[turn], &ChatSettings::default());
        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 3);
        match &parts[1] {
            GeminiPart::Text(text) => assert!(text.contains("[File: notes.txt]")),
            other => panic!("expected text part, got {other:?}"),
        }
        match &parts[2] {
            GeminiPart::InlineData { mime_type, data } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, "iVBORw0KGgo=");
            }
            other => panic!("expected inline data, got {other:?}"),
        }
    }

    #[test]
    fn empty_turn_gets_placeholder_part() {
        let request = encode_request(&[assistant("")], &ChatSettings::default());
        match &request.contents[0].parts[0] {
            GeminiPart::Text(text) => assert_eq!(text, " "),
            other => panic!("expected placeholder, got {other:?}"),
        }
    }

    #[test]
    fn function_calls_and_responses_are_encoded() {
        let mut turn = assistant("");
        turn.function_calls = vec![FunctionCall {
            name: "get_weather".to_string(),
            args: json!({"city": "SF"}),
        }];
        turn.function_responses = vec![Some(json!({"temp": 72}))];

        let request = encode_request(&[turn], &ChatSettings::default());
        assert_eq!(request.contents.len(), 2);
        assert!(matches!(
            &request.contents[0].parts[1],
            GeminiPart::FunctionCall { name, .. } if name == "get_weather"
        ));
        assert_eq!(request.contents[1].role, Some("function"));
        match &request.contents[1].parts[0] {
            GeminiPart::FunctionResponse { name, response } => {
                assert_eq!(name, "get_weather");
                assert_eq!(response["temp"], 72);
            }
            other => panic!("expected function response, got {other:?}"),
        }
    }

    #[test]
    fn url_context_auto_enables_search() {
        let mut settings = ChatSettings::default();
        settings.tools.url_context = true;
        settings.model = "gemini-2.5-flash".to_string();

        let request = encode_request(&[user("hi")], &settings);
        let wire = serde_json::to_value(&request.tools).unwrap();
        assert_eq!(wire, json!([{"googleSearch": {}}, {"url_context": {}}]));
    }

    #[test]
    fn legacy_models_use_search_retrieval() {
        let mut settings = ChatSettings::default();
        settings.tools.google_search = true;
        settings.model = "gemini-1.5-pro".to_string();

        let request = encode_request(&[user("hi")], &settings);
        let wire = serde_json::to_value(&request.tools).unwrap();
        assert_eq!(wire, json!([{"googleSearchRetrieval": {}}]));
    }

    #[test]
    fn function_declarations_parse_and_unparseable_are_skipped() {
        let mut settings = ChatSettings::default();
        settings.tools.function_calling = true;
        settings.function_declarations =
            Some(r#"[{"name": "get_weather", "parameters": {}}]"#.to_string());

        let request = encode_request(&[user("hi")], &settings);
        assert!(matches!(
            &request.tools[0],
            GeminiTool::FunctionDeclarations(decls) if decls.len() == 1
        ));

        settings.function_declarations = Some("{not json".to_string());
        let request = encode_request(&[user("hi")], &settings);
        assert!(request.tools.is_empty());
    }

    #[test]
    fn thinking_config_by_model_family() {
        let mut settings = ChatSettings::default();
        settings.thinking = true;

        // 2.0-flash never gets a thinking config
        settings.model = "gemini-2.0-flash".to_string();
        let request = encode_request(&[user("hi")], &settings);
        assert!(request.generation_config.thinking_config.is_none());

        // gemini-3 models are steered by level
        settings.model = "gemini-3-pro-preview".to_string();
        settings.thinking_level = crate::settings::ThinkingLevel::High;
        let request = encode_request(&[user("hi")], &settings);
        let config = request.generation_config.thinking_config.unwrap();
        assert_eq!(config.thinking_level.as_deref(), Some("high"));
        assert!(config.thinking_budget.is_none());

        // budget models get the explicit budget
        settings.model = "gemini-2.5-pro".to_string();
        settings.thinking_budget = 4096;
        let request = encode_request(&[user("hi")], &settings);
        let config = request.generation_config.thinking_config.unwrap();
        assert_eq!(config.thinking_budget, Some(4096));
        assert!(config.thinking_level.is_none());
    }

    #[test]
    fn stop_sequences_only_when_non_empty() {
        let mut settings = ChatSettings::default();
        let request = encode_request(&[user("hi")], &settings);
        assert!(request.generation_config.stop_sequences.is_none());

        settings.advanced.stop_sequences = vec!["END".to_string()];
        let request = encode_request(&[user("hi")], &settings);
        assert_eq!(
            request.generation_config.stop_sequences,
            Some(vec!["END".to_string()])
        );
    }

    // -- chunk decoding --

    fn decode(value: serde_json::Value) -> DeltaVec {
        let mut out = DeltaVec::new();
        assert!(decode_chunk(&value, &mut out));
        out
    }

    #[test]
    fn text_and_thought_parts() {
        let out = decode(json!({
            "candidates": [{"content": {"parts": [
                {"text": "pondering", "thought": true},
                {"text": "result"}
            ]}}]
        }));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], NormalizedDelta::Reasoning("pondering".to_string()));
        assert_eq!(out[1], NormalizedDelta::Text("result".to_string()));
    }

    #[test]
    fn function_call_part() {
        let out = decode(json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "get_weather", "args": {"city": "SF"}}}
            ]}}]
        }));
        match &out[0] {
            NormalizedDelta::FunctionCall(call) => assert_eq!(call.name, "get_weather"),
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn grounding_metadata_on_candidate() {
        let out = decode(json!({
            "candidates": [{
                "content": {"parts": [{"text": "cited"}]},
                "groundingMetadata": {"groundingChunks": [{"web": {"uri": "http://x"}}]}
            }]
        }));
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], NormalizedDelta::Text(_)));
        match &out[1] {
            NormalizedDelta::Metadata {
                grounding: Some(grounding),
                ..
            } => {
                assert_eq!(grounding["groundingChunks"][0]["web"]["uri"], "http://x");
            }
            other => panic!("expected Metadata, got {other:?}"),
        }
    }

    #[test]
    fn error_chunk() {
        let out = decode(json!({"error": {"code": 429, "message": "quota"}}));
        assert_eq!(
            out.as_slice(),
            [NormalizedDelta::StreamError {
                message: "quota".to_string()
            }]
        );
    }

    #[test]
    fn empty_chunk_is_unrecognized() {
        let mut out = DeltaVec::new();
        assert!(!decode_chunk(&json!({"usageMetadata": {}}), &mut out));
    }
}
