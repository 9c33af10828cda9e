use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Thinking effort level for models that are steered by level rather than
/// by an explicit token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Minimal,
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThinkingLevel::Minimal => write!(f, "minimal"),
            ThinkingLevel::Low => write!(f, "low"),
            ThinkingLevel::Medium => write!(f, "medium"),
            ThinkingLevel::High => write!(f, "high"),
        }
    }
}

/// Per-request tool toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    pub structured_output: bool,
    pub function_calling: bool,
    pub google_search: bool,
    pub url_context: bool,
    pub code_execution: bool,
    pub deep_research: bool,
}

/// Advanced sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedSettings {
    pub stop_sequences: Vec<String>,
    pub max_output_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            stop_sequences: Vec::new(),
            max_output_tokens: 2048,
            top_p: 0.95,
            top_k: 0,
        }
    }
}

/// Read-only snapshot of generation settings for one request.
///
/// Constructed per request and passed into the provider adapter explicitly;
/// nothing in the pipeline reads ambient settings state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    pub model: String,
    pub provider: String,
    pub system_instruction: String,
    pub temperature: f64,
    pub thinking: bool,
    pub thinking_level: ThinkingLevel,
    pub thinking_budget: u32,
    pub tools: ToolSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<String>,
    pub exclude_thinking_on_submit: bool,
    pub api_keys: FxHashMap<String, String>,
    pub advanced: AdvancedSettings,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            provider: "google".to_string(),
            system_instruction: String::new(),
            temperature: 1.0,
            thinking: false,
            thinking_level: ThinkingLevel::default(),
            thinking_budget: 8192,
            tools: ToolSettings::default(),
            function_declarations: None,
            exclude_thinking_on_submit: true,
            api_keys: FxHashMap::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

impl ChatSettings {
    /// The credential for the selected provider, if configured.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_keys.get(&self.provider).map(String::as_str)
    }
}
