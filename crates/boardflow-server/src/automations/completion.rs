//! AI completion client and the AI_FILL_FIELDS prompt/response helpers.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AiConfig;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("{0}")]
    NotConfigured(String),

    #[error("AI request failed: {0}")]
    Request(String),

    #[error("AI API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse AI response: {0}")]
    Parse(String),
}

/// Single-prompt text completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageOwned,
}

#[derive(Deserialize)]
struct ChatMessageOwned {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client (OpenRouter by default).
pub struct ChatCompletionClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    referer: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(client: Client, config: &AiConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            endpoint: config.base_url.clone(),
            referer: config.referer.clone(),
        }
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            CompletionError::NotConfigured(
                "AI API key not configured (automation.ai.api_key)".into(),
            )
        })?;

        let req = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.client.post(&self.endpoint).bearer_auth(api_key).json(&req);
        if let Some(referer) = &self.referer {
            request = request.header("HTTP-Referer", referer);
        }

        let res = request
            .send()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| CompletionError::Parse(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "{}".to_string()))
    }
}

// ==================== Prompt and response handling ====================

static FENCED_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```").expect("Invalid fenced json regex")
});

static BARE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\{[\s\S]*\})").expect("Invalid json object regex"));

static LEADING_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("Invalid float regex")
});

static MONEY_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d,.]+").expect("Invalid money regex"));

pub struct PromptInput<'a> {
    pub item_name: &'a str,
    pub board_name: &'a str,
    /// Current field values keyed by column name
    pub fields: &'a Map<String, Value>,
    pub instructions: &'a str,
    /// `- <name> (<type>): <instruction>` lines
    pub field_lines: &'a [String],
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let fields = serde_json::to_string_pretty(input.fields).unwrap_or_else(|_| "{}".into());
    format!(
        "You are an AI assistant helping to fill fields in a task management board.

ITEM CONTEXT:
- Task Name: {item}
- Board: {board}
- Current Fields: {fields}

INSTRUCTIONS:
{instructions}

FIELDS TO FILL:
{lines}

Please respond with ONLY a JSON object where keys are field names and values are the content to put in each field. Do not include any markdown formatting or explanation, just the raw JSON.

Example response format:
{{\"field1\": \"value1\", \"field2\": \"value2\"}}",
        item = input.item_name,
        board = input.board_name,
        fields = fields,
        instructions = input.instructions,
        lines = input.field_lines.join("\n"),
    )
}

/// Extracts the JSON object from a completion, tolerating a markdown fence
/// or surrounding prose.
pub fn parse_field_values(content: &str) -> Result<Map<String, Value>, CompletionError> {
    let json_str = FENCED_OBJECT
        .captures(content)
        .or_else(|| BARE_OBJECT.captures(content))
        .and_then(|c| c.get(1))
        .map_or(content, |m| m.as_str());

    match serde_json::from_str::<Value>(json_str.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CompletionError::Parse("expected a JSON object".into())),
        Err(e) => Err(CompletionError::Parse(e.to_string())),
    }
}

fn number_value(f: f64) -> Option<Value> {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        serde_json::Number::from_f64(f).map(Value::Number)
    }
}

fn leading_float(s: &str) -> Option<f64> {
    LEADING_FLOAT
        .find(s)
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a model-supplied value to what a column of `column_type` stores.
pub fn coerce_field_value(column_type: &str, value: &Value) -> Value {
    match column_type {
        "number" => match value {
            Value::Number(_) => value.clone(),
            Value::String(s) => leading_float(s)
                .and_then(number_value)
                .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        "checkbox" => Value::Bool(match value {
            Value::Bool(b) => *b,
            Value::String(s) => matches!(s.as_str(), "true" | "yes" | "1"),
            _ => false,
        }),
        "money" => {
            let text = value_to_string(value);
            MONEY_DIGITS
                .find(&text)
                .and_then(|m| leading_float(&m.as_str().replace(',', "")))
                .and_then(number_value)
                .unwrap_or_else(|| Value::from(0))
        }
        _ => Value::String(value_to_string(value)),
    }
}
