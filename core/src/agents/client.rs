use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{ModelParams, ProviderConfig};
use crate::errors::TaskError;

/// Transport timeout applied when the caller does not configure one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Body of a `/chat/completions` call. Optional limits are omitted rather
/// than sent as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    response_format: ResponseFormat,
}

impl ChatCompletionRequest {
    /// JSON-object response mode is always requested.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, params: &ModelParams) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: params.temperature,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            max_tokens: params.max_tokens,
            seed: params.seed,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

/// Token counters normalised from the provider's `usage` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageBody {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

impl From<UsageBody> for TokenUsage {
    fn from(usage: UsageBody) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
            total_tokens: usage.total_tokens.unwrap_or(0),
        }
    }
}

/// HTTP client for OpenAI-compatible endpoints. One instance is shared by
/// every execution; it holds no per-request state.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
}

impl LlmClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Lingua-Core/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self { client })
    }

    /// Single non-streaming completion. No retries.
    pub async fn chat_completion(
        &self,
        provider: &ProviderConfig,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion, TaskError> {
        let url = endpoint(&provider.base_url, "chat/completions");
        let response = self
            .client
            .post(url)
            .bearer_auth(&provider.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| TaskError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TaskError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(TaskError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionBody =
            serde_json::from_str(&body).map_err(|_| TaskError::ResponseParse {
                snippet: snippet(&body),
            })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .ok_or(TaskError::EmptyResponse)?;

        Ok(ChatCompletion {
            content,
            usage: parsed.usage.map(TokenUsage::from),
        })
    }

    /// Raw `GET /models`. The `data` array is returned untouched; filtering
    /// happens in [`crate::agents::discovery`].
    pub async fn list_models(
        &self,
        base_url: &str,
        api_key: &str,
    ) -> Result<Vec<Value>, TaskError> {
        let response = self
            .client
            .get(endpoint(base_url, "models"))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| TaskError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TaskError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(TaskError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value =
            serde_json::from_str(&body).map_err(|_| TaskError::InvalidResponseFormat)?;
        match parsed.get("data") {
            Some(Value::Array(entries)) => Ok(entries.clone()),
            _ => Err(TaskError::InvalidResponseFormat),
        }
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// At most the first 200 characters, for diagnostics.
pub fn snippet(content: &str) -> String {
    content.chars().take(200).collect()
}
