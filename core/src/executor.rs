//! Task executor: turns a [`TaskRequest`] into one chat completion against the
//! requested provider and hands back a uniform [`TaskResult`].
//!
//! The pipeline is provider lookup → prompt build → parameter resolution →
//! remote call → fence stripping → JSON decode → task parse. Nothing is
//! retried; a caller that wants another attempt re-issues the whole task.

use log::Level;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::agents::client::{snippet, ChatCompletionRequest, ChatMessage, LlmClient, TokenUsage};
use crate::agents::config::{self, ParamOverrides};
use crate::agents::prompts::{build_prompt, TaskOutput};
use crate::agents::store::ProviderStore;
use crate::errors::TaskError;
use crate::logging::log_event;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n?(.*?)\n?```$").expect("valid fence pattern"));

/// One task invocation as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_type: String,
    pub provider_id: String,
    pub model_id: String,
    /// Task-specific parameter bag, e.g. `{"text": "...", "from": "English"}`.
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_params: Option<ParamOverrides>,
}

/// Either parsed task data or the reason the task failed. There is no
/// partial success.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Success {
        data: TaskOutput,
        usage: Option<TokenUsage>,
    },
    Failure(TaskError),
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success { .. })
    }

    pub fn data(&self) -> Option<&TaskOutput> {
        match self {
            TaskResult::Success { data, .. } => Some(data),
            TaskResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            TaskResult::Success { .. } => None,
            TaskResult::Failure(err) => Some(err),
        }
    }
}

/// `{success:true, data, usage?}` or `{success:false, error}`.
impl Serialize for TaskResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TaskResult::Success { data, usage } => {
                let len = if usage.is_some() { 3 } else { 2 };
                let mut state = serializer.serialize_struct("TaskResult", len)?;
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
                if let Some(usage) = usage {
                    state.serialize_field("usage", usage)?;
                }
                state.end()
            }
            TaskResult::Failure(err) => {
                let mut state = serializer.serialize_struct("TaskResult", 2)?;
                state.serialize_field("success", &false)?;
                state.serialize_field("error", &err.to_string())?;
                state.end()
            }
        }
    }
}

/// Remove one markdown code fence (optionally tagged `json`) wrapping the
/// whole trimmed content. Anything else, including content fenced more than
/// once, comes back trimmed but otherwise untouched.
pub fn strip_markdown_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    match CODE_FENCE.captures(trimmed) {
        Some(caps) => {
            let inner = caps.get(1).map_or("", |m| m.as_str()).trim();
            if CODE_FENCE.is_match(inner) {
                trimmed.to_string()
            } else {
                inner.to_string()
            }
        }
        None => trimmed.to_string(),
    }
}

/// Runs tasks against the providers held in a [`ProviderStore`].
#[derive(Clone)]
pub struct TaskExecutor {
    store: ProviderStore,
    client: LlmClient,
}

impl TaskExecutor {
    pub fn new(store: ProviderStore, client: LlmClient) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &ProviderStore {
        &self.store
    }

    /// Execute one request to completion. Never fails outright; every error
    /// is folded into [`TaskResult::Failure`].
    pub async fn execute(&self, request: TaskRequest) -> TaskResult {
        let execution_id = Uuid::new_v4();
        log_event(
            Level::Debug,
            Some("LLM-0100"),
            "llm.executor",
            "Task started",
            None,
            Some(json!({
                "execution": execution_id.to_string(),
                "task": request.task_type,
                "provider": request.provider_id,
                "model": request.model_id,
            })),
        );

        match self.run(&request).await {
            Ok((data, usage)) => {
                log_event(
                    Level::Info,
                    Some("LLM-0200"),
                    "llm.executor",
                    "Task succeeded",
                    None,
                    Some(json!({
                        "execution": execution_id.to_string(),
                        "task": request.task_type,
                        "provider": request.provider_id,
                        "model": request.model_id,
                        "usage": usage,
                    })),
                );
                TaskResult::Success { data, usage }
            }
            Err(err) => {
                log_event(
                    Level::Warn,
                    Some(err.code()),
                    "llm.executor",
                    "Task failed",
                    Some(err.explain()),
                    Some(json!({
                        "execution": execution_id.to_string(),
                        "task": request.task_type,
                        "provider": request.provider_id,
                        "model": request.model_id,
                        "error": err.to_string(),
                    })),
                );
                TaskResult::Failure(err)
            }
        }
    }

    async fn run(
        &self,
        request: &TaskRequest,
    ) -> Result<(TaskOutput, Option<TokenUsage>), TaskError> {
        let settings = self.store.load_settings().await;
        let provider = settings
            .providers
            .iter()
            .find(|p| p.id == request.provider_id)
            .ok_or_else(|| TaskError::ProviderNotFound(request.provider_id.clone()))?;
        if !provider.enabled {
            let label = if provider.name.is_empty() {
                &provider.id
            } else {
                &provider.name
            };
            return Err(TaskError::ProviderDisabled(label.clone()));
        }

        let prompt = build_prompt(&request.task_type, &request.params)
            .map_err(|e| TaskError::PromptBuild(e.to_string()))?;

        let params = config::effective_params(
            &settings,
            &request.task_type,
            request.model_params.as_ref(),
        );
        let body = ChatCompletionRequest::new(
            request.model_id.clone(),
            vec![ChatMessage::system(prompt.system), ChatMessage::user(prompt.user)],
            &params,
        );

        let completion = self.client.chat_completion(provider, &body).await?;
        let normalized = strip_markdown_code_fences(&completion.content);
        let decoded: Value =
            serde_json::from_str(&normalized).map_err(|_| TaskError::ResponseParse {
                snippet: snippet(&normalized),
            })?;

        Ok((prompt.kind.parse(decoded), completion.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_tagged_fence() {
        assert_eq!(
            strip_markdown_code_fences("```json\n{\"translation\":\"你好\"}\n```"),
            "{\"translation\":\"你好\"}"
        );
    }

    #[test]
    fn strips_untagged_fence_and_surrounding_whitespace() {
        assert_eq!(
            strip_markdown_code_fences("  \n```\n{\"a\": [1, 2]}\n```  \n"),
            "{\"a\": [1, 2]}"
        );
        assert_eq!(strip_markdown_code_fences("```json {\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn leaves_unfenced_and_partial_fences_alone() {
        assert_eq!(strip_markdown_code_fences(" {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_markdown_code_fences("```json\n{\"a\":1}"), "```json\n{\"a\":1}");
        assert_eq!(
            strip_markdown_code_fences("Here you go:\n```json\n{}\n```"),
            "Here you go:\n```json\n{}\n```"
        );
    }

    #[test]
    fn stripping_is_idempotent() {
        let inputs = [
            "```json\n{\"translation\":\"你好\"}\n```",
            "```\n[1,2,3]\n```",
            "{\"plain\":true}",
            "```\n```json\n{}\n```\n```",
            "   ```json\n  {\"x\": \"```\"}  \n```",
            "",
        ];
        for input in inputs {
            let once = strip_markdown_code_fences(input);
            assert_eq!(strip_markdown_code_fences(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn result_serialises_to_wire_shape() {
        let success = TaskResult::Success {
            data: TaskOutput::Translation {
                translation: "你好".into(),
            },
            usage: None,
        };
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({ "success": true, "data": { "translation": "你好" } })
        );

        let with_usage = TaskResult::Success {
            data: TaskOutput::Raw(json!({ "anything": 1 })),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        };
        assert_eq!(
            serde_json::to_value(&with_usage).unwrap()["usage"],
            json!({ "promptTokens": 10, "completionTokens": 5, "totalTokens": 15 })
        );

        let failure = TaskResult::Failure(TaskError::ProviderDisabled("OpenAI".into()));
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({ "success": false, "error": "Provider is disabled: OpenAI" })
        );
    }
}
