//! Model discovery: ask a provider which models it serves and keep only the
//! ones usable for chat completion.

use log::Level;
use serde_json::{json, Value};

use super::client::LlmClient;
use crate::errors::TaskError;
use crate::logging::log_event;

/// Substrings marking image, audio, embedding and moderation models.
const NON_CHAT_MARKERS: [&str; 5] = ["dall-e", "whisper", "tts", "embedding", "moderation"];

/// Chat-capable model ids served at `base_url`, sorted ascending.
pub async fn discover_models(
    client: &LlmClient,
    base_url: &str,
    api_key: &str,
) -> Result<Vec<String>, TaskError> {
    match client.list_models(base_url, api_key).await {
        Ok(entries) => {
            let models = filter_chat_models(entries.iter().filter_map(model_id));
            log_event(
                Level::Info,
                Some("LLM-0300"),
                "llm.discovery",
                "Model listing fetched",
                None,
                Some(json!({
                    "base_url": base_url,
                    "listed": entries.len(),
                    "kept": models.len(),
                })),
            );
            Ok(models)
        }
        Err(err) => {
            log_event(
                Level::Warn,
                Some(err.code()),
                "llm.discovery",
                "Model listing failed",
                Some(err.explain()),
                Some(json!({ "base_url": base_url, "error": err.to_string() })),
            );
            Err(err)
        }
    }
}

fn model_id(entry: &Value) -> Option<String> {
    entry.get("id").and_then(Value::as_str).map(str::to_string)
}

/// Drop non-chat models (case-insensitive) and sort what is left.
pub fn filter_chat_models<I>(ids: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut models: Vec<String> = ids
        .into_iter()
        .map(Into::into)
        .filter(|id| {
            let lower = id.to_lowercase();
            !NON_CHAT_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .collect();
    models.sort();
    models
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_blocked_models_regardless_of_case() {
        let models = filter_chat_models(["gpt-4", "text-embedding-3", "DALL-E-3", "gpt-3.5"]);
        assert_eq!(models, vec!["gpt-3.5", "gpt-4"]);
    }

    #[test]
    fn every_marker_is_blocked() {
        let models = filter_chat_models([
            "Whisper-1",
            "tts-1-hd",
            "omni-moderation-latest",
            "text-EMBEDDING-ada-002",
            "dall-e-2",
            "o3-mini",
            "claude-3-haiku",
        ]);
        assert_eq!(models, vec!["claude-3-haiku", "o3-mini"]);
    }
}
