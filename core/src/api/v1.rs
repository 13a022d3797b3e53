//! Version 1 of the HTTP API, mounted under `/api/llm`.
//!
//! Handlers are thin: decode the body, check required fields, delegate to the
//! store, executor or discovery, and wrap the outcome in the `{success, ...}`
//! envelope. Bodies are decoded by hand so a malformed payload maps to a 500
//! with the envelope rather than the extractor's plain-text rejection.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::Level;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agents::client::LlmClient;
use crate::agents::config::{self, ParamOverrides, ProviderConfig, Settings};
use crate::agents::discovery::discover_models;
use crate::agents::store::{DeleteOutcome, ProviderStore};
use crate::executor::{TaskExecutor, TaskRequest};
use crate::logging::log_event;

/// Shared state injected into each handler.
#[derive(Clone)]
pub struct ApiState {
    pub store: ProviderStore,
    pub executor: TaskExecutor,
    pub client: LlmClient,
}

impl ApiState {
    pub fn new(store: ProviderStore, client: LlmClient) -> Self {
        Self {
            executor: TaskExecutor::new(store.clone(), client.clone()),
            store,
            client,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/llm/execute", post(execute_task))
        .route("/api/llm/models", post(list_models))
        .route("/api/llm/config", get(get_config).post(save_config))
        .route("/api/llm/provider", post(save_provider).delete(delete_provider))
        .route("/api/llm/default-model", get(default_model))
        .with_state(state)
}

fn success(body: Value) -> Response {
    let mut payload = json!({ "success": true });
    config::merge_json(&mut payload, body);
    (StatusCode::OK, Json(payload)).into_response()
}

fn failure(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.to_string() })),
    )
        .into_response()
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|err| {
        log_event(
            Level::Warn,
            Some("API-1000"),
            "llm.api",
            "Rejected malformed request body",
            None,
            Some(json!({ "error": err.to_string() })),
        );
        failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Invalid request body: {err}"),
        )
    })
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteInput {
    task_type: Option<String>,
    provider_id: Option<String>,
    model_id: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    model_params: Option<ParamOverrides>,
}

/// POST /api/llm/execute
async fn execute_task(State(state): State<ApiState>, body: Bytes) -> Response {
    let input: ExecuteInput = match decode(&body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let (Some(task_type), Some(provider_id), Some(model_id)) = (
        present(input.task_type),
        present(input.provider_id),
        present(input.model_id),
    ) else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing required fields: taskType, providerId, modelId",
        );
    };

    let result = state
        .executor
        .execute(TaskRequest {
            task_type,
            provider_id,
            model_id,
            params: input.params,
            model_params: input.model_params,
        })
        .await;
    let status = if result.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(result)).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelsInput {
    base_url: Option<String>,
    api_key: Option<String>,
    /// Lets a client holding only the masked key refresh a saved provider.
    provider_id: Option<String>,
}

/// POST /api/llm/models
async fn list_models(State(state): State<ApiState>, body: Bytes) -> Response {
    let input: ModelsInput = match decode(&body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let (Some(base_url), Some(api_key)) = (present(input.base_url), present(input.api_key)) else {
        return failure(StatusCode::BAD_REQUEST, "baseUrl and apiKey are required");
    };

    let mut probe = ProviderConfig {
        id: input.provider_id.unwrap_or_default(),
        name: String::new(),
        base_url,
        api_key,
        enabled: true,
        models: None,
    };
    if !probe.id.is_empty() {
        let stored = state.store.get_provider(&probe.id).await;
        config::restore_masked_key(&mut probe, stored.as_ref());
    }

    match discover_models(&state.client, &probe.base_url, &probe.api_key).await {
        Ok(models) => success(json!({ "models": models })),
        Err(err) => failure(StatusCode::BAD_REQUEST, err),
    }
}

/// GET /api/llm/config
async fn get_config(State(state): State<ApiState>) -> Response {
    let settings = config::masked(&state.store.load_settings().await);
    match serde_json::to_value(&settings) {
        Ok(config) => success(json!({ "config": config })),
        Err(err) => failure(StatusCode::INTERNAL_SERVER_ERROR, err),
    }
}

#[derive(Deserialize)]
struct ConfigInput {
    config: Settings,
}

/// POST /api/llm/config
async fn save_config(State(state): State<ApiState>, body: Bytes) -> Response {
    let ConfigInput { config: mut incoming } = match decode(&body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let stored = state.store.load_settings().await;
    config::restore_masked_keys(&mut incoming, &stored);
    config::prune_dangling_references(&mut incoming);

    if state.store.save_settings(&incoming).await {
        log_event(
            Level::Info,
            Some("CFG-0004"),
            "llm.settings",
            "Settings replaced through API",
            None,
            Some(json!({ "providers": incoming.providers.len() })),
        );
        success(json!({}))
    } else {
        failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save configuration",
        )
    }
}

#[derive(Deserialize)]
struct ProviderInput {
    provider: Option<ProviderConfig>,
}

/// POST /api/llm/provider
async fn save_provider(State(state): State<ApiState>, body: Bytes) -> Response {
    let input: ProviderInput = match decode(&body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let Some(mut provider) = input.provider.filter(|p| !p.id.trim().is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "Provider id is required");
    };

    let stored = state.store.get_provider(&provider.id).await;
    config::restore_masked_key(&mut provider, stored.as_ref());

    if state.store.save_provider_config(provider).await {
        success(json!({}))
    } else {
        failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save provider")
    }
}

#[derive(Deserialize)]
struct ProviderQuery {
    id: Option<String>,
}

/// DELETE /api/llm/provider?id=X
async fn delete_provider(
    State(state): State<ApiState>,
    Query(query): Query<ProviderQuery>,
) -> Response {
    let Some(id) = present(query.id) else {
        return failure(StatusCode::BAD_REQUEST, "Provider id is required");
    };
    match state.store.delete_provider(&id).await {
        DeleteOutcome::Deleted => success(json!({})),
        DeleteOutcome::NotFound => {
            failure(StatusCode::NOT_FOUND, format!("Provider not found: {id}"))
        }
        DeleteOutcome::PersistFailed => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save configuration",
        ),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultModelQuery {
    task_type: Option<String>,
}

/// GET /api/llm/default-model?taskType=X
async fn default_model(
    State(state): State<ApiState>,
    Query(query): Query<DefaultModelQuery>,
) -> Response {
    let Some(task_type) = present(query.task_type) else {
        return failure(StatusCode::BAD_REQUEST, "taskType is required");
    };
    match state.store.get_default_model_for_task(&task_type).await {
        Some(selection) => match serde_json::to_value(&selection) {
            Ok(body) => success(body),
            Err(err) => failure(StatusCode::INTERNAL_SERVER_ERROR, err),
        },
        None => failure(
            StatusCode::NOT_FOUND,
            format!("No model available for task: {task_type}"),
        ),
    }
}
