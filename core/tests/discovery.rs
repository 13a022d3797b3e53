use httpmock::Method::GET;
use httpmock::MockServer;
use lingua_core::agents::discovery::discover_models;
use lingua_core::agents::LlmClient;
use lingua_core::TaskError;
use serde_json::json;

#[tokio::test]
async fn lists_chat_models_sorted() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/models")
                .header("authorization", "Bearer sk-live");
            then.status(200).json_body(json!({
                "object": "list",
                "data": [
                    { "id": "gpt-4", "object": "model" },
                    { "id": "text-embedding-3", "object": "model" },
                    { "id": "DALL-E-3", "object": "model" },
                    { "id": "gpt-3.5", "object": "model" },
                    { "object": "model" }
                ]
            }));
        })
        .await;

    let client = LlmClient::new().unwrap();
    let models = discover_models(&client, &server.url("/v1/"), "sk-live")
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(models, vec!["gpt-3.5", "gpt-4"]);
}

#[tokio::test]
async fn non_success_status_is_an_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models");
            then.status(401).body("{\"error\":\"invalid key\"}");
        })
        .await;

    let client = LlmClient::new().unwrap();
    let err = discover_models(&client, &server.base_url(), "bad")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TaskError::Api {
            status: 401,
            body: "{\"error\":\"invalid key\"}".into()
        }
    );
}

#[tokio::test]
async fn missing_data_list_is_invalid_format() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models");
            then.status(200).json_body(json!({ "data": { "id": "gpt-4" } }));
        })
        .await;

    let client = LlmClient::new().unwrap();
    let err = discover_models(&client, &server.base_url(), "sk")
        .await
        .unwrap_err();
    assert_eq!(err, TaskError::InvalidResponseFormat);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    let client = LlmClient::new().unwrap();
    let err = discover_models(&client, "http://127.0.0.1:9", "sk")
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Network(_)), "got {err:?}");
}
