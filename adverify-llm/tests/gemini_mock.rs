mod common;

use adverify_common::{AdverifyError, LlmConfig};
use adverify_llm::ensure_llm_ready;
use adverify_llm::gemini::GeminiClient;
use adverify_llm::traits::{LlmClient, ModelCatalog};
use adverify_llm::verifier::{Verdict, Verifier};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test-key";

fn config_for(server: &MockServer, model: Option<&str>) -> LlmConfig {
    LlmConfig::Gemini {
        api_key: KEY.to_string(),
        model: model.map(str::to_string),
        base_url: Some(format!("{}/v1beta", server.uri())),
    }
}

async fn mount_catalog(server: &MockServer, models: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(query_param("key", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn catalog_prefers_flash_models() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    mount_catalog(
        &server,
        json!([
            { "name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"] },
            { "name": "models/gemini-1.5-pro", "supportedGenerationMethods": ["generateContent"] },
            { "name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"] }
        ]),
    )
    .await;

    let client = ensure_llm_ready(&config_for(&server, None)).await.unwrap();
    assert_eq!(client.model_name(), "gemini-1.5-flash");
}

#[tokio::test]
async fn configured_model_skips_the_catalog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = ensure_llm_ready(&config_for(&server, Some("gemini-1.5-pro")))
        .await
        .unwrap();
    assert_eq!(client.model_name(), "gemini-1.5-pro");
}

#[tokio::test]
async fn catalog_follows_page_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "models/gemini-2.0-flash", "supportedGenerationMethods": ["generateContent"] }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "models/text-bison-001", "supportedGenerationMethods": ["generateText"] }],
            "nextPageToken": "page-2"
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url(
        KEY.into(),
        "unused".into(),
        &format!("{}/v1beta", server.uri()),
    )
    .unwrap();
    let models = client.list_models().await.unwrap();
    let names: Vec<_> = models.iter().map(|m| m.id()).collect();
    assert_eq!(names, vec!["text-bison-001", "gemini-2.0-flash"]);
}

#[tokio::test]
async fn no_generation_models_is_model_unavailable() {
    let server = MockServer::start().await;
    mount_catalog(
        &server,
        json!([{ "name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"] }]),
    )
    .await;

    match ensure_llm_ready(&config_for(&server, None)).await {
        Err(AdverifyError::ModelUnavailable(msg)) => assert!(msg.contains("embedding-001")),
        Err(other) => panic!("expected ModelUnavailable, got {other:?}"),
        Ok(_) => panic!("expected ModelUnavailable"),
    }
}

#[tokio::test]
async fn rejected_key_is_reported_as_credential_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .mount(&server)
        .await;

    match ensure_llm_ready(&config_for(&server, None)).await {
        Err(AdverifyError::CredentialRejected(msg)) => assert!(msg.contains("API key not valid")),
        Err(other) => panic!("expected CredentialRejected, got {other:?}"),
        Ok(_) => panic!("expected CredentialRejected"),
    }
}

#[tokio::test]
async fn blank_key_never_reaches_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = LlmConfig::Gemini {
        api_key: "  ".into(),
        model: None,
        base_url: Some(server.uri()),
    };
    assert!(matches!(
        ensure_llm_ready(&cfg).await,
        Err(AdverifyError::InputMissing(_))
    ));
}

#[tokio::test]
async fn generate_posts_the_prompt_and_joins_parts() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(query_param("key", KEY))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{ "text": "Say OK" }] }],
            "generationConfig": { "maxOutputTokens": 8 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "O" }, { "text": "K" }] },
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url(
        KEY.into(),
        "gemini-1.5-flash".into(),
        &format!("{}/v1beta", server.uri()),
    )
    .unwrap();
    let response = client.generate("Say OK", None, Some(8), None).await.unwrap();
    assert_eq!(response.text, "OK");
    assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
}

#[tokio::test]
async fn safety_blocks_are_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url(KEY.into(), "m".into(), &server.uri()).unwrap();
    let err = client.generate("x", None, None, None).await.unwrap_err();
    assert!(matches!(err, AdverifyError::Provider(ref m) if m.contains("safety")));
}

#[tokio::test]
async fn verifier_round_trip_over_gemini() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    mount_catalog(
        &server,
        json!([{ "name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent"] }]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::generation_reply(
            "```json\n{\"score\": 93, \"hallucinations\": [], \"tone_consistency\": \"Matches the calm, factual voice\", \"verdict\": \"PASS\"}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = ensure_llm_ready(&config_for(&server, None)).await.unwrap();
    let verdict = Verifier::new(client.as_ref())
        .verify(
            "Our coffee is 100% organic, fair-trade, locally roasted.",
            "Organic, fair-trade coffee, roasted right here in town.",
        )
        .await
        .unwrap();

    assert_eq!(verdict.verdict, Verdict::Pass);
    assert!(verdict.score > 80);
    assert!(verdict.hallucinations.is_empty());
    assert!(verdict.is_consistent());
}

#[tokio::test]
async fn unreachable_provider_error_hides_the_key() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}/v1beta", listener.local_addr().unwrap());
    drop(listener);

    let client =
        GeminiClient::with_base_url("SUPERSECRETKEY123".into(), "gemini-1.5-flash".into(), &base)
            .unwrap();
    let err = client.generate("hi", None, None, None).await.unwrap_err();
    assert_eq!(err.category(), "network_failure");
    assert!(!err.to_string().contains("SUPERSECRETKEY123"), "leaked: {err}");
}

#[tokio::test]
async fn configured_resource_name_hits_the_bare_model_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::generation_reply("OK")))
        .expect(1)
        .mount(&server)
        .await;

    let client = ensure_llm_ready(&config_for(&server, Some("models/gemini-1.5-flash")))
        .await
        .unwrap();
    assert_eq!(client.model_name(), "gemini-1.5-flash");
    let response = client.generate("Say OK", None, None, None).await.unwrap();
    assert_eq!(response.text, "OK");
}
