// LLM generator against a mock chat-completion endpoint.

use bruh_bot::generator::openrouter::LlmGenerator;
use bruh_bot::generator::{ContentGenerator, GenerationError, MAX_POST_CHARS};
use bruh_bot::topics::{PromptStyle, Topic, TopicCatalog};
use bruh_bot::transport::Mention;
use chrono::Utc;
use serde_json::{json, Value};
use wiremock::matchers::{bearer_token, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const COMPLETIONS: &str = "/api/v1/chat/completions";

fn generator(server: &MockServer) -> LlmGenerator {
    LlmGenerator::new(&format!("{}{}", server.uri(), COMPLETIONS), "sk-test", "test/model").unwrap()
}

fn completion(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

fn topic() -> Topic {
    Topic::new(
        "NFTs y derechos de IP en Story Protocol",
        &["nft", "ip"],
        PromptStyle::Educational,
    )
}

#[tokio::test]
async fn request_carries_persona_topic_and_hashtags() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .and(bearer_token("sk-test"))
        .and(header("HTTP-Referer", "https://github.com/bruh-bot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  IP en la blockchain, wey 🐕 #bruh  ")))
        .expect(1)
        .mount(&server)
        .await;

    let text = generator(&server).generate(&topic()).await.unwrap();
    assert_eq!(text, "IP en la blockchain, wey 🐕 #bruh");

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "test/model");
    assert_eq!(body["max_tokens"], 100);
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(body["messages"][0]["content"]
        .as_str()
        .unwrap()
        .starts_with("You are Bruh"));
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("NFTs y derechos de IP en Story Protocol"));
    assert!(user.contains("#bruh #bruhnft #nft #storyprotocol"));
}

#[tokio::test]
async fn long_completion_is_cut_to_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&"¡ay! ".repeat(100))))
        .mount(&server)
        .await;

    let text = generator(&server).generate(&topic()).await.unwrap();
    assert_eq!(text.chars().count(), MAX_POST_CHARS);
    assert!(text.ends_with("..."));
}

#[tokio::test]
async fn every_catalog_topic_fits_the_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&"x".repeat(500))))
        .mount(&server)
        .await;

    let generator = generator(&server);
    let catalog = TopicCatalog::default();
    let topics = catalog
        .domain_topics()
        .iter()
        .chain(std::iter::once(catalog.territorial()));
    for topic in topics {
        let text = generator.generate(topic).await.unwrap();
        assert!(text.chars().count() <= MAX_POST_CHARS, "{}", topic.label);
    }
}

#[tokio::test]
async fn error_object_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": {"message": "bad key"}})))
        .mount(&server)
        .await;

    match generator(&server).generate(&topic()).await {
        Err(GenerationError::Api(message)) => assert_eq!(message, "bad key"),
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_choices_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "gen-1"})))
        .mount(&server)
        .await;

    assert!(matches!(
        generator(&server).generate(&topic()).await,
        Err(GenerationError::Malformed(_))
    ));
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        generator(&server).generate(&topic()).await,
        Err(GenerationError::Malformed(_))
    ));
}

#[tokio::test]
async fn non_success_status_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(402).set_body_string("insufficient credits"))
        .mount(&server)
        .await;

    match generator(&server).generate(&topic()).await {
        Err(GenerationError::Status { status, body }) => {
            assert_eq!(status, 402);
            assert_eq!(body, "insufficient credits");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn accepted_but_not_ok_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "choices": [{"message": {"content": "queued?"}}]
        })))
        .mount(&server)
        .await;

    match generator(&server).generate(&topic()).await {
        Err(GenerationError::Status { status, .. }) => assert_eq!(status, 202),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_network_error() {
    // Nothing listens on port 9 (discard) in the test environment.
    let generator = LlmGenerator::new("http://127.0.0.1:9/v1/chat", "k", "m").unwrap();
    assert!(matches!(
        generator.generate(&topic()).await,
        Err(GenerationError::Network(_))
    ));
}

#[tokio::test]
async fn reply_prompt_includes_mention_and_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("BRUH... 🙄")))
        .mount(&server)
        .await;

    let mention = Mention {
        remote_id: "7".into(),
        text: "@bruh que es story protocol?".into(),
        created_at: Utc::now(),
        conversation_id: None,
    };
    let text = generator(&server)
        .generate_reply(&mention, Some("hilo original"))
        .await
        .unwrap();
    assert_eq!(text, "BRUH... 🙄");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("@bruh que es story protocol?"));
    assert!(user.contains("Context of the conversation: hilo original"));
}
