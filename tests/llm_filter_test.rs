// tests/llm_filter_test.rs
// The reference oracle against a mock generateContent endpoint.

use feedpilot::filter::{ContentBlock, FilterOracle, FilterResult, LlmFilter, Rule, RuleMode};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-2.0-flash";

fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    })
}

fn rules() -> Vec<Rule> {
    vec![Rule {
        id: "r1".to_string(),
        criteria: "not sensational / engagement bait".to_string(),
        mode: RuleMode::Block,
    }]
}

#[tokio::test]
async fn verdict_and_reason_come_back_from_the_model() {
    let server = MockServer::start().await;
    let completion = "```json\n{\"reason\": \"engagement bait\", \"pass_filter\": false}\n```";
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .and(body_string_contains("not sensational"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(completion)))
        .mount(&server)
        .await;

    let filter = LlmFilter::with_endpoint(&server.uri(), "test-key", MODEL).unwrap();
    let verdict = filter
        .filter(
            &[ContentBlock::text("oh my god! this thing just happened!")],
            &rules(),
        )
        .await
        .unwrap();

    assert_eq!(
        verdict,
        FilterResult::Block { reason: "engagement bait".to_string() }
    );
}

#[tokio::test]
async fn passing_content_passes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"reason": "ordinary post", "pass_filter": true}"#,
        )))
        .mount(&server)
        .await;

    let filter = LlmFilter::with_endpoint(&server.uri(), "test-key", MODEL).unwrap();
    let verdict = filter
        .filter(&[ContentBlock::text("a quiet update")], &rules())
        .await
        .unwrap();
    assert_eq!(verdict, FilterResult::Pass);
}

#[tokio::test]
async fn server_errors_surface_as_errors_for_the_caller_to_fail_open() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let filter = LlmFilter::with_endpoint(&server.uri(), "test-key", MODEL).unwrap();
    assert!(filter
        .filter(&[ContentBlock::text("anything")], &rules())
        .await
        .is_err());
}

#[tokio::test]
async fn prose_completions_are_errors_not_verdicts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "I believe this content should probably be blocked.",
        )))
        .mount(&server)
        .await;

    let filter = LlmFilter::with_endpoint(&server.uri(), "test-key", MODEL).unwrap();
    assert!(filter
        .filter(&[ContentBlock::text("anything")], &rules())
        .await
        .is_err());
}
