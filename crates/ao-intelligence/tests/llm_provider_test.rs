use ao_intelligence::llm::{
    AnthropicProvider, CompletionRequest, LlmError, LlmProvider, LlmRole, MockProvider,
};

// ===========================================================================
// CompletionRequest
// ===========================================================================

#[test]
fn test_request_builder_orders_messages() {
    let req = CompletionRequest::new("m", 100)
        .user("first")
        .assistant("second")
        .user("third")
        .with_temperature(0.2);
    let roles: Vec<LlmRole> = req.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![LlmRole::User, LlmRole::Assistant, LlmRole::User]);
    assert_eq!(req.temperature, Some(0.2));
    assert!(req.system.is_none());
}

#[test]
fn test_role_serialization() {
    assert_eq!(serde_json::to_string(&LlmRole::User).unwrap(), "\"user\"");
    assert_eq!(LlmRole::Assistant.to_string(), "assistant");
}

#[test]
fn test_anthropic_body_includes_temperature_when_set() {
    let req = CompletionRequest::new("m", 10).user("hi").with_temperature(0.5);
    let body = AnthropicProvider::request_body(&req);
    assert_eq!(body["temperature"], 0.5);
    assert_eq!(body["model"], "m");
    assert!(body.get("system").is_none());
}

// ===========================================================================
// MockProvider
// ===========================================================================

#[tokio::test]
async fn test_mock_replays_queue_then_defaults() {
    let mock = MockProvider::new()
        .with_reply("{\"type\": \"bug\"}")
        .with_error(LlmError::Timeout);
    let req = CompletionRequest::new("claude-test", 50).user("go");

    let first = mock.complete(&req).await.unwrap();
    assert_eq!(first.text, "{\"type\": \"bug\"}");

    let second = mock.complete(&req).await;
    assert!(matches!(second, Err(LlmError::Timeout)));

    let third = mock.complete(&req).await.unwrap();
    assert_eq!(third.text, "Mock response");
    assert_eq!(third.model, "claude-test");

    assert_eq!(mock.requests().len(), 3);
    assert_eq!(mock.requests()[0].messages[0].content, "go");
}

#[tokio::test]
async fn test_anthropic_unreachable_is_http_error() {
    // Port 9 (discard) on localhost is closed in test environments.
    let provider = AnthropicProvider::new("key").with_base_url("http://127.0.0.1:9");
    let req = CompletionRequest::new("m", 10).user("hi");
    let err = provider.complete(&req).await.unwrap_err();
    assert!(matches!(err, LlmError::HttpError(_) | LlmError::Timeout));
}

#[test]
fn test_error_display() {
    let err = LlmError::ApiError {
        status: 500,
        message: "boom".into(),
    };
    assert_eq!(err.to_string(), "API error (status 500): boom");
    let err = LlmError::RateLimited {
        retry_after_secs: Some(30),
    };
    assert!(err.to_string().contains("30"));
}
