use futures::StreamExt;
use llm_relay::{
    get_provider, CompletionKind, CompletionRequest, ConversationHistory, Field, LlmConfig,
    Provider, ProviderError, SchemaModel, ToolCall,
};
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn config(provider: Provider, url: &str) -> LlmConfig {
    LlmConfig::new(provider)
        .with_api_key("sk-test")
        .with_base_url(url)
        .with_retry_base_delay(Duration::from_millis(1))
}

fn weather_tool() -> Arc<SchemaModel> {
    Arc::new(
        SchemaModel::tool("get_weather")
            .documentation("Current weather for a city.")
            .field("city", Field::string().build().unwrap())
            .build()
            .unwrap(),
    )
}

fn verdict() -> Arc<SchemaModel> {
    Arc::new(
        SchemaModel::output("Verdict")
            .field("approved", Field::boolean().build().unwrap())
            .field("reason", Field::string().optional().build().unwrap())
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn openai_message_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "stream": false,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hi"}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = get_provider(config(Provider::OpenAI, &server.url())).unwrap();
    let request = CompletionRequest::new("gpt-4o-mini", "Be brief.")
        .with_user_message("Hi")
        .with_usage_tracking();
    let response = provider.completion(request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.kind, CompletionKind::Message { content: "Hello!".to_string() });
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(11));
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn openai_tool_call_then_answer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({
            "tools": [{"type": "function", "function": {"name": "get_weather"}}]
        })))
        .with_status(200)
        .with_body(
            json!({"choices": [{
                "message": {"content": null, "tool_calls": [{
                    "id": "call_1", "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                }]},
                "finish_reason": "tool_calls"
            }]})
            .to_string(),
        )
        .create_async()
        .await;

    let provider = get_provider(config(Provider::OpenAI, &server.url())).unwrap();
    let request = CompletionRequest::new("gpt-4o", "Use tools.")
        .with_user_message("Weather in Paris?")
        .with_tool(weather_tool());
    let response = provider.completion(request).await.unwrap();
    mock.assert_async().await;

    let CompletionKind::ToolCall { tool_calls } = response.kind else {
        panic!("expected tool calls");
    };
    assert_eq!(tool_calls, vec![ToolCall::new("call_1", "get_weather", json!({"city": "Paris"}))]);

    // The calls slot straight into the history.
    let mut history = ConversationHistory::new();
    history.append_user("Weather in Paris?").unwrap();
    history.append_tool_call(tool_calls).unwrap();
    history
        .append_tool_results_json(&[json!({"id": "call_1", "arguments": {"temp": 21}})])
        .unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn mistral_structured_output() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({
            "model": "mistral-small",
            "response_format": {"type": "json_schema", "json_schema": {"name": "Verdict", "strict": true}}
        })))
        .with_status(200)
        .with_body(
            json!({"choices": [{"message": {"content": "{\"approved\":true}"}, "finish_reason": "stop"}]})
                .to_string(),
        )
        .create_async()
        .await;

    let provider = get_provider(config(Provider::Mistral, &server.url())).unwrap();
    let request = CompletionRequest::new("mistral-small", "Judge.")
        .with_user_message("Ship it?")
        .with_structured_output(verdict());
    let response = provider.completion(request).await.unwrap();
    mock.assert_async().await;
    assert_eq!(response.kind, CompletionKind::Structured { value: json!({"approved": true}) });
    assert_eq!(response.usage, None);
}

#[tokio::test]
async fn anthropic_structured_output() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/messages")
        .match_header("x-api-key", "sk-test")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "model": "claude-3-5-sonnet-20241022",
            "system": "Judge.",
            "max_tokens": 8192,
            "tool_choice": {"type": "tool", "name": "Verdict"}
        })))
        .with_status(200)
        .with_body(
            json!({
                "type": "message",
                "content": [{"type": "tool_use", "id": "toolu_1", "name": "Verdict",
                             "input": {"approved": false, "reason": "tests fail"}}],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 20, "output_tokens": 8}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = get_provider(config(Provider::Anthropic, &server.url())).unwrap();
    let request = CompletionRequest::new("claude-3-5-sonnet-20241022", "Judge.")
        .with_user_message("Ship it?")
        .with_structured_output(verdict());
    let response = provider.completion(request).await.unwrap();
    mock.assert_async().await;
    assert_eq!(
        response.kind,
        CompletionKind::Structured { value: json!({"approved": false, "reason": "tests fail"}) }
    );
}

#[tokio::test]
async fn retries_transient_failures() {
    let mut server = mockito::Server::new_async().await;
    let unavailable = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body(r#"{"error":{"message":"try again"}}"#)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(json!({"choices": [{"message": {"content": "recovered"}}]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let provider = get_provider(config(Provider::OpenAI, &server.url())).unwrap();
    let request = CompletionRequest::new("gpt-4o", "sys").with_user_message("hi");
    let response = provider.completion(request).await.unwrap();

    unavailable.assert_async().await;
    ok.assert_async().await;
    assert_eq!(response.kind, CompletionKind::Message { content: "recovered".to_string() });
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
        .expect(1)
        .create_async()
        .await;

    let provider = get_provider(config(Provider::OpenAI, &server.url())).unwrap();
    let request = CompletionRequest::new("gpt-4o", "sys").with_user_message("hi");
    let err = provider.completion(request).await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(
        err,
        ProviderError::ApiError { status: 401, ref message } if message == "Incorrect API key provided"
    ));
}

#[tokio::test]
async fn retries_give_up_after_the_limit() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body("upstream exploded")
        .expect(3)
        .create_async()
        .await;

    let provider = get_provider(config(Provider::OpenAI, &server.url()).with_max_retries(2)).unwrap();
    let request = CompletionRequest::new("gpt-4o", "sys").with_user_message("hi");
    let err = provider.completion(request).await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, ProviderError::ApiError { status: 500, ref message } if message == "upstream exploded"));
}

#[tokio::test]
async fn openai_streaming() {
    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: not-json\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({"stream": true})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let provider = get_provider(config(Provider::Groq, &server.url())).unwrap();
    let request = CompletionRequest::new("llama-3.1-8b-instant-groq", "sys").with_user_message("hi");
    let stream = provider.completion_stream(request).await.unwrap();
    let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;

    mock.assert_async().await;
    assert_eq!(fragments.concat(), "Hello");
}

#[tokio::test]
async fn anthropic_streaming() {
    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Bon\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"jour\"}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    let _mock = server
        .mock("POST", "/messages")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let provider = get_provider(config(Provider::Anthropic, &server.url())).unwrap();
    let request = CompletionRequest::new("claude-3-5-haiku-20241022", "sys").with_user_message("hi");
    let fragments: Vec<String> = provider
        .completion_stream(request)
        .await
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(fragments, vec!["Bon", "jour"]);
}

#[tokio::test]
async fn streaming_rejects_tools_before_sending() {
    let server = mockito::Server::new_async().await;
    let provider = get_provider(config(Provider::OpenAI, &server.url())).unwrap();
    let request = CompletionRequest::new("gpt-4o", "sys")
        .with_user_message("hi")
        .with_tool(weather_tool());
    let err = provider.completion_stream(request).await.err().unwrap();
    assert!(matches!(err, ProviderError::InvalidRequest(_)));
}
