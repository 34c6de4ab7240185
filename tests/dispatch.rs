use llm_relay::{
    CompletionKind, CompletionRequest, ConfigError, Dispatcher, LlmConfig, Provider, ProviderError,
};
use serde_json::json;

fn openai_body(content: &str) -> String {
    json!({"choices": [{"message": {"content": content}, "finish_reason": "stop"}]}).to_string()
}

#[tokio::test]
async fn routes_by_catalog() {
    let mut openai = mockito::Server::new_async().await;
    let mut groq = mockito::Server::new_async().await;
    let openai_mock = openai
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(openai_body("from openai"))
        .expect(1)
        .create_async()
        .await;
    let groq_mock = groq
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::PartialJson(json!({"model": "qwen-2.5-32b"})))
        .with_status(200)
        .with_body(openai_body("from groq"))
        .expect(1)
        .create_async()
        .await;

    let dispatcher = Dispatcher::new()
        .with_config(LlmConfig::new(Provider::OpenAI).with_api_key("a").with_base_url(openai.url()))
        .unwrap()
        .with_config(LlmConfig::new(Provider::Groq).with_api_key("b").with_base_url(groq.url()))
        .unwrap();
    assert_eq!(dispatcher.providers(), vec![Provider::OpenAI, Provider::Groq]);

    let response = dispatcher
        .completion(CompletionRequest::new("gpt-4o", "sys").with_user_message("hi"))
        .await
        .unwrap();
    assert_eq!(response.kind, CompletionKind::Message { content: "from openai".to_string() });

    let response = dispatcher
        .completion(CompletionRequest::new("qwen-2.5-32b-groq", "sys").with_user_message("hi"))
        .await
        .unwrap();
    assert_eq!(response.kind, CompletionKind::Message { content: "from groq".to_string() });

    openai_mock.assert_async().await;
    groq_mock.assert_async().await;
}

#[tokio::test]
async fn explicit_provider_overrides_catalog() {
    let mut gateway = mockito::Server::new_async().await;
    let mock = gateway
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::PartialJson(json!({"model": "my-finetune"})))
        .with_status(200)
        .with_body(openai_body("ok"))
        .create_async()
        .await;

    let dispatcher = Dispatcher::new()
        .with_config(LlmConfig::new(Provider::Custom).with_base_url(gateway.url()))
        .unwrap();
    let request = CompletionRequest::new("my-finetune", "sys")
        .with_user_message("hi")
        .with_provider(Provider::Custom);
    dispatcher.completion(request).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn unknown_model_is_rejected() {
    let dispatcher = Dispatcher::new();
    let err = dispatcher
        .completion(CompletionRequest::new("gpt-17", "sys").with_user_message("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::UnknownModel(model) if model == "gpt-17"));
}

#[tokio::test]
async fn unconfigured_provider_is_a_config_error() {
    let dispatcher = Dispatcher::new();
    let err = dispatcher
        .completion(CompletionRequest::new("claude-3-7-sonnet-20250219", "sys").with_user_message("hi"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Config(ConfigError::MissingApiKey(Provider::Anthropic))
    ));
}

#[tokio::test]
async fn invalid_requests_fail_before_routing() {
    let dispatcher = Dispatcher::new();
    let err = dispatcher
        .completion(CompletionRequest::new("gpt-17", "sys"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest(_)));
}

#[test]
fn invalid_configs_are_rejected() {
    let err = Dispatcher::new()
        .with_config(LlmConfig::new(Provider::Mistral))
        .unwrap_err();
    assert!(matches!(err, ProviderError::Config(ConfigError::MissingApiKey(Provider::Mistral))));
}
