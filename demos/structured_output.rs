use llm_relay::{
    CompletionKind, CompletionRequest, Dispatcher, OutputSchema, Provider, Schema,
};
use std::error::Error;
use tracing_subscriber::EnvFilter;

/// A city's postal address.
#[derive(OutputSchema)]
#[allow(dead_code)]
struct Address {
    street: String,
    city: String,
    /// Two-letter country code.
    country: String,
}

/// A short profile extracted from free text.
#[derive(OutputSchema)]
#[allow(dead_code)]
struct Profile {
    name: String,
    #[schema(description = "Age in years, if stated")]
    age: Option<u32>,
    #[schema(values = ["engineer", "designer", "manager", "other"])]
    occupation: String,
    address: Address,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // The same model, rendered for every backend.
    for provider in [Provider::OpenAI, Provider::Anthropic, Provider::Mistral, Provider::Groq] {
        let document = Profile::render(provider)?;
        println!("--- {provider} ---\n{}", serde_json::to_string_pretty(&document)?);
    }

    let dispatcher = Dispatcher::from_env();
    if dispatcher.providers().is_empty() {
        println!("\nSet OPENAI_API_KEY (or another provider key) to send a request.");
        return Ok(());
    }

    let model = std::env::var("LLM_RELAY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let request = CompletionRequest::new(model, "Extract the person's profile.")
        .with_user_message(
            "Ada is a 36 year old engineer living at 12 Analytical Row, London, GB.",
        )
        .with_structured_output(Profile::schema_model()?)
        .with_usage_tracking();

    let response = dispatcher.completion(request).await?;
    match response.kind {
        CompletionKind::Structured { value } => {
            println!("\nExtracted:\n{}", serde_json::to_string_pretty(&value)?)
        }
        other => println!("\nUnexpected reply: {other:?}"),
    }
    if let Some(usage) = response.usage {
        println!("Tokens: {} in / {} out", usage.prompt_tokens, usage.completion_tokens);
    }
    Ok(())
}
