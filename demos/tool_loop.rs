use llm_relay::{
    CompletionKind, CompletionRequest, ConversationHistory, Dispatcher, Schema, ToolPack,
    ToolSchema, TurnKind,
};
use serde_json::json;
use std::error::Error;
use tracing_subscriber::EnvFilter;

/// Adds two numbers together.
#[derive(ToolSchema)]
#[schema(rename = "add_numbers")]
#[allow(dead_code)]
struct AddNumbers {
    a: f64,
    b: f64,
}

/// Multiplies two numbers together.
#[derive(ToolSchema)]
#[schema(rename = "multiply_numbers")]
#[allow(dead_code)]
struct MultiplyNumbers {
    a: f64,
    b: f64,
}

fn operands(args: &serde_json::Value) -> Result<(f64, f64), String> {
    let a = args["a"].as_f64().ok_or("`a` must be a number")?;
    let b = args["b"].as_f64().ok_or("`b` must be a number")?;
    Ok((a, b))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut tools = ToolPack::new();
    tools.register_with_handler(AddNumbers::schema_model()?, |args| {
        let (a, b) = operands(args)?;
        Ok(json!(a + b))
    })?;
    tools.register_with_handler(MultiplyNumbers::schema_model()?, |args| {
        let (a, b) = operands(args)?;
        Ok(json!(a * b))
    })?;
    println!("Tools: {:?}", tools.names());

    let dispatcher = Dispatcher::from_env();
    if dispatcher.providers().is_empty() {
        println!("Set OPENAI_API_KEY (or another provider key) to run the loop.");
        return Ok(());
    }
    let model = std::env::var("LLM_RELAY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let system = "Use the tools for arithmetic, then answer in one sentence.";

    let mut history = ConversationHistory::new();
    history.append_user("What is (3.5 * 2) + 10?")?;

    for _ in 0..5 {
        let request = CompletionRequest::new(model.clone(), system)
            .with_history(history.clone())
            .with_tools(tools.schemas());
        let response = dispatcher.completion(request).await?;

        match response.kind {
            CompletionKind::ToolCall { tool_calls } => {
                // A tool call must answer a user message.
                if !history.state().accepts(TurnKind::ToolCall) {
                    println!("Model asked for another tool round; stopping.");
                    break;
                }
                for call in &tool_calls {
                    println!("-> {}({})", call.name, call.arguments);
                }
                let results = tools.execute_all(&tool_calls);
                history.append_tool_call(tool_calls)?;
                history.append_tool_results(results)?;
            }
            CompletionKind::Message { content } => {
                println!("{content}");
                history.append_assistant(content)?;
                break;
            }
            CompletionKind::Structured { value } => {
                println!("Unexpected structured reply: {value}");
                break;
            }
        }
    }
    Ok(())
}
