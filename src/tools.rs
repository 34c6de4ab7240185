//! Tool registration and local execution of model-requested calls.

use crate::config::Provider;
use crate::history::{ToolCall, ToolResult};
use crate::schema::{Schema, SchemaError, SchemaFlavor, SchemaModel};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Represents a tool function that can be executed with decoded JSON arguments
pub type ToolHandler = Arc<dyn Fn(&JsonValue) -> Result<JsonValue, String> + Send + Sync>;

/// Errors raised when running a tool locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool with this name is in the pack.
    #[error("Tool '{0}' not found in tool pack")]
    NotFound(String),
    /// The tool is declared but has no local handler.
    #[error("Tool '{0}' has no handler")]
    NoHandler(String),
    /// The handler returned an error.
    #[error("Tool '{name}' failed: {message}")]
    Failed {
        /// Tool name.
        name: String,
        /// Handler error message.
        message: String,
    },
}

struct Entry {
    schema: Arc<SchemaModel>,
    handler: Option<ToolHandler>,
}

/// An ordered set of tool schemas offered to the model in one request,
/// each optionally paired with a local handler.
#[derive(Default, Clone)]
pub struct ToolPack {
    entries: Vec<Arc<Entry>>,
}

impl fmt::Debug for ToolPack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolPack").field("tools", &self.names()).finish()
    }
}

impl ToolPack {
    /// Create a new empty tool pack
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool without a local handler.
    ///
    /// # Errors
    ///
    /// `SchemaError::Definition` when `schema` is not a tool model or its
    /// name is already taken.
    pub fn register(&mut self, schema: Arc<SchemaModel>) -> Result<(), SchemaError> {
        self.insert(schema, None)
    }

    /// Adds a tool together with the function that runs it.
    pub fn register_with_handler<F>(&mut self, schema: Arc<SchemaModel>, handler: F) -> Result<(), SchemaError>
    where
        F: Fn(&JsonValue) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        self.insert(schema, Some(Arc::new(handler)))
    }

    /// Adds the tool described by a derived [`Schema`] type.
    pub fn register_schema<T: Schema>(&mut self) -> Result<(), SchemaError> {
        self.register(T::schema_model()?)
    }

    fn insert(&mut self, schema: Arc<SchemaModel>, handler: Option<ToolHandler>) -> Result<(), SchemaError> {
        if schema.flavor() != SchemaFlavor::Tool {
            return Err(SchemaError::Definition(format!(
                "`{}` is an output model and cannot be registered as a tool",
                schema.name()
            )));
        }
        if self.get(schema.name()).is_some() {
            return Err(SchemaError::Definition(format!(
                "tool `{}` is already registered",
                schema.name()
            )));
        }
        debug!(tool = schema.name(), handler = handler.is_some(), "Registered tool");
        self.entries.push(Arc::new(Entry { schema, handler }));
        Ok(())
    }

    /// Looks a tool schema up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<SchemaModel>> {
        self.entry(name).map(|entry| &entry.schema)
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|entry| entry.schema.name() == name)
            .map(|entry| entry.as_ref())
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.schema.name()).collect()
    }

    /// Tool schemas in registration order, ready for
    /// [`CompletionRequest::with_tools`](crate::CompletionRequest::with_tools).
    pub fn schemas(&self) -> Vec<Arc<SchemaModel>> {
        self.entries.iter().map(|entry| Arc::clone(&entry.schema)).collect()
    }

    /// Number of tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders every tool for `provider`, in registration order.
    pub fn render(&self, provider: Provider) -> Result<Vec<JsonValue>, SchemaError> {
        self.entries.iter().map(|entry| entry.schema.render(provider)).collect()
    }

    /// Runs one tool call with its local handler. A `null` result becomes `{}`.
    pub fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let entry = self
            .entry(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let handler = entry
            .handler
            .as_ref()
            .ok_or_else(|| ToolError::NoHandler(call.name.clone()))?;

        debug!(tool = %call.name, id = %call.id, "Executing tool");
        let content = handler(&call.arguments).map_err(|message| ToolError::Failed {
            name: call.name.clone(),
            message,
        })?;
        // A result must carry content to enter the history.
        let content = match content {
            JsonValue::Null => json!({}),
            content => content,
        };
        Ok(ToolResult::new(call.id.clone(), content))
    }

    /// Runs every call in order. Failures become `{"error": message}`
    /// results so the batch can still be appended to the history.
    pub fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        calls
            .iter()
            .map(|call| {
                self.execute(call).unwrap_or_else(|err| {
                    warn!(tool = %call.name, error = %err, "Tool execution failed");
                    ToolResult::new(call.id.clone(), json!({ "error": err.to_string() }))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn add_tool() -> Arc<SchemaModel> {
        Arc::new(
            SchemaModel::tool("add")
                .documentation("Add two numbers")
                .field("a", Field::integer().build().unwrap())
                .field("b", Field::integer().build().unwrap())
                .build()
                .unwrap(),
        )
    }

    fn add(args: &JsonValue) -> Result<JsonValue, String> {
        let a = args.get("a").and_then(JsonValue::as_i64).ok_or("missing a")?;
        let b = args.get("b").and_then(JsonValue::as_i64).ok_or("missing b")?;
        Ok(json!(a + b))
    }

    #[test]
    fn test_tool_pack() {
        let mut pack = ToolPack::new();
        pack.register_with_handler(add_tool(), add).unwrap();
        pack.register(Arc::new(SchemaModel::tool("noop").build().unwrap())).unwrap();

        assert_eq!(pack.len(), 2);
        assert_eq!(pack.names(), ["add", "noop"]);
        assert_eq!(pack.render(Provider::OpenAI).unwrap()[0]["function"]["name"], "add");

        let result = pack
            .execute(&ToolCall::new("call_1", "add", json!({"a": 5, "b": 3})))
            .unwrap();
        assert_eq!(result, ToolResult::new("call_1", json!(8)));

        let error = pack.execute(&ToolCall::new("call_2", "multiply", json!({})));
        assert_eq!(error, Err(ToolError::NotFound("multiply".to_string())));
        let error = pack.execute(&ToolCall::new("call_3", "noop", json!({})));
        assert_eq!(error, Err(ToolError::NoHandler("noop".to_string())));
    }

    #[test]
    fn rejects_duplicates_and_output_models() {
        let mut pack = ToolPack::new();
        pack.register(add_tool()).unwrap();
        assert!(matches!(pack.register(add_tool()), Err(SchemaError::Definition(_))));

        let output = Arc::new(SchemaModel::output("Answer").build().unwrap());
        assert!(matches!(pack.register(output), Err(SchemaError::Definition(_))));
        assert_eq!(pack.len(), 1);
    }

    #[test]
    fn execute_all_reports_failures_inline() {
        let mut pack = ToolPack::new();
        pack.register_with_handler(add_tool(), add).unwrap();
        let results = pack.execute_all(&[
            ToolCall::new("c1", "add", json!({"a": 1, "b": 2})),
            ToolCall::new("c2", "add", json!({"a": 1})),
        ]);
        assert_eq!(results[0].content, json!(3));
        assert_eq!(results[1].id, "c2");
        assert_eq!(results[1].content, json!({"error": "Tool 'add' failed: missing b"}));
    }

    #[test]
    fn null_handler_results_can_join_the_history() {
        let mut pack = ToolPack::new();
        pack.register_with_handler(Arc::new(SchemaModel::tool("noop").build().unwrap()), |_| {
            Ok(JsonValue::Null)
        })
        .unwrap();
        let calls = vec![ToolCall::new("c1", "noop", json!({}))];

        let results = pack.execute_all(&calls);
        assert_eq!(results, vec![ToolResult::new("c1", json!({}))]);

        let mut history = crate::history::ConversationHistory::new();
        history.append_user("do nothing").unwrap();
        history.append_tool_call(calls).unwrap();
        history.append_tool_results(results).unwrap();
        assert_eq!(history.len(), 3);
    }
}
