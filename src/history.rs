//!
//! Conversation History
//!
//! An ordered log of turns guarded by a small state machine, so that only
//! transcripts a chat API accepts (`user → assistant → [tool call → tool
//! result]* → user → …`) can be built.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

/// Errors raised by illegal appends. The history is unchanged when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// The turn cannot follow the current last turn.
    #[error("Sequencing error: {0}")]
    Sequencing(String),
    /// A tool result entry lacks its call id or its content.
    #[error("Malformed tool result: {0}")]
    MalformedToolResult(String),
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Decoded JSON arguments.
    pub arguments: JsonValue,
}

impl ToolCall {
    /// Creates a tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of one tool call, sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the call this answers.
    pub id: String,
    /// Result payload.
    pub content: JsonValue,
}

impl ToolResult {
    /// Creates a tool result.
    pub fn new(id: impl Into<String>, content: impl Into<JsonValue>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    /// Reads a raw `{"id": .., "arguments": ..}` object (`"content"` is
    /// accepted in place of `"arguments"`).
    pub fn from_json(entry: &JsonValue) -> Result<Self, HistoryError> {
        let id = entry
            .get("id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                HistoryError::MalformedToolResult("tool result must have an id".to_string())
            })?;
        let content = entry
            .get("arguments")
            .or_else(|| entry.get("content"))
            .cloned()
            .unwrap_or(JsonValue::Null);
        let result = ToolResult::new(id, content);
        result.check()?;
        Ok(result)
    }

    fn check(&self) -> Result<(), HistoryError> {
        if self.id.trim().is_empty() {
            return Err(HistoryError::MalformedToolResult(
                "tool result must have an id".to_string(),
            ));
        }
        if self.content.is_null() {
            return Err(HistoryError::MalformedToolResult(format!(
                "tool result must have content; content missing for tool call id: {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    /// A user message.
    User {
        /// Message text.
        text: String,
    },
    /// An assistant text reply.
    Assistant {
        /// Message text.
        text: String,
    },
    /// An assistant turn requesting tool calls.
    ToolCall {
        /// The requested calls, in order.
        calls: Vec<ToolCall>,
    },
    /// The result of one tool call.
    ToolResult(ToolResult),
}

impl Turn {
    /// The kind tag of this turn.
    pub fn kind(&self) -> TurnKind {
        match self {
            Turn::User { .. } => TurnKind::User,
            Turn::Assistant { .. } => TurnKind::Assistant,
            Turn::ToolCall { .. } => TurnKind::ToolCall,
            Turn::ToolResult(_) => TurnKind::ToolResult,
        }
    }
}

/// Turn kinds, used to ask the state machine what may come next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnKind {
    /// User message.
    User,
    /// Assistant text.
    Assistant,
    /// Assistant tool-call request.
    ToolCall,
    /// Tool result.
    ToolResult,
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TurnKind::User => "user message",
            TurnKind::Assistant => "assistant message",
            TurnKind::ToolCall => "tool call",
            TurnKind::ToolResult => "tool result",
        })
    }
}

/// Where the conversation stands, determined by its last turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HistoryState {
    /// No turns yet.
    #[default]
    Empty,
    /// Last turn was a user message.
    AwaitingAssistant,
    /// Last turn was assistant text.
    AwaitingUserOrTool,
    /// Last turn was a tool-call request.
    AwaitingToolResult,
    /// Last turn was a tool result; more results or an assistant reply may follow.
    ToolResultsReceived,
}

impl HistoryState {
    /// The state after appending `kind`, or `None` if the append is illegal.
    pub fn next(self, kind: TurnKind) -> Option<HistoryState> {
        use HistoryState::*;
        match (self, kind) {
            (Empty | AwaitingUserOrTool, TurnKind::User) => Some(AwaitingAssistant),
            (Empty | AwaitingAssistant | ToolResultsReceived, TurnKind::Assistant) => {
                Some(AwaitingUserOrTool)
            }
            (AwaitingAssistant, TurnKind::ToolCall) => Some(AwaitingToolResult),
            (AwaitingToolResult | ToolResultsReceived, TurnKind::ToolResult) => {
                Some(ToolResultsReceived)
            }
            _ => None,
        }
    }

    /// Whether a turn of `kind` may be appended in this state.
    pub fn accepts(self, kind: TurnKind) -> bool {
        self.next(kind).is_some()
    }

    fn rule(kind: TurnKind) -> &'static str {
        match kind {
            TurnKind::User => {
                "user message must be added after an assistant message or as the first message"
            }
            TurnKind::Assistant => "assistant message must not follow another assistant turn",
            TurnKind::ToolCall => "tool call must be added right after a user message",
            TurnKind::ToolResult => {
                "tool results must follow a tool call or other tool results"
            }
        }
    }
}

/// An ordered, role-alternation-checked list of turns.
///
/// The system message is not part of the history; adapters prepend it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    #[serde(skip)]
    state: HistoryState,
}

impl ConversationHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user message.
    pub fn append_user(&mut self, text: impl Into<String>) -> Result<(), HistoryError> {
        let next = self.advance(TurnKind::User)?;
        self.turns.push(Turn::User { text: text.into() });
        self.state = next;
        Ok(())
    }

    /// Appends an assistant text reply.
    pub fn append_assistant(&mut self, text: impl Into<String>) -> Result<(), HistoryError> {
        let next = self.advance(TurnKind::Assistant)?;
        self.turns.push(Turn::Assistant { text: text.into() });
        self.state = next;
        Ok(())
    }

    /// Appends an assistant turn that requests `calls`.
    pub fn append_tool_call(&mut self, calls: Vec<ToolCall>) -> Result<(), HistoryError> {
        let next = self.advance(TurnKind::ToolCall)?;
        if calls.is_empty() {
            return Err(HistoryError::Sequencing(
                "tool call turn must carry at least one call".to_string(),
            ));
        }
        self.turns.push(Turn::ToolCall { calls });
        self.state = next;
        Ok(())
    }

    /// Appends a batch of tool results, one turn per result.
    ///
    /// Every entry is checked before anything is appended: a single malformed
    /// entry (or an empty batch) rejects the whole batch.
    pub fn append_tool_results(&mut self, results: Vec<ToolResult>) -> Result<(), HistoryError> {
        if results.is_empty() {
            return Err(HistoryError::MalformedToolResult(
                "tool result batch is empty".to_string(),
            ));
        }
        for result in &results {
            result.check()?;
        }
        let next = self.advance(TurnKind::ToolResult)?;
        self.turns.extend(results.into_iter().map(Turn::ToolResult));
        self.state = next;
        Ok(())
    }

    /// Like [`ConversationHistory::append_tool_results`] for raw JSON entries.
    pub fn append_tool_results_json(&mut self, entries: &[JsonValue]) -> Result<(), HistoryError> {
        let results = entries
            .iter()
            .map(ToolResult::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        self.append_tool_results(results)
    }

    /// Turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Iterates over turns in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// The most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when no turn has been appended.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Current state.
    pub fn state(&self) -> HistoryState {
        self.state
    }

    fn advance(&self, kind: TurnKind) -> Result<HistoryState, HistoryError> {
        self.state.next(kind).ok_or_else(|| {
            let after = match self.last() {
                Some(turn) => turn.kind().to_string(),
                None => "an empty history".to_string(),
            };
            HistoryError::Sequencing(format!(
                "cannot add {kind} after {after}: {}",
                HistoryState::rule(kind)
            ))
        })
    }
}

impl<'a> IntoIterator for &'a ConversationHistory {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
