//!
//! Schema Models
//!
//! Declarative descriptions of structured documents and the engine that
//! renders them into provider-specific JSON Schema and tool definitions.
//!
//! Models are built explicitly through [`SchemaModel::output`] /
//! [`SchemaModel::tool`], or derived from a struct with
//! `#[derive(OutputSchema)]` / `#[derive(ToolSchema)]` (feature `macros`).

mod field;
mod model;
mod render;

pub use field::{Field, FieldBuilder, FieldKind};
pub use model::{SchemaFlavor, SchemaModel, SchemaModelBuilder};

use crate::config::{Provider, UnsupportedProvider};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while declaring or rendering schema models.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A field or model declaration breaks an invariant.
    #[error("Schema definition error: {0}")]
    Definition(String),
    /// The render target is not a provider the engine knows how to emit for.
    #[error(transparent)]
    UnsupportedProvider(#[from] UnsupportedProvider),
}

impl SchemaError {
    pub(crate) fn definition(message: impl Into<String>) -> Self {
        SchemaError::Definition(message.into())
    }
}

/// A type that describes itself as a [`SchemaModel`].
///
/// Implemented by the derive macros; nested struct fields resolve their
/// shape through this trait.
///
/// A derived model cannot contain itself:
///
/// ```compile_fail
/// use llm_relay::OutputSchema;
///
/// #[derive(OutputSchema)]
/// struct Node {
///     label: String,
///     children: Vec<Node>,
/// }
/// ```
///
/// Cycles through other models are reported as
/// [`SchemaError::Definition`] when the model is built.
pub trait Schema {
    /// Builds (or returns) the model for this type.
    fn schema_model() -> Result<Arc<SchemaModel>, SchemaError>;

    /// Renders the model for `provider`.
    fn render(provider: Provider) -> Result<JsonValue, SchemaError> {
        Self::schema_model()?.render(provider)
    }
}
