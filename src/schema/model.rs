use super::{Field, SchemaError};
use std::collections::HashSet;

/// Which kind of document a model renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaFlavor {
    /// Constrains a free-form structured response.
    Output,
    /// Describes a callable tool's parameters.
    Tool,
}

impl SchemaFlavor {
    /// Lowercase name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaFlavor::Output => "output",
            SchemaFlavor::Tool => "tool",
        }
    }
}

/// A named, documented, ordered set of fields.
///
/// Models are declared once and are read-only afterwards; share them with
/// `Arc` when nesting them inside fields.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    name: String,
    documentation: Option<String>,
    flavor: SchemaFlavor,
    fields: Vec<(String, Field)>,
}

impl SchemaModel {
    /// Starts an output-flavor model.
    pub fn output(name: impl Into<String>) -> SchemaModelBuilder {
        Self::builder(SchemaFlavor::Output, name)
    }

    /// Starts a tool-flavor model.
    pub fn tool(name: impl Into<String>) -> SchemaModelBuilder {
        Self::builder(SchemaFlavor::Tool, name)
    }

    /// Starts a model of the given flavor.
    pub fn builder(flavor: SchemaFlavor, name: impl Into<String>) -> SchemaModelBuilder {
        SchemaModelBuilder {
            name: name.into(),
            documentation: None,
            flavor,
            fields: Vec::new(),
        }
    }

    /// The declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptive text, if any.
    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    /// The flavor.
    pub fn flavor(&self) -> SchemaFlavor {
        self.flavor
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| field)
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the model declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`SchemaModel`].
#[derive(Debug, Clone)]
pub struct SchemaModelBuilder {
    name: String,
    documentation: Option<String>,
    flavor: SchemaFlavor,
    fields: Vec<(String, Field)>,
}

impl SchemaModelBuilder {
    /// Sets the descriptive text; surrounding whitespace is trimmed.
    pub fn documentation(mut self, documentation: impl Into<String>) -> Self {
        let documentation = documentation.into();
        let trimmed = documentation.trim();
        self.documentation = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Appends a field. Duplicates are reported by [`SchemaModelBuilder::build`].
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Validates names and builds the model.
    ///
    /// # Errors
    ///
    /// `SchemaError::Definition` for an empty or malformed model name, an
    /// empty field name, or a duplicated field name.
    pub fn build(self) -> Result<SchemaModel, SchemaError> {
        validate_model_name(&self.name)?;

        let mut seen = HashSet::new();
        for (name, _) in &self.fields {
            if name.is_empty() {
                return Err(SchemaError::definition(format!(
                    "model `{}` declares a field with an empty name",
                    self.name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::definition(format!(
                    "model `{}` declares field `{name}` more than once",
                    self.name
                )));
            }
        }

        Ok(SchemaModel {
            name: self.name,
            documentation: self.documentation,
            flavor: self.flavor,
            fields: self.fields,
        })
    }
}

fn validate_model_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::definition("model name cannot be empty"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(SchemaError::definition(format!(
            "model name `{name}` contains `{bad}`; only ASCII letters, digits, `_` and `-` are allowed"
        )));
    }
    Ok(())
}
