use super::{SchemaError, SchemaModel};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// The JSON type of a schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `"string"`
    String,
    /// `"number"`
    Number,
    /// `"integer"`
    Integer,
    /// `"boolean"`
    Boolean,
    /// `"array"`, needs an item shape or an item primitive.
    Array,
    /// `"object"`, needs an item shape.
    Object,
}

impl FieldKind {
    /// The JSON Schema type keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }

    /// Whether this kind can be used as an array's item primitive.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldKind::Array | FieldKind::Object)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type and constraint metadata for one property of a [`SchemaModel`].
///
/// Fields are immutable once built. Construct them through
/// [`Field::builder`] or one of the per-kind shorthands.
#[derive(Debug, Clone)]
pub struct Field {
    description: Option<String>,
    kind: FieldKind,
    optional: bool,
    enum_values: Vec<JsonValue>,
    item_shape: Option<Arc<SchemaModel>>,
    item_primitive: Option<FieldKind>,
}

impl Field {
    /// Starts a field of the given kind.
    pub fn builder(kind: FieldKind) -> FieldBuilder {
        FieldBuilder {
            description: None,
            kind,
            optional: false,
            enum_values: Vec::new(),
            item_shape: None,
            item_primitive: None,
        }
    }

    /// Starts a `string` field.
    pub fn string() -> FieldBuilder {
        Self::builder(FieldKind::String)
    }

    /// Starts a `number` field.
    pub fn number() -> FieldBuilder {
        Self::builder(FieldKind::Number)
    }

    /// Starts an `integer` field.
    pub fn integer() -> FieldBuilder {
        Self::builder(FieldKind::Integer)
    }

    /// Starts a `boolean` field.
    pub fn boolean() -> FieldBuilder {
        Self::builder(FieldKind::Boolean)
    }

    /// Starts an `array` field.
    pub fn array() -> FieldBuilder {
        Self::builder(FieldKind::Array)
    }

    /// Starts an `object` field.
    pub fn object() -> FieldBuilder {
        Self::builder(FieldKind::Object)
    }

    /// Human-readable description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The JSON kind.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether the field may be absent or null.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Allowed literal values. Empty means unconstrained.
    pub fn enum_values(&self) -> &[JsonValue] {
        &self.enum_values
    }

    /// Nested model for objects and arrays of objects.
    pub fn item_shape(&self) -> Option<&Arc<SchemaModel>> {
        self.item_shape.as_ref()
    }

    /// Element kind for arrays of primitives.
    pub fn item_primitive(&self) -> Option<FieldKind> {
        self.item_primitive
    }
}

/// Builder for [`Field`]; all invariants are checked in [`FieldBuilder::build`].
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    description: Option<String>,
    kind: FieldKind,
    optional: bool,
    enum_values: Vec<JsonValue>,
    item_shape: Option<Arc<SchemaModel>>,
    item_primitive: Option<FieldKind>,
}

impl FieldBuilder {
    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the field optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets whether the field is optional.
    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Restricts the field to the given literal values, in order.
    pub fn enum_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the nested model of an object, or the element model of an array.
    pub fn item_shape(mut self, shape: Arc<SchemaModel>) -> Self {
        self.item_shape = Some(shape);
        self
    }

    /// Sets the element kind of an array of primitives.
    pub fn item_primitive(mut self, kind: FieldKind) -> Self {
        self.item_primitive = Some(kind);
        self
    }

    /// Validates the combination and builds the field.
    ///
    /// # Errors
    ///
    /// `SchemaError::Definition` when an array has both or neither of an item
    /// shape and an item primitive, when an object lacks an item shape or has
    /// an item primitive, when the item primitive is not primitive, or when a
    /// primitive kind carries item settings.
    pub fn build(self) -> Result<Field, SchemaError> {
        match self.kind {
            FieldKind::Array => match (&self.item_shape, self.item_primitive) {
                (Some(_), Some(_)) => {
                    return Err(SchemaError::definition(
                        "array field cannot have both an item shape and an item primitive",
                    ))
                }
                (None, None) => {
                    return Err(SchemaError::definition(
                        "array field must have either an item shape or an item primitive",
                    ))
                }
                (None, Some(primitive)) if !primitive.is_primitive() => {
                    return Err(SchemaError::definition(format!(
                        "array item primitive must be a primitive kind, got {primitive}"
                    )))
                }
                _ => {}
            },
            FieldKind::Object => {
                if self.item_primitive.is_some() {
                    return Err(SchemaError::definition(
                        "object field cannot have an item primitive",
                    ));
                }
                if self.item_shape.is_none() {
                    return Err(SchemaError::definition("object field must have an item shape"));
                }
            }
            kind => {
                if self.item_shape.is_some() || self.item_primitive.is_some() {
                    return Err(SchemaError::definition(format!(
                        "{kind} field cannot have an item shape or item primitive"
                    )));
                }
            }
        }

        Ok(Field {
            description: self.description,
            kind: self.kind,
            optional: self.optional,
            enum_values: self.enum_values,
            item_shape: self.item_shape,
            item_primitive: self.item_primitive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> Arc<SchemaModel> {
        Arc::new(
            SchemaModel::output("Point")
                .field("x", Field::number().build().unwrap())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn primitive_fields_build() {
        let field = Field::string()
            .description("A colour")
            .optional()
            .enum_values(["red", "green"])
            .build()
            .unwrap();
        assert_eq!(field.kind(), FieldKind::String);
        assert_eq!(field.description(), Some("A colour"));
        assert!(field.is_optional());
        assert_eq!(field.enum_values().len(), 2);
    }

    #[test]
    fn array_requires_exactly_one_item_source() {
        assert!(Field::array().build().is_err());
        assert!(Field::array()
            .item_shape(shape())
            .item_primitive(FieldKind::String)
            .build()
            .is_err());
        assert!(Field::array().item_shape(shape()).build().is_ok());
        assert!(Field::array().item_primitive(FieldKind::Integer).build().is_ok());
    }

    #[test]
    fn array_item_primitive_must_be_primitive() {
        let err = Field::array()
            .item_primitive(FieldKind::Object)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::Definition(_)));
    }

    #[test]
    fn object_requires_shape_and_no_primitive() {
        assert!(Field::object().build().is_err());
        assert!(Field::object()
            .item_shape(shape())
            .item_primitive(FieldKind::String)
            .build()
            .is_err());
        assert!(Field::object().item_shape(shape()).build().is_ok());
    }

    #[test]
    fn invalid_combinations_fail_regardless_of_other_settings() {
        let err = Field::array()
            .description("ignored")
            .optional()
            .enum_values([1, 2])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::Definition(_)));
    }

    #[test]
    fn primitive_kinds_reject_item_settings() {
        assert!(Field::boolean().item_primitive(FieldKind::String).build().is_err());
        assert!(Field::integer().item_shape(shape()).build().is_err());
    }
}
