//! The schema translation engine.
//!
//! Every provider quirk lives in [`ProviderProfile::for_target`]; the
//! traversal below never branches on the provider itself.

use super::{Field, FieldKind, SchemaError, SchemaFlavor, SchemaModel};
use crate::config::{Provider, UnsupportedProvider};
use serde_json::{json, Map, Value as JsonValue};

/// Document skeleton a rendered model is wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Envelope {
    /// `{"type":"json_schema","json_schema":{..,"schema":BODY}}`
    JsonSchema,
    /// `{"type":"function","function":{..,"parameters":BODY}}`
    Function,
    /// `{"name":..,"description":..,"input_schema":BODY}`
    InputSchema,
}

/// How optional fields are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionalPolicy {
    /// Type widened to `[kind, "null"]`, name kept in `required`.
    NullableRequired,
    /// Type untouched, name left out of `required`.
    OmitFromRequired,
}

#[derive(Debug, Clone, Copy)]
struct ProviderProfile {
    envelope: Envelope,
    strict: bool,
    additional_properties: bool,
    property_descriptions: bool,
    titles: bool,
    optional: OptionalPolicy,
}

impl ProviderProfile {
    fn for_target(provider: Provider, flavor: SchemaFlavor) -> Result<Self, SchemaError> {
        use Envelope::*;
        use OptionalPolicy::*;

        let profile = match (provider, flavor) {
            (Provider::OpenAI | Provider::Groq, SchemaFlavor::Output) => ProviderProfile {
                envelope: JsonSchema,
                strict: true,
                additional_properties: true,
                property_descriptions: true,
                titles: false,
                optional: NullableRequired,
            },
            // Mistral wants titles and no per-property descriptions.
            (Provider::Mistral, SchemaFlavor::Output) => ProviderProfile {
                envelope: JsonSchema,
                strict: true,
                additional_properties: true,
                property_descriptions: false,
                titles: true,
                optional: OmitFromRequired,
            },
            (Provider::Anthropic, SchemaFlavor::Output) => ProviderProfile {
                envelope: InputSchema,
                strict: false,
                additional_properties: false,
                property_descriptions: true,
                titles: false,
                optional: NullableRequired,
            },
            (Provider::OpenAI | Provider::Groq | Provider::Mistral, SchemaFlavor::Tool) => {
                ProviderProfile {
                    envelope: Function,
                    strict: false,
                    additional_properties: true,
                    property_descriptions: true,
                    titles: false,
                    optional: OmitFromRequired,
                }
            }
            (Provider::Anthropic, SchemaFlavor::Tool) => ProviderProfile {
                envelope: InputSchema,
                strict: false,
                additional_properties: false,
                property_descriptions: true,
                titles: false,
                optional: OmitFromRequired,
            },
            (Provider::Custom, _) => {
                return Err(UnsupportedProvider(provider.as_str().to_string()).into())
            }
        };
        Ok(profile)
    }
}

impl SchemaModel {
    /// Renders the model into the document `provider` expects.
    ///
    /// Output models become a `response_format` document (OpenAI, Groq,
    /// Mistral) or a flat `input_schema` tool (Anthropic); tool models become
    /// function definitions. Rendering is pure: the same model and provider
    /// always produce the same document.
    ///
    /// # Errors
    ///
    /// `SchemaError::UnsupportedProvider` for [`Provider::Custom`], before any
    /// traversal. `SchemaError::Definition` when a nested model has a
    /// different flavor.
    pub fn render(&self, provider: Provider) -> Result<JsonValue, SchemaError> {
        let profile = ProviderProfile::for_target(provider, self.flavor())?;
        let body = self.render_with(provider, &profile)?;
        Ok(self.wrap(body, &profile))
    }

    /// Same as [`SchemaModel::render`] but takes a provider token such as `"openai"`.
    pub fn render_for(&self, provider: &str) -> Result<JsonValue, SchemaError> {
        let provider: Provider = provider.parse()?;
        self.render(provider)
    }

    /// Renders only the inner object schema (the `schema`, `parameters` or
    /// `input_schema` part), which is also what nested fields embed.
    pub fn render_body(&self, provider: Provider) -> Result<JsonValue, SchemaError> {
        let profile = ProviderProfile::for_target(provider, self.flavor())?;
        self.render_with(provider, &profile)
    }

    fn render_with(
        &self,
        provider: Provider,
        profile: &ProviderProfile,
    ) -> Result<JsonValue, SchemaError> {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, field) in self.fields() {
            let entry = self.render_property(name, field, provider, profile)?;
            properties.insert(name.to_string(), entry);

            if !field.is_optional() || profile.optional == OptionalPolicy::NullableRequired {
                required.push(JsonValue::String(name.to_string()));
            }
        }

        let mut body = Map::new();
        body.insert("type".into(), json!("object"));
        if profile.titles {
            body.insert("title".into(), json!(self.name()));
        }
        body.insert("properties".into(), JsonValue::Object(properties));
        if profile.additional_properties {
            body.insert("additionalProperties".into(), json!(false));
        }
        body.insert("required".into(), JsonValue::Array(required));
        Ok(JsonValue::Object(body))
    }

    fn render_property(
        &self,
        name: &str,
        field: &Field,
        provider: Provider,
        profile: &ProviderProfile,
    ) -> Result<JsonValue, SchemaError> {
        let mut entry = match field.kind() {
            // The nested document is the entry itself, not wrapped again.
            FieldKind::Object => match self.nested_body(name, field, provider, profile)? {
                JsonValue::Object(map) => map,
                _ => Map::new(),
            },
            kind => {
                let mut entry = Map::new();
                entry.insert("type".into(), json!(kind.as_str()));
                if profile.titles {
                    entry.insert("title".into(), json!(humanize(name)));
                }
                if profile.property_descriptions {
                    if let Some(description) = field.description() {
                        entry.insert("description".into(), json!(description));
                    }
                }
                if !field.enum_values().is_empty() {
                    entry.insert("enum".into(), JsonValue::Array(field.enum_values().to_vec()));
                }
                if kind == FieldKind::Array {
                    let items = match field.item_primitive() {
                        Some(primitive) => json!({ "type": primitive.as_str() }),
                        None => self.nested_body(name, field, provider, profile)?,
                    };
                    entry.insert("items".into(), items);
                }
                entry
            }
        };

        if field.is_optional() && profile.optional == OptionalPolicy::NullableRequired {
            entry.insert(
                "type".into(),
                json!([field.kind().as_str(), "null"]),
            );
        }
        Ok(JsonValue::Object(entry))
    }

    fn nested_body(
        &self,
        name: &str,
        field: &Field,
        provider: Provider,
        profile: &ProviderProfile,
    ) -> Result<JsonValue, SchemaError> {
        let shape = field.item_shape().ok_or_else(|| {
            SchemaError::definition(format!(
                "field `{name}` of `{}` has no item shape",
                self.name()
            ))
        })?;
        if shape.flavor() != self.flavor() {
            return Err(SchemaError::definition(format!(
                "field `{name}` of {} model `{}` nests `{}`, which is a {} model",
                self.flavor().as_str(),
                self.name(),
                shape.name(),
                shape.flavor().as_str()
            )));
        }
        shape.render_with(provider, profile)
    }

    fn wrap(&self, body: JsonValue, profile: &ProviderProfile) -> JsonValue {
        let description = self.documentation().unwrap_or_default();
        match profile.envelope {
            Envelope::JsonSchema => json!({
                "type": "json_schema",
                "json_schema": {
                    "name": self.name(),
                    "description": description,
                    "strict": profile.strict,
                    "schema": body,
                }
            }),
            Envelope::Function => json!({
                "type": "function",
                "function": {
                    "name": self.name(),
                    "description": description,
                    "parameters": body,
                }
            }),
            Envelope::InputSchema => json!({
                "name": self.name(),
                "description": description,
                "input_schema": body,
            }),
        }
    }
}

/// `first_name` -> `First Name`.
fn humanize(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
