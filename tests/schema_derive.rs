#![cfg(feature = "macros")]

use llm_relay::{FieldKind, OutputSchema, Provider, Schema, SchemaError, SchemaFlavor, ToolSchema};
use serde_json::json;

/// A postal address.
#[derive(OutputSchema)]
#[allow(dead_code)]
struct Address {
    /// Street and number.
    street: String,
    city: String,
    #[schema(description = "Postal code, if known")]
    zip: Option<String>,
}

/// A user profile.
#[derive(OutputSchema)]
#[allow(dead_code)]
struct UserProfile {
    name: String,
    age: u32,
    #[schema(values = ["admin", "member"])]
    role: String,
    address: Address,
    #[schema(rename = "previous_addresses")]
    history: Vec<Address>,
    tags: Vec<String>,
    score: Option<f64>,
}

/// Look up the weather for a city.
#[derive(ToolSchema)]
#[schema(rename = "get_weather")]
#[allow(dead_code)]
struct GetWeather {
    city: String,
    #[schema(values = ["celsius", "fahrenheit"])]
    unit: Option<String>,
    #[schema(optional, description = "Days ahead")]
    days: i64,
}

#[derive(OutputSchema)]
#[allow(dead_code)]
struct Team {
    name: String,
    members: Vec<Member>,
}

#[derive(OutputSchema)]
#[allow(dead_code)]
struct Member {
    name: String,
    teams: Vec<Team>,
}

/// A country.
#[derive(OutputSchema)]
#[allow(dead_code)]
struct Country {
    code: String,
}

#[derive(OutputSchema)]
#[allow(dead_code)]
struct City {
    name: String,
    country: Country,
}

#[derive(OutputSchema)]
#[allow(dead_code)]
struct Trip {
    origin: City,
    stops: Vec<City>,
}

#[derive(ToolSchema)]
#[allow(dead_code)]
struct Misplaced {
    address: Address,
}

#[test]
fn derived_model_matches_declaration() {
    let model = UserProfile::schema_model().unwrap();
    assert_eq!(model.name(), "UserProfile");
    assert_eq!(model.documentation(), Some("A user profile."));
    assert_eq!(model.flavor(), SchemaFlavor::Output);

    let names: Vec<_> = model.fields().map(|(name, _)| name).collect();
    assert_eq!(names, ["name", "age", "role", "address", "previous_addresses", "tags", "score"]);

    assert_eq!(model.field("age").unwrap().kind(), FieldKind::Integer);
    assert_eq!(model.field("role").unwrap().enum_values(), [json!("admin"), json!("member")]);
    assert_eq!(model.field("tags").unwrap().item_primitive(), Some(FieldKind::String));
    assert!(model.field("score").unwrap().is_optional());
    assert_eq!(
        model.field("previous_addresses").unwrap().item_shape().unwrap().name(),
        "Address"
    );
}

#[test]
fn nested_object_equals_its_own_body() {
    let profile = UserProfile::render(Provider::OpenAI).unwrap();
    let address = Address::schema_model().unwrap().render_body(Provider::OpenAI).unwrap();
    let schema = &profile["json_schema"]["schema"];
    assert_eq!(schema["properties"]["address"], address);
    assert_eq!(schema["properties"]["previous_addresses"]["items"], address);
    assert_eq!(schema["properties"]["previous_addresses"]["type"], "array");
}

#[test]
fn doc_comments_become_descriptions() {
    let body = Address::schema_model().unwrap().render_body(Provider::OpenAI).unwrap();
    assert_eq!(body["properties"]["street"]["description"], "Street and number.");
    assert_eq!(body["properties"]["zip"]["description"], "Postal code, if known");
    assert_eq!(body["properties"]["zip"]["type"], json!(["string", "null"]));
    assert_eq!(body["required"], json!(["street", "city", "zip"]));
}

#[test]
fn tool_derive_renders_function() {
    let tool = GetWeather::render(Provider::OpenAI).unwrap();
    assert_eq!(
        tool,
        json!({
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Look up the weather for a city.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "city": {"type": "string"},
                        "unit": {"type": "string", "enum": ["celsius", "fahrenheit"]},
                        "days": {"type": "integer", "description": "Days ahead"}
                    },
                    "additionalProperties": false,
                    "required": ["city"]
                }
            }
        })
    );
}

#[test]
fn models_are_cached() {
    let first = Address::schema_model().unwrap();
    let second = Address::schema_model().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[test]
fn nesting_an_output_model_in_a_tool_fails_at_render() {
    assert!(Misplaced::schema_model().is_ok());
    let err = Misplaced::render(Provider::Anthropic).unwrap_err();
    assert!(matches!(err, SchemaError::Definition(msg) if msg.contains("Address")));
}

#[test]
fn custom_target_is_unsupported() {
    assert!(matches!(
        GetWeather::render(Provider::Custom),
        Err(SchemaError::UnsupportedProvider(_))
    ));
}

#[test]
fn cyclic_models_fail_instead_of_recursing() {
    let err = Team::schema_model().unwrap_err();
    assert!(matches!(err, SchemaError::Definition(ref msg) if msg.contains("Team")));
    // The guard is released, so the next attempt reports the same error.
    assert!(Member::schema_model().is_err());
    assert!(Team::schema_model().is_err());
}

#[test]
fn nesting_holds_at_every_depth() {
    for provider in [Provider::OpenAI, Provider::Mistral, Provider::Anthropic] {
        let trip = Trip::schema_model().unwrap().render_body(provider).unwrap();
        let city = City::schema_model().unwrap().render_body(provider).unwrap();
        let country = Country::schema_model().unwrap().render_body(provider).unwrap();

        assert_eq!(trip["properties"]["origin"], city, "{provider}");
        assert_eq!(trip["properties"]["origin"]["properties"]["country"], country, "{provider}");
        assert_eq!(trip["properties"]["stops"]["items"], city, "{provider}");
        assert_eq!(
            trip["properties"]["stops"]["items"]["properties"]["country"],
            country,
            "{provider}"
        );
    }
    let mistral = Trip::schema_model().unwrap().render_body(Provider::Mistral).unwrap();
    assert_eq!(mistral["properties"]["origin"]["properties"]["country"]["title"], "Country");
}
