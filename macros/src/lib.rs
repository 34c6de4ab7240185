extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::{
    bracketed, parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, GenericArgument,
    Lit, LitStr, Meta, PathArguments, Token, Type,
};

/// Derives `llm_relay::Schema` for a struct, producing an output-flavor
/// model (a structured response format).
///
/// # Example
///
/// ```no_run
/// use llm_relay::OutputSchema;
///
/// /// A mailing address.
/// #[derive(OutputSchema)]
/// struct Address {
///     street: String,
///     #[schema(description = "Two-letter country code", values = ["US", "FR"])]
///     country: String,
///     zip: Option<String>,
/// }
/// ```
#[proc_macro_derive(OutputSchema, attributes(schema))]
pub fn derive_output_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input, "Output")
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derives `llm_relay::Schema` for a struct, producing a tool-flavor model
/// (a callable function's parameters).
///
/// # Example
///
/// ```no_run
/// use llm_relay::ToolSchema;
///
/// /// Looks up the current weather.
/// #[derive(ToolSchema)]
/// #[schema(rename = "get_weather")]
/// struct GetWeather {
///     city: String,
///     #[schema(values = ["celsius", "fahrenheit"])]
///     unit: Option<String>,
/// }
/// ```
#[proc_macro_derive(ToolSchema, attributes(schema))]
pub fn derive_tool_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input, "Tool")
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Options read from `#[schema(...)]`.
#[derive(Default)]
struct SchemaAttrs {
    description: Option<String>,
    rename: Option<String>,
    optional: bool,
    values: Vec<Lit>,
}

fn parse_schema_attrs(attrs: &[Attribute]) -> syn::Result<SchemaAttrs> {
    let mut parsed = SchemaAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("schema")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("description") {
                parsed.description = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("rename") {
                parsed.rename = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("optional") {
                parsed.optional = true;
            } else if meta.path.is_ident("values") {
                let input = meta.value()?;
                let content;
                bracketed!(content in input);
                let values = Punctuated::<Lit, Token![,]>::parse_terminated(&content)?;
                parsed.values = values.into_iter().collect();
            } else {
                return Err(meta.error(
                    "unknown schema attribute; expected `description`, `rename`, `optional` or `values`",
                ));
            }
            Ok(())
        })?;
    }
    Ok(parsed)
}

/// Doc comment lines, trimmed, blank lines dropped.
fn doc_lines(attrs: &[Attribute]) -> Vec<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(expr) => match &expr.lit {
                    Lit::Str(s) => Some(s.value().trim().to_string()),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect()
}

/// How a Rust type maps onto a field kind.
enum Shape<'a> {
    Primitive(&'static str),
    Nested(&'a Type),
}

fn last_segment_ident(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(path) if path.qself.is_none() => path.path.segments.last(),
        _ => None,
    }
}

/// The single generic argument of `Wrapper<T>` when `ty` is that wrapper.
fn unwrap_generic<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let segment = last_segment_ident(ty)?;
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) if args.args.len() == 1 => match args.args.first() {
            Some(GenericArgument::Type(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

fn classify(ty: &Type) -> Shape<'_> {
    if let Type::Reference(reference) = ty {
        if let Type::Path(path) = reference.elem.as_ref() {
            if path.path.is_ident("str") {
                return Shape::Primitive("String");
            }
        }
    }
    let kind = last_segment_ident(ty).and_then(|segment| {
        match segment.ident.to_string().as_str() {
            "String" | "str" | "char" => Some("String"),
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" => Some("Integer"),
            "f32" | "f64" => Some("Number"),
            "bool" => Some("Boolean"),
            _ => None,
        }
    });
    match kind {
        Some(kind) => Shape::Primitive(kind),
        None => Shape::Nested(ty),
    }
}

fn expand(input: DeriveInput, flavor: &str) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "schema derives do not support generic structs",
        ));
    }
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "schema derives require a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                ident,
                "schema derives can only be used on structs",
            ))
        }
    };

    let model_attrs = parse_schema_attrs(&input.attrs)?;
    let model_name = model_attrs.rename.unwrap_or_else(|| ident.to_string());
    let documentation = model_attrs
        .description
        .or_else(|| Some(doc_lines(&input.attrs).join("\n")).filter(|doc| !doc.is_empty()));
    let documentation = documentation.map(|doc| quote! { .documentation(#doc) });

    let flavor = format_ident!("{}", flavor);
    let refers_to_self = |ty: &Type| {
        last_segment_ident(ty).map_or(false, |segment| segment.ident == *ident || segment.ident == "Self")
    };
    let mut field_calls = Vec::new();
    for field in fields {
        let attrs = parse_schema_attrs(&field.attrs)?;
        let field_ident = field.ident.as_ref().ok_or_else(|| {
            syn::Error::new_spanned(field, "schema derives require named fields")
        })?;
        let name = attrs.rename.clone().unwrap_or_else(|| {
            let raw = field_ident.to_string();
            raw.strip_prefix("r#").map(str::to_string).unwrap_or(raw)
        });

        let (ty, optional) = match unwrap_generic(&field.ty, "Option") {
            Some(inner) => (inner, true),
            None => (&field.ty, attrs.optional),
        };

        let (kind, items) = match unwrap_generic(ty, "Vec") {
            Some(item) => {
                if unwrap_generic(item, "Vec").is_some() {
                    return Err(syn::Error::new_spanned(
                        &field.ty,
                        "arrays of arrays cannot be described; wrap the inner array in a struct",
                    ));
                }
                let items = match classify(item) {
                    Shape::Primitive(kind) => {
                        let kind = format_ident!("{}", kind);
                        quote! { .item_primitive(::llm_relay::schema::FieldKind::#kind) }
                    }
                    Shape::Nested(nested) if refers_to_self(nested) => {
                        return Err(syn::Error::new_spanned(
                            &field.ty,
                            "a schema cannot contain itself; recursive models cannot be described",
                        ))
                    }
                    Shape::Nested(nested) => quote! {
                        .item_shape(<#nested as ::llm_relay::schema::Schema>::schema_model()?)
                    },
                };
                (format_ident!("Array"), items)
            }
            None => match classify(ty) {
                Shape::Primitive(kind) => (format_ident!("{}", kind), TokenStream2::new()),
                Shape::Nested(nested) if refers_to_self(nested) => {
                    return Err(syn::Error::new_spanned(
                        &field.ty,
                        "a schema cannot contain itself; recursive models cannot be described",
                    ))
                }
                Shape::Nested(nested) => (
                    format_ident!("Object"),
                    quote! { .item_shape(<#nested as ::llm_relay::schema::Schema>::schema_model()?) },
                ),
            },
        };

        let description = attrs
            .description
            .clone()
            .or_else(|| Some(doc_lines(&field.attrs).join(" ")).filter(|doc| !doc.is_empty()))
            .map(|doc| quote! { .description(#doc) });
        let values = if attrs.values.is_empty() {
            TokenStream2::new()
        } else {
            let values = &attrs.values;
            quote! {
                .enum_values(::std::vec![#(::llm_relay::serde_json::Value::from(#values)),*])
            }
        };

        field_calls.push(quote! {
            .field(
                #name,
                ::llm_relay::schema::Field::builder(::llm_relay::schema::FieldKind::#kind)
                    #description
                    .set_optional(#optional)
                    #values
                    #items
                    .build()?,
            )
        });
    }

    Ok(quote! {
        impl ::llm_relay::schema::Schema for #ident {
            fn schema_model() -> ::std::result::Result<
                ::std::sync::Arc<::llm_relay::schema::SchemaModel>,
                ::llm_relay::schema::SchemaError,
            > {
                static MODEL: ::std::sync::OnceLock<::std::sync::Arc<::llm_relay::schema::SchemaModel>> =
                    ::std::sync::OnceLock::new();
                if let ::std::option::Option::Some(model) = MODEL.get() {
                    return ::std::result::Result::Ok(::std::sync::Arc::clone(model));
                }
                ::std::thread_local! {
                    static BUILDING: ::std::cell::Cell<bool> = ::std::cell::Cell::new(false);
                }
                // Models that reach themselves through other models fail instead of recursing.
                if BUILDING.with(|building| building.replace(true)) {
                    return ::std::result::Result::Err(::llm_relay::schema::SchemaError::Definition(
                        ::std::format!("model '{}' contains itself", #model_name),
                    ));
                }
                let built = (|| -> ::std::result::Result<
                    ::llm_relay::schema::SchemaModel,
                    ::llm_relay::schema::SchemaError,
                > {
                    ::llm_relay::schema::SchemaModel::builder(
                        ::llm_relay::schema::SchemaFlavor::#flavor,
                        #model_name,
                    )
                    #documentation
                    #(#field_calls)*
                    .build()
                })();
                BUILDING.with(|building| building.set(false));
                let model = built?;
                let model = MODEL.get_or_init(|| ::std::sync::Arc::new(model));
                ::std::result::Result::Ok(::std::sync::Arc::clone(model))
            }
        }
    })
}
