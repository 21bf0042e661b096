//! Procedural macros for the docbridge project.
//!
//! This crate provides compile-time code generation for the docbridge framework.
//! Currently that is `#[derive(Identity)]`, which registers a document's identity
//! field so the codec never has to discover it at runtime.

#[allow(unused_extern_crates)]
extern crate self as docbridge_macros;

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Error, Expr, Field, Fields, Ident, LitStr,
    Result, ext::IdentExt,
};

/// Derives `docbridge::identity::Identified` for a struct with named fields.
///
/// The identity field is, in order of preference:
///
/// 1. the field marked `#[identity]`
/// 2. the field serialized as `_id`, via `#[serde(rename = "_id")]` or by being named `_id`
/// 3. a field named `id`
///
/// If no field qualifies, the type has no identity and identity-based operations
/// report it as missing. The field's type must implement
/// `docbridge::identity::IdentityValue`.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Identity)]
/// struct Product {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
///     id: Option<Id<Product>>,
///     name: String,
/// }
/// ```
#[proc_macro_derive(Identity, attributes(identity))]
pub fn derive_identity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_identity(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

fn expand_identity(input: DeriveInput) -> Result<proc_macro2::TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(Error::new_spanned(
                    &input.ident,
                    "Identity can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new_spanned(
                &input.ident,
                "Identity can only be derived for structs",
            ))
        }
    };

    let rename_all = container_rename_all(&input.attrs)?;
    let candidates = fields
        .into_iter()
        .map(|field| Candidate::new(field, rename_all.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let marked = candidates.iter().filter(|c| c.marked).collect::<Vec<_>>();
    if let Some(extra) = marked.get(1) {
        return Err(Error::new_spanned(
            extra.ident,
            "only one field may be marked #[identity]",
        ));
    }

    let chosen = marked
        .first()
        .copied()
        .or_else(|| candidates.iter().find(|c| c.wire_name == "_id"))
        .or_else(|| candidates.iter().find(|c| c.ident.unraw() == "id"));

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match chosen {
        Some(candidate) => {
            let ident = candidate.ident;
            let field_name = ident.unraw().to_string();
            let wire_name = &candidate.wire_name;

            quote! {
                ::core::option::Option::Some(::docbridge::identity::IdentityField::<Self>::new(
                    #field_name,
                    #wire_name,
                    |document| &document.#ident,
                    |document| &mut document.#ident,
                ))
            }
        }
        None => quote! { ::core::option::Option::None },
    };

    Ok(quote! {
        impl #impl_generics ::docbridge::identity::Identified for #name #ty_generics #where_clause {
            fn identity_field() -> ::core::option::Option<::docbridge::identity::IdentityField<Self>> {
                #body
            }
        }
    })
}

struct Candidate<'a> {
    ident: &'a Ident,
    wire_name: String,
    marked: bool,
}

impl<'a> Candidate<'a> {
    fn new(field: &'a Field, rename_all: Option<&str>) -> Result<Self> {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| Error::new(Span::call_site(), "expected a named field"))?;

        let mut marked = false;
        for attr in &field.attrs {
            if attr.path().is_ident("identity") {
                attr.meta.require_path_only()?;
                marked = true;
            }
        }

        let wire_name = match field_rename(&field.attrs)? {
            Some(renamed) => renamed,
            None => apply_rename_all(&ident.unraw().to_string(), rename_all),
        };

        Ok(Self { ident, wire_name, marked })
    }
}

/// Reads `rename = "..."` (or `rename(serialize = "...")`) from a field's serde attributes.
fn field_rename(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut renamed = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if meta.input.peek(syn::Token![=]) {
                    renamed = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    meta.parse_nested_meta(|inner| {
                        let value = inner.value()?.parse::<LitStr>()?.value();
                        if inner.path.is_ident("serialize") {
                            renamed = Some(value);
                        }
                        Ok(())
                    })?;
                }
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        })?;
    }

    Ok(renamed)
}

/// Reads `rename_all = "..."` (or its `serialize` half) from the container's serde attributes.
fn container_rename_all(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut rule = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                if meta.input.peek(syn::Token![=]) {
                    rule = Some(meta.value()?.parse::<LitStr>()?);
                } else {
                    meta.parse_nested_meta(|inner| {
                        let value = inner.value()?.parse::<LitStr>()?;
                        if inner.path.is_ident("serialize") {
                            rule = Some(value);
                        }
                        Ok(())
                    })?;
                }
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        })?;
    }

    match rule {
        Some(lit) if RENAME_RULES.contains(&lit.value().as_str()) => Ok(Some(lit.value())),
        Some(lit) => Err(Error::new_spanned(lit, "unknown serde rename_all rule")),
        None => Ok(None),
    }
}

fn skip_meta_value(meta: &syn::meta::ParseNestedMeta) -> Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta_value(&inner))?;
    }
    Ok(())
}

const RENAME_RULES: &[&str] = &[
    "lowercase",
    "UPPERCASE",
    "PascalCase",
    "camelCase",
    "snake_case",
    "SCREAMING_SNAKE_CASE",
    "kebab-case",
    "SCREAMING-KEBAB-CASE",
];

/// Applies a serde `rename_all` rule to a snake_case field name.
fn apply_rename_all(field: &str, rule: Option<&str>) -> String {
    let pascal = || {
        field
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<String>()
    };

    match rule {
        Some("lowercase") | Some("snake_case") | None => field.to_string(),
        Some("UPPERCASE") | Some("SCREAMING_SNAKE_CASE") => field.to_ascii_uppercase(),
        Some("PascalCase") => pascal(),
        Some("camelCase") => {
            let pascal = pascal();
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        Some("kebab-case") => field.replace('_', "-"),
        Some("SCREAMING-KEBAB-CASE") => field.replace('_', "-").to_ascii_uppercase(),
        Some(_) => field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_name_of(input: &str) -> Option<String> {
        let input: DeriveInput = syn::parse_str(input).unwrap();
        let expanded = expand_identity(input).unwrap().to_string();
        expanded
            .split(":: new (")
            .nth(1)
            .and_then(|rest| rest.split(',').nth(1))
            .map(|wire| wire.trim().trim_matches('"').to_string())
    }

    #[test]
    fn prefers_marked_field() {
        let wire = wire_name_of(
            "struct A { id: String, #[identity] #[serde(rename = \"key\")] code: String }",
        );
        assert_eq!(wire.as_deref(), Some("key"));
    }

    #[test]
    fn prefers_underscore_id_over_plain_id() {
        let wire = wire_name_of(
            "struct A { id: String, #[serde(default, rename = \"_id\")] key: Option<String> }",
        );
        assert_eq!(wire.as_deref(), Some("_id"));

        let wire = wire_name_of("struct A { _id: String, id: String }");
        assert_eq!(wire.as_deref(), Some("_id"));
    }

    #[test]
    fn falls_back_to_id_field() {
        assert_eq!(wire_name_of("struct A { name: String, id: u64 }").as_deref(), Some("id"));
        assert_eq!(
            wire_name_of("#[serde(rename_all = \"UPPERCASE\")] struct A { id: u64 }").as_deref(),
            Some("ID")
        );
    }

    #[test]
    fn no_identity_field() {
        assert_eq!(wire_name_of("struct A { name: String }"), None);
        assert_eq!(wire_name_of("struct A;"), None);
    }

    #[test]
    fn rejects_two_marked_fields_and_enums() {
        let input: DeriveInput =
            syn::parse_str("struct A { #[identity] a: String, #[identity] b: String }").unwrap();
        assert!(expand_identity(input).is_err());

        let input: DeriveInput = syn::parse_str("enum E { A }").unwrap();
        assert!(expand_identity(input).is_err());
    }

    #[test]
    fn malformed_renames_are_errors() {
        for source in [
            "struct A { #[serde(rename = 5)] id: String }",
            "struct A { #[serde(rename(serialize = key))] id: String }",
            "#[serde(rename_all = camelCase)] struct A { id: String }",
        ] {
            let input: DeriveInput = syn::parse_str(source).unwrap();
            assert!(expand_identity(input).is_err(), "{source}");
        }

        let wire = wire_name_of(
            "struct A { #[serde(rename(serialize = \"key\", deserialize = \"k\"), with = \"m\", skip_serializing_if = \"Option::is_none\")] id: String }",
        );
        assert_eq!(wire.as_deref(), Some("key"));
    }

    #[test]
    fn rename_rules() {
        assert_eq!(apply_rename_all("order_id", Some("camelCase")), "orderId");
        assert_eq!(apply_rename_all("order_id", Some("PascalCase")), "OrderId");
        assert_eq!(apply_rename_all("order_id", Some("kebab-case")), "order-id");
        assert_eq!(apply_rename_all("order_id", Some("SCREAMING_SNAKE_CASE")), "ORDER_ID");
    }
}
