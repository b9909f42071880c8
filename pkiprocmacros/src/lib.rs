//! Procedural macros used in the definition and implementation of getters and setters for PathSettings

use proc_macro2::Span;
use quote::quote;
use syn::parse::{Parse, ParseStream, Result};
use syn::{Expr, Ident, Token};

/// Signature contains the results of parsing a ps_gets_and_sets definition, i.e., the name of a
/// value stored in a PathSettings map, the corresponding type and an optional default value. For
/// example:
///     ```ignore
///     ps_gets_and_sets!(PS_TRUST_ANCHOR_FOLDER, String);
///     ps_gets_and_sets_with_default!(PS_INITIAL_EXPLICIT_POLICY_INDICATOR, bool, false);
///     ```
struct Signature {
    value_name: Ident,
    value_type: Ident,
    default_value: Option<Expr>,
}

impl Parse for Signature {
    fn parse(stream: ParseStream) -> Result<Self> {
        let value_name: Ident = stream.parse()?;
        let _: Token!(,) = stream.parse()?;
        let value_type: Ident = stream.parse()?;
        let default_value = if stream.is_empty() {
            None
        } else {
            let _: Token!(,) = stream.parse()?;
            Some(stream.parse()?)
        };
        Ok(Signature {
            value_name,
            value_type,
            default_value,
        })
    }
}

/// is_string_numeric is used to determine if a string value contains only numeric characters.
/// It is used to process a slice that omits the first character, i.e., in order to identify
/// types like u8, i32, etc.
fn is_string_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_numeric())
}

/// Maps a value type to the name of the PathSettingsTypes variant that carries it, i.e., u64 to
/// U64 and bool to Bool. Other type names are used as is.
fn variant_for_type(value_type: &Ident) -> Ident {
    let type_str = value_type.to_string();
    let variant = if type_str == "bool" {
        "Bool".to_string()
    } else if is_string_numeric(&type_str[1..]) {
        type_str.to_uppercase()
    } else {
        type_str
    };
    Ident::new(&variant, value_type.span())
}

/// Returns the getter and setter names for a PS_ prefixed value name.
fn accessor_names(value_name: &Ident) -> (String, String) {
    let name = value_name.to_string();
    let suffix = name.strip_prefix("PS_").unwrap_or(&name).to_lowercase();
    (format!("get_{}", suffix), format!("set_{}", suffix))
}

fn expand(signature: Signature) -> proc_macro2::TokenStream {
    let flag = signature.value_name;
    let return_t = signature.value_type;
    let ps_type = variant_for_type(&return_t);
    let (getter_str, setter_str) = accessor_names(&flag);
    let getter = Ident::new(&getter_str, Span::call_site());
    let setter = Ident::new(&setter_str, Span::call_site());

    let getter_comment = format!(
        "`{}` is used to retrieve `{}` items from a [`PathSettings`] instance",
        getter_str, flag
    );
    let setter_comment = format!(
        "`{}` is used to set `{}` items in a [`PathSettings`] instance",
        setter_str, flag
    );

    let getter_fn = match signature.default_value {
        Some(default_value) => quote! {
            #[doc = #getter_comment]
            pub fn #getter(&self) -> #return_t {
                match self.0.get(#flag) {
                    Some(PathSettingsTypes::#ps_type(v)) => v.clone(),
                    _ => #default_value,
                }
            }
        },
        None => quote! {
            #[doc = #getter_comment]
            pub fn #getter(&self) -> Option<#return_t> {
                match self.0.get(#flag) {
                    Some(PathSettingsTypes::#ps_type(v)) => Some(v.clone()),
                    _ => None,
                }
            }
        },
    };

    quote! {
        impl PathSettings {
            #getter_fn

            #[doc = #setter_comment]
            pub fn #setter(&mut self, v: #return_t) {
                self.0.insert(#flag.to_string(), PathSettingsTypes::#ps_type(v));
            }
        }
    }
}

/// Generates `get_` and `set_` methods on `PathSettings` for a value with no default. The getter
/// returns None when the value is absent or holds a different type.
#[proc_macro]
pub fn ps_gets_and_sets(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let signature = syn::parse_macro_input!(input as Signature);
    if signature.default_value.is_some() {
        return syn::Error::new(
            Span::call_site(),
            "use ps_gets_and_sets_with_default for values with a default",
        )
        .to_compile_error()
        .into();
    }
    expand(signature).into()
}

/// Generates `get_` and `set_` methods on `PathSettings` for a value with a default. The getter
/// returns the default when the value is absent or holds a different type.
#[proc_macro]
pub fn ps_gets_and_sets_with_default(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let signature = syn::parse_macro_input!(input as Signature);
    if signature.default_value.is_none() {
        return syn::Error::new(Span::call_site(), "a default value is required")
            .to_compile_error()
            .into();
    }
    expand(signature).into()
}
