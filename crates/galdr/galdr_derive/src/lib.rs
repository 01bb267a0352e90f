//! This crate provides galdr's derive macro.
mod reflect;

/// Implements a derive macro for the [Reflect] trait.
///
/// Only structs with named fields are supported. By default every `pub`
/// field is serialized; `#[reflect(private_fields)]` on the struct includes
/// the non-public fields, and `#[reflect(skip)]` excludes a field entirely.
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn reflect(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    reflect::reflect(input)
}
