use syn::{
    parse, Attribute, Data, DataStruct, DeriveInput, Error, Field, Fields, FieldsNamed, Ident,
    Visibility,
};

use quote::{format_ident, quote};

use proc_macro2::TokenStream;

pub fn reflect(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    match parse(input) {
        Ok(ast) => impl_reflect_derive(&ast),
        Err(error) => error.to_compile_error(),
    }
    .into()
}

/// Checks whether a `#[reflect(...)]` attribute list contains `flag`.
fn has_reflect_flag(attributes: &[Attribute], flag: &str) -> bool {
    attributes.iter().any(|attribute| {
        if !attribute.path().is_ident("reflect") {
            return false;
        }

        let mut found = false;
        let _ = attribute.parse_nested_meta(|meta| {
            if meta.path.is_ident(flag) {
                found = true;
            }
            Ok(())
        });

        found
    })
}

/// Selects the serializable fields: skipped fields never, non-public fields
/// only when the struct opts in with `#[reflect(private_fields)]`.
fn serializable_fields<'a>(
    fields: &'a FieldsNamed,
    include_private: bool,
) -> impl Iterator<Item = &'a Field> {
    fields.named.iter().filter(move |field| {
        if has_reflect_flag(&field.attrs, "skip") {
            return false;
        }

        include_private || matches!(field.vis, Visibility::Public(_))
    })
}

/// Generates the accessor functions and the descriptor entry for one field.
fn field_descriptor(ast: &DeriveInput, field: &Field) -> (TokenStream, TokenStream) {
    let type_name = &ast.ident;

    let ident = field.ident.as_ref().expect("named field");
    let field_type = &field.ty;
    let get_fn = format_ident!("get_{}", ident);
    let set_fn = format_ident!("set_{}", ident);

    let accessors = quote! {
        fn #get_fn(value: &dyn std::any::Any) -> Option<&dyn std::any::Any> {
            value
                .downcast_ref::<#type_name>()
                .map(|record| &record.#ident as &dyn std::any::Any)
        }

        fn #set_fn(
            value: &mut dyn std::any::Any,
            field: Box<dyn std::any::Any>,
        ) -> Option<()> {
            value.downcast_mut::<#type_name>()?.#ident =
                *field.downcast::<#field_type>().ok()?;
            Some(())
        }
    };

    let descriptor = quote! {
        galdr::shape::FieldDescriptor {
            name: stringify!(#ident),
            type_name: std::any::type_name::<#field_type>(),
            shape: <#field_type as galdr::shape::Reflect>::shape,
            get: #get_fn,
            set: #set_fn,
        }
    };

    (accessors, descriptor)
}

fn shape_fn(ast: &DeriveInput, fields: &FieldsNamed) -> TokenStream {
    let type_name = &ast.ident;
    let include_private = has_reflect_flag(&ast.attrs, "private_fields");

    let (accessors, descriptors): (Vec<_>, Vec<_>) = serializable_fields(fields, include_private)
        .map(|field| field_descriptor(ast, field))
        .unzip();

    quote! {
        fn shape() -> galdr::shape::TypeShape {
            #(#accessors)*

            galdr::shape::TypeShape::Record(galdr::shape::RecordShape::new::<Self>(
                concat!(module_path!(), "::", stringify!(#type_name)),
                vec![#(#descriptors),*],
            ))
        }
    }
}

fn impl_reflect_derive(ast: &DeriveInput) -> TokenStream {
    let fields = match &ast.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(fields),
            ..
        }) => fields,
        Data::Struct(data) => {
            return Error::new_spanned(
                &data.fields,
                "Can only derive `Reflect` for structs with named fields.",
            )
            .to_compile_error();
        }
        Data::Enum(data) => {
            return Error::new(
                data.enum_token.span,
                "Cannot derive `Reflect` for enums; wrap the variants in record types \
                 behind a polymorphic field instead.",
            )
            .to_compile_error();
        }
        Data::Union(data) => {
            return Error::new(data.union_token.span, "Cannot derive `Reflect` for unions.")
                .to_compile_error();
        }
    };

    // Descriptor tables hold plain function pointers, which cannot be
    // generic over the record's type parameters.
    if !ast.generics.params.is_empty() {
        return Error::new_spanned(
            &ast.generics,
            "Cannot derive `Reflect` for generic types.",
        )
        .to_compile_error();
    }

    let type_name: &Ident = &ast.ident;

    let shape_fn = shape_fn(ast, fields);

    quote! {
        impl galdr::shape::Reflect for #type_name {
            #shape_fn
        }

        impl galdr::shape::Polymorphic for #type_name {
            fn type_identifier(&self) -> &'static str {
                concat!(module_path!(), "::", stringify!(#type_name))
            }

            fn record_shape(&self) -> galdr::shape::TypeShape {
                <Self as galdr::shape::Reflect>::shape()
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    }
}
