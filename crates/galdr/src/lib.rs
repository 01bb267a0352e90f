//! Galdr is a schema-less binary serialization engine: it derives, caches and
//! executes byte-exact encoder/decoder pairs from compile-time type descriptors,
//! so the same type definition on both ends is the only setup required.
pub mod engine;
pub mod fingerprint;
pub mod shape;
pub mod wire;

mod decimal;
mod error;

pub use decimal::Decimal;
pub use engine::Serializer;
pub use error::{Error, Result};
pub use fingerprint::SchemaFingerprint;
pub use shape::{Polymorphic, Reflect};

/// Derive macro implementing [`shape::Reflect`] and [`shape::Polymorphic`]
/// for a named-field struct, generating its field descriptor table.
///
/// Fields are discovered in declaration order and reordered to the canonical
/// (name-ascending) order when the record shape is materialized. Only `pub`
/// fields participate by default; annotate the struct with
/// `#[reflect(private_fields)]` to include non-public fields, or a single
/// field with `#[reflect(skip)]` to leave it out entirely (skipped fields
/// keep their `Default` value after decoding).
///
/// The type must implement [`Default`], which the engine uses as the
/// construction path when decoding.
///
/// ## Examples
/// ```no_run
/// use galdr::Reflect;
///
/// #[derive(Reflect, Default)]
/// struct Foo {
///     pub bar1: i32,
///     pub bar2: String,
///     pub bar3: Vec<u8>,
/// }
/// ```
pub use galdr_derive::Reflect;

extern crate self as galdr;
