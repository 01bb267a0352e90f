//! Schema fingerprints.
//!
//! A fingerprint is a 160-bit digest of a type's fully expanded shape: the
//! qualified type name plus every field's name and type description, with
//! nested records inlined recursively. Two peers whose fingerprints for a
//! type match will agree on the wire layout of its values; any rename, field
//! addition, removal or type change produces a different digest.
use sha1::{Digest, Sha1};
use std::any::TypeId;
use std::fmt;

use crate::shape::{RecordShape, Reflect, TypeShape};

/// 160-bit schema digest, displayed as 40 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaFingerprint([u8; 20]);

impl SchemaFingerprint {
    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for SchemaFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

/// Fingerprints the shape of `T`.
pub fn fingerprint<T: Reflect>() -> SchemaFingerprint {
    fingerprint_of(&T::shape())
}

/// Fingerprints an already-resolved shape.
pub fn fingerprint_of(shape: &TypeShape) -> SchemaFingerprint {
    let mut description = String::new();
    describe(shape, &mut description, &mut Vec::new());

    let digest = Sha1::digest(description.as_bytes());
    SchemaFingerprint(digest.into())
}

/// Appends the canonical text form of `shape` to `out`.
fn describe(shape: &TypeShape, out: &mut String, path: &mut Vec<TypeId>) {
    match shape {
        TypeShape::Scalar(kind) => out.push_str(&kind.to_string()),
        TypeShape::Sequence(sequence) => {
            out.push_str("sequence<");
            describe(&(sequence.element)(), out, path);
            out.push('>');
        }
        TypeShape::Map(map) => {
            out.push_str("map<");
            describe(&(map.key)(), out, path);
            out.push(',');
            describe(&(map.value)(), out, path);
            out.push('>');
        }
        TypeShape::Record(record) => describe_record(record, out, path),
        TypeShape::Polymorphic => out.push_str("polymorphic"),
    }
}

/// Emits a record as its qualified name, `#`, then one `name:typeName;`
/// entry per field in canonical order, with the expansion of each
/// record-bearing field inlined after its entry.
fn describe_record(record: &RecordShape, out: &mut String, path: &mut Vec<TypeId>) {
    out.push_str(record.type_name);
    out.push_str(" # ");

    path.push(record.type_id);
    for field in &record.fields {
        out.push_str(field.name);
        out.push(':');
        out.push_str(field.type_name);
        out.push(';');
        expand(&(field.shape)(), out, path);
    }
    path.pop();
}

/// Inlines the expansion of any record reachable from a field's shape
/// without crossing another record boundary. A record already on the
/// active visitation path contributes nothing, so the walk terminates on
/// cyclic type graphs.
fn expand(shape: &TypeShape, out: &mut String, path: &mut Vec<TypeId>) {
    match shape {
        TypeShape::Record(record) if !path.contains(&record.type_id) => {
            describe_record(record, out, path);
        }
        TypeShape::Sequence(sequence) => expand(&(sequence.element)(), out, path),
        TypeShape::Map(map) => {
            expand(&(map.key)(), out, path);
            expand(&(map.value)(), out, path);
        }
        _ => {}
    }
}
