//! The codec derivation engine.
//!
//! [`Serializer`] turns a [`TypeShape`](crate::shape::TypeShape) into a pair
//! of type-erased encode/decode procedures, built recursively bottom-up and
//! memoized per type identity. Top-level codecs are cached per entry-point
//! type so repeated calls never re-resolve a shape or re-sort fields; record
//! codecs live in one further cache, codecs for concrete types reached
//! through polymorphic fields in another, because the latter are keyed by
//! the runtime type rather than the declared field type.
//!
//! Cache entries are lazy placeholder cells registered *before* the engine
//! recurses into field shapes, so mutually recursive record graphs resolve
//! without looping. Entries are never evicted; record types are assumed
//! fixed for the process lifetime.
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::io::{Read, Write};
use std::sync::{Arc, OnceLock};
use tracing::trace;

use crate::shape::{
    FieldGetter, FieldSetter, MapShape, Polymorphic, RecordShape, Reflect, ScalarKind,
    SequenceShape, TypeShape,
};
use crate::wire::scalar;
use crate::{Decimal, Error, Result};

/// Lazy cache slot for a record codec.
///
/// The slot is inserted into the cache before the codec's field codecs are
/// built; a self-referential field finds the slot and links to it instead of
/// recursing forever. Every slot reachable from a finished top-level
/// derivation is filled.
type RecordCell = OnceLock<RecordCodec>;

/// Derived encode/decode procedure for one shape.
enum ValueCodec {
    Scalar(ScalarKind),
    Sequence {
        shape: SequenceShape,
        element: Box<ValueCodec>,
    },
    Map {
        shape: MapShape,
        key: Box<ValueCodec>,
        value: Box<ValueCodec>,
    },
    Record(Arc<RecordCell>),
    Polymorphic,
}

struct FieldCodec {
    get: FieldGetter,
    set: FieldSetter,
    codec: ValueCodec,
}

/// Codec for a record type: the construction path plus one field codec per
/// serializable field, in canonical order.
struct RecordCodec {
    type_name: &'static str,
    construct: fn() -> Box<dyn Any>,
    fields: Vec<FieldCodec>,
}

/// A concrete type admitted for polymorphic decoding.
struct RegisteredType {
    shape: fn() -> TypeShape,
    into_value: fn(Box<dyn Any>) -> Option<Box<dyn Polymorphic>>,
}

/// Schema-less binary serializer.
///
/// Owns the codec derivation caches and the registry of concrete types
/// permitted behind polymorphic fields. Construct one per process (or per
/// independent format domain) and share it; all operations take `&self` and
/// are safe to call concurrently.
#[derive(Default)]
pub struct Serializer {
    roots: DashMap<TypeId, Arc<ValueCodec>>,
    records: DashMap<TypeId, Arc<RecordCell>>,
    polymorphic: DashMap<TypeId, Arc<RecordCell>>,
    registry: DashMap<&'static str, RegisteredType>,
}

impl Serializer {
    /// Creates a serializer with empty caches and an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `T` for polymorphic decoding.
    ///
    /// Values behind `Box<dyn Polymorphic>` fields carry a type identifier
    /// on the wire; decoding resolves identifiers only against types
    /// registered here, never against arbitrary reachable type names.
    /// Fails with [`Error::UnsupportedShape`] if `T` is not a record type.
    pub fn register<T>(&self) -> Result<()>
    where
        T: Reflect + Polymorphic + Default,
    {
        let TypeShape::Record(shape) = T::shape() else {
            return Err(Error::UnsupportedShape(
                "only record types can be registered for polymorphic decoding",
            ));
        };

        self.registry.insert(
            shape.type_name,
            RegisteredType {
                shape: T::shape,
                into_value: |value| {
                    value
                        .downcast::<T>()
                        .ok()
                        .map(|concrete| concrete as Box<dyn Polymorphic>)
                },
            },
        );

        Ok(())
    }

    /// Encodes `value` into `write`.
    pub fn encode<T: Reflect>(&self, value: &T, mut write: impl Write) -> Result<()> {
        let codec = self.root_codec::<T>()?;
        self.encode_value(&codec, value, &mut write)
    }

    /// Decodes a `T` from `read`.
    pub fn decode<T: Reflect>(&self, mut read: impl Read) -> Result<T> {
        let codec = self.root_codec::<T>()?;
        let value = self.decode_value(&codec, &mut read)?;

        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::ValueAccess(std::any::type_name::<T>()))
    }

    /// Digest of `T`'s wire schema, for out-of-band compatibility checks.
    pub fn fingerprint<T: Reflect>(&self) -> crate::SchemaFingerprint {
        crate::fingerprint::fingerprint::<T>()
    }

    /// Fetches the memoized top-level codec for `T`.
    ///
    /// `T::shape()` rebuilds the descriptor tables and re-establishes the
    /// canonical field order, so it runs once per type; warm calls hit the
    /// map and never touch the shape again. Two threads racing on a new
    /// type both build, the first insert wins.
    fn root_codec<T: Reflect>(&self) -> Result<Arc<ValueCodec>> {
        if let Some(codec) = self.roots.get(&TypeId::of::<T>()) {
            return Ok(Arc::clone(&codec));
        }

        let codec = Arc::new(self.codec_for(&T::shape(), &mut Vec::new())?);
        Ok(Arc::clone(
            self.roots.entry(TypeId::of::<T>()).or_insert(codec).value(),
        ))
    }

    /// Builds (or fetches) the codec for `shape`.
    ///
    /// `in_progress` tracks the record types currently under construction on
    /// this call path; re-encountering one links to its placeholder cell
    /// instead of recursing.
    fn codec_for(&self, shape: &TypeShape, in_progress: &mut Vec<TypeId>) -> Result<ValueCodec> {
        Ok(match shape {
            TypeShape::Scalar(kind) => ValueCodec::Scalar(*kind),
            TypeShape::Sequence(sequence) => ValueCodec::Sequence {
                shape: sequence.clone(),
                element: Box::new(self.codec_for(&(sequence.element)(), in_progress)?),
            },
            TypeShape::Map(map) => ValueCodec::Map {
                shape: map.clone(),
                key: Box::new(self.codec_for(&(map.key)(), in_progress)?),
                value: Box::new(self.codec_for(&(map.value)(), in_progress)?),
            },
            TypeShape::Record(record) => {
                ValueCodec::Record(self.record_cell(&self.records, record, in_progress)?)
            }
            TypeShape::Polymorphic => ValueCodec::Polymorphic,
        })
    }

    /// Insert-or-fetch of a record codec cell, filling it if this caller is
    /// the one that builds it.
    ///
    /// Two threads racing on the same previously-unseen type both obtain the
    /// same cell from the atomic insert; each builds independently and the
    /// first `set` wins, so every observer sees exactly one codec.
    fn record_cell(
        &self,
        cache: &DashMap<TypeId, Arc<RecordCell>>,
        shape: &RecordShape,
        in_progress: &mut Vec<TypeId>,
    ) -> Result<Arc<RecordCell>> {
        let cell = cache
            .entry(shape.type_id)
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .clone();

        if cell.get().is_none() && !in_progress.contains(&shape.type_id) {
            in_progress.push(shape.type_id);
            let built = self.build_record(shape, in_progress);
            in_progress.pop();

            let _ = cell.set(built?);
            trace!(type_name = shape.type_name, "derived record codec");
        }

        Ok(cell)
    }

    fn build_record(
        &self,
        shape: &RecordShape,
        in_progress: &mut Vec<TypeId>,
    ) -> Result<RecordCodec> {
        let mut fields = Vec::with_capacity(shape.fields.len());
        for field in &shape.fields {
            fields.push(FieldCodec {
                get: field.get,
                set: field.set,
                codec: self.codec_for(&(field.shape)(), in_progress)?,
            });
        }

        Ok(RecordCodec {
            type_name: shape.type_name,
            construct: shape.construct,
            fields,
        })
    }

    /// Builds (or fetches) the record codec for the runtime type of a
    /// polymorphic value; keyed by the concrete type, not the declared one.
    fn polymorphic_cell(&self, value: &dyn Polymorphic) -> Result<Arc<RecordCell>> {
        let TypeShape::Record(shape) = value.record_shape() else {
            return Err(Error::UnsupportedShape(
                "polymorphic value does not describe a record type",
            ));
        };

        self.record_cell(&self.polymorphic, &shape, &mut Vec::new())
    }

    fn encode_value(
        &self,
        codec: &ValueCodec,
        value: &dyn Any,
        write: &mut dyn Write,
    ) -> Result<()> {
        match codec {
            ValueCodec::Scalar(kind) => encode_scalar(*kind, value, write),
            ValueCodec::Sequence { shape, element } => {
                let len = (shape.len)(value).ok_or(Error::ValueAccess("sequence"))?;
                write_count(&mut *write, len)?;
                (shape.visit)(value, &mut |item| {
                    self.encode_value(element, item, &mut *write)
                })
            }
            ValueCodec::Map { shape, key, value: entry_value } => {
                let len = (shape.len)(value).ok_or(Error::ValueAccess("map"))?;
                write_count(&mut *write, len)?;
                (shape.visit)(value, &mut |entry_key, entry| {
                    self.encode_value(key, entry_key, &mut *write)?;
                    self.encode_value(entry_value, entry, &mut *write)
                })
            }
            ValueCodec::Record(cell) => {
                let record = cell
                    .get()
                    .ok_or(Error::ConstructionFailure("record codec not initialized"))?;
                self.encode_record(record, value, write)
            }
            ValueCodec::Polymorphic => {
                let boxed = value
                    .downcast_ref::<Box<dyn Polymorphic>>()
                    .ok_or(Error::ValueAccess("polymorphic value"))?;
                scalar::write_string(&mut *write, boxed.type_identifier())?;

                let cell = self.polymorphic_cell(boxed.as_ref())?;
                let record = cell
                    .get()
                    .ok_or(Error::ConstructionFailure("record codec not initialized"))?;
                self.encode_record(record, boxed.as_any(), write)
            }
        }
    }

    /// Encodes a record's fields in canonical order; no names or tags go on
    /// the wire.
    fn encode_record(
        &self,
        codec: &RecordCodec,
        value: &dyn Any,
        write: &mut dyn Write,
    ) -> Result<()> {
        for field in &codec.fields {
            let field_value = (field.get)(value).ok_or(Error::ValueAccess(codec.type_name))?;
            self.encode_value(&field.codec, field_value, write)?;
        }

        Ok(())
    }

    fn decode_value(&self, codec: &ValueCodec, read: &mut dyn Read) -> Result<Box<dyn Any>> {
        match codec {
            ValueCodec::Scalar(kind) => decode_scalar(*kind, read),
            ValueCodec::Sequence { shape, element } => {
                let count = read.read_u32::<LittleEndian>()? as usize;
                // The count is untrusted wire data; cap the speculative
                // allocation and let the sequence grow as elements arrive.
                let mut sequence = (shape.new_with_capacity)(count.min(MAX_PREALLOCATION));
                for _ in 0..count {
                    let item = self.decode_value(element, read)?;
                    (shape.push)(sequence.as_mut(), item)
                        .ok_or(Error::ValueAccess("sequence element"))?;
                }
                Ok(sequence)
            }
            ValueCodec::Map { shape, key, value } => {
                let count = read.read_u32::<LittleEndian>()? as usize;
                let mut map = (shape.new)();
                for _ in 0..count {
                    let entry_key = self.decode_value(key, read)?;
                    let entry_value = self.decode_value(value, read)?;
                    (shape.insert)(map.as_mut(), entry_key, entry_value)
                        .ok_or(Error::ValueAccess("map entry"))?;
                }
                Ok(map)
            }
            ValueCodec::Record(cell) => {
                let record = cell
                    .get()
                    .ok_or(Error::ConstructionFailure("record codec not initialized"))?;
                self.decode_record(record, read)
            }
            ValueCodec::Polymorphic => {
                let identifier = scalar::read_string(&mut *read)?;
                let Some(entry) = self.registry.get(identifier.as_str()) else {
                    return Err(Error::UnresolvableType(identifier));
                };
                // Copy the vtable out so the registry shard is released
                // before recursing into codec derivation.
                let (shape_fn, into_value) = (entry.shape, entry.into_value);
                drop(entry);

                let TypeShape::Record(shape) = shape_fn() else {
                    return Err(Error::UnsupportedShape(
                        "registered polymorphic type is not a record",
                    ));
                };
                let cell = self.record_cell(&self.polymorphic, &shape, &mut Vec::new())?;
                let record = cell
                    .get()
                    .ok_or(Error::ConstructionFailure("record codec not initialized"))?;

                let value = self.decode_record(record, read)?;
                let boxed =
                    into_value(value).ok_or(Error::ConstructionFailure(shape.type_name))?;
                Ok(Box::new(boxed))
            }
        }
    }

    /// Constructs a default instance and fills its fields in canonical
    /// order.
    fn decode_record(&self, codec: &RecordCodec, read: &mut dyn Read) -> Result<Box<dyn Any>> {
        let mut value = (codec.construct)();
        for field in &codec.fields {
            let field_value = self.decode_value(&field.codec, read)?;
            (field.set)(value.as_mut(), field_value)
                .ok_or(Error::ValueAccess(codec.type_name))?;
        }

        Ok(value)
    }
}

/// Upper bound on the element capacity reserved up front from a decoded
/// sequence count.
const MAX_PREALLOCATION: usize = 4096;

/// Writes a container element/entry count as a fixed 4-byte little-endian
/// integer (the format uses the varint only inside fragment headers).
fn write_count(mut write: impl Write, len: usize) -> Result<()> {
    let count =
        u32::try_from(len).map_err(|_| Error::ScalarOutOfRange("count exceeds 32 bits"))?;
    write.write_u32::<LittleEndian>(count)?;

    Ok(())
}

fn scalar_ref<'a, T: 'static>(value: &'a dyn Any) -> Result<&'a T> {
    value
        .downcast_ref::<T>()
        .ok_or(Error::ValueAccess(std::any::type_name::<T>()))
}

fn encode_scalar(kind: ScalarKind, value: &dyn Any, write: &mut dyn Write) -> Result<()> {
    match kind {
        ScalarKind::I8 => write.write_i8(*scalar_ref::<i8>(value)?)?,
        ScalarKind::U8 => write.write_u8(*scalar_ref::<u8>(value)?)?,
        ScalarKind::I16 => write.write_i16::<LittleEndian>(*scalar_ref::<i16>(value)?)?,
        ScalarKind::U16 => write.write_u16::<LittleEndian>(*scalar_ref::<u16>(value)?)?,
        ScalarKind::I32 => write.write_i32::<LittleEndian>(*scalar_ref::<i32>(value)?)?,
        ScalarKind::U32 => write.write_u32::<LittleEndian>(*scalar_ref::<u32>(value)?)?,
        ScalarKind::I64 => write.write_i64::<LittleEndian>(*scalar_ref::<i64>(value)?)?,
        ScalarKind::U64 => write.write_u64::<LittleEndian>(*scalar_ref::<u64>(value)?)?,
        ScalarKind::F32 => write.write_f32::<LittleEndian>(*scalar_ref::<f32>(value)?)?,
        ScalarKind::F64 => write.write_f64::<LittleEndian>(*scalar_ref::<f64>(value)?)?,
        ScalarKind::Bool => scalar::write_bool(&mut *write, *scalar_ref::<bool>(value)?)?,
        ScalarKind::Char => scalar::write_char(&mut *write, *scalar_ref::<char>(value)?)?,
        ScalarKind::Decimal => scalar::write_decimal(&mut *write, scalar_ref::<Decimal>(value)?)?,
        ScalarKind::Timestamp => {
            scalar::write_timestamp(&mut *write, scalar_ref::<DateTime<Utc>>(value)?)?;
        }
        ScalarKind::Duration => {
            scalar::write_duration(&mut *write, scalar_ref::<TimeDelta>(value)?)?;
        }
        ScalarKind::String => scalar::write_string(&mut *write, scalar_ref::<String>(value)?)?,
    }

    Ok(())
}

fn decode_scalar(kind: ScalarKind, read: &mut dyn Read) -> Result<Box<dyn Any>> {
    Ok(match kind {
        ScalarKind::I8 => Box::new(read.read_i8()?),
        ScalarKind::U8 => Box::new(read.read_u8()?),
        ScalarKind::I16 => Box::new(read.read_i16::<LittleEndian>()?),
        ScalarKind::U16 => Box::new(read.read_u16::<LittleEndian>()?),
        ScalarKind::I32 => Box::new(read.read_i32::<LittleEndian>()?),
        ScalarKind::U32 => Box::new(read.read_u32::<LittleEndian>()?),
        ScalarKind::I64 => Box::new(read.read_i64::<LittleEndian>()?),
        ScalarKind::U64 => Box::new(read.read_u64::<LittleEndian>()?),
        ScalarKind::F32 => Box::new(read.read_f32::<LittleEndian>()?),
        ScalarKind::F64 => Box::new(read.read_f64::<LittleEndian>()?),
        ScalarKind::Bool => Box::new(scalar::read_bool(&mut *read)?),
        ScalarKind::Char => Box::new(scalar::read_char(&mut *read)?),
        ScalarKind::Decimal => Box::new(scalar::read_decimal(&mut *read)?),
        ScalarKind::Timestamp => Box::new(scalar::read_timestamp(&mut *read)?),
        ScalarKind::Duration => Box::new(scalar::read_duration(&mut *read)?),
        ScalarKind::String => Box::new(scalar::read_string(&mut *read)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    fn roundtrip<T>(value: &T) -> Result<()>
    where
        T: Reflect + Debug + PartialEq,
    {
        let serializer = Serializer::new();

        let mut encoded: Vec<u8> = Vec::new();
        serializer.encode(value, &mut encoded)?;
        let decoded: T = serializer.decode(encoded.as_slice())?;

        assert_eq!(value, &decoded);

        Ok(())
    }

    #[test]
    fn scalar_extremes_roundtrip() -> Result<()> {
        roundtrip(&i8::MIN)?;
        roundtrip(&i8::MAX)?;
        roundtrip(&u8::MAX)?;
        roundtrip(&i16::MIN)?;
        roundtrip(&u16::MAX)?;
        roundtrip(&i32::MIN)?;
        roundtrip(&u32::MAX)?;
        roundtrip(&i64::MIN)?;
        roundtrip(&i64::MAX)?;
        roundtrip(&u64::MAX)?;
        roundtrip(&0u64)?;
        roundtrip(&f32::MIN)?;
        roundtrip(&f32::MAX)?;
        roundtrip(&f64::MIN)?;
        roundtrip(&f64::MAX)?;
        roundtrip(&false)?;
        roundtrip(&true)?;
        roundtrip(&'\0')?;
        roundtrip(&'🦀')?;
        roundtrip(&String::new())?;
        roundtrip(&"jörð".to_string())?;
        roundtrip(&Decimal::MIN)?;
        roundtrip(&Decimal::MAX)?;
        roundtrip(&Decimal::ZERO)?;

        Ok(())
    }

    #[test]
    fn time_extremes_roundtrip() -> Result<()> {
        let epoch = DateTime::from_timestamp_micros(0).unwrap();
        let far_past = DateTime::from_timestamp_micros(-60_000_000_000_000_000).unwrap();
        let far_future = DateTime::from_timestamp_micros(60_000_000_000_000_000).unwrap();

        roundtrip(&epoch)?;
        roundtrip(&far_past)?;
        roundtrip(&far_future)?;

        roundtrip(&TimeDelta::zero())?;
        roundtrip(&TimeDelta::microseconds(i64::MAX))?;
        roundtrip(&TimeDelta::microseconds(i64::MIN))?;

        Ok(())
    }

    #[test]
    fn sequences_preserve_order_and_length() -> Result<()> {
        roundtrip(&Vec::<u32>::new())?;
        roundtrip(&vec![42u32])?;
        roundtrip(&(0..1000u32).collect::<Vec<_>>())?;
        roundtrip(&vec![vec![1u8, 2], vec![], vec![3]])?;

        Ok(())
    }

    #[test]
    fn sequence_count_precedes_elements() -> Result<()> {
        let serializer = Serializer::new();

        let mut encoded: Vec<u8> = Vec::new();
        serializer.encode(&vec![7u8, 9u8], &mut encoded)?;

        assert_eq!(encoded, [2, 0, 0, 0, 7, 9]);

        Ok(())
    }

    #[test]
    fn maps_preserve_the_entry_set() -> Result<()> {
        let mut entries = std::collections::HashMap::new();
        entries.insert("one".to_string(), 1i64);
        entries.insert("two".to_string(), 2i64);
        entries.insert("three".to_string(), 3i64);
        roundtrip(&entries)?;

        let mut ordered = std::collections::BTreeMap::new();
        ordered.insert(3u16, "c".to_string());
        ordered.insert(1u16, "a".to_string());
        roundtrip(&ordered)?;

        Ok(())
    }

    #[test]
    fn truncated_scalar_is_truncated_input() {
        let serializer = Serializer::new();

        let bytes = [1u8, 2, 3]; // three bytes of an i32
        assert!(matches!(
            serializer.decode::<i32>(bytes.as_slice()),
            Err(Error::TruncatedInput)
        ));
    }

    #[test]
    fn shape_is_resolved_once_per_type() -> Result<()> {
        use crate::shape::FieldDescriptor;
        use std::sync::atomic::{AtomicUsize, Ordering};

        static SHAPE_CALLS: AtomicUsize = AtomicUsize::new(0);

        #[derive(Debug, PartialEq, Default)]
        struct Counted {
            value: u32,
        }

        fn get_value(value: &dyn Any) -> Option<&dyn Any> {
            value
                .downcast_ref::<Counted>()
                .map(|record| &record.value as &dyn Any)
        }

        fn set_value(value: &mut dyn Any, field: Box<dyn Any>) -> Option<()> {
            value.downcast_mut::<Counted>()?.value = *field.downcast::<u32>().ok()?;
            Some(())
        }

        impl Reflect for Counted {
            fn shape() -> TypeShape {
                SHAPE_CALLS.fetch_add(1, Ordering::Relaxed);
                TypeShape::Record(RecordShape::new::<Counted>(
                    "counted",
                    vec![FieldDescriptor {
                        name: "value",
                        type_name: "u32",
                        shape: u32::shape,
                        get: get_value,
                        set: set_value,
                    }],
                ))
            }
        }

        let serializer = Serializer::new();

        let mut encoded: Vec<u8> = Vec::new();
        serializer.encode(&Counted { value: 7 }, &mut encoded)?;
        let cold_resolutions = SHAPE_CALLS.load(Ordering::Relaxed);

        for _ in 0..10 {
            encoded.clear();
            serializer.encode(&Counted { value: 7 }, &mut encoded)?;
            let decoded: Counted = serializer.decode(encoded.as_slice())?;
            assert_eq!(decoded, Counted { value: 7 });
        }

        // Warm calls must hit the memoized codec, never the shape.
        assert_eq!(SHAPE_CALLS.load(Ordering::Relaxed), cold_resolutions);

        Ok(())
    }

    #[test]
    fn huge_claimed_count_fails_without_reserving() {
        let serializer = Serializer::new();

        // Count claims u32::MAX 8-byte elements with nothing behind it; the
        // decoder must fail on the first element, not reserve 32 GiB.
        let bytes = [0xFFu8, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            serializer.decode::<Vec<u64>>(bytes.as_slice()),
            Err(Error::TruncatedInput)
        ));
    }

    #[test]
    fn truncated_sequence_is_truncated_input() {
        let serializer = Serializer::new();

        // Count claims four elements, only two follow.
        let bytes = [4u8, 0, 0, 0, 1, 2];
        assert!(matches!(
            serializer.decode::<Vec<u8>>(bytes.as_slice()),
            Err(Error::TruncatedInput)
        ));
    }
}
