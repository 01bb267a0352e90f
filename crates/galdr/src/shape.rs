//! Type shapes: the classification of a data type for codec purposes, and
//! the descriptor tables the codec engine consumes.
//!
//! Every serializable type implements [`Reflect`], either through one of the
//! built-in implementations below or through `#[derive(Reflect)]`. A shape is
//! a fully type-erased description: record fields carry monomorphized
//! accessor function pointers, container shapes carry construction and
//! iteration vtables, and nested shapes are reached through lazy thunks so
//! self-referential type graphs terminate.
use chrono::{DateTime, TimeDelta, Utc};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::{Decimal, Error, Result};

/// Lazy handle to a nested type's shape.
///
/// Shapes reference their component shapes through function pointers rather
/// than inline values, so a record type that (transitively) contains itself
/// can still be described.
pub type ShapeFn = fn() -> TypeShape;

/// Borrows one field of a record as a type-erased value.
///
/// Returns `None` when the passed value is not the record type the
/// descriptor was generated for.
pub type FieldGetter = for<'a> fn(&'a dyn Any) -> Option<&'a dyn Any>;

/// Writes one field of a record from a type-erased value.
pub type FieldSetter = fn(&mut dyn Any, Box<dyn Any>) -> Option<()>;

/// The scalar kinds with a fixed wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ScalarKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
    Char,
    Decimal,
    Timestamp,
    Duration,
    String,
}

/// Classification of a type for codec derivation.
#[derive(Debug, Clone)]
pub enum TypeShape {
    /// A fixed-width or length-prefixed scalar.
    Scalar(ScalarKind),
    /// An ordered, variable-length, homogeneous collection.
    Sequence(SequenceShape),
    /// An unordered key-to-value collection with unique keys.
    Map(MapShape),
    /// A concrete, instantiable composite type.
    Record(RecordShape),
    /// A value whose static type is a trait object; the concrete type is
    /// only known per instance at encode time.
    Polymorphic,
}

/// Descriptor for one serializable field of a record.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name, used for canonical ordering and the schema fingerprint.
    pub name: &'static str,
    /// Qualified name of the field's type.
    pub type_name: &'static str,
    /// Shape of the field's type.
    pub shape: ShapeFn,
    /// Type-erased read access.
    pub get: FieldGetter,
    /// Type-erased write access.
    pub set: FieldSetter,
}

/// Descriptor for a concrete record type: its identity, its construction
/// path and its fields in canonical order.
#[derive(Debug, Clone)]
pub struct RecordShape {
    /// Identity of the described type.
    pub type_id: TypeId,
    /// Fully-qualified type name; written to the wire for polymorphic
    /// values and hashed into the schema fingerprint.
    pub type_name: &'static str,
    /// Fields in canonical (name-ascending) order.
    pub fields: Vec<FieldDescriptor>,
    /// Builds a default instance for the decoder to fill in.
    pub construct: fn() -> Box<dyn Any>,
}

impl RecordShape {
    /// Materializes a record shape, establishing the canonical field order.
    ///
    /// The wire format carries no field names or tags, so encode and decode
    /// must agree on the order; sorting by name here makes it independent of
    /// declaration order.
    pub fn new<T: Default + 'static>(
        type_name: &'static str,
        mut fields: Vec<FieldDescriptor>,
    ) -> Self {
        fields.sort_by(|a, b| a.name.cmp(b.name));

        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            fields,
            construct: || Box::new(T::default()),
        }
    }
}

/// Capability vtable for a homogeneous sequence type.
#[derive(Debug, Clone)]
pub struct SequenceShape {
    /// Shape of the element type.
    pub element: ShapeFn,
    /// Number of elements in a value of this type.
    pub len: fn(&dyn Any) -> Option<usize>,
    /// Calls the visitor once per element, in order.
    pub visit: fn(&dyn Any, &mut dyn FnMut(&dyn Any) -> Result<()>) -> Result<()>,
    /// Creates an empty instance sized for `capacity` elements.
    pub new_with_capacity: fn(usize) -> Box<dyn Any>,
    /// Appends a decoded element.
    pub push: fn(&mut dyn Any, Box<dyn Any>) -> Option<()>,
}

/// Capability vtable for a key-unique map type.
#[derive(Debug, Clone)]
pub struct MapShape {
    /// Shape of the key type.
    pub key: ShapeFn,
    /// Shape of the value type.
    pub value: ShapeFn,
    /// Number of entries in a value of this type.
    pub len: fn(&dyn Any) -> Option<usize>,
    /// Calls the visitor once per entry, in the map's natural iteration
    /// order. The order is not normalized; two maps with equal entries may
    /// produce different bytes.
    pub visit: fn(&dyn Any, &mut dyn FnMut(&dyn Any, &dyn Any) -> Result<()>) -> Result<()>,
    /// Creates an empty instance.
    pub new: fn() -> Box<dyn Any>,
    /// Inserts a decoded entry.
    pub insert: fn(&mut dyn Any, Box<dyn Any>, Box<dyn Any>) -> Option<()>,
}

/// Implemented by every serializable type.
pub trait Reflect: 'static {
    /// Classifies the implementing type for codec derivation.
    fn shape() -> TypeShape;
}

/// Object-safe access to a value held behind an abstract (trait object)
/// field, the one case where the concrete type is only known at runtime.
///
/// `#[derive(Reflect)]` implements this trait alongside [`Reflect`]; fields
/// declared as `Box<dyn Polymorphic>` are encoded with a type identifier
/// prefix and decoded through the serializer's registry of permitted
/// concrete types.
pub trait Polymorphic: Any + Send + Sync {
    /// Fully-qualified identifier written to the wire for this concrete
    /// type, and looked up in the registry on decode.
    fn type_identifier(&self) -> &'static str;

    /// The concrete type's record shape.
    fn record_shape(&self) -> TypeShape;

    /// Borrows the value for type-erased field access.
    fn as_any(&self) -> &dyn Any;
}

impl Reflect for Box<dyn Polymorphic> {
    fn shape() -> TypeShape {
        TypeShape::Polymorphic
    }
}

/// This macro implements [`Reflect`] for the scalar kinds without having to
/// spell out every implementation individually.
macro_rules! impl_scalar_reflect {
    ($t:ty, $kind:ident) => {
        impl Reflect for $t {
            fn shape() -> TypeShape {
                TypeShape::Scalar(ScalarKind::$kind)
            }
        }
    };
}

impl_scalar_reflect!(i8, I8);
impl_scalar_reflect!(u8, U8);
impl_scalar_reflect!(i16, I16);
impl_scalar_reflect!(u16, U16);
impl_scalar_reflect!(i32, I32);
impl_scalar_reflect!(u32, U32);
impl_scalar_reflect!(i64, I64);
impl_scalar_reflect!(u64, U64);
impl_scalar_reflect!(f32, F32);
impl_scalar_reflect!(f64, F64);
impl_scalar_reflect!(bool, Bool);
impl_scalar_reflect!(char, Char);
impl_scalar_reflect!(Decimal, Decimal);
impl_scalar_reflect!(DateTime<Utc>, Timestamp);
impl_scalar_reflect!(TimeDelta, Duration);
impl_scalar_reflect!(String, String);

fn sequence_len<T: Reflect>(value: &dyn Any) -> Option<usize> {
    value.downcast_ref::<Vec<T>>().map(Vec::len)
}

fn sequence_visit<T: Reflect>(
    value: &dyn Any,
    visitor: &mut dyn FnMut(&dyn Any) -> Result<()>,
) -> Result<()> {
    let items = value
        .downcast_ref::<Vec<T>>()
        .ok_or(Error::ValueAccess(std::any::type_name::<Vec<T>>()))?;
    for item in items {
        visitor(item)?;
    }

    Ok(())
}

fn sequence_new<T: Reflect>(capacity: usize) -> Box<dyn Any> {
    Box::new(Vec::<T>::with_capacity(capacity))
}

fn sequence_push<T: Reflect>(value: &mut dyn Any, item: Box<dyn Any>) -> Option<()> {
    value.downcast_mut::<Vec<T>>()?.push(*item.downcast::<T>().ok()?);
    Some(())
}

impl<T: Reflect> Reflect for Vec<T> {
    fn shape() -> TypeShape {
        TypeShape::Sequence(SequenceShape {
            element: T::shape,
            len: sequence_len::<T>,
            visit: sequence_visit::<T>,
            new_with_capacity: sequence_new::<T>,
            push: sequence_push::<T>,
        })
    }
}

fn hash_map_len<K: Reflect + Eq + Hash, V: Reflect>(value: &dyn Any) -> Option<usize> {
    value.downcast_ref::<HashMap<K, V>>().map(HashMap::len)
}

fn hash_map_visit<K: Reflect + Eq + Hash, V: Reflect>(
    value: &dyn Any,
    visitor: &mut dyn FnMut(&dyn Any, &dyn Any) -> Result<()>,
) -> Result<()> {
    let entries = value
        .downcast_ref::<HashMap<K, V>>()
        .ok_or(Error::ValueAccess(std::any::type_name::<HashMap<K, V>>()))?;
    for (key, item) in entries {
        visitor(key, item)?;
    }

    Ok(())
}

fn hash_map_new<K: Reflect + Eq + Hash, V: Reflect>() -> Box<dyn Any> {
    Box::new(HashMap::<K, V>::new())
}

fn hash_map_insert<K: Reflect + Eq + Hash, V: Reflect>(
    value: &mut dyn Any,
    key: Box<dyn Any>,
    item: Box<dyn Any>,
) -> Option<()> {
    value
        .downcast_mut::<HashMap<K, V>>()?
        .insert(*key.downcast::<K>().ok()?, *item.downcast::<V>().ok()?);
    Some(())
}

impl<K: Reflect + Eq + Hash, V: Reflect> Reflect for HashMap<K, V> {
    fn shape() -> TypeShape {
        TypeShape::Map(MapShape {
            key: K::shape,
            value: V::shape,
            len: hash_map_len::<K, V>,
            visit: hash_map_visit::<K, V>,
            new: hash_map_new::<K, V>,
            insert: hash_map_insert::<K, V>,
        })
    }
}

fn btree_map_len<K: Reflect + Ord, V: Reflect>(value: &dyn Any) -> Option<usize> {
    value.downcast_ref::<BTreeMap<K, V>>().map(BTreeMap::len)
}

fn btree_map_visit<K: Reflect + Ord, V: Reflect>(
    value: &dyn Any,
    visitor: &mut dyn FnMut(&dyn Any, &dyn Any) -> Result<()>,
) -> Result<()> {
    let entries = value
        .downcast_ref::<BTreeMap<K, V>>()
        .ok_or(Error::ValueAccess(std::any::type_name::<BTreeMap<K, V>>()))?;
    for (key, item) in entries {
        visitor(key, item)?;
    }

    Ok(())
}

fn btree_map_new<K: Reflect + Ord, V: Reflect>() -> Box<dyn Any> {
    Box::new(BTreeMap::<K, V>::new())
}

fn btree_map_insert<K: Reflect + Ord, V: Reflect>(
    value: &mut dyn Any,
    key: Box<dyn Any>,
    item: Box<dyn Any>,
) -> Option<()> {
    value
        .downcast_mut::<BTreeMap<K, V>>()?
        .insert(*key.downcast::<K>().ok()?, *item.downcast::<V>().ok()?);
    Some(())
}

impl<K: Reflect + Ord, V: Reflect> Reflect for BTreeMap<K, V> {
    fn shape() -> TypeShape {
        TypeShape::Map(MapShape {
            key: K::shape,
            value: V::shape,
            len: btree_map_len::<K, V>,
            visit: btree_map_visit::<K, V>,
            new: btree_map_new::<K, V>,
            insert: btree_map_insert::<K, V>,
        })
    }
}
