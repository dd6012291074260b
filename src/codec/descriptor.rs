//! Explicit type descriptors: the schema that replaces reflection.
//!
//! Every encodable class exposes a [`TypeDescriptor`] listing its public
//! fields (name and declared kind) and, for class and collection fields,
//! the element type's qualified name. Descriptors live in a
//! [`TypeRegistry`] keyed by qualified type name; the registry also holds
//! type-specific [`ClassCodec`]s looked up by the `<TypeName>Codec` naming
//! convention, with the generic field-by-field engine as the fallback.
//! Registering a codec is the extension mechanism for new encodable types;
//! the core never changes.
//!
//! The wire forms ([`FieldMeta`], [`CollectionMeta`]) are what a record's
//! `SchemaEncoded` metadata bytes actually contain: enough to resolve the
//! concrete type and destination field without static knowledge at decode
//! time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::value::{Instance, Value};
use crate::error::{PackError, Result};

/// Closed set of primitive field kinds with a stable wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveKind {
    /// UTF-8 string.
    Str,
    /// Boolean (one byte on the wire).
    Bool,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Raw byte buffer.
    Bytes,
}

/// Declared kind of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A primitive or string leaf.
    Primitive(PrimitiveKind),
    /// An ordered collection of same-typed elements.
    Collection {
        /// Qualified name of the element type ("i32", "MyClass", ...).
        element_type: String,
    },
    /// A nested class instance.
    Class {
        /// Qualified name of the field's concrete type.
        type_name: String,
    },
    /// A collection whose elements are references to nodes elsewhere in
    /// the tree, resolved in the post-pass.
    PointerCollection {
        /// Qualified name of the referenced element type.
        element_type: String,
    },
}

/// One public field of an encodable type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name, used for set-by-name at decode.
    pub name: String,
    /// Declared kind.
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// The descriptor of one encodable type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// Qualified type name; the registry key.
    pub type_name: String,
    /// Public fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    /// Creates a descriptor with no fields.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field appender.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::new(name, kind));
        self
    }

    /// Looks up a field by name.
    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A type-specific codec that turns a whole instance into one opaque
/// payload and back, bypassing the generic field walk.
///
/// The engine still frames the record and writes the schema metadata; the
/// codec only owns the payload bytes.
pub trait ClassCodec {
    /// Encodes one instance into payload bytes.
    fn encode_payload(&self, instance: &Instance) -> Result<Vec<u8>>;

    /// Decodes payload bytes back into a value.
    fn decode_payload(&self, payload: &[u8]) -> Result<Value>;
}

/// Registry of type descriptors and optional type-specific codecs.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
    codecs: HashMap<String, Box<dyn ClassCodec>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type descriptor under its qualified name.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.type_name.clone(), descriptor);
    }

    /// Registers a type-specific codec for `type_name`.
    ///
    /// Stored under the `<TypeName>Codec` convention name so lookup is a
    /// pure name-convention check.
    pub fn register_codec(&mut self, type_name: &str, codec: Box<dyn ClassCodec>) {
        self.codecs.insert(format!("{type_name}Codec"), codec);
    }

    /// Resolves a descriptor by qualified type name.
    pub fn descriptor(&self, type_name: &str) -> Option<&TypeDescriptor> {
        self.types.get(type_name)
    }

    /// Looks up a type-specific codec by the naming convention; `None`
    /// means the generic engine handles the type.
    pub fn codec_for(&self, type_name: &str) -> Option<&dyn ClassCodec> {
        self.codecs
            .get(&format!("{type_name}Codec"))
            .map(Box::as_ref)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.len())
            .field("codecs", &self.codecs.len())
            .finish()
    }
}

/// Wire metadata of a primitive, class, or pointer record: everything the
/// decoder needs to route the value into its destination field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Primitive tag, if the record is a primitive leaf.
    pub primitive: Option<PrimitiveKind>,
    /// Qualified type name for class records (empty for primitives).
    pub type_name: String,
    /// Destination field name in the parent instance.
    pub field_name: String,
    /// Whether the value is an element of a collection (routed by the
    /// running array index instead of by name).
    pub array_item: bool,
}

/// Wire metadata of a collection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Qualified element type name.
    pub element_type: String,
    /// Destination field name in the parent instance.
    pub field_name: String,
    /// Declared element count; the decoder pre-sizes the list with it.
    pub count: u32,
    /// Reference IDs of the element records, in element order. Pointer
    /// collections resolve these against the finished tree in the
    /// post-pass.
    pub item_ids: Vec<u32>,
    /// Whether the collection itself is an element of an outer
    /// collection.
    pub array_item: bool,
}

/// Resolves a collection element type name to a primitive kind, if it
/// names one. Anything else is treated as a class type name.
pub fn primitive_kind_named(name: &str) -> Option<PrimitiveKind> {
    match name {
        "str" => Some(PrimitiveKind::Str),
        "bool" => Some(PrimitiveKind::Bool),
        "i32" => Some(PrimitiveKind::I32),
        "i64" => Some(PrimitiveKind::I64),
        "f32" => Some(PrimitiveKind::F32),
        "f64" => Some(PrimitiveKind::F64),
        "bytes" => Some(PrimitiveKind::Bytes),
        _ => None,
    }
}

/// Serializes one primitive value to its payload bytes. Numeric values are
/// little-endian, strings are raw UTF-8, booleans are one byte.
pub fn primitive_to_bytes(kind: PrimitiveKind, value: &Value) -> Result<Vec<u8>> {
    match (kind, value) {
        (PrimitiveKind::Str, Value::Str(s)) => Ok(s.as_bytes().to_vec()),
        (PrimitiveKind::Bool, Value::Bool(b)) => Ok(vec![u8::from(*b)]),
        (PrimitiveKind::I32, Value::I32(v)) => Ok(v.to_le_bytes().to_vec()),
        (PrimitiveKind::I64, Value::I64(v)) => Ok(v.to_le_bytes().to_vec()),
        (PrimitiveKind::F32, Value::F32(v)) => Ok(v.to_le_bytes().to_vec()),
        (PrimitiveKind::F64, Value::F64(v)) => Ok(v.to_le_bytes().to_vec()),
        (PrimitiveKind::Bytes, Value::Bytes(b)) => Ok(b.clone()),
        (kind, value) => Err(PackError::Schema(format!(
            "value {value:?} does not match declared primitive kind {kind:?}"
        ))),
    }
}

/// Deserializes one primitive payload back into a value.
pub fn primitive_from_bytes(kind: PrimitiveKind, bytes: &[u8]) -> Result<Value> {
    fn fixed<const N: usize>(kind: PrimitiveKind, bytes: &[u8]) -> Result<[u8; N]> {
        bytes.try_into().map_err(|_| {
            PackError::Schema(format!(
                "primitive {kind:?} expects {N} payload bytes, found {}",
                bytes.len()
            ))
        })
    }

    match kind {
        PrimitiveKind::Str => String::from_utf8(bytes.to_vec())
            .map(Value::Str)
            .map_err(|_| PackError::Schema("string payload is not valid UTF-8".into())),
        PrimitiveKind::Bool => match bytes.first() {
            Some(b) => Ok(Value::Bool(*b != 0)),
            None => Err(PackError::Schema("boolean payload is empty".into())),
        },
        PrimitiveKind::I32 => Ok(Value::I32(i32::from_le_bytes(fixed(kind, bytes)?))),
        PrimitiveKind::I64 => Ok(Value::I64(i64::from_le_bytes(fixed(kind, bytes)?))),
        PrimitiveKind::F32 => Ok(Value::F32(f32::from_le_bytes(fixed(kind, bytes)?))),
        PrimitiveKind::F64 => Ok(Value::F64(f64::from_le_bytes(fixed(kind, bytes)?))),
        PrimitiveKind::Bytes => Ok(Value::Bytes(bytes.to_vec())),
    }
}

/// Encodes schema metadata with the crate's standard bincode
/// configuration.
pub fn encode_meta<T: Serialize>(meta: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(meta, bincode::config::standard())
        .map_err(|e| PackError::Schema(e.to_string()))
}

/// Decodes schema metadata.
pub fn decode_meta<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(meta, _)| meta)
        .map_err(|e| PackError::Schema(e.to_string()))
}
