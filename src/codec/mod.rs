//! The graph codec: schema-described instances to and from the container's
//! shape tree and resource records.
//!
//! Encoding walks a dynamic [`value::Instance`] graph against registered
//! [`descriptor::TypeDescriptor`]s, emitting one shape node and one record
//! per class, field, and collection. Decoding walks the loaded shape tree,
//! rebuilding a [`value::Value`] tree and resolving cross-references
//! through the [`crate::resolve`] machinery.

pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod value;

pub use decode::{DecodeReport, DecodedNode, GraphDecoder};
pub use descriptor::{
    ClassCodec, CollectionMeta, FieldDescriptor, FieldKind, FieldMeta, PrimitiveKind,
    TypeDescriptor, TypeRegistry,
};
pub use encode::{EncodeSession, GraphEncoder};
pub use value::{Instance, Value};
