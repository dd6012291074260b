//! # Scenepack
//!
//! A chunk-framed binary container and graph codec for scene-like asset
//! data: a structural shape tree, per-category resource blocks, and a
//! schema-driven engine that reconstructs object graphs with shared
//! references intact.
//!
//! ## Overview
//!
//! A pack file separates *structure* from *content*. The shape tree
//! records what exists (categories, reference IDs, names, child order);
//! the resource store holds each node's opaque `(metadata, payload)`
//! record, grouped into one block per category. On top of that sits the
//! graph codec, which turns dynamic, schema-described instances into
//! nodes and records and back, deduplicating shared instances into
//! pointers along the way.
//!
//! ### Key Features
//!
//! *   **Single-pass writes:** Header and index space is reserved up
//!     front, blocks are written sequentially, then one seek back
//!     finalizes the file.
//! *   **Selective loads:** A [`CategoryMask`] picks which resource
//!     blocks are parsed; everything else is framed and skipped.
//! *   **Streamed payloads:** Records can leave their payload bytes on
//!     disk and materialize them later through a memory-mapped
//!     [`PayloadSource`].
//! *   **Shared references:** Instances carrying a dedup identity are
//!     written once; later occurrences become pointer records resolved
//!     back to the same shared value on decode.
//! *   **Schema by registration:** Encodable types are described by
//!     explicit [`TypeDescriptor`]s in a [`TypeRegistry`]; type-specific
//!     [`ClassCodec`]s can take over whole payloads without touching the
//!     engine.
//! *   **Iterative tree walks:** Serialization, parsing, and decoding
//!     all run on explicit heap stacks, so hostile nesting depth cannot
//!     exhaust the call stack.
//!
//! ## File Layout
//!
//! ```text
//! [Header (12b)] [Index Block] [Node Block] [Resource Block]...
//! ```
//!
//! Every block is a chunk: a little-endian `u32` length (excluding
//! itself) followed by that many bytes. The node block holds the shape
//! tree in depth-first pre-order; each resource block holds the records
//! of exactly one category.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scenepack::{
//!     EncodeSession, FieldKind, GraphEncoder, Instance, LoadOptions, PrimitiveKind,
//!     Scenepack, TypeDescriptor, TypeRegistry, Value,
//! };
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(
//!     TypeDescriptor::new("Health").field("points", FieldKind::Primitive(PrimitiveKind::I32)),
//! );
//!
//! // Encode.
//! let mut session = EncodeSession::new("scene")?;
//! let encoder = GraphEncoder::new(&registry);
//! let health = std::rc::Rc::new(std::cell::RefCell::new(
//!     Instance::new("Health").field("points", Value::I32(100)),
//! ));
//! let subtree = encoder.encode_class(&mut session, &health, None, false)?;
//! session.attach(subtree);
//! Scenepack::save("scene.spk", scenepack::FileKind::GameAsset, session)?;
//!
//! // Decode.
//! let pack = Scenepack::load("scene.spk", &LoadOptions::default())?;
//! let (root, report) = Scenepack::decode(&pack, &registry)?;
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** `unsafe` appears only in the `io` module,
//!   for memory-mapping the container file.
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library
//!   (enforced by clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a
//!   [`PackError`] variant; corrupt framing is always a hard error, never
//!   a best-effort resync.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod category;
pub mod codec;
pub mod container;
pub mod error;
pub mod inspector;
pub mod resolve;
pub mod shape;
pub mod store;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod chunk;
#[doc(hidden)]
pub mod id;
#[doc(hidden)]
pub mod io;

// --- RE-EXPORTS ---

pub use api::{LoadedPack, Scenepack};
pub use category::{BlockKind, Category, CategoryMask, FileKind, MetadataKind};
pub use codec::{
    ClassCodec, DecodeReport, DecodedNode, EncodeSession, FieldDescriptor, FieldKind,
    GraphDecoder, GraphEncoder, Instance, PrimitiveKind, TypeDescriptor, TypeRegistry, Value,
};
pub use container::{ContainerFile, ContainerIndex, FileHeader, LoadOptions};
pub use error::{PackError, Result};
pub use id::{IdGenerator, ReferenceId};
pub use inspector::PackInspector;
pub use io::PayloadSource;
pub use shape::ShapeNode;
pub use store::{Payload, ResourceBlock, ResourceRecord, ResourceStore, StreamedRange};
