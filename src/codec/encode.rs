//! Graph encoding: dynamic instances into shape nodes and resource
//! records.
//!
//! The encoder walks an instance graph against the registered descriptors,
//! emitting one `Class` node and record per instance, one `Primitive` leaf
//! per set primitive field, and one `Collection` node wrapping the element
//! subtrees. Instances carrying a dedup identity are emitted once; every
//! later occurrence becomes a `Pointer` record whose payload is the first
//! occurrence's reference ID.
//!
//! Each `encode_class` call returns the subtree it built; the caller
//! decides where to attach it. The instance graph must be acyclic except
//! through identity-carrying instances, which the dedup pass short-
//! circuits into pointers.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::category::{Category, MetadataKind};
use crate::codec::descriptor::{
    encode_meta, primitive_kind_named, primitive_to_bytes, CollectionMeta, FieldKind, FieldMeta,
    PrimitiveKind, TypeRegistry,
};
use crate::codec::value::{Instance, Value};
use crate::error::{PackError, Result};
use crate::id::{IdGenerator, ReferenceId};
use crate::shape::ShapeNode;
use crate::store::{ResourceRecord, ResourceStore};

/// Mutable state of one encode pass: the ID generator, the shape tree
/// under construction, the resource store, and the dedup ledger.
///
/// A session covers exactly one output file and must not be reused.
#[derive(Debug)]
pub struct EncodeSession {
    generator: IdGenerator,
    root: ShapeNode,
    store: ResourceStore,
    emitted: Vec<(String, ReferenceId)>,
}

impl EncodeSession {
    /// Starts a session with a named root node.
    pub fn new(root_name: impl Into<String>) -> Result<Self> {
        let mut generator = IdGenerator::new();
        let root_id = generator.generate()?;
        let root = ShapeNode::new(Category::Root, root_id).with_name(root_name);
        Ok(Self {
            generator,
            root,
            store: ResourceStore::new(),
            emitted: Vec::new(),
        })
    }

    /// Issues a session-unique reference ID.
    pub fn generate_id(&mut self) -> Result<ReferenceId> {
        self.generator.generate()
    }

    /// The shape tree built so far.
    pub fn root(&self) -> &ShapeNode {
        &self.root
    }

    /// Mutable access to the shape tree, for callers that attach subtrees
    /// below something other than the root.
    pub fn root_mut(&mut self) -> &mut ShapeNode {
        &mut self.root
    }

    /// Attaches a finished subtree directly under the root.
    pub fn attach(&mut self, child: ShapeNode) {
        self.root.add_child(child);
    }

    /// The resource store built so far.
    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Adds a record under `category`.
    pub fn add_resource(&mut self, category: Category, record: ResourceRecord) -> Result<()> {
        self.store.add_resource(category, record)
    }

    /// Explicitly replaces an already-added record.
    pub fn replace_resource(&mut self, category: Category, record: ResourceRecord) -> Result<()> {
        self.store.replace_resource(category, record)
    }

    /// Splits the session into the finished shape tree and store, ready
    /// for [`crate::container::ContainerFile::write`].
    pub fn into_parts(self) -> (ShapeNode, ResourceStore) {
        (self.root, self.store)
    }

    /// First reference ID emitted for `identity`, if any.
    ///
    /// A linear scan over everything emitted this session; sessions are
    /// bounded by one file's content.
    fn find_emitted(&self, identity: &str) -> Option<ReferenceId> {
        self.emitted
            .iter()
            .find(|(known, _)| known == identity)
            .map(|(_, id)| *id)
    }

    fn record_emitted(&mut self, identity: &str, id: ReferenceId) {
        self.emitted.push((identity.to_string(), id));
    }
}

/// Encodes instance graphs against a descriptor registry.
#[derive(Debug)]
pub struct GraphEncoder<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> GraphEncoder<'r> {
    /// Creates an encoder over `registry`.
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Encodes one instance (and, transitively, its set fields) into the
    /// session, returning the subtree for the caller to attach.
    ///
    /// `field_name` and `array_item` describe where the instance sits in
    /// its parent, and travel in the record metadata so decode can route
    /// the rebuilt value; pass `None` for a top-level instance.
    pub fn encode_class(
        &self,
        session: &mut EncodeSession,
        instance: &Rc<RefCell<Instance>>,
        field_name: Option<&str>,
        array_item: bool,
    ) -> Result<ShapeNode> {
        let inst = instance.borrow();
        let field_name = field_name.unwrap_or_default();

        if let Some(identity) = inst.identity.as_deref() {
            if let Some(target) = session.find_emitted(identity) {
                return self.encode_pointer(session, &inst.type_name, target, field_name, array_item);
            }
        }

        let id = session.generate_id()?;
        let mut node = ShapeNode::new(Category::Class, id);
        if let Some(identity) = inst.identity.clone() {
            session.record_emitted(&identity, id);
            node = node.with_identity(identity);
        }

        let meta = encode_meta(&FieldMeta {
            primitive: None,
            type_name: inst.type_name.clone(),
            field_name: field_name.to_string(),
            array_item,
        })?;

        // A type-specific codec owns the whole payload; no field children
        // are emitted for it.
        if let Some(codec) = self.registry.codec_for(&inst.type_name) {
            let payload = codec.encode_payload(&inst)?;
            let record = ResourceRecord::new(id, MetadataKind::SchemaEncoded, meta, payload);
            session.add_resource(Category::Class, record)?;
            return Ok(node);
        }

        let descriptor = self
            .registry
            .descriptor(&inst.type_name)
            .cloned()
            .ok_or_else(|| {
                PackError::Schema(format!(
                    "no descriptor registered for type {}",
                    inst.type_name
                ))
            })?;

        let record = ResourceRecord::new(id, MetadataKind::SchemaEncoded, meta, Vec::new());
        session.add_resource(Category::Class, record)?;

        for field in &descriptor.fields {
            let value = match inst.get(&field.name) {
                Some(value) if !value.is_unset() => value.clone(),
                _ => continue,
            };

            let child = match &field.kind {
                FieldKind::Primitive(kind) => {
                    self.encode_primitive(session, *kind, &value, &field.name, false)?
                }
                FieldKind::Class { .. } => {
                    let target = value.as_object().ok_or_else(|| {
                        PackError::Schema(format!(
                            "field {}.{} expects a class instance",
                            descriptor.type_name, field.name
                        ))
                    })?;
                    self.encode_class(session, target, Some(&field.name), false)?
                }
                FieldKind::Collection { element_type } => {
                    self.encode_collection(session, element_type, &value, &field.name)?
                }
                FieldKind::PointerCollection { element_type } => {
                    self.encode_pointer_collection(session, element_type, &value, &field.name)?
                }
            };
            node.add_child(child);
        }

        Ok(node)
    }

    fn encode_primitive(
        &self,
        session: &mut EncodeSession,
        kind: PrimitiveKind,
        value: &Value,
        field_name: &str,
        array_item: bool,
    ) -> Result<ShapeNode> {
        let payload = primitive_to_bytes(kind, value)?;
        let id = session.generate_id()?;
        let meta = encode_meta(&FieldMeta {
            primitive: Some(kind),
            type_name: String::new(),
            field_name: field_name.to_string(),
            array_item,
        })?;
        let record = ResourceRecord::new(id, MetadataKind::SchemaEncoded, meta, payload);
        session.add_resource(Category::Primitive, record)?;
        Ok(ShapeNode::new(Category::Primitive, id))
    }

    /// Encodes a by-value collection: every element subtree first (so the
    /// element IDs are known), then the wrapper node and record.
    fn encode_collection(
        &self,
        session: &mut EncodeSession,
        element_type: &str,
        value: &Value,
        field_name: &str,
    ) -> Result<ShapeNode> {
        let items = value.as_list().ok_or_else(|| {
            PackError::Schema(format!("field {field_name} expects a collection"))
        })?;

        let mut children = Vec::with_capacity(items.len());
        let mut item_ids = Vec::with_capacity(items.len());
        for item in items {
            let child = match primitive_kind_named(element_type) {
                Some(kind) => self.encode_primitive(session, kind, item, field_name, true)?,
                None => {
                    let target = item.as_object().ok_or_else(|| {
                        PackError::Schema(format!(
                            "collection {field_name} expects {element_type} elements"
                        ))
                    })?;
                    self.encode_class(session, target, Some(field_name), true)?
                }
            };
            item_ids.push(child.id.as_u32());
            children.push(child);
        }

        let id = session.generate_id()?;
        let meta = encode_meta(&CollectionMeta {
            element_type: element_type.to_string(),
            field_name: field_name.to_string(),
            count: items.len() as u32,
            item_ids,
            array_item: false,
        })?;
        let record = ResourceRecord::new(id, MetadataKind::SchemaEncoded, meta, Vec::new());
        session.add_resource(Category::Collection, record)?;

        let mut node = ShapeNode::new(Category::Collection, id);
        for child in children {
            node.add_child(child);
        }
        Ok(node)
    }

    /// Encodes a by-reference collection. The elements live elsewhere in
    /// the tree; only their reference IDs are recorded, so the node has no
    /// children.
    ///
    /// Elements are either `I64` values holding a raw reference ID, or
    /// identity-carrying instances already encoded this session.
    fn encode_pointer_collection(
        &self,
        session: &mut EncodeSession,
        element_type: &str,
        value: &Value,
        field_name: &str,
    ) -> Result<ShapeNode> {
        let items = value.as_list().ok_or_else(|| {
            PackError::Schema(format!("field {field_name} expects a pointer collection"))
        })?;

        let mut item_ids = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::I64(raw) if (0..=i64::from(u32::MAX)).contains(raw) => {
                    item_ids.push(*raw as u32);
                }
                Value::Object(target) => {
                    let target = target.borrow();
                    let id = target
                        .identity
                        .as_deref()
                        .and_then(|identity| session.find_emitted(identity))
                        .ok_or_else(|| {
                            PackError::Schema(format!(
                                "pointer collection {field_name} element has not been encoded yet"
                            ))
                        })?;
                    item_ids.push(id.as_u32());
                }
                other => {
                    return Err(PackError::Schema(format!(
                        "pointer collection {field_name} cannot reference {other:?}"
                    )));
                }
            }
        }

        let id = session.generate_id()?;
        let meta = encode_meta(&CollectionMeta {
            element_type: element_type.to_string(),
            field_name: field_name.to_string(),
            count: items.len() as u32,
            item_ids,
            array_item: false,
        })?;
        let record = ResourceRecord::new(id, MetadataKind::SchemaEncoded, meta, Vec::new());
        session.add_resource(Category::PointerCollection, record)?;
        Ok(ShapeNode::new(Category::PointerCollection, id))
    }

    fn encode_pointer(
        &self,
        session: &mut EncodeSession,
        type_name: &str,
        target: ReferenceId,
        field_name: &str,
        array_item: bool,
    ) -> Result<ShapeNode> {
        let id = session.generate_id()?;
        let meta = encode_meta(&FieldMeta {
            primitive: None,
            type_name: type_name.to_string(),
            field_name: field_name.to_string(),
            array_item,
        })?;
        let payload = target.as_u32().to_le_bytes().to_vec();
        let record = ResourceRecord::new(id, MetadataKind::SchemaEncoded, meta, payload);
        session.add_resource(Category::Pointer, record)?;
        debug!("deduplicated {type_name} into a pointer at {target}");
        Ok(ShapeNode::new(Category::Pointer, id))
    }
}
