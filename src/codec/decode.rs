//! Graph decoding: a loaded shape tree plus its records back into a
//! dynamic value tree.
//!
//! Decoding runs in two iterative passes over heap stacks, so hostile
//! depth cannot exhaust the call stack. The first pass mirrors the shape
//! tree into shared [`DecodedNode`]s. The second walks it pre-order,
//! parsing each node's record and routing the rebuilt value into its
//! parent's field or collection slot; pointers go through the
//! [`Resolver`] so either producer/consumer order works, and pointer
//! collections are deferred to a [`PostPass`] that runs once the whole
//! tree is materialized.
//!
//! Missing records (masked categories, or files written without them)
//! leave the node's value empty and its routed field unset; decode keeps
//! going and the [`DecodeReport`] carries the damage counts.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, warn};

use crate::category::Category;
use crate::codec::descriptor::{
    decode_meta, primitive_from_bytes, CollectionMeta, FieldMeta, TypeRegistry,
};
use crate::codec::value::{Instance, Value};
use crate::error::{PackError, Result};
use crate::id::ReferenceId;
use crate::io::PayloadSource;
use crate::resolve::{PostPass, Resolver};
use crate::shape::ShapeNode;
use crate::store::ResourceStore;

/// One node of the decoded tree: the shape node's structure plus the
/// value its record decoded to, if any.
///
/// Nodes are `Rc`-shared because deferred resolution steps hold handles
/// into the tree while it is still being walked.
#[derive(Debug)]
pub struct DecodedNode {
    /// Category carried over from the shape node.
    pub category: Category,
    /// Reference ID carried over from the shape node.
    pub id: ReferenceId,
    /// Name carried over from the shape node (a placeholder for
    /// categories whose names are not materialized).
    pub name: Option<String>,
    /// The decoded value. `None` until the walk reaches this node, and
    /// forever for structural nodes and masked-out records.
    pub value: RefCell<Option<Value>>,
    /// Children in shape order.
    pub children: Vec<Rc<DecodedNode>>,
}

impl DecodedNode {
    /// Pre-order search by reference ID.
    pub fn find_by_id(self: &Rc<Self>, id: ReferenceId) -> Option<Rc<DecodedNode>> {
        self.find(|n| n.id == id)
    }

    /// Pre-order search by name.
    pub fn find_by_name(self: &Rc<Self>, name: &str) -> Option<Rc<DecodedNode>> {
        self.find(|n| n.name.as_deref() == Some(name))
    }

    fn find(self: &Rc<Self>, matches: impl Fn(&DecodedNode) -> bool) -> Option<Rc<DecodedNode>> {
        let mut stack = vec![Rc::clone(self)];
        while let Some(node) = stack.pop() {
            if matches(&node) {
                return Some(node);
            }
            for child in node.children.iter().rev() {
                stack.push(Rc::clone(child));
            }
        }
        None
    }

    /// A clone of this node's decoded value, if it has one.
    pub fn value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    /// Total number of nodes in this subtree, including self.
    pub fn count(&self) -> usize {
        let mut total = 0;
        let mut stack: Vec<&DecodedNode> = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            for child in &node.children {
                stack.push(child);
            }
        }
        total
    }
}

/// What decode could not reconstruct. Decode itself only fails on corrupt
/// data; schema gaps degrade into these counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Class records whose type name had neither a descriptor nor a
    /// codec; their values (and their field subtrees) stay unset.
    pub unresolved_types: usize,
    /// Reference targets that never resolved: pointer records and pointer
    /// collection elements aimed at IDs absent from the tree.
    pub dangling_refs: usize,
}

/// Where a decoded value lands in its parent: a named field of an
/// instance, or the next slot of a collection being filled.
#[derive(Clone)]
enum FieldTarget {
    Fields(Rc<RefCell<Instance>>),
    Slot {
        items: Rc<RefCell<Vec<Value>>>,
        next: Rc<Cell<usize>>,
    },
}

impl FieldTarget {
    fn assign(&self, field_name: &str, value: Value) {
        match self {
            FieldTarget::Fields(instance) => instance.borrow_mut().set(field_name, value),
            FieldTarget::Slot { items, next } => {
                let index = next.get();
                let mut items = items.borrow_mut();
                if index < items.len() {
                    items[index] = value;
                } else {
                    items.push(value);
                }
                next.set(index + 1);
            }
        }
    }

    /// Claims the destination now, before the value exists, so a deferred
    /// write lands where the cursor sat at registration time rather than
    /// wherever it is when the value finally arrives. For slots this also
    /// advances the cursor, keeping later elements in their own positions.
    fn pin(&self) -> PinnedTarget {
        match self {
            FieldTarget::Fields(instance) => PinnedTarget::Field(Rc::clone(instance)),
            FieldTarget::Slot { items, next } => {
                let index = next.get();
                next.set(index + 1);
                let mut items_mut = items.borrow_mut();
                if index >= items_mut.len() {
                    items_mut.resize(index + 1, Value::Unset);
                }
                drop(items_mut);
                PinnedTarget::Slot {
                    items: Rc::clone(items),
                    index,
                }
            }
        }
    }
}

/// A destination fixed at registration time for a value delivered later.
enum PinnedTarget {
    Field(Rc<RefCell<Instance>>),
    Slot {
        items: Rc<RefCell<Vec<Value>>>,
        index: usize,
    },
}

impl PinnedTarget {
    fn assign(self, field_name: &str, value: Value) {
        match self {
            PinnedTarget::Field(instance) => instance.borrow_mut().set(field_name, value),
            PinnedTarget::Slot { items, index } => {
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    items.resize(index + 1, Value::Unset);
                }
                items[index] = value;
            }
        }
    }
}

/// One unit of the iterative value walk.
enum Step {
    /// Parse this node's record and queue its children.
    Enter {
        node: Rc<DecodedNode>,
        target: Option<FieldTarget>,
    },
    /// All of a collection's elements are in; seal the list and route it.
    Seal {
        node: Rc<DecodedNode>,
        items: Rc<RefCell<Vec<Value>>>,
        field_name: String,
        target: Option<FieldTarget>,
    },
}

/// Shared state of one decode pass.
struct WalkState<'a> {
    store: &'a ResourceStore,
    source: Option<&'a PayloadSource>,
    resolver: Resolver,
    post_pass: PostPass<Rc<DecodedNode>>,
    post_dangling: Rc<Cell<usize>>,
    report: DecodeReport,
}

/// Decodes shape trees against a descriptor registry.
#[derive(Debug)]
pub struct GraphDecoder<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> GraphDecoder<'r> {
    /// Creates a decoder over `registry`.
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Decodes a full tree. Streamed payloads need `source`; in-memory
    /// stores can pass `None`.
    pub fn decode(
        &self,
        shape_root: &ShapeNode,
        store: &ResourceStore,
        source: Option<&PayloadSource>,
    ) -> Result<(Rc<DecodedNode>, DecodeReport)> {
        let root = build_tree(shape_root)?;

        let mut state = WalkState {
            store,
            source,
            resolver: Resolver::new(),
            post_pass: PostPass::new(),
            post_dangling: Rc::new(Cell::new(0)),
            report: DecodeReport::default(),
        };

        let mut steps = vec![Step::Enter {
            node: Rc::clone(&root),
            target: None,
        }];
        while let Some(step) = steps.pop() {
            match step {
                Step::Enter { node, target } => {
                    let child_target = self.enter(&node, &target, &mut state, &mut steps)?;
                    for child in node.children.iter().rev() {
                        steps.push(Step::Enter {
                            node: Rc::clone(child),
                            target: child_target.clone(),
                        });
                    }
                }
                Step::Seal {
                    node,
                    items,
                    field_name,
                    target,
                } => {
                    let list = Value::List(items.borrow().clone());
                    state.resolver.deliver(node.id, list.clone());
                    if let Some(target) = &target {
                        target.assign(&field_name, list.clone());
                    }
                    *node.value.borrow_mut() = Some(list);
                }
            }
        }

        state.post_pass.run(&root);
        state.report.dangling_refs = state.resolver.dangling() + state.post_dangling.get();
        Ok((root, state.report))
    }

    /// Handles one node on entry, returning the target its children route
    /// into (if this node opens an instance or a collection).
    fn enter(
        &self,
        node: &Rc<DecodedNode>,
        target: &Option<FieldTarget>,
        state: &mut WalkState<'_>,
        steps: &mut Vec<Step>,
    ) -> Result<Option<FieldTarget>> {
        let record = match state.store.get_resource(node.category, node.id) {
            Some(record) => record,
            None => {
                // Structural nodes never have records; decodable ones
                // without them were masked out of the load.
                if matches!(
                    node.category,
                    Category::Class
                        | Category::Primitive
                        | Category::Pointer
                        | Category::Collection
                        | Category::PointerCollection
                ) {
                    debug!("node {} ({}) has no record, skipping", node.id, node.category);
                }
                return Ok(None);
            }
        };

        match node.category {
            Category::Class => {
                let meta: FieldMeta = decode_meta(&record.metadata)?;

                if let Some(codec) = self.registry.codec_for(&meta.type_name) {
                    let payload = record.payload_bytes(state.source)?;
                    let value = codec.decode_payload(&payload)?;
                    settle(node, &mut state.resolver, target, &meta.field_name, value);
                    return Ok(None);
                }

                if self.registry.descriptor(&meta.type_name).is_none() {
                    warn!("no descriptor registered for type {}", meta.type_name);
                    state.report.unresolved_types += 1;
                    return Ok(None);
                }

                let instance = Rc::new(RefCell::new(Instance::new(meta.type_name)));
                let value = Value::Object(Rc::clone(&instance));
                settle(node, &mut state.resolver, target, &meta.field_name, value);
                Ok(Some(FieldTarget::Fields(instance)))
            }
            Category::Primitive => {
                let meta: FieldMeta = decode_meta(&record.metadata)?;
                let kind = meta.primitive.ok_or_else(|| {
                    PackError::Schema(format!(
                        "primitive record {} carries no primitive tag",
                        node.id
                    ))
                })?;
                let payload = record.payload_bytes(state.source)?;
                let value = primitive_from_bytes(kind, &payload)?;
                settle(node, &mut state.resolver, target, &meta.field_name, value);
                Ok(None)
            }
            Category::Pointer => {
                let meta: FieldMeta = decode_meta(&record.metadata)?;
                let payload = record.payload_bytes(state.source)?;
                let raw: [u8; 4] = payload.as_slice().try_into().map_err(|_| {
                    PackError::CorruptContainer(format!(
                        "pointer record {} payload is {} bytes, expected 4",
                        node.id,
                        payload.len()
                    ))
                })?;
                let target_id = ReferenceId::from_raw(u32::from_le_bytes(raw));

                // The destination is claimed here, not when the target
                // delivers: a pointer inside a collection keeps its own
                // slot even when later elements settle first. A target
                // that only delivers after the collection seals cannot
                // reach the sealed list; such a pointer stays unset there
                // (the node itself still receives the value).
                let pointer_node = Rc::clone(node);
                let pinned = target.as_ref().map(FieldTarget::pin);
                state.resolver.expect(
                    target_id,
                    Box::new(move |value| {
                        if let Some(pinned) = pinned {
                            pinned.assign(&meta.field_name, value.clone());
                        }
                        *pointer_node.value.borrow_mut() = Some(value.clone());
                    }),
                );
                Ok(None)
            }
            Category::Collection => {
                let meta: CollectionMeta = decode_meta(&record.metadata)?;
                // Pre-size from the declared count, but never beyond the
                // elements actually present; the count is untrusted.
                let presize = (meta.count as usize).min(node.children.len());
                let items = Rc::new(RefCell::new(vec![Value::Unset; presize]));
                let next = Rc::new(Cell::new(0));
                // The seal step sits under the children on the stack, so
                // it runs after every element has filled its slot.
                steps.push(Step::Seal {
                    node: Rc::clone(node),
                    items: Rc::clone(&items),
                    field_name: meta.field_name,
                    target: target.clone(),
                });
                Ok(Some(FieldTarget::Slot { items, next }))
            }
            Category::PointerCollection => {
                let meta: CollectionMeta = decode_meta(&record.metadata)?;
                let collection_node = Rc::clone(node);
                let field_target = target.clone();
                let dangling = Rc::clone(&state.post_dangling);
                state.post_pass.defer(Box::new(move |root| {
                    let mut items = Vec::with_capacity(meta.item_ids.len());
                    for raw in &meta.item_ids {
                        match root.find_by_id(ReferenceId::from_raw(*raw)) {
                            Some(found) => {
                                // Targets without a decoded value fall
                                // back to their raw ID.
                                let resolved = found.value();
                                items.push(match resolved {
                                    Some(value) if !value.is_unset() => value,
                                    _ => Value::I64(i64::from(*raw)),
                                });
                            }
                            None => {
                                dangling.set(dangling.get() + 1);
                                items.push(Value::Unset);
                            }
                        }
                    }
                    let list = Value::List(items);
                    if let Some(target) = &field_target {
                        target.assign(&meta.field_name, list.clone());
                    }
                    *collection_node.value.borrow_mut() = Some(list);
                }));
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

/// Delivers a finished value: to waiting pointers, to the parent slot or
/// field, and onto the node itself.
fn settle(
    node: &Rc<DecodedNode>,
    resolver: &mut Resolver,
    target: &Option<FieldTarget>,
    field_name: &str,
    value: Value,
) {
    resolver.deliver(node.id, value.clone());
    if let Some(target) = target {
        target.assign(field_name, value.clone());
    }
    *node.value.borrow_mut() = Some(value);
}

/// Mirrors a shape tree into shared decoded nodes, children first, on an
/// explicit stack.
fn build_tree(shape: &ShapeNode) -> Result<Rc<DecodedNode>> {
    struct Frame<'a> {
        shape: &'a ShapeNode,
        next_child: usize,
        built: Vec<Rc<DecodedNode>>,
    }

    let mut stack = vec![Frame {
        shape,
        next_child: 0,
        built: Vec::with_capacity(shape.children.len()),
    }];

    loop {
        let pending = match stack.last_mut() {
            Some(top) if top.next_child < top.shape.children.len() => {
                let child = &top.shape.children[top.next_child];
                top.next_child += 1;
                Some(child)
            }
            _ => None,
        };

        if let Some(child) = pending {
            stack.push(Frame {
                shape: child,
                next_child: 0,
                built: Vec::with_capacity(child.children.len()),
            });
            continue;
        }

        let done = match stack.pop() {
            Some(frame) => frame,
            None => return Err(PackError::Internal("decode tree stack underflow".into())),
        };
        let node = Rc::new(DecodedNode {
            category: done.shape.category,
            id: done.shape.id,
            name: done.shape.name.clone(),
            value: RefCell::new(None),
            children: done.built,
        });
        match stack.last_mut() {
            Some(parent) => parent.built.push(node),
            None => return Ok(node),
        }
    }
}
