//! The node shape tree: the structural skeleton of the graph.
//!
//! The shape tree records what exists (category, reference ID, optional
//! name, child order) independently of resource content. It is serialized
//! depth-first pre-order with no length field bounding a subtree, so a
//! reader can never skip an unwanted subtree wholesale: it must still walk
//! each node's fixed fields to learn how many grandchildren to recurse
//! into, even when the subtree's category is masked out.
//!
//! Per-node wire fields: `child_count` (u32), `kind` (u32 tag), `id` (u32),
//! `name_len` (u32), name bytes. Name bytes are only materialized for
//! name-significant categories (see [`Category::reads_name`]); for all
//! others the reader seeks past them and substitutes a fixed placeholder.

use std::io::{Read, Seek, SeekFrom};

use crate::category::Category;
use crate::chunk;
use crate::error::{PackError, Result};
use crate::id::ReferenceId;

/// Placeholder substituted for names that are framed in the file but not
/// read (same literal the format has always used).
pub const PLACEHOLDER_NAME: &str = "none";

/// Fixed portion of one serialized node: child count, kind, id, name
/// length.
const NODE_FIXED_LEN: usize = 16;

/// One node in the shape tree.
///
/// Children are exclusively owned by their parent: the shape tree is a
/// strict tree with no shared ownership and no cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeNode {
    /// Discrete category tag.
    pub category: Category,
    /// Session-unique reference ID, shared with this node's resource
    /// record if it has one.
    pub id: ReferenceId,
    /// Optional UTF-8 name. On decode, non-name-significant categories get
    /// [`PLACEHOLDER_NAME`].
    pub name: Option<String>,
    /// Stable external identity (e.g. an asset path) used for shared-
    /// resource deduplication during encode. Never serialized.
    pub identity: Option<String>,
    /// Ordered children.
    pub children: Vec<ShapeNode>,
}

impl ShapeNode {
    /// Creates a leaf node.
    pub fn new(category: Category, id: ReferenceId) -> Self {
        Self {
            category,
            id,
            name: None,
            identity: None,
            children: Vec::new(),
        }
    }

    /// Sets the node name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the dedup identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Appends a child, preserving insertion order.
    pub fn add_child(&mut self, child: ShapeNode) {
        self.children.push(child);
    }

    /// Total number of nodes in this subtree, including self.
    pub fn count(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.children.iter());
        }
        total
    }

    /// Pre-order search by reference ID.
    pub fn find_by_id(&self, id: ReferenceId) -> Option<&ShapeNode> {
        self.find(|n| n.id == id)
    }

    /// Pre-order search by name.
    pub fn find_by_name(&self, name: &str) -> Option<&ShapeNode> {
        self.find(|n| n.name.as_deref() == Some(name))
    }

    /// Pre-order search by dedup identity.
    pub fn find_by_identity(&self, identity: &str) -> Option<&ShapeNode> {
        self.find(|n| n.identity.as_deref() == Some(identity))
    }

    fn find(&self, matches: impl Fn(&ShapeNode) -> bool) -> Option<&ShapeNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if matches(node) {
                return Some(node);
            }
            // Push in reverse so the walk stays pre-order.
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        None
    }

    /// Serialized length of this subtree in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += NODE_FIXED_LEN + node.name.as_deref().unwrap_or_default().len();
            stack.extend(node.children.iter());
        }
        total
    }

    /// Serializes this subtree depth-first pre-order into `buf`.
    ///
    /// The walk uses an explicit stack so encoding depth is bounded by
    /// heap, not call stack.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            let name = node.name.as_deref().unwrap_or_default();

            chunk::write_u32(buf, node.children.len() as u32);
            chunk::write_u32(buf, node.category.bit());
            chunk::write_u32(buf, node.id.as_u32());
            chunk::write_u32(buf, name.len() as u32);
            buf.extend_from_slice(name.as_bytes());

            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    /// Reads a full pre-order shape tree.
    ///
    /// Drives an explicit stack off each node's declared child count, so
    /// malicious or deep trees cannot exhaust the call stack. `consumed`
    /// is advanced by the exact number of bytes read, which the caller
    /// checks against the enclosing chunk's declared length.
    pub fn decode<R: Read + Seek>(reader: &mut R, consumed: &mut usize) -> Result<ShapeNode> {
        let (root, root_children) = Self::read_one(reader, consumed)?;
        let mut stack: Vec<(ShapeNode, u32)> = vec![(root, root_children)];

        loop {
            let remaining = match stack.last() {
                Some((_, remaining)) => *remaining,
                None => {
                    return Err(PackError::Internal("shape decode stack underflow".into()));
                }
            };

            if remaining == 0 {
                let (done, _) = match stack.pop() {
                    Some(frame) => frame,
                    None => {
                        return Err(PackError::Internal("shape decode stack underflow".into()));
                    }
                };
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(done),
                    None => return Ok(done),
                }
            } else {
                if let Some((_, remaining)) = stack.last_mut() {
                    *remaining -= 1;
                }
                let (child, child_count) = Self::read_one(reader, consumed)?;
                stack.push((child, child_count));
            }
        }
    }

    /// Reads one node's fixed fields and (policy permitting) its name.
    fn read_one<R: Read + Seek>(reader: &mut R, consumed: &mut usize) -> Result<(ShapeNode, u32)> {
        let child_count = chunk::read_u32(reader)?;
        let raw_category = chunk::read_u32(reader)?;
        let id = ReferenceId::from_raw(chunk::read_u32(reader)?);
        let name_len = chunk::read_u32(reader)? as usize;

        let category = Category::from_raw(raw_category).ok_or_else(|| {
            PackError::CorruptContainer(format!("unknown node category tag {raw_category:#x}"))
        })?;

        // Only name-significant nodes get their names materialized; the
        // rest are framed in the file but skipped, trading name precision
        // for read cost. The placeholder keeps downstream lookups total.
        let name = if category.reads_name() {
            let raw = chunk::read_exact_vec(reader, name_len)?;
            String::from_utf8(raw).map_err(|_| {
                PackError::CorruptContainer(format!("node {id} name is not valid UTF-8"))
            })?
        } else {
            reader.seek(SeekFrom::Current(name_len as i64))?;
            PLACEHOLDER_NAME.to_string()
        };

        *consumed += NODE_FIXED_LEN + name_len;

        // The declared child count is untrusted; capacity grows as
        // children actually parse, so a hostile count cannot demand a
        // huge allocation up front.
        let node = ShapeNode::new(category, id).with_name(name);
        Ok((node, child_count))
    }
}
