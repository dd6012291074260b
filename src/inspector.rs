//! Tools for inspecting the physical structure of pack files.
//! useful for debugging block layout and verification.

use std::path::Path;

use serde::Serialize;

use crate::api::Scenepack;
use crate::container::LoadOptions;
use crate::error::{PackError, Result};
use crate::shape::ShapeNode;
use crate::store::{Payload, ResourceStore};

/// A structural report of a pack file.
#[derive(Debug, Serialize)]
pub struct DebugReport {
    /// Format version from the header.
    pub version: u32,
    /// Declared length of everything after the header.
    pub total_length: u32,
    /// Declared file kind.
    pub file_kind: String,
    /// Number of entries in the index block.
    pub index_entries: usize,
    /// The shape tree with per-node record information.
    pub tree: NodeInfo,
}

/// Metadata for a single node in the shape tree.
#[derive(Debug, Serialize)]
pub struct NodeInfo {
    /// Category name.
    pub category: String,
    /// Raw reference ID.
    pub id: u32,
    /// Node name (the placeholder for categories whose names are not
    /// materialized).
    pub name: String,
    /// Whether a resource record backs this node.
    pub has_record: bool,
    /// Payload size in bytes, if a record is present.
    pub payload_size: u64,
    /// Metadata size in bytes, if a record is present.
    pub metadata_size: u64,
    /// Child nodes.
    pub children: Vec<NodeInfo>,
}

/// The pack inspector tool.
#[derive(Debug)]
pub struct PackInspector;

impl PackInspector {
    /// Analyzes a file and returns a structural report.
    ///
    /// Payloads are left on disk; only frame sizes are collected.
    pub fn inspect<P: AsRef<Path>>(path: P) -> Result<DebugReport> {
        let options = LoadOptions {
            stream_payloads: true,
            ..LoadOptions::default()
        };
        let pack = Scenepack::load(path, &options)?;

        let root = pack.shape_root().ok_or_else(|| {
            PackError::CorruptContainer("container carries no node block".into())
        })?;
        let tree = Self::inspect_tree(root, pack.store())?;

        Ok(DebugReport {
            version: pack.header().version,
            total_length: pack.header().total_length,
            file_kind: format!("{:?}", pack.header().file_kind),
            index_entries: pack.index().map(|i| i.entries().len()).unwrap_or(0),
            tree,
        })
    }

    /// Builds the per-node report bottom-up with an explicit stack, so tree
    /// depth is bounded by heap rather than call stack.
    fn inspect_tree(root: &ShapeNode, store: &ResourceStore) -> Result<NodeInfo> {
        struct Frame<'a> {
            node: &'a ShapeNode,
            next_child: usize,
            built: Vec<NodeInfo>,
        }

        let mut stack = vec![Frame {
            node: root,
            next_child: 0,
            built: Vec::with_capacity(root.children.len()),
        }];

        loop {
            let pending = match stack.last_mut() {
                Some(top) if top.next_child < top.node.children.len() => {
                    let child = &top.node.children[top.next_child];
                    top.next_child += 1;
                    Some(child)
                }
                _ => None,
            };

            if let Some(child) = pending {
                stack.push(Frame {
                    node: child,
                    next_child: 0,
                    built: Vec::with_capacity(child.children.len()),
                });
                continue;
            }

            let done = match stack.pop() {
                Some(frame) => frame,
                None => return Err(PackError::Internal("inspector stack underflow".into())),
            };
            let info = Self::describe(done.node, store, done.built);
            match stack.last_mut() {
                Some(parent) => parent.built.push(info),
                None => return Ok(info),
            }
        }
    }

    fn describe(node: &ShapeNode, store: &ResourceStore, children: Vec<NodeInfo>) -> NodeInfo {
        let record = store.get_resource(node.category, node.id);
        let (has_record, payload_size, metadata_size) = match record {
            Some(record) => {
                let payload_size = match &record.payload {
                    Payload::Inline(bytes) => bytes.len() as u64,
                    Payload::Streamed(range) => range.length,
                };
                (true, payload_size, record.metadata.len() as u64)
            }
            None => (false, 0, 0),
        };

        NodeInfo {
            category: node.category.to_string(),
            id: node.id.as_u32(),
            name: node.name.clone().unwrap_or_default(),
            has_record,
            payload_size,
            metadata_size,
            children,
        }
    }
}

impl std::fmt::Display for DebugReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== PACK INSPECTOR REPORT ===")?;
        writeln!(f, "Version:        {}", self.version)?;
        writeln!(f, "File Kind:      {}", self.file_kind)?;
        writeln!(f, "Body Length:    {}b", self.total_length)?;
        writeln!(f, "Index Entries:  {}", self.index_entries)?;
        writeln!(f, "\n[SHAPE TREE]")?;
        self.tree.fmt_tree(f)
    }
}

impl NodeInfo {
    /// Pre-order box-drawing render with an explicit stack; depth is
    /// bounded by heap rather than call stack.
    fn fmt_tree(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stack: Vec<(&NodeInfo, String, bool)> = vec![(self, String::new(), true)];

        while let Some((node, prefix, is_last)) = stack.pop() {
            let connector = if is_last { "└── " } else { "├── " };
            let record = if node.has_record {
                format!(" | Meta: {}b | Payload: {}b", node.metadata_size, node.payload_size)
            } else {
                String::new()
            };

            writeln!(
                f,
                "{}{}[{}] #{} \"{}\"{}",
                prefix, connector, node.category, node.id, node.name, record
            )?;

            let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
            // Push in reverse so siblings pop in declaration order.
            for (i, child) in node.children.iter().enumerate().rev() {
                stack.push((child, child_prefix.clone(), i == node.children.len() - 1));
            }
        }
        Ok(())
    }
}
