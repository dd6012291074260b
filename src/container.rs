//! The top-level container file: header, sequential block layout, and the
//! index table.
//!
//! A pack file is a fixed 12-byte header followed by chunk-framed blocks at
//! increasing offsets. The writer reserves exact space for the header and
//! index up front, writes the data blocks, then seeks back to offset zero
//! and writes the final header (with the resolved total length) and the
//! index. The reader walks blocks sequentially until the file length is
//! consumed; the index is parsed and exposed for future random-access use
//! but the sequential read path never consults it.

use std::io::{Read, Seek, SeekFrom, Write};

use log::{debug, warn};

use crate::category::{BlockKind, Category, CategoryMask, FileKind};
use crate::chunk;
use crate::error::{PackError, Result};
use crate::shape::ShapeNode;
use crate::store::{ResourceBlock, ResourceStore};

/// Current container format version.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed header size: version + total length + file kind, 4 bytes each.
pub const HEADER_LEN: usize = 12;

/// Canonical file extension for pack files.
pub const FILE_EXTENSION: &str = "spk";

/// Bytes per index entry: category (4) + byte offset (4).
const INDEX_ENTRY_LEN: usize = 8;

/// The fixed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version.
    pub version: u32,
    /// Bytes in the file after the header.
    pub total_length: u32,
    /// Declared file kind; opaque to the core.
    pub file_kind: FileKind,
}

impl FileHeader {
    /// Serializes the header to its fixed 12-byte form.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.total_length.to_le_bytes());
        bytes[8..12].copy_from_slice(&(self.file_kind as u32).to_le_bytes());
        bytes
    }

    /// Reads and parses the header from the start of a stream.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut raw = [0u8; HEADER_LEN];
        chunk::read_exact_checked(reader, &mut raw)?;

        let version = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let total_length = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let file_kind = FileKind::from_raw(u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]));

        if version != FORMAT_VERSION {
            return Err(PackError::CorruptContainer(format!(
                "unsupported container version {version}"
            )));
        }

        Ok(Self {
            version,
            total_length,
            file_kind,
        })
    }
}

/// One index entry: which category's block lives at which offset from the
/// start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Raw category tag of the indexed block (`Node` for the shape tree).
    pub category: u32,
    /// Absolute byte offset of the block's chunk frame.
    pub byte_offset: u32,
}

/// The list of (category, offset) pairs recorded in write order.
///
/// The index must stay internally consistent with the block layout, but
/// sequential readers do not need it; it exists for future random-access
/// reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerIndex {
    entries: Vec<IndexEntry>,
}

impl ContainerIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry in write order.
    pub fn push(&mut self, category: u32, byte_offset: u32) {
        self.entries.push(IndexEntry {
            category,
            byte_offset,
        });
    }

    /// All entries in write order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Offset of the first block recorded for `category`, if present.
    pub fn offset_of(&self, category: Category) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.category == category.bit())
            .map(|e| e.byte_offset)
    }

    /// Exact serialized size of the index block, chunk framing included.
    pub fn block_len(entry_count: usize) -> usize {
        entry_count * INDEX_ENTRY_LEN + chunk::CHUNK_LEN_BYTES + 4
    }

    /// Serializes the index as a chunk-framed block.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(4 + self.entries.len() * INDEX_ENTRY_LEN);
        chunk::write_u32(&mut body, BlockKind::Index as u32);
        for entry in &self.entries {
            chunk::write_u32(&mut body, entry.category);
            chunk::write_u32(&mut body, entry.byte_offset);
        }

        let mut block = Vec::with_capacity(body.len() + chunk::CHUNK_LEN_BYTES);
        chunk::write_chunk(&mut block, &body)?;
        Ok(block)
    }

    /// Parses an index block body (the bytes after the block kind tag).
    pub fn parse_body(body: &[u8]) -> Result<Self> {
        if body.len() % INDEX_ENTRY_LEN != 0 {
            return Err(PackError::CorruptContainer(format!(
                "index block body of {} bytes is not a whole number of entries",
                body.len()
            )));
        }

        let mut index = ContainerIndex::new();
        for entry in body.chunks_exact(INDEX_ENTRY_LEN) {
            let category = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let byte_offset = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
            index.push(category, byte_offset);
        }
        Ok(index)
    }
}

/// Options controlling how a container is read.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Which resource categories are parsed; blocks outside the mask are
    /// framed-and-skipped (masking saves parsing cost, not seeking cost).
    pub mask: CategoryMask,
    /// Leave every payload on disk as a position/length range.
    pub stream_payloads: bool,
    /// Materialize every payload regardless of streamed flags (whole file
    /// in memory).
    pub assembly: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            mask: CategoryMask::ALL,
            stream_payloads: false,
            assembly: false,
        }
    }
}

/// Everything read out of one container file.
#[derive(Debug)]
pub struct ContainerContents {
    /// The parsed file header.
    pub header: FileHeader,
    /// The index block, if the file carried one.
    pub index: Option<ContainerIndex>,
    /// The shape tree, if the file carried a node block.
    pub shape_root: Option<ShapeNode>,
    /// Every resource block selected by the mask.
    pub store: ResourceStore,
}

/// Whole-file write/read orchestration.
#[derive(Debug)]
pub struct ContainerFile;

impl ContainerFile {
    /// Writes a complete container: header, node block, resource blocks,
    /// and the index.
    ///
    /// Space for the header and index is reserved up front (their exact
    /// sizes are known from the block count), data blocks are written
    /// sequentially while the index is accumulated, then the writer seeks
    /// back to offset zero for the final header and index.
    pub fn write<W: Write + Seek>(
        writer: &mut W,
        file_kind: FileKind,
        shape_root: &ShapeNode,
        store: &ResourceStore,
    ) -> Result<ContainerIndex> {
        let mut blocks: Vec<(u32, Vec<u8>)> = Vec::with_capacity(1 + store.block_count());

        let mut node_body = Vec::with_capacity(4 + shape_root.encoded_len());
        chunk::write_u32(&mut node_body, BlockKind::Node as u32);
        shape_root.encode(&mut node_body);
        let mut node_block = Vec::with_capacity(node_body.len() + chunk::CHUNK_LEN_BYTES);
        chunk::write_chunk(&mut node_block, &node_body)?;
        blocks.push((Category::Node.bit(), node_block));

        for block in store.blocks() {
            blocks.push((block.category().bit(), block.serialize()?));
        }

        // Reserve header + index space; both sizes are exact.
        let index_len = ContainerIndex::block_len(blocks.len());
        let mut file_offset = HEADER_LEN + index_len;
        writer.seek(SeekFrom::Start(file_offset as u64))?;

        let mut index = ContainerIndex::new();
        for (category, bytes) in &blocks {
            let offset = u32::try_from(file_offset).map_err(|_| {
                PackError::Internal("container body exceeds the u32 offset limit".into())
            })?;
            index.push(*category, offset);
            writer.write_all(bytes)?;
            file_offset += bytes.len();
            debug!("wrote block {category:#x} ({} bytes)", bytes.len());
        }

        let total_length = u32::try_from(file_offset - HEADER_LEN).map_err(|_| {
            PackError::Internal("container body exceeds the u32 length limit".into())
        })?;
        let header = FileHeader {
            version: FORMAT_VERSION,
            total_length,
            file_kind,
        };

        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&header.to_bytes())?;
        writer.write_all(&index.serialize()?)?;
        writer.flush()?;

        Ok(index)
    }

    /// Reads a container sequentially, block by block, until the file
    /// length is consumed.
    ///
    /// Unknown block kinds are skipped by seeking past their declared
    /// chunk length. Any disagreement between a chunk's declared length
    /// and the bytes its parser actually consumed is a hard
    /// [`PackError::CorruptContainer`]: continuing would read the next
    /// block's bytes as part of the current one.
    pub fn read<R: Read + Seek>(reader: &mut R, options: &LoadOptions) -> Result<ContainerContents> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let header = FileHeader::read(reader)?;
        if u64::from(header.total_length) + HEADER_LEN as u64 != file_len {
            debug!(
                "header declares {} bytes after header, file has {}",
                header.total_length,
                file_len - HEADER_LEN as u64
            );
        }

        let mut contents = ContainerContents {
            header,
            index: None,
            shape_root: None,
            store: ResourceStore::new(),
        };

        let mut bytes_read = HEADER_LEN as u64;
        while bytes_read < file_len {
            let chunk_len = chunk::read_u32(reader)? as u64;
            if chunk_len < 4 {
                return Err(PackError::CorruptContainer(format!(
                    "block chunk of {chunk_len} bytes cannot hold a block kind"
                )));
            }
            let raw_kind = chunk::read_u32(reader)?;
            let body_len = (chunk_len - 4) as usize;

            match BlockKind::from_raw(raw_kind) {
                Some(BlockKind::Index) => {
                    let body = chunk::read_exact_vec(reader, body_len)?;
                    contents.index = Some(ContainerIndex::parse_body(&body)?);
                }
                Some(BlockKind::Node) => {
                    if contents.shape_root.is_some() {
                        return Err(PackError::CorruptContainer(
                            "container holds two node blocks".into(),
                        ));
                    }
                    let mut consumed = 0usize;
                    let root = ShapeNode::decode(reader, &mut consumed)?;
                    if consumed != body_len {
                        return Err(PackError::CorruptContainer(format!(
                            "node block declared {body_len} bytes but the tree consumed {consumed}"
                        )));
                    }
                    contents.shape_root = Some(root);
                }
                Some(BlockKind::Resource) => {
                    if body_len < 4 {
                        return Err(PackError::CorruptContainer(format!(
                            "resource block of {chunk_len} bytes cannot hold a category"
                        )));
                    }
                    let raw_category = chunk::read_u32(reader)?;
                    let record_len = body_len - 4;
                    match Category::from_raw(raw_category) {
                        Some(category) if options.mask.contains(category) => {
                            let block = ResourceBlock::parse(
                                reader,
                                category,
                                record_len,
                                options.stream_payloads,
                                options.assembly,
                            )?;
                            contents.store.insert_block(block)?;
                        }
                        Some(category) => {
                            // Masked out: framing is skipped, parsing is
                            // not attempted.
                            debug!("skipping masked {category} block ({record_len} bytes)");
                            reader.seek(SeekFrom::Current(record_len as i64))?;
                        }
                        None => {
                            warn!("skipping resource block with unknown category {raw_category:#x}");
                            reader.seek(SeekFrom::Current(record_len as i64))?;
                        }
                    }
                }
                None => {
                    warn!("skipping block with unknown kind {raw_kind}");
                    reader.seek(SeekFrom::Current(body_len as i64))?;
                }
            }

            bytes_read += chunk::CHUNK_LEN_BYTES as u64 + chunk_len;
            let position = reader.stream_position()?;
            if position != bytes_read {
                return Err(PackError::CorruptContainer(format!(
                    "block declared end {bytes_read} but parser stopped at {position}"
                )));
            }
        }

        Ok(contents)
    }
}
