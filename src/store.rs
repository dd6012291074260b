//! The resource store: per-category maps of reference ID to opaque
//! resource records.
//!
//! A record couples a metadata blob with a payload. The core never
//! interprets either: a domain collaborator supplies the
//! `(metadata kind, metadata, payload)` triple at encode time and receives
//! the same triple back on decode. Payloads may be left on disk
//! ("streamed") and materialized later through a [`PayloadSource`].

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::io::{Read, Seek, SeekFrom};

use crate::category::{BlockKind, Category, MetadataKind};
use crate::chunk;
use crate::error::{PackError, Result};
use crate::id::ReferenceId;
use crate::io::PayloadSource;

/// Fixed bytes of a record frame after its length prefix: id (4) +
/// streamed flag (1) + metadata kind (4) + metadata length (4).
const RECORD_FIXED_LEN: usize = 13;

/// Location of a payload that was left on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamedRange {
    /// Absolute byte position in the container file.
    pub position: u64,
    /// Payload length in bytes.
    pub length: u64,
}

/// A resource payload: either materialized in memory or a range still on
/// disk.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Payload bytes held in memory.
    Inline(Vec<u8>),
    /// Payload bytes still on disk, identified by position and length.
    Streamed(StreamedRange),
}

/// One opaque resource record. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Reference ID, shared with the shape node this record backs.
    pub id: ReferenceId,
    /// Whether the payload should stay on disk when the file is read
    /// (individual records can opt in even when the caller did not
    /// request global streaming).
    pub streamed: bool,
    /// How the metadata bytes are encoded.
    pub metadata_kind: MetadataKind,
    /// Opaque metadata bytes.
    pub metadata: Vec<u8>,
    /// Opaque payload.
    pub payload: Payload,
}

impl ResourceRecord {
    /// Creates an in-memory record.
    pub fn new(
        id: ReferenceId,
        metadata_kind: MetadataKind,
        metadata: Vec<u8>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id,
            streamed: false,
            metadata_kind,
            metadata,
            payload: Payload::Inline(payload),
        }
    }

    /// Marks the record to be streamed (payload left on disk) on future
    /// reads.
    pub fn streamed(mut self) -> Self {
        self.streamed = true;
        self
    }

    /// Resolves the payload to bytes regardless of representation.
    ///
    /// Streamed payloads require a [`PayloadSource`] over the originating
    /// container file.
    pub fn payload_bytes(&self, source: Option<&PayloadSource>) -> Result<Vec<u8>> {
        match &self.payload {
            Payload::Inline(bytes) => Ok(bytes.clone()),
            Payload::Streamed(range) => match source {
                Some(source) => source.read_range(range),
                None => Err(PackError::Internal(format!(
                    "resource {} is streamed and needs a payload source",
                    self.id
                ))),
            },
        }
    }

    /// Serialized length excluding the record's own length prefix.
    fn wire_len(&self) -> Result<usize> {
        let payload_len = match &self.payload {
            Payload::Inline(bytes) => bytes.len(),
            Payload::Streamed(_) => {
                return Err(PackError::Internal(format!(
                    "resource {} payload must be materialized before writing",
                    self.id
                )));
            }
        };
        Ok(RECORD_FIXED_LEN + self.metadata.len() + payload_len)
    }

    /// Appends the record frame to `buf`.
    fn serialize(&self, buf: &mut Vec<u8>) -> Result<()> {
        let payload = match &self.payload {
            Payload::Inline(bytes) => bytes,
            Payload::Streamed(_) => {
                return Err(PackError::Internal(format!(
                    "resource {} payload must be materialized before writing",
                    self.id
                )));
            }
        };

        let wire_len = u32::try_from(self.wire_len()?).map_err(|_| {
            PackError::Internal(format!(
                "resource {} frame exceeds the u32 record limit",
                self.id
            ))
        })?;
        chunk::write_u32(buf, wire_len);
        chunk::write_u32(buf, self.id.as_u32());
        chunk::write_bool8(buf, self.streamed);
        chunk::write_u32(buf, self.metadata_kind as u32);
        chunk::write_u32(buf, self.metadata.len() as u32);
        buf.extend_from_slice(&self.metadata);
        buf.extend_from_slice(payload);
        Ok(())
    }
}

/// All records of one category, keyed by reference ID.
///
/// The declared object count written to the file must equal the number of
/// records actually present; the parser enforces this.
#[derive(Debug, Clone)]
pub struct ResourceBlock {
    category: Category,
    records: BTreeMap<u32, ResourceRecord>,
    write_order: Vec<u32>,
}

impl ResourceBlock {
    /// Creates an empty block for `category`.
    pub fn new(category: Category) -> Self {
        Self {
            category,
            records: BTreeMap::new(),
            write_order: Vec::new(),
        }
    }

    /// This block's category.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Number of records present.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the block holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds a record. Duplicate IDs within a category are a programmer
    /// error given the session generator invariant, so `add` refuses to
    /// overwrite; use [`ResourceBlock::replace`] when replacement is
    /// intended.
    pub fn add(&mut self, record: ResourceRecord) -> Result<()> {
        let raw = record.id.as_u32();
        if self.records.contains_key(&raw) {
            return Err(PackError::Internal(format!(
                "duplicate resource id {} in {} block",
                record.id, self.category
            )));
        }
        self.write_order.push(raw);
        self.records.insert(raw, record);
        Ok(())
    }

    /// Explicitly replaces an existing record. Fails if the ID is not
    /// present.
    pub fn replace(&mut self, record: ResourceRecord) -> Result<()> {
        let raw = record.id.as_u32();
        match self.records.get_mut(&raw) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(PackError::Internal(format!(
                "cannot replace missing resource id {} in {} block",
                record.id, self.category
            ))),
        }
    }

    /// Looks up a record by reference ID.
    pub fn get(&self, id: ReferenceId) -> Option<&ResourceRecord> {
        self.records.get(&id.as_u32())
    }

    /// Records in their original insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.write_order
            .iter()
            .filter_map(move |raw| self.records.get(raw))
    }

    /// Serializes the whole block as a chunk-framed byte vector:
    /// `[chunk_len][block_kind][category][object_count][records...]`.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        chunk::write_u32(&mut body, BlockKind::Resource as u32);
        chunk::write_u32(&mut body, self.category.bit());
        chunk::write_u32(&mut body, self.records.len() as u32);
        for record in self.iter() {
            record.serialize(&mut body)?;
        }

        let mut block = Vec::with_capacity(body.len() + chunk::CHUNK_LEN_BYTES);
        chunk::write_chunk(&mut block, &body)?;
        Ok(block)
    }

    /// Parses a block body after the container has consumed the block kind
    /// and category tags. `declared_len` is the chunk length minus those
    /// two fields.
    ///
    /// A record whose `streamed` flag is set, or every record when
    /// `stream_all` is requested, keeps its payload on disk: the absolute
    /// file position and length are recorded and the stream is seeked past
    /// the bytes. `assembly` mode materializes every payload regardless,
    /// for callers that need the whole file in memory.
    pub fn parse<R: Read + Seek>(
        reader: &mut R,
        category: Category,
        declared_len: usize,
        stream_all: bool,
        assembly: bool,
    ) -> Result<Self> {
        let mut block = ResourceBlock::new(category);

        let object_count = chunk::read_u32(reader)? as usize;
        let mut bytes_read = 4usize;

        while bytes_read < declared_len {
            let remaining_block = declared_len - bytes_read;
            let record_len = chunk::read_u32(reader)? as usize;
            if record_len < RECORD_FIXED_LEN {
                return Err(PackError::CorruptContainer(format!(
                    "{category} record frame of {record_len} bytes is smaller than its fixed fields"
                )));
            }
            // Bound the frame by the bytes the block actually has left
            // before trusting it for any read or allocation.
            if record_len + chunk::CHUNK_LEN_BYTES > remaining_block {
                return Err(PackError::CorruptContainer(format!(
                    "{category} record frame of {record_len} bytes overruns its block \
                     ({remaining_block} bytes left)"
                )));
            }

            let id = ReferenceId::from_raw(chunk::read_u32(reader)?);
            let streamed = chunk::read_bool8(reader)?;
            let metadata_kind = MetadataKind::from_raw(chunk::read_u32(reader)?);
            let metadata_len = chunk::read_u32(reader)? as usize;

            let mut remaining = record_len - RECORD_FIXED_LEN;
            if metadata_len > remaining {
                return Err(PackError::CorruptContainer(format!(
                    "{category} record {id} declares {metadata_len} metadata bytes but only {remaining} remain"
                )));
            }

            let metadata = chunk::read_exact_vec(reader, metadata_len)?;
            remaining -= metadata_len;

            let payload = if remaining == 0 {
                Payload::Inline(Vec::new())
            } else if assembly {
                Payload::Inline(chunk::read_exact_vec(reader, remaining)?)
            } else if streamed || stream_all {
                // Streamed payloads never touch memory here: record where
                // the bytes live and step over them.
                let position = reader.stream_position()?;
                reader.seek(SeekFrom::Current(remaining as i64))?;
                Payload::Streamed(StreamedRange {
                    position,
                    length: remaining as u64,
                })
            } else {
                Payload::Inline(chunk::read_exact_vec(reader, remaining)?)
            };

            let record = ResourceRecord {
                id,
                streamed,
                metadata_kind,
                metadata,
                payload,
            };

            if block.records.contains_key(&id.as_u32()) {
                return Err(PackError::CorruptContainer(format!(
                    "duplicate resource id {id} in {category} block"
                )));
            }
            block.write_order.push(id.as_u32());
            block.records.insert(id.as_u32(), record);

            bytes_read += record_len + chunk::CHUNK_LEN_BYTES;
        }

        if bytes_read != declared_len {
            return Err(PackError::CorruptContainer(format!(
                "{category} block declared {declared_len} bytes but records consumed {bytes_read}"
            )));
        }
        if block.records.len() != object_count {
            return Err(PackError::CorruptContainer(format!(
                "{category} block declared {object_count} objects but holds {}",
                block.records.len()
            )));
        }

        Ok(block)
    }
}

/// Every resource block of one encode or decode session, keyed by
/// category.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    blocks: BTreeMap<u32, ResourceBlock>,
}

impl ResourceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record under `category`, creating the block on first use.
    pub fn add_resource(&mut self, category: Category, record: ResourceRecord) -> Result<()> {
        self.blocks
            .entry(category.bit())
            .or_insert_with(|| ResourceBlock::new(category))
            .add(record)
    }

    /// Explicitly replaces a record under `category`.
    pub fn replace_resource(&mut self, category: Category, record: ResourceRecord) -> Result<()> {
        match self.blocks.get_mut(&category.bit()) {
            Some(block) => block.replace(record),
            None => Err(PackError::Internal(format!(
                "cannot replace resource in missing {category} block"
            ))),
        }
    }

    /// Looks up a record.
    pub fn get_resource(&self, category: Category, id: ReferenceId) -> Option<&ResourceRecord> {
        self.blocks.get(&category.bit()).and_then(|b| b.get(id))
    }

    /// The block for `category`, if any records were added or parsed.
    pub fn block(&self, category: Category) -> Option<&ResourceBlock> {
        self.blocks.get(&category.bit())
    }

    /// Inserts an already-parsed block (decode path).
    pub fn insert_block(&mut self, block: ResourceBlock) -> Result<()> {
        match self.blocks.entry(block.category().bit()) {
            btree_map::Entry::Occupied(_) => Err(PackError::CorruptContainer(format!(
                "container holds two {} blocks",
                block.category()
            ))),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(block);
                Ok(())
            }
        }
    }

    /// Blocks in ascending category-bit order (the container's write
    /// order).
    pub fn blocks(&self) -> impl Iterator<Item = &ResourceBlock> {
        self.blocks.values()
    }

    /// Number of blocks present.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
