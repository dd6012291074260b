//! High-level entry points for saving, loading, and decoding pack files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;

use crate::category::FileKind;
use crate::codec::decode::{DecodeReport, DecodedNode, GraphDecoder};
use crate::codec::descriptor::TypeRegistry;
use crate::codec::encode::EncodeSession;
use crate::container::{ContainerContents, ContainerFile, ContainerIndex, FileHeader, LoadOptions};
use crate::error::{PackError, Result};
use crate::io::PayloadSource;
use crate::shape::ShapeNode;
use crate::store::{Payload, ResourceStore};

/// A container read into memory, still tied to its path so streamed
/// payloads can be materialized later.
#[derive(Debug)]
pub struct LoadedPack {
    contents: ContainerContents,
    path: PathBuf,
}

impl LoadedPack {
    /// The parsed file header.
    pub fn header(&self) -> &FileHeader {
        &self.contents.header
    }

    /// The shape tree, if the file carried one.
    pub fn shape_root(&self) -> Option<&ShapeNode> {
        self.contents.shape_root.as_ref()
    }

    /// The resource store selected by the load mask.
    pub fn store(&self) -> &ResourceStore {
        &self.contents.store
    }

    /// The index block, if the file carried one.
    pub fn index(&self) -> Option<&ContainerIndex> {
        self.contents.index.as_ref()
    }

    /// Path the pack was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a payload source over the originating file.
    pub fn payload_source(&self) -> Result<PayloadSource> {
        PayloadSource::open(&self.path)
    }

    /// Whether any loaded record left its payload on disk.
    pub fn has_streamed_payloads(&self) -> bool {
        self.contents
            .store
            .blocks()
            .flat_map(|block| block.iter())
            .any(|record| matches!(record.payload, Payload::Streamed(_)))
    }
}

/// The main entry point of the library.
#[derive(Debug)]
pub struct Scenepack;

impl Scenepack {
    /// Writes a finished encode session to `path`.
    pub fn save<P: AsRef<Path>>(
        path: P,
        file_kind: FileKind,
        session: EncodeSession,
    ) -> Result<()> {
        let (root, store) = session.into_parts();
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        let index = ContainerFile::write(&mut writer, file_kind, &root, &store)?;
        debug!(
            "saved {} with {} indexed blocks",
            path.as_ref().display(),
            index.entries().len()
        );
        Ok(())
    }

    /// Reads a container from `path` under `options`.
    pub fn load<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<LoadedPack> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);
        let contents = ContainerFile::read(&mut reader, options)?;
        Ok(LoadedPack { contents, path })
    }

    /// Runs the graph decoder over a loaded pack, materializing streamed
    /// payloads through the originating file when needed.
    pub fn decode(
        pack: &LoadedPack,
        registry: &TypeRegistry,
    ) -> Result<(Rc<DecodedNode>, DecodeReport)> {
        let shape_root = pack.shape_root().ok_or_else(|| {
            PackError::CorruptContainer("container carries no node block".into())
        })?;

        let source = if pack.has_streamed_payloads() {
            Some(pack.payload_source()?)
        } else {
            None
        };

        let decoder = GraphDecoder::new(registry);
        decoder.decode(shape_root, pack.store(), source.as_ref())
    }
}
