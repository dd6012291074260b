//! On-demand payload materialization for streamed resources.
//!
//! Decoding with streaming enabled leaves payload bytes on disk; a
//! [`PayloadSource`] memory-maps the container file afterwards and serves
//! individual [`StreamedRange`]s without pulling the whole file through a
//! read loop.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{PackError, Result};
use crate::store::StreamedRange;

/// A read-only view over a container file used to materialize streamed
/// payloads.
#[derive(Debug)]
pub struct PayloadSource {
    mmap: Mmap,
}

impl PayloadSource {
    /// Opens and memory-maps the container file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;

        // Safety: Mmap is fundamentally unsafe as external processes could
        // modify the file. We assume exclusive access or accept the risk
        // for performance (standard practice).
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self { mmap })
    }

    /// Copies one streamed range out of the file.
    pub fn read_range(&self, range: &StreamedRange) -> Result<Vec<u8>> {
        let start = range.position as usize;
        let end = start
            .checked_add(range.length as usize)
            .ok_or_else(|| PackError::CorruptContainer("streamed range overflows".into()))?;

        let bytes = self.mmap.get(start..end).ok_or_else(|| {
            PackError::CorruptContainer(format!(
                "streamed range {}..{} is outside the file ({} bytes)",
                start,
                end,
                self.mmap.len()
            ))
        })?;
        Ok(bytes.to_vec())
    }

    /// Length of the underlying file in bytes.
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether the underlying file is empty.
    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }
}
