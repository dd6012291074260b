//! Reference IDs and the per-session generator.

use std::collections::HashSet;
use std::fmt;

use crate::error::{PackError, Result};

/// A strong type for the 32-bit reference IDs shared by nodes and
/// resources.
///
/// Node IDs and resource IDs are the same kind of value and may be
/// cross-referenced interchangeably; a shape node and the record holding
/// its payload carry the same ID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceId(u32);

impl ReferenceId {
    /// Wraps a raw ID read from a file.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReferenceId({})", self.0)
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bound on collision retries before the generator gives up.
const MAX_RETRIES: u32 = 64;

/// Per-session reference ID generator.
///
/// Each ID is derived from a random 128-bit value truncated to 32 bits and
/// collision-checked against every ID issued so far in the session. IDs are
/// unique for the lifetime of one encode or decode session and never
/// reused; a generator must not be shared across sessions.
#[derive(Debug, Default)]
pub struct IdGenerator {
    issued: HashSet<u32>,
}

impl IdGenerator {
    /// Creates a fresh generator with no issued IDs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new session-unique ID.
    ///
    /// Collisions trigger a bounded number of retries; past the bound the
    /// generator fails with [`PackError::IdSpaceExhausted`] rather than
    /// recursing indefinitely.
    pub fn generate(&mut self) -> Result<ReferenceId> {
        for _ in 0..MAX_RETRIES {
            let wide: u128 = rand::random();
            let id = wide as u32;

            if self.issued.insert(id) {
                return Ok(ReferenceId(id));
            }
        }
        Err(PackError::IdSpaceExhausted)
    }

    /// Marks an externally produced ID as issued so the generator will
    /// never hand it out again within this session.
    ///
    /// Returns `false` if the ID was already taken.
    pub fn reserve(&mut self, id: ReferenceId) -> bool {
        self.issued.insert(id.0)
    }

    /// Number of IDs issued so far.
    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}
