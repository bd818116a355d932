//! 32-bit index sequences with primitive restart.

use crate::error::VertexError;

/// Reserved index value that breaks a strip, fan or loop.
pub const RESTART_INDEX: u32 = u32::MAX;

/// How a geometry buffer fills its index sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IndexingMode {
    /// Every recorded vertex appends its own position as an index.
    #[default]
    Sequential,
    /// Indices are appended explicitly by the caller.
    Explicit,
}

/// Index sequence of a geometry buffer.
///
/// After [`begin`](Self::begin) position 0 always holds [`RESTART_INDEX`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexList {
    indices: Vec<u32>,
}

impl IndexList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to a single leading restart sentinel.
    pub fn begin(&mut self) {
        self.indices.clear();
        self.indices.push(RESTART_INDEX);
    }

    /// Append one index.
    pub fn push(&mut self, index: u32) {
        self.indices.push(index);
    }

    /// Append the restart sentinel.
    pub fn restart(&mut self) {
        self.indices.push(RESTART_INDEX);
    }

    /// Check every non-sentinel index against `vertex_count`.
    pub fn validate(&self, vertex_count: usize) -> Result<(), VertexError> {
        match self
            .indices
            .iter()
            .enumerate()
            .find(|(_, &i)| i != RESTART_INDEX && i as usize >= vertex_count)
        {
            Some((position, &index)) => Err(VertexError::IndexOutOfRange {
                index,
                position,
                vertex_count,
            }),
            None => Ok(()),
        }
    }

    /// All entries, sentinels included.
    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    /// Raw bytes for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Number of entries, sentinels included.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the list has no entries, not even the sentinel.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Size in bytes: 4 per entry.
    pub fn byte_size(&self) -> usize {
        self.indices.len() * std::mem::size_of::<u32>()
    }

    /// Number of entries that are not the restart sentinel.
    pub fn vertex_reference_count(&self) -> usize {
        self.indices.iter().filter(|&&i| i != RESTART_INDEX).count()
    }
}
