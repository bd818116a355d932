//! Buffer types and descriptors.

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferTarget {
    /// Per-vertex or per-instance attribute data.
    #[default]
    Vertex,
    /// 32-bit index data.
    Index,
}

/// How often a buffer's contents are expected to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsageHint {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten occasionally.
    Dynamic,
    /// Rewritten every frame.
    Stream,
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: usize,
    /// Binding target.
    pub target: BufferTarget,
    /// Usage hint.
    pub usage: BufferUsageHint,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: usize, target: BufferTarget) -> Self {
        Self {
            label: None,
            size,
            target,
            usage: BufferUsageHint::Static,
        }
    }

    /// Set the usage hint.
    pub fn with_usage(mut self, usage: BufferUsageHint) -> Self {
        self.usage = usage;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
