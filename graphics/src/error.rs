//! Graphics error types.

use redlilium_vertex_core::VertexError;

use crate::program::ShaderError;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// The backend refused to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A requested feature is not supported by the device.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// The backend's allocation budget is exhausted.
    #[error("out of GPU memory: {requested} bytes requested, {available} available")]
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
        /// Bytes still available.
        available: usize,
    },
    /// The device that created a resource no longer exists.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A buffer access falls outside the buffer.
    #[error("range {offset}..{end} is outside a {size}-byte buffer")]
    OutOfBounds {
        /// Start of the access.
        offset: usize,
        /// End of the access.
        end: usize,
        /// Buffer size.
        size: usize,
    },
    /// A descriptor row refers to a buffer that has been dropped.
    #[error("binding at slot {slot} refers to a dropped buffer")]
    StaleBinding {
        /// Slot of the stale row.
        slot: u32,
    },
    /// A descriptor was used without being the current vertex source.
    #[error("vertex layout descriptor is not current")]
    DescriptorNotCurrent,
    /// A backend handle is unknown to the backend.
    #[error("unknown {kind} handle {id}")]
    InvalidHandle {
        /// Resource kind.
        kind: &'static str,
        /// Raw handle value.
        id: u64,
    },
    /// The backend rejected a draw call.
    #[error("draw failed: {0}")]
    DrawFailed(String),
    /// Vertex recording or layout contract violation.
    #[error(transparent)]
    Vertex(#[from] VertexError),
    /// Shader compile or link failure.
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::DeviceLost;
        assert_eq!(err.to_string(), "GPU device lost");

        let err = GraphicsError::StaleBinding { slot: 10 };
        assert_eq!(err.to_string(), "binding at slot 10 refers to a dropped buffer");

        let err = GraphicsError::OutOfBounds {
            offset: 8,
            end: 24,
            size: 16,
        };
        assert_eq!(err.to_string(), "range 8..24 is outside a 16-byte buffer");
    }

    #[test]
    fn test_vertex_error_is_transparent() {
        let err: GraphicsError = VertexError::TooManyChannels { max: 8 }.into();
        assert_eq!(err.to_string(), "a vertex record holds at most 8 channels");
    }
}
