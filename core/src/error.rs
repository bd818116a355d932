//! Error types for vertex recording and layout.

use crate::vertex::RecordState;

/// Errors raised by the CPU side of the vertex pipeline.
///
/// Every variant is a caller contract violation: the call that returns it did
/// not touch any channel data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VertexError {
    /// An operation was called in the wrong recording state.
    #[error("cannot {operation} while {found}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the record was in.
        found: RecordState,
    },
    /// More channels than a record can hold.
    #[error("a vertex record holds at most {max} channels")]
    TooManyChannels {
        /// Maximum channel count.
        max: usize,
    },
    /// Two channels of one record claim the same binding slot.
    #[error("slot {slot} is already used by channel '{name}'")]
    DuplicateSlot {
        /// The contested slot.
        slot: u32,
        /// Name of the channel already bound to the slot.
        name: String,
    },
    /// A channel's declared format does not describe its value type.
    #[error("channel '{name}' declares {declared}, but its value type is {actual}")]
    FormatMismatch {
        /// Channel name.
        name: String,
        /// Format declared by the channel descriptor.
        declared: String,
        /// Format implied by the Rust value type.
        actual: String,
    },
    /// A channel key was used with a record it does not belong to.
    #[error("channel {index} does not hold values of the requested type")]
    ChannelTypeMismatch {
        /// Position of the channel in the record.
        index: usize,
    },
    /// A channel key points past the end of the record.
    #[error("no channel at position {index}")]
    UnknownChannel {
        /// Position requested.
        index: usize,
    },
    /// Channels fell out of lock-step.
    #[error("channel '{name}' holds {actual} values, expected {expected}")]
    LengthMismatch {
        /// Channel name.
        name: String,
        /// Vertex count of the record.
        expected: usize,
        /// Values held by the channel.
        actual: usize,
    },
    /// An index refers past the recorded vertices.
    #[error("index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        /// The offending index value.
        index: u32,
        /// Position in the index list.
        position: usize,
        /// Number of recorded vertices.
        vertex_count: usize,
    },
    /// A strided write was requested with a stride smaller than one element.
    #[error("stride {stride} is smaller than the {element_size}-byte element")]
    InvalidStride {
        /// Requested stride.
        stride: usize,
        /// Element size in bytes.
        element_size: usize,
    },
    /// The destination slice cannot hold the write.
    #[error("writing {required} bytes at offset {offset} overflows a {available}-byte destination")]
    DestinationTooSmall {
        /// Start offset of the write.
        offset: usize,
        /// Bytes the write needs past `offset`.
        required: usize,
        /// Size of the destination.
        available: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VertexError::InvalidState {
            operation: "push a vertex",
            found: RecordState::Ready,
        };
        assert_eq!(err.to_string(), "cannot push a vertex while ready");

        let err = VertexError::IndexOutOfRange {
            index: 7,
            position: 3,
            vertex_count: 4,
        };
        assert_eq!(
            err.to_string(),
            "index 7 at position 3 is out of range for 4 vertices"
        );
    }
}
