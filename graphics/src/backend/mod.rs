//! GPU backend abstraction layer.
//!
//! The [`GpuBackend`] trait is the only place that talks to the driver.
//! Everything above it (buffers, layout descriptors, programs) holds opaque
//! integer handles handed out by the backend.
//!
//! # Available Backends
//!
//! - `headless` (always compiled): CPU emulation used by tests and tools
//! - `gl-backend`: OpenGL / OpenGL ES through `glow`
//!
//! # Context Model
//!
//! A backend is bound to one graphics context and is only used from the
//! thread that owns that context. Nothing here is `Send` or `Sync`.

#[cfg(feature = "gl-backend")]
pub mod gl;

pub mod headless;

use std::fmt;

use redlilium_vertex_core::{ElementFormat, PrimitiveMode, UniformInfo, UniformValue};

use crate::error::GraphicsError;
use crate::program::ShaderStage;
use crate::types::{BufferDescriptor, DeviceFeatures};

// ============================================================================
// Handles
// ============================================================================

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw backend handle.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw backend handle.
            pub const fn raw(self) -> u64 {
                self.0
            }

            pub(crate) fn invalid(self) -> GraphicsError {
                GraphicsError::InvalidHandle {
                    kind: $kind,
                    id: self.0,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

handle!(
    /// Handle to a GPU buffer allocation.
    BufferId,
    "buffer"
);
handle!(
    /// Handle to a GPU vertex array object.
    VertexArrayId,
    "vertex array"
);
handle!(
    /// Handle to a GPU program object.
    ProgramId,
    "program"
);

// ============================================================================
// Draw State
// ============================================================================

/// One attribute-pointer row as applied to a vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributePointer {
    /// Source buffer.
    pub buffer: BufferId,
    /// Element format.
    pub format: ElementFormat,
    /// Byte offset of the first element.
    pub offset: usize,
    /// Bytes between consecutive elements.
    pub stride: usize,
    /// 0 advances per vertex, N advances once every N instances.
    pub divisor: u32,
}

/// An indexed draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// How indices are assembled.
    pub mode: PrimitiveMode,
    /// Number of 32-bit indices read from the start of the index buffer.
    pub index_count: usize,
    /// Number of instances; 1 for a plain draw.
    pub instance_count: u32,
    /// Restart sentinel, if primitive restart is enabled.
    pub restart_index: Option<u32>,
}

/// An active vertex input of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Name as declared in the shader.
    pub name: String,
    /// Slot the input is read from.
    pub location: u32,
}

// ============================================================================
// Backend Trait
// ============================================================================

/// GPU backend trait for abstracting the driver beneath the vertex pipeline.
pub trait GpuBackend {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Optional features this backend provides.
    fn features(&self) -> DeviceFeatures;

    // --- Buffers ---

    /// Allocate a buffer of `descriptor.size` zeroed bytes.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError>;

    /// Write `data` at `offset`.
    fn write_buffer(&self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), GraphicsError>;

    /// Read `size` bytes at `offset`.
    fn read_buffer(&self, buffer: BufferId, offset: usize, size: usize) -> Result<Vec<u8>, GraphicsError>;

    /// Free a buffer.
    fn destroy_buffer(&self, buffer: BufferId);

    // --- Vertex arrays ---

    /// Create an empty vertex array.
    fn create_vertex_array(&self) -> Result<VertexArrayId, GraphicsError>;

    /// Make a vertex array the current vertex source, or clear it.
    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>);

    /// Point `slot` of `vertex_array` at a buffer range and enable it.
    fn set_attribute(
        &self,
        vertex_array: VertexArrayId,
        slot: u32,
        pointer: &AttributePointer,
    ) -> Result<(), GraphicsError>;

    /// Disable `slot` of `vertex_array`.
    fn disable_attribute(&self, vertex_array: VertexArrayId, slot: u32) -> Result<(), GraphicsError>;

    /// Attach the index buffer of `vertex_array`.
    fn set_index_buffer(&self, vertex_array: VertexArrayId, buffer: BufferId) -> Result<(), GraphicsError>;

    /// Free a vertex array.
    fn destroy_vertex_array(&self, vertex_array: VertexArrayId);

    /// Issue an indexed, optionally instanced draw from `vertex_array`.
    fn draw_indexed(&self, vertex_array: VertexArrayId, call: &DrawCall) -> Result<(), GraphicsError>;

    // --- Programs ---

    /// Create an empty program object.
    fn create_program(&self) -> Result<ProgramId, GraphicsError>;

    /// Compile `source` and attach it. On failure returns the compiler log.
    fn attach_shader(&self, program: ProgramId, stage: ShaderStage, source: &str) -> Result<(), String>;

    /// Bind the vertex input `name` to `slot`. Takes effect on the next link.
    fn bind_attribute_location(&self, program: ProgramId, slot: u32, name: &str);

    /// Link attached stages. On failure returns the linker log.
    fn link_program(&self, program: ProgramId) -> Result<(), String>;

    /// Active vertex inputs of a linked program.
    fn active_attributes(&self, program: ProgramId) -> Vec<AttributeInfo>;

    /// Active uniforms of a linked program.
    fn active_uniforms(&self, program: ProgramId) -> Vec<UniformInfo>;

    /// Make a program current, or clear it.
    fn use_program(&self, program: Option<ProgramId>);

    /// Write a uniform of `program`. The value has already been validated.
    fn set_uniform(&self, program: ProgramId, name: &str, value: &UniformValue);

    /// Detach and delete all attached stages.
    fn detach_shaders(&self, program: ProgramId);

    /// Free a program.
    fn destroy_program(&self, program: ProgramId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_debug() {
        assert_eq!(format!("{:?}", BufferId::from_raw(3)), "BufferId(3)");
        assert_eq!(VertexArrayId::from_raw(7).raw(), 7);
        assert_eq!(
            ProgramId::from_raw(2).invalid(),
            GraphicsError::InvalidHandle { kind: "program", id: 2 }
        );
    }
}
