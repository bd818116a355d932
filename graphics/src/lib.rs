//! # RedLilium Vertex
//!
//! GPU side of the RedLilium vertex pipeline: buffers, vertex layout
//! descriptors, indexed and instanced geometry, and the program boundary.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - Owns the backend and the current binding state
//! - [`Buffer`] - A reference-counted GPU allocation
//! - [`AttributeSet`] - Typed channels recorded in lock-step and uploaded into one buffer
//! - [`VertexLayoutDescriptor`] - Slot to buffer/offset/stride/divisor table of a draw
//! - [`GeometryBuffer`] / [`InstanceStream`] - Indexed geometry and per-instance data
//! - [`Program`] / [`Renderer`] - Channel slot binding, uniforms and render capabilities
//! - Backends: headless (always) and OpenGL (`gl-backend` feature)
//!
//! ## Example
//!
//! ```
//! use glam::Vec3;
//! use redlilium_vertex::{ChannelDescriptor, GeometryBuffer, GraphicsDevice, PrimitiveMode};
//!
//! let device = GraphicsDevice::headless();
//! let mut geometry = GeometryBuffer::new(&device)?;
//! let color = geometry.add_channel::<[u8; 4]>(ChannelDescriptor::color())?;
//!
//! geometry.begin(PrimitiveMode::Triangles)?;
//! geometry.set(color, [255, 0, 0, 255])?;
//! geometry.vertex(Vec3::ZERO)?;
//! geometry.vertex(Vec3::X)?;
//! geometry.vertex(Vec3::Y)?;
//! geometry.end()?;
//!
//! assert_eq!(geometry.attributes().stride(), 16);
//! geometry.draw()?;
//! # Ok::<(), redlilium_vertex::GraphicsError>(())
//! ```

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod program;
pub mod renderer;
pub mod resources;
pub mod types;
pub mod vertex;

// Re-export main types for convenience
pub use backend::headless::{DrawRecord, HeadlessBackend};
pub use backend::{AttributeInfo, AttributePointer, BufferId, DrawCall, GpuBackend, ProgramId, VertexArrayId};
pub use config::DeviceConfig;
pub use device::GraphicsDevice;
pub use error::GraphicsError;
pub use program::{Program, ShaderError, ShaderStage};
pub use renderer::{CameraCapability, Drawable, ModelTransform, RenderCapability, Renderer};
pub use resources::Buffer;
pub use types::{BufferDescriptor, BufferTarget, BufferUsageHint, DeviceFeatures};
pub use vertex::{AttributeBinding, AttributeSet, GeometryBuffer, InstanceStream, VertexLayoutDescriptor};

#[cfg(feature = "gl-backend")]
pub use backend::gl::GlBackend;

pub use redlilium_vertex_core::{
    AttributeChannel, AttributeValue, Channel, ChannelDescriptor, ChannelKey, ElementFormat, IndexList, IndexingMode,
    LayoutMode, LayoutPlan, Primitive, PrimitiveMode, RecordState, ScalarType, UniformInfo, UniformType,
    UniformValue, VertexError, RESTART_INDEX,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the vertex pipeline.
///
/// Only logs the library versions; devices need no global setup.
pub fn init() {
    redlilium_vertex_core::init();
    log::info!("RedLilium Vertex v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_headless_backend() {
        let device = GraphicsDevice::headless();
        assert_eq!(device.backend().name(), "Headless Backend");
        assert_eq!(device.features(), DeviceFeatures::all());
    }
}
