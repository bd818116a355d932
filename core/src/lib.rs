//! # RedLilium Vertex Core
//!
//! GPU-free half of the vertex pipeline: element formats, typed attribute
//! channels, the lock-step [`VertexRecord`], byte layout planning, index
//! lists with primitive restart, primitive assembly and the uniform type
//! model.
//!
//! GPU resources that consume these types live in `redlilium-vertex`.

pub mod error;
pub mod mesh;
pub mod uniform;
pub mod vertex;

pub use error::VertexError;
pub use mesh::{IndexList, IndexingMode, Primitive, PrimitiveMode, RESTART_INDEX};
pub use uniform::{UniformInfo, UniformKind, UniformMismatch, UniformShape, UniformType, UniformValue};
pub use vertex::{
    AttributeChannel, AttributeValue, Channel, ChannelDescriptor, ChannelKey, ChannelPlacement, ElementFormat,
    LayoutMode, LayoutPlan, NullChannel, RecordState, ScalarType, VertexRecord,
};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
pub fn init() {
    log::info!("RedLilium Vertex Core v{} initialized", VERSION);
}
