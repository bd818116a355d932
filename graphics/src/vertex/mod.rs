//! GPU-side vertex pipeline.
//!
//! - [`AttributeSet`]: a recorded vertex record uploaded into one buffer
//! - [`VertexLayoutDescriptor`]: the slot to buffer/offset/stride/divisor table of a draw
//! - [`GeometryBuffer`]: an attribute set plus indices, drawable
//! - [`InstanceStream`]: an attribute set read per instance

mod attribute_set;
mod descriptor;
mod geometry;
mod instance;

pub use attribute_set::AttributeSet;
pub use descriptor::{AttributeBinding, VertexLayoutDescriptor};
pub use geometry::GeometryBuffer;
pub use instance::InstanceStream;
