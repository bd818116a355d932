//! Vertex attribute composition.
//!
//! A [`VertexRecord`] composes up to eight [`Channel`]s into one logical
//! vertex. Values are recorded with `begin` / `set` + `push` per vertex /
//! `end`, and the finished record is laid out by a [`LayoutPlan`].

mod channel;
mod format;
mod layout;
mod record;
mod value;

pub use channel::{
    AttributeChannel, Channel, ChannelDescriptor, NullChannel, SLOT_COLOR, SLOT_NORMAL, SLOT_POSITION,
    SLOT_TEXCOORD0,
};
pub use format::{encode_snorm8, encode_unorm8, ElementFormat, ScalarType};
pub use layout::{ChannelPlacement, LayoutMode, LayoutPlan};
pub use record::{ChannelKey, RecordState, VertexRecord};
pub use value::AttributeValue;
