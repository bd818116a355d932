//! Common types and descriptors for graphics resources.
//!
//! This module contains buffer targets, usage hints, descriptor structs and
//! the device feature flags used throughout the graphics system.

mod buffer;
mod features;

pub use buffer::{BufferDescriptor, BufferTarget, BufferUsageHint};
pub use features::DeviceFeatures;
