//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer
//!
//! Resources are reference-counted with [`Rc`] and live on the context thread.
//! Each resource holds a weak reference back to its parent device.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Rc`]: std::rc::Rc

mod buffer;

pub use buffer::Buffer;
