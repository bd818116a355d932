//! GPU buffer resource.

use std::rc::{Rc, Weak};

use crate::backend::BufferId;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferTarget, DeviceFeatures};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and are reference-counted.
/// They hold a weak reference back to their parent device. The allocation is
/// freed when the last reference is dropped.
///
/// # Example
///
/// ```
/// use redlilium_vertex::{BufferDescriptor, BufferTarget, GraphicsDevice};
///
/// let device = GraphicsDevice::headless();
/// let buffer = device.create_buffer(&BufferDescriptor::new(8, BufferTarget::Vertex))?;
/// buffer.write(4, &[1, 2, 3, 4])?;
/// assert_eq!(buffer.read(4, 4)?, vec![1, 2, 3, 4]);
/// # Ok::<(), redlilium_vertex::GraphicsError>(())
/// ```
pub struct Buffer {
    device: Weak<GraphicsDevice>,
    id: BufferId,
    descriptor: BufferDescriptor,
}

impl Buffer {
    /// Create a new buffer (called by GraphicsDevice).
    pub(crate) fn new(device: Weak<GraphicsDevice>, id: BufferId, descriptor: BufferDescriptor) -> Self {
        Self { device, id, descriptor }
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Rc<GraphicsDevice>> {
        self.device.upgrade()
    }

    /// Backend handle of the allocation.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> usize {
        self.descriptor.size
    }

    /// Get the binding target.
    pub fn target(&self) -> BufferTarget {
        self.descriptor.target
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), GraphicsError> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > self.descriptor.size {
            return Err(GraphicsError::OutOfBounds {
                offset,
                end,
                size: self.descriptor.size,
            });
        }
        Ok(())
    }

    /// Update the sub-range starting at `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), GraphicsError> {
        self.check_range(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        let device = self.device().ok_or(GraphicsError::DeviceLost)?;
        device.backend().write_buffer(self.id, offset, data)
    }

    /// Replace the whole contents. `data` must be exactly [`size`](Self::size) bytes.
    pub fn replace(&self, data: &[u8]) -> Result<(), GraphicsError> {
        if data.len() != self.descriptor.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "replacing a {}-byte buffer with {} bytes",
                self.descriptor.size,
                data.len()
            )));
        }
        self.write(0, data)
    }

    /// Read `size` bytes starting at `offset` back from the GPU.
    pub fn read(&self, offset: usize, size: usize) -> Result<Vec<u8>, GraphicsError> {
        self.check_range(offset, size)?;
        let device = self.device().ok_or(GraphicsError::DeviceLost)?;
        device.require(DeviceFeatures::BUFFER_READBACK, "buffer readback")?;
        device.backend().read_buffer(self.id, offset, size)
    }

    /// Read the whole buffer back from the GPU.
    pub fn read_all(&self) -> Result<Vec<u8>, GraphicsError> {
        self.read(0, self.descriptor.size)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            log::trace!("Buffer: releasing {:?} {:?}", self.id, self.descriptor.label);
            device.backend().destroy_buffer(self.id);
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("target", &self.descriptor.target)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Buffers belong to the context thread
static_assertions::assert_not_impl_any!(Buffer: Send, Sync);
