//! Vertex layout descriptor: the GPU-side binding table of a draw.

use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use redlilium_vertex_core::ElementFormat;

use crate::backend::{AttributePointer, DrawCall, VertexArrayId};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::BufferTarget;

/// One row of a [`VertexLayoutDescriptor`].
///
/// The buffer reference is non-owning: once the buffer is dropped the row
/// is stale and activating or drawing with it fails.
#[derive(Debug, Clone)]
pub struct AttributeBinding {
    /// Source buffer.
    pub buffer: Weak<Buffer>,
    /// Element format.
    pub format: ElementFormat,
    /// Byte offset of the first element.
    pub offset: usize,
    /// Bytes between consecutive elements.
    pub stride: usize,
    /// 0 advances per vertex, N advances once every N instances.
    pub divisor: u32,
}

impl Default for AttributeBinding {
    fn default() -> Self {
        Self {
            buffer: Weak::new(),
            format: ElementFormat::NONE,
            offset: 0,
            stride: 0,
            divisor: 0,
        }
    }
}

impl PartialEq for AttributeBinding {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.buffer, &other.buffer)
            && self.format == other.format
            && self.offset == other.offset
            && self.stride == other.stride
            && self.divisor == other.divisor
    }
}

impl AttributeBinding {
    /// Whether the source buffer is gone.
    pub fn is_stale(&self) -> bool {
        self.buffer.strong_count() == 0
    }

    fn pointer(&self, slot: u32) -> Result<AttributePointer, GraphicsError> {
        let buffer = self.buffer.upgrade().ok_or(GraphicsError::StaleBinding { slot })?;
        Ok(AttributePointer {
            buffer: buffer.id(),
            format: self.format,
            offset: self.offset,
            stride: self.stride,
            divisor: self.divisor,
        })
    }
}

/// A vertex array: for each slot, where the shader reads that slot from.
///
/// Several attribute sets may fill rows of the same descriptor; this is how
/// per-instance streams ride alongside per-vertex data. Rows are applied to
/// the GPU with [`activate`](Self::activate) while the descriptor is the
/// current vertex source, or all at once with [`bind_all`](Self::bind_all).
pub struct VertexLayoutDescriptor {
    device: Weak<GraphicsDevice>,
    id: VertexArrayId,
    bindings: BTreeMap<u32, AttributeBinding>,
    index_buffer: Option<Weak<Buffer>>,
}

impl VertexLayoutDescriptor {
    pub(crate) fn new(device: Weak<GraphicsDevice>, id: VertexArrayId) -> Self {
        Self {
            device,
            id,
            bindings: BTreeMap::new(),
            index_buffer: None,
        }
    }

    fn device(&self) -> Result<Rc<GraphicsDevice>, GraphicsError> {
        self.device.upgrade().ok_or(GraphicsError::DeviceLost)
    }

    /// Backend handle of the vertex array.
    pub fn id(&self) -> VertexArrayId {
        self.id
    }

    /// All rows, by slot.
    pub fn bindings(&self) -> &BTreeMap<u32, AttributeBinding> {
        &self.bindings
    }

    /// The row for `slot`, if any.
    pub fn binding(&self, slot: u32) -> Option<&AttributeBinding> {
        self.bindings.get(&slot)
    }

    /// The row for `slot`, created with defaults if absent.
    pub fn binding_mut(&mut self, slot: u32) -> &mut AttributeBinding {
        self.bindings.entry(slot).or_default()
    }

    /// Remove the row for `slot` and disable the slot on the GPU.
    pub fn remove_binding(&mut self, slot: u32) -> Result<Option<AttributeBinding>, GraphicsError> {
        let removed = self.bindings.remove(&slot);
        if removed.is_some() {
            self.device()?.backend().disable_attribute(self.id, slot)?;
        }
        Ok(removed)
    }

    /// Whether this descriptor is the current vertex source.
    pub fn is_current(&self) -> bool {
        self.device
            .upgrade()
            .is_some_and(|device| device.current_vertex_array() == Some(self.id))
    }

    /// Make this descriptor the current vertex source.
    pub fn bind(&self) -> Result<(), GraphicsError> {
        self.device()?.bind_vertex_array(Some(self.id));
        Ok(())
    }

    /// Clear the current vertex source if it is this descriptor.
    pub fn unbind(&self) -> Result<(), GraphicsError> {
        let device = self.device()?;
        if device.current_vertex_array() == Some(self.id) {
            device.bind_vertex_array(None);
        }
        Ok(())
    }

    /// Apply the row for `slot` to the GPU attribute-pointer and divisor state.
    ///
    /// The descriptor must be current.
    pub fn activate(&self, slot: u32) -> Result<(), GraphicsError> {
        if !self.is_current() {
            return Err(GraphicsError::DescriptorNotCurrent);
        }
        let binding = self
            .bindings
            .get(&slot)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("no binding at slot {slot}")))?;
        if binding.format.is_null() {
            return Err(GraphicsError::InvalidParameter(format!(
                "binding at slot {slot} has no element format"
            )));
        }
        let pointer = binding.pointer(slot)?;
        self.device()?.backend().set_attribute(self.id, slot, &pointer)
    }

    /// Bind, apply every row, unbind.
    pub fn bind_all(&self) -> Result<(), GraphicsError> {
        self.bind()?;
        let result = self.bindings.keys().try_for_each(|&slot| self.activate(slot));
        self.unbind()?;
        log::debug!(
            "Vertex layout {:?}: applied {} bindings",
            self.id,
            self.bindings.len()
        );
        result
    }

    /// Attach the index buffer used by indexed draws.
    pub fn set_index_buffer(&mut self, buffer: &Rc<Buffer>) -> Result<(), GraphicsError> {
        if buffer.target() != BufferTarget::Index {
            return Err(GraphicsError::InvalidParameter(format!(
                "{:?} is not an index buffer",
                buffer.label()
            )));
        }
        self.device()?.backend().set_index_buffer(self.id, buffer.id())?;
        self.index_buffer = Some(Rc::downgrade(buffer));
        Ok(())
    }

    /// The attached index buffer, if it is still alive.
    pub fn index_buffer(&self) -> Option<Rc<Buffer>> {
        self.index_buffer.as_ref().and_then(Weak::upgrade)
    }

    /// Check that every row and the index buffer refer to live buffers.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if let Some((&slot, _)) = self.bindings.iter().find(|(_, b)| b.is_stale()) {
            return Err(GraphicsError::StaleBinding { slot });
        }
        if self.index_buffer.is_some() && self.index_buffer().is_none() {
            return Err(GraphicsError::InvalidParameter(
                "index buffer has been dropped".to_string(),
            ));
        }
        Ok(())
    }

    /// Bind, issue `call`, unbind.
    pub(crate) fn draw(&self, call: &DrawCall) -> Result<(), GraphicsError> {
        self.validate()?;
        let device = self.device()?;
        self.bind()?;
        let result = device.backend().draw_indexed(self.id, call);
        self.unbind()?;
        result
    }
}

impl Drop for VertexLayoutDescriptor {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            if device.current_vertex_array() == Some(self.id) {
                device.bind_vertex_array(None);
            }
            device.backend().destroy_vertex_array(self.id);
        }
    }
}

impl std::fmt::Debug for VertexLayoutDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexLayoutDescriptor")
            .field("id", &self.id)
            .field("bindings", &self.bindings)
            .finish()
    }
}
