//! Indexed geometry: an attribute set plus an index sequence and a layout
//! descriptor, ready to draw.

use std::rc::{Rc, Weak};

use glam::Vec3;
use redlilium_vertex_core::{
    AttributeChannel, AttributeValue, ChannelDescriptor, ChannelKey, IndexList, IndexingMode, LayoutMode,
    PrimitiveMode, RecordState, VertexError, RESTART_INDEX,
};

use crate::backend::DrawCall;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferTarget, BufferUsageHint, DeviceFeatures};

use super::attribute_set::AttributeSet;
use super::descriptor::VertexLayoutDescriptor;
use super::instance::InstanceStream;

/// Indexed, optionally instanced geometry.
///
/// A position channel (slot 0, `3 x f32`) is always present; further
/// channels are added before the first [`begin`](Self::begin).
///
/// The index sequence starts with a restart sentinel after every `begin`,
/// so draws always run with primitive restart enabled. In
/// [`IndexingMode::Sequential`] every [`vertex`](Self::vertex) call appends
/// its own index; in [`IndexingMode::Explicit`] the caller appends indices
/// with [`index`](Self::index).
///
/// # Example
///
/// ```
/// use glam::Vec3;
/// use redlilium_vertex::{GeometryBuffer, GraphicsDevice, IndexingMode, PrimitiveMode};
///
/// let device = GraphicsDevice::headless();
/// let mut quad = GeometryBuffer::new(&device)?.with_indexing(IndexingMode::Explicit);
///
/// quad.begin(PrimitiveMode::Triangles)?;
/// quad.vertex(Vec3::new(0.0, 0.0, 0.0))?;
/// quad.vertex(Vec3::new(1.0, 0.0, 0.0))?;
/// quad.vertex(Vec3::new(1.0, 1.0, 0.0))?;
/// quad.vertex(Vec3::new(0.0, 1.0, 0.0))?;
/// for i in [0, 1, 2, 0, 2, 3] {
///     quad.index(i)?;
/// }
/// quad.end()?;
/// quad.draw()?;
/// # Ok::<(), redlilium_vertex::GraphicsError>(())
/// ```
pub struct GeometryBuffer {
    device: Weak<GraphicsDevice>,
    attributes: AttributeSet,
    position: ChannelKey<Vec3>,
    indices: IndexList,
    indexing: IndexingMode,
    mode: PrimitiveMode,
    index_buffer: Option<Rc<Buffer>>,
    descriptor: Option<VertexLayoutDescriptor>,
}

impl GeometryBuffer {
    /// Create geometry with only the position channel.
    pub fn new(device: &Rc<GraphicsDevice>) -> Result<Self, GraphicsError> {
        let mut attributes = AttributeSet::new(device);
        let position = attributes.add_channel::<Vec3>(ChannelDescriptor::position())?;
        Ok(Self {
            device: Rc::downgrade(device),
            attributes,
            position,
            indices: IndexList::new(),
            indexing: IndexingMode::default(),
            mode: PrimitiveMode::default(),
            index_buffer: None,
            descriptor: None,
        })
    }

    /// Set how the index sequence is filled.
    pub fn with_indexing(mut self, indexing: IndexingMode) -> Self {
        self.indexing = indexing;
        self
    }

    /// Set the vertex buffer layout.
    pub fn with_layout_mode(mut self, mode: LayoutMode) -> Self {
        self.attributes = self.attributes.with_layout_mode(mode);
        self
    }

    /// Set the usage hint of the vertex buffer.
    pub fn with_usage(mut self, usage: BufferUsageHint) -> Self {
        self.attributes = self.attributes.with_usage(usage);
        self
    }

    /// Set the debug label of the vertex buffer.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.attributes = self.attributes.with_label(label);
        self
    }

    fn device(&self) -> Result<Rc<GraphicsDevice>, GraphicsError> {
        self.device.upgrade().ok_or(GraphicsError::DeviceLost)
    }

    fn require_state(&self, operation: &'static str, expected: RecordState) -> Result<(), GraphicsError> {
        let found = self.attributes.state();
        if found != expected {
            return Err(VertexError::InvalidState { operation, found }.into());
        }
        Ok(())
    }

    /// Declare an extra per-vertex channel.
    pub fn add_channel<T: AttributeValue>(&mut self, descriptor: ChannelDescriptor) -> Result<ChannelKey<T>, GraphicsError> {
        self.attributes.add_channel(descriptor)
    }

    /// Declare a placeholder channel.
    pub fn add_null_channel(&mut self) -> Result<(), GraphicsError> {
        self.attributes.add_null_channel()
    }

    /// Start recording primitives of `mode`.
    pub fn begin(&mut self, mode: PrimitiveMode) -> Result<(), GraphicsError> {
        self.attributes.begin()?;
        self.indices.begin();
        self.mode = mode;
        Ok(())
    }

    /// Set the working value of a channel for the next vertex.
    pub fn set<T: AttributeValue>(&mut self, key: ChannelKey<T>, value: T) -> Result<(), GraphicsError> {
        self.attributes.set(key, value)
    }

    /// Append a vertex at `position` using the working values of every
    /// other channel. Returns the vertex index.
    pub fn vertex(&mut self, position: Vec3) -> Result<u32, GraphicsError> {
        self.attributes.set(self.position, position)?;
        self.push()
    }

    /// Append a vertex from the working values of every channel.
    pub fn push(&mut self) -> Result<u32, GraphicsError> {
        let index = self.attributes.push()?;
        let index = u32::try_from(index)
            .ok()
            .filter(|&i| i != RESTART_INDEX)
            .ok_or_else(|| GraphicsError::InvalidParameter("too many vertices for 32-bit indices".to_string()))?;
        if self.indexing == IndexingMode::Sequential {
            self.indices.push(index);
        }
        Ok(index)
    }

    /// Append an explicit index.
    pub fn index(&mut self, index: u32) -> Result<(), GraphicsError> {
        self.require_state("append an index", RecordState::Recording)?;
        self.indices.push(index);
        Ok(())
    }

    /// Break the current strip, fan or loop.
    pub fn restart(&mut self) -> Result<(), GraphicsError> {
        self.require_state("restart a primitive", RecordState::Recording)?;
        self.indices.restart();
        Ok(())
    }

    /// Finish recording: upload vertices and indices and rebuild the layout descriptor.
    ///
    /// Every non-sentinel index is checked against the vertex count first.
    /// If validation or an upload fails the geometry stays recording and
    /// cannot be drawn; `end()` may be retried.
    ///
    /// Instance streams merged with
    /// [`bind_instanced_attribute`](Self::bind_instanced_attribute) must be
    /// bound again afterwards.
    pub fn end(&mut self) -> Result<(), GraphicsError> {
        self.require_state("end", RecordState::Recording)?;
        let device = self.device()?;
        self.indices.validate(self.attributes.vertex_count())?;

        let index_buffer = device.create_buffer_init(
            &BufferDescriptor::new(self.indices.byte_size(), BufferTarget::Index)
                .with_usage(device.config().default_usage),
            self.indices.as_bytes(),
        )?;
        self.attributes.end()?;

        // Dropping the previous descriptor releases its vertex array.
        self.descriptor = None;
        self.index_buffer = None;
        let mut descriptor = device.create_vertex_layout()?;
        self.attributes.bind(&mut descriptor)?;
        descriptor.set_index_buffer(&index_buffer)?;
        descriptor.bind_all()?;

        log::debug!(
            "GeometryBuffer: {} vertices, {} indices ({:?})",
            self.attributes.vertex_count(),
            self.indices.len(),
            self.mode
        );

        self.index_buffer = Some(index_buffer);
        self.descriptor = Some(descriptor);
        Ok(())
    }

    /// Issue one indexed draw.
    pub fn draw(&self) -> Result<(), GraphicsError> {
        self.draw_instanced(1)
    }

    /// Issue an indexed draw of `instances` instances.
    pub fn draw_instanced(&self, instances: u32) -> Result<(), GraphicsError> {
        self.require_state("draw", RecordState::Ready)?;
        let device = self.device()?;
        if instances != 1 {
            device.require(DeviceFeatures::INSTANCING, "instanced drawing")?;
        }
        device.require(DeviceFeatures::PRIMITIVE_RESTART, "primitive restart")?;

        let descriptor = self.descriptor.as_ref().ok_or(VertexError::InvalidState {
            operation: "draw",
            found: RecordState::Uninitialized,
        })?;
        descriptor.draw(&DrawCall {
            mode: self.mode,
            index_count: self.indices.len(),
            instance_count: instances,
            restart_index: Some(RESTART_INDEX),
        })
    }

    /// Merge a per-instance stream into this geometry's descriptor.
    pub fn bind_instanced_attribute(&mut self, stream: &mut InstanceStream, divisor: u32) -> Result<(), GraphicsError> {
        stream.set_divisor(divisor)?;
        self.device()?.require(DeviceFeatures::INSTANCING, "instanced attributes")?;

        let found = self.attributes.state();
        let descriptor = self.descriptor.as_mut().ok_or(VertexError::InvalidState {
            operation: "bind instanced attributes",
            found,
        })?;
        descriptor.bind()?;
        let result = stream.bind(descriptor);
        descriptor.unbind()?;
        result
    }

    /// Key of the built-in position channel.
    pub fn position_key(&self) -> ChannelKey<Vec3> {
        self.position
    }

    /// Typed access to one channel's recorded values.
    pub fn channel<T: AttributeValue>(&self, key: ChannelKey<T>) -> Result<&AttributeChannel<T>, GraphicsError> {
        self.attributes.channel(key)
    }

    /// The per-vertex attribute set.
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// Index sequence, leading sentinel included.
    pub fn indices(&self) -> &IndexList {
        &self.indices
    }

    /// Index buffer of the last successful `end()`.
    pub fn index_buffer(&self) -> Option<&Rc<Buffer>> {
        self.index_buffer.as_ref()
    }

    /// Layout descriptor of the last successful `end()`.
    pub fn descriptor(&self) -> Option<&VertexLayoutDescriptor> {
        self.descriptor.as_ref()
    }

    /// Primitive mode of the current recording.
    pub fn mode(&self) -> PrimitiveMode {
        self.mode
    }

    /// How indices are filled.
    pub fn indexing(&self) -> IndexingMode {
        self.indexing
    }

    /// Recording state.
    pub fn state(&self) -> RecordState {
        self.attributes.state()
    }

    /// Number of recorded vertices.
    pub fn vertex_count(&self) -> usize {
        self.attributes.vertex_count()
    }
}

impl std::fmt::Debug for GeometryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryBuffer")
            .field("mode", &self.mode)
            .field("indexing", &self.indexing)
            .field("attributes", &self.attributes)
            .field("indices", &self.indices.len())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
