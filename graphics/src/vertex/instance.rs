//! Per-instance attribute streams.

use std::rc::Rc;

use redlilium_vertex_core::{
    AttributeChannel, AttributeValue, ChannelDescriptor, ChannelKey, LayoutMode, RecordState,
};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::BufferUsageHint;

use super::attribute_set::AttributeSet;
use super::descriptor::VertexLayoutDescriptor;

/// An [`AttributeSet`] whose rows advance per instance instead of per vertex.
///
/// The stream's lifecycle is independent of the geometry it decorates: it
/// can be re-recorded every frame and merged again with
/// [`GeometryBuffer::bind_instanced_attribute`](super::GeometryBuffer::bind_instanced_attribute)
/// while the per-vertex data stays untouched.
#[derive(Debug)]
pub struct InstanceStream {
    attributes: AttributeSet,
}

impl InstanceStream {
    /// Create an empty stream with divisor 1.
    pub fn new(device: &Rc<GraphicsDevice>) -> Self {
        let mut attributes = AttributeSet::new(device).with_usage(BufferUsageHint::Dynamic);
        attributes.set_divisor(1);
        Self { attributes }
    }

    /// Set the buffer layout.
    pub fn with_layout_mode(mut self, mode: LayoutMode) -> Self {
        self.attributes = self.attributes.with_layout_mode(mode);
        self
    }

    /// Set the usage hint of uploaded buffers.
    pub fn with_usage(mut self, usage: BufferUsageHint) -> Self {
        self.attributes = self.attributes.with_usage(usage);
        self
    }

    /// Set the debug label of uploaded buffers.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.attributes = self.attributes.with_label(label);
        self
    }

    /// Declare a per-instance channel. Only allowed before the first `begin()`.
    pub fn add_channel<T: AttributeValue>(&mut self, descriptor: ChannelDescriptor) -> Result<ChannelKey<T>, GraphicsError> {
        self.attributes.add_channel(descriptor)
    }

    /// Declare a placeholder channel.
    pub fn add_null_channel(&mut self) -> Result<(), GraphicsError> {
        self.attributes.add_null_channel()
    }

    /// Start recording instance records.
    pub fn begin(&mut self) -> Result<(), GraphicsError> {
        self.attributes.begin()
    }

    /// Set the working value of a channel for the next instance.
    pub fn set<T: AttributeValue>(&mut self, key: ChannelKey<T>, value: T) -> Result<(), GraphicsError> {
        self.attributes.set(key, value)
    }

    /// Append one instance record. Returns its index.
    pub fn push(&mut self) -> Result<usize, GraphicsError> {
        self.attributes.push()
    }

    /// Finish recording and upload into a new buffer.
    ///
    /// Rows bound from the previous buffer go stale; bind the stream again.
    pub fn end(&mut self) -> Result<(), GraphicsError> {
        self.attributes.end()
    }

    /// Fill descriptor rows for every non-null channel with the stream's divisor.
    pub fn bind(&self, descriptor: &mut VertexLayoutDescriptor) -> Result<(), GraphicsError> {
        self.attributes.bind(descriptor)
    }

    /// Instances that share one record. Must be at least 1.
    pub fn divisor(&self) -> u32 {
        self.attributes.divisor()
    }

    /// Change the divisor. Zero is rejected: it would make the stream per-vertex.
    pub fn set_divisor(&mut self, divisor: u32) -> Result<(), GraphicsError> {
        if divisor == 0 {
            return Err(GraphicsError::InvalidParameter(
                "instance streams need a divisor of at least 1".to_string(),
            ));
        }
        self.attributes.set_divisor(divisor);
        Ok(())
    }

    /// Number of recorded instance records.
    pub fn instance_count(&self) -> usize {
        self.attributes.vertex_count()
    }

    /// Recording state.
    pub fn state(&self) -> RecordState {
        self.attributes.state()
    }

    /// Buffer of the last upload.
    pub fn buffer(&self) -> Option<&Rc<Buffer>> {
        self.attributes.buffer()
    }

    /// Typed access to one channel's recorded values.
    pub fn channel<T: AttributeValue>(&self, key: ChannelKey<T>) -> Result<&AttributeChannel<T>, GraphicsError> {
        self.attributes.channel(key)
    }

    /// Read the uploaded bytes back from the GPU.
    pub fn read_back(&self) -> Result<Vec<u8>, GraphicsError> {
        self.attributes.read_back()
    }

    /// The wrapped attribute set.
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }
}
