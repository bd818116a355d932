//! Attribute sets: a vertex record uploaded into one GPU buffer.

use std::rc::{Rc, Weak};

use redlilium_vertex_core::{
    AttributeChannel, AttributeValue, ChannelDescriptor, ChannelKey, LayoutMode, LayoutPlan, RecordState, VertexError,
    VertexRecord,
};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferTarget, BufferUsageHint};

use super::descriptor::{AttributeBinding, VertexLayoutDescriptor};

/// A composed vertex record and the GPU buffer it was last uploaded to.
///
/// # Lifecycle
///
/// ```text
/// Uninitialized --begin--> Recording --end--> Ready
///                              ^                |
///                              +-----begin------+
/// ```
///
/// Every `end()` allocates a fresh buffer of exactly `stride * vertex_count`
/// bytes and drops the previous one, which leaves descriptor rows that
/// pointed at it stale until the set is bound again.
///
/// # Example
///
/// ```
/// use redlilium_vertex::{AttributeSet, ChannelDescriptor, GraphicsDevice};
///
/// let device = GraphicsDevice::headless();
/// let mut set = AttributeSet::new(&device);
/// let position = set.add_channel::<[f32; 3]>(ChannelDescriptor::position())?;
/// let color = set.add_channel::<[u8; 4]>(ChannelDescriptor::color())?;
///
/// set.begin()?;
/// set.set(color, [255, 255, 255, 255])?;
/// for x in 0..3 {
///     set.set(position, [x as f32, 0.0, 0.0])?;
///     set.push()?;
/// }
/// set.end()?;
///
/// assert_eq!(set.stride(), 16);
/// assert_eq!(set.buffer().map(|b| b.size()), Some(48));
/// # Ok::<(), redlilium_vertex::GraphicsError>(())
/// ```
pub struct AttributeSet {
    device: Weak<GraphicsDevice>,
    record: VertexRecord,
    buffer: Option<Rc<Buffer>>,
    usage: BufferUsageHint,
    divisor: u32,
    label: Option<String>,
}

impl AttributeSet {
    /// Create an empty set using the device's default usage hint.
    pub fn new(device: &Rc<GraphicsDevice>) -> Self {
        Self {
            device: Rc::downgrade(device),
            record: VertexRecord::new(),
            buffer: None,
            usage: device.config().default_usage,
            divisor: 0,
            label: None,
        }
    }

    /// Set the buffer layout.
    pub fn with_layout_mode(mut self, mode: LayoutMode) -> Self {
        self.record.set_layout_mode(mode);
        self
    }

    /// Set the usage hint of uploaded buffers.
    pub fn with_usage(mut self, usage: BufferUsageHint) -> Self {
        self.usage = usage;
        self
    }

    /// Set the debug label of uploaded buffers.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Declare a typed channel. Only allowed before the first `begin()`.
    pub fn add_channel<T: AttributeValue>(&mut self, descriptor: ChannelDescriptor) -> Result<ChannelKey<T>, GraphicsError> {
        Ok(self.record.add_channel(descriptor)?)
    }

    /// Declare a placeholder channel.
    pub fn add_null_channel(&mut self) -> Result<(), GraphicsError> {
        Ok(self.record.add_null_channel()?)
    }

    /// Start recording.
    pub fn begin(&mut self) -> Result<(), GraphicsError> {
        Ok(self.record.begin()?)
    }

    /// Set the working value of a channel.
    pub fn set<T: AttributeValue>(&mut self, key: ChannelKey<T>, value: T) -> Result<(), GraphicsError> {
        Ok(self.record.set(key, value)?)
    }

    /// Append one vertex made of every channel's working value. Returns its index.
    pub fn push(&mut self) -> Result<usize, GraphicsError> {
        Ok(self.record.push()?)
    }

    /// Finish recording and upload into a new buffer.
    ///
    /// The set only becomes ready once the upload succeeded; on failure it
    /// stays recording and keeps its previous buffer out of reach of `bind`.
    pub fn end(&mut self) -> Result<(), GraphicsError> {
        let device = self.device.upgrade().ok_or(GraphicsError::DeviceLost)?;
        let plan = self.record.layout()?;

        let mut descriptor = BufferDescriptor::new(plan.total_size(), BufferTarget::Vertex).with_usage(self.usage);
        if let Some(label) = &self.label {
            descriptor = descriptor.with_label(label.clone());
        }
        let buffer = device.create_buffer(&descriptor)?;
        self.upload(&buffer, &plan)?;
        self.record.end()?;

        log::debug!(
            "AttributeSet {:?}: uploaded {} vertices, stride {}, {} bytes ({:?})",
            self.label,
            plan.vertex_count,
            plan.stride,
            plan.total_size(),
            plan.mode
        );
        self.buffer = Some(buffer);
        Ok(())
    }

    fn upload(&self, buffer: &Buffer, plan: &LayoutPlan) -> Result<(), GraphicsError> {
        match plan.mode {
            LayoutMode::Interleaved => buffer.write(0, &plan.pack(self.record.channels())?),
            LayoutMode::Blocked => {
                let channels = self.record.channels();
                for placement in &plan.placements {
                    let channel = channels
                        .get(placement.channel)
                        .ok_or(VertexError::UnknownChannel {
                            index: placement.channel,
                        })?;
                    buffer.write(placement.offset, channel.bytes())?;
                }
                Ok(())
            }
        }
    }

    /// Fill one descriptor row per non-null channel at the channel's slot.
    ///
    /// A slot whose live row comes from another buffer with the other
    /// divisor class (per-vertex vs per-instance) is rejected and no row
    /// is touched.
    ///
    /// Rows are applied to the GPU right away when `descriptor` is current,
    /// otherwise on its next [`bind_all`](VertexLayoutDescriptor::bind_all).
    pub fn bind(&self, descriptor: &mut VertexLayoutDescriptor) -> Result<(), GraphicsError> {
        if self.record.state() != RecordState::Ready {
            return Err(VertexError::InvalidState {
                operation: "bind attributes",
                found: self.record.state(),
            }
            .into());
        }
        let (Some(buffer), Some(plan)) = (&self.buffer, self.record.plan()) else {
            return Err(GraphicsError::InvalidParameter(
                "attribute set has no uploaded buffer".to_string(),
            ));
        };

        for placement in &plan.placements {
            if let Some(existing) = descriptor.binding(placement.slot) {
                let foreign = existing
                    .buffer
                    .upgrade()
                    .is_some_and(|other| !Rc::ptr_eq(&other, buffer));
                if foreign && (existing.divisor == 0) != (self.divisor == 0) {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "slot {} already holds {} data from another buffer",
                        placement.slot,
                        if existing.divisor == 0 { "per-vertex" } else { "per-instance" }
                    )));
                }
            }
        }

        let apply = descriptor.is_current();
        for placement in &plan.placements {
            *descriptor.binding_mut(placement.slot) = AttributeBinding {
                buffer: Rc::downgrade(buffer),
                format: placement.format,
                offset: placement.offset,
                stride: placement.stride,
                divisor: self.divisor,
            };
            if apply {
                descriptor.activate(placement.slot)?;
            }
        }
        Ok(())
    }

    /// Read the uploaded bytes back from the GPU.
    pub fn read_back(&self) -> Result<Vec<u8>, GraphicsError> {
        match &self.buffer {
            Some(buffer) => buffer.read_all(),
            None => Err(VertexError::InvalidState {
                operation: "read back",
                found: self.record.state(),
            }
            .into()),
        }
    }

    /// Typed access to one channel's recorded values.
    pub fn channel<T: AttributeValue>(&self, key: ChannelKey<T>) -> Result<&AttributeChannel<T>, GraphicsError> {
        Ok(self.record.channel(key)?)
    }

    /// The underlying record.
    pub fn record(&self) -> &VertexRecord {
        &self.record
    }

    /// Recording state.
    pub fn state(&self) -> RecordState {
        self.record.state()
    }

    /// Number of recorded vertices.
    pub fn vertex_count(&self) -> usize {
        self.record.vertex_count()
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> usize {
        self.record.stride()
    }

    /// Layout of the last upload.
    pub fn plan(&self) -> Option<&LayoutPlan> {
        self.record.plan()
    }

    /// Buffer of the last upload.
    pub fn buffer(&self) -> Option<&Rc<Buffer>> {
        self.buffer.as_ref()
    }

    /// Divisor written into descriptor rows.
    pub fn divisor(&self) -> u32 {
        self.divisor
    }

    /// Set the divisor written into descriptor rows by the next `bind()`.
    pub fn set_divisor(&mut self, divisor: u32) {
        self.divisor = divisor;
    }
}

impl std::fmt::Debug for AttributeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeSet")
            .field("label", &self.label)
            .field("record", &self.record)
            .field("buffer", &self.buffer)
            .field("divisor", &self.divisor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use crate::config::DeviceConfig;

    fn setup() -> (HeadlessBackend, Rc<GraphicsDevice>) {
        let backend = HeadlessBackend::new();
        let device = GraphicsDevice::new(Box::new(backend.clone()), DeviceConfig::default());
        (backend, device)
    }

    fn triangle(device: &Rc<GraphicsDevice>, mode: LayoutMode) -> AttributeSet {
        let mut set = AttributeSet::new(device).with_layout_mode(mode);
        let position = set.add_channel::<[f32; 3]>(ChannelDescriptor::position()).unwrap();
        let color = set.add_channel::<[u8; 4]>(ChannelDescriptor::color()).unwrap();
        set.begin().unwrap();
        for i in 0..3u8 {
            set.set(position, [i as f32, 1.0, 2.0]).unwrap();
            set.set(color, [i, i, i, 255]).unwrap();
            set.push().unwrap();
        }
        set.end().unwrap();
        set
    }

    #[test]
    fn test_interleaved_upload() {
        let (_, device) = setup();
        let set = triangle(&device, LayoutMode::Interleaved);
        let bytes = set.read_back().unwrap();
        assert_eq!(bytes.len(), 48);
        // vertex 1: position at 16, color at 28
        assert_eq!(&bytes[16..20], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[28..32], &[1, 1, 1, 255]);
    }

    #[test]
    fn test_blocked_upload() {
        let (_, device) = setup();
        let set = triangle(&device, LayoutMode::Blocked);
        let bytes = set.read_back().unwrap();
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[12..16], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[40..44], &[1, 1, 1, 255]);
    }

    #[test]
    fn test_end_replaces_buffer() {
        let (backend, device) = setup();
        let mut set = triangle(&device, LayoutMode::Interleaved);
        let first = set.buffer().map(|b| b.id());

        set.begin().unwrap();
        set.push().unwrap();
        set.end().unwrap();

        assert_ne!(set.buffer().map(|b| b.id()), first);
        assert_eq!(backend.buffer_count(), 1);
        assert_eq!(backend.allocated_bytes(), 16);
    }

    #[test]
    fn test_bind_while_recording_fails() {
        let (_, device) = setup();
        let mut set = triangle(&device, LayoutMode::Interleaved);
        let mut descriptor = device.create_vertex_layout().unwrap();
        set.begin().unwrap();
        assert!(matches!(
            set.bind(&mut descriptor),
            Err(GraphicsError::Vertex(VertexError::InvalidState {
                found: RecordState::Recording,
                ..
            }))
        ));
    }

    #[test]
    fn test_bind_fills_rows() {
        let (_, device) = setup();
        let set = triangle(&device, LayoutMode::Interleaved);
        let mut descriptor = device.create_vertex_layout().unwrap();
        set.bind(&mut descriptor).unwrap();

        let color = descriptor.binding(2).unwrap();
        assert_eq!((color.offset, color.stride, color.divisor), (12, 16, 0));
        assert_eq!(color.format, redlilium_vertex_core::ElementFormat::UNORM8X4);
        assert!(descriptor.binding(1).is_none());
    }

    #[test]
    fn test_null_channel_binds_nothing() {
        let (_, device) = setup();
        let mut set = AttributeSet::new(&device);
        let position = set.add_channel::<[f32; 3]>(ChannelDescriptor::position()).unwrap();
        set.add_null_channel().unwrap();
        set.begin().unwrap();
        set.set(position, [1.0, 2.0, 3.0]).unwrap();
        set.push().unwrap();
        set.end().unwrap();

        let mut descriptor = device.create_vertex_layout().unwrap();
        set.bind(&mut descriptor).unwrap();
        assert_eq!(descriptor.bindings().len(), 1);
        assert_eq!(set.stride(), 12);
    }

    #[test]
    fn test_empty_recording_uploads_nothing() {
        let (_, device) = setup();
        let mut set = AttributeSet::new(&device);
        set.add_channel::<[f32; 3]>(ChannelDescriptor::position()).unwrap();
        set.begin().unwrap();
        set.end().unwrap();
        assert_eq!(set.buffer().map(|b| b.size()), Some(0));
        assert!(set.read_back().unwrap().is_empty());
    }

    #[test]
    fn test_failed_upload_stays_recording() {
        let device = GraphicsDevice::new(
            Box::new(HeadlessBackend::new()),
            DeviceConfig::new().with_max_buffer_size(48),
        );
        let mut set = triangle(&device, LayoutMode::Interleaved);
        let first = set.buffer().map(|b| b.id());

        set.begin().unwrap();
        for _ in 0..4 {
            set.push().unwrap();
        }
        assert!(matches!(set.end(), Err(GraphicsError::InvalidParameter(_))));
        assert_eq!(set.state(), RecordState::Recording);
        assert!(set.plan().is_none());
        assert_eq!(set.buffer().map(|b| b.id()), first);

        let mut descriptor = device.create_vertex_layout().unwrap();
        assert!(set.bind(&mut descriptor).is_err());
        assert!(descriptor.bindings().is_empty());
    }

    #[test]
    fn test_end_retried_after_memory_freed() {
        let backend = HeadlessBackend::new().with_memory_budget(100);
        let device = GraphicsDevice::new(Box::new(backend.clone()), DeviceConfig::default());
        let mut set = triangle(&device, LayoutMode::Blocked);
        let blocker = device
            .create_buffer(&BufferDescriptor::new(32, BufferTarget::Vertex))
            .unwrap();

        set.begin().unwrap();
        for _ in 0..3 {
            set.push().unwrap();
        }
        assert!(matches!(set.end(), Err(GraphicsError::OutOfMemory { .. })));
        assert_eq!(set.state(), RecordState::Recording);

        drop(blocker);
        set.end().unwrap();
        assert_eq!(set.state(), RecordState::Ready);
        assert_eq!(backend.allocated_bytes(), 48);
    }
}
