//! Graphics device.
//!
//! The [`GraphicsDevice`] is the main interface for creating GPU resources.
//! It owns the backend, the configuration and the per-context binding state
//! (current vertex source and current program).

use std::cell::Cell;
use std::rc::Rc;

use crate::backend::headless::HeadlessBackend;
use crate::backend::{GpuBackend, ProgramId, VertexArrayId};
use crate::config::DeviceConfig;
use crate::error::GraphicsError;
use crate::program::Program;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, DeviceFeatures};
use crate::vertex::VertexLayoutDescriptor;

/// A graphics device for creating GPU resources.
///
/// # Context Model
///
/// A device wraps one graphics context and must only be used from the
/// thread that owns it. It is reference-counted with [`Rc`]; resources hold
/// a weak reference back to it and report [`GraphicsError::DeviceLost`] once
/// it is gone.
///
/// # Example
///
/// ```
/// use redlilium_vertex::{BufferDescriptor, BufferTarget, GraphicsDevice};
///
/// let device = GraphicsDevice::headless();
/// let buffer = device.create_buffer(&BufferDescriptor::new(64, BufferTarget::Vertex))?;
/// assert_eq!(buffer.size(), 64);
/// # Ok::<(), redlilium_vertex::GraphicsError>(())
/// ```
pub struct GraphicsDevice {
    backend: Box<dyn GpuBackend>,
    config: DeviceConfig,
    features: DeviceFeatures,
    current_vertex_array: Cell<Option<VertexArrayId>>,
    current_program: Cell<Option<ProgramId>>,
}

impl GraphicsDevice {
    /// Create a device on top of a backend.
    pub fn new(backend: Box<dyn GpuBackend>, config: DeviceConfig) -> Rc<Self> {
        let features = backend.features();
        log::info!(
            "Created graphics device {:?} on {} (features: {:?}, max buffer size: {})",
            config.label,
            backend.name(),
            features,
            config.max_buffer_size
        );
        Rc::new(Self {
            backend,
            config,
            features,
            current_vertex_array: Cell::new(None),
            current_program: Cell::new(None),
        })
    }

    /// Create a device on a fresh [`HeadlessBackend`] with default configuration.
    pub fn headless() -> Rc<Self> {
        Self::new(Box::new(HeadlessBackend::new()), DeviceConfig::default())
    }

    /// The backend beneath this device.
    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    /// The device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Features the backend provides.
    pub fn features(&self) -> DeviceFeatures {
        self.features
    }

    /// Fail with [`GraphicsError::FeatureNotSupported`] unless `feature` is available.
    pub fn require(&self, feature: DeviceFeatures, what: &str) -> Result<(), GraphicsError> {
        if self.features.contains(feature) {
            Ok(())
        } else {
            Err(GraphicsError::FeatureNotSupported(what.to_string()))
        }
    }

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the size exceeds the configured maximum or the
    /// backend refuses the allocation.
    pub fn create_buffer(self: &Rc<Self>, descriptor: &BufferDescriptor) -> Result<Rc<Buffer>, GraphicsError> {
        if descriptor.size > self.config.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.config.max_buffer_size
            )));
        }

        let id = self.backend.create_buffer(descriptor)?;
        let buffer = Rc::new(Buffer::new(Rc::downgrade(self), id, descriptor.clone()));

        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}",
            descriptor.label,
            descriptor.size
        );

        Ok(buffer)
    }

    /// Create a GPU buffer and fill it with `data`.
    pub fn create_buffer_init(
        self: &Rc<Self>,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<Rc<Buffer>, GraphicsError> {
        let buffer = self.create_buffer(descriptor)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Create an empty vertex layout descriptor.
    pub fn create_vertex_layout(self: &Rc<Self>) -> Result<VertexLayoutDescriptor, GraphicsError> {
        let id = self.backend.create_vertex_array()?;
        log::trace!("GraphicsDevice: created vertex layout {:?}", id);
        Ok(VertexLayoutDescriptor::new(Rc::downgrade(self), id))
    }

    /// Create an empty program.
    pub fn create_program(self: &Rc<Self>) -> Result<Program, GraphicsError> {
        let id = self.backend.create_program()?;
        Ok(Program::new(Rc::downgrade(self), id))
    }

    /// The vertex array currently bound as vertex source.
    pub fn current_vertex_array(&self) -> Option<VertexArrayId> {
        self.current_vertex_array.get()
    }

    pub(crate) fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>) {
        if self.current_vertex_array.get() != vertex_array {
            self.backend.bind_vertex_array(vertex_array);
            self.current_vertex_array.set(vertex_array);
        }
    }

    /// The program currently in use.
    pub fn current_program(&self) -> Option<ProgramId> {
        self.current_program.get()
    }

    pub(crate) fn use_program(&self, program: Option<ProgramId>) {
        if self.current_program.get() != program {
            self.backend.use_program(program);
            self.current_program.set(program);
        }
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("features", &self.features)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferTarget;

    #[test]
    fn test_create_buffer() {
        let device = GraphicsDevice::headless();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferTarget::Vertex).with_label("test"))
            .unwrap();
        assert_eq!(buffer.size(), 1024);
        assert_eq!(buffer.label(), Some("test"));
    }

    #[test]
    fn test_buffer_size_limit() {
        let device = GraphicsDevice::new(
            Box::new(HeadlessBackend::new()),
            DeviceConfig::new().with_max_buffer_size(16),
        );
        assert!(matches!(
            device.create_buffer(&BufferDescriptor::new(17, BufferTarget::Vertex)),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let device = GraphicsDevice::new(
            Box::new(HeadlessBackend::new().with_memory_budget(8)),
            DeviceConfig::default(),
        );
        assert!(matches!(
            device.create_buffer(&BufferDescriptor::new(32, BufferTarget::Vertex)),
            Err(GraphicsError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn test_require_feature() {
        let device = GraphicsDevice::new(
            Box::new(HeadlessBackend::new().with_features(DeviceFeatures::empty())),
            DeviceConfig::default(),
        );
        assert!(device.require(DeviceFeatures::INSTANCING, "instancing").is_err());
        assert!(GraphicsDevice::headless()
            .require(DeviceFeatures::INSTANCING, "instancing")
            .is_ok());
    }
}
