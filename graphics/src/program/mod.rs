//! Shader programs.
//!
//! A [`Program`] is the boundary between the vertex pipeline and the shader
//! subsystem. The vertex side depends on exactly one thing from it: before
//! linking, every non-null channel's slot is bound to the channel's name, so
//! slot numbers are declared once per channel and never repeated at call
//! sites. The rest (compile, link, reflection, uniforms) is kept small.
//!
//! Uniform setters validate the value against the reflected declaration.
//! A mismatch is logged and the value is dropped; it never fails a frame.

use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use redlilium_vertex_core::{ChannelDescriptor, UniformInfo, UniformValue};

use crate::backend::{AttributeInfo, ProgramId};
use crate::device::GraphicsDevice;
use crate::vertex::{AttributeSet, GeometryBuffer, InstanceStream};

/// Shader stage of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Geometry shader.
    Geometry,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
        })
    }
}

/// Compile and link failures, carrying the driver diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("program failed to link: {log}")]
    Link { log: String },

    #[error("graphics device was dropped")]
    DeviceLost,
}

/// A shader program.
///
/// # Example
///
/// ```
/// use redlilium_vertex::{ChannelDescriptor, GraphicsDevice, ShaderStage};
///
/// let device = GraphicsDevice::headless();
/// let mut program = device.create_program()?;
/// program.attach(ShaderStage::Vertex, "in vec3 position; uniform float scale; void main() {}")?;
/// program.attach(ShaderStage::Fragment, "out vec4 color; void main() {}")?;
/// program.bind_channel(&ChannelDescriptor::position());
/// program.link()?;
///
/// assert!(program.set_uniform("scale", 2.0f32));
/// assert!(!program.set_uniform("scale", 2i32));
/// # Ok::<(), redlilium_vertex::GraphicsError>(())
/// ```
pub struct Program {
    device: Weak<GraphicsDevice>,
    id: ProgramId,
    stages: Vec<ShaderStage>,
    linked: bool,
    attributes: Vec<AttributeInfo>,
    uniforms: HashMap<String, UniformInfo>,
}

impl Program {
    pub(crate) fn new(device: Weak<GraphicsDevice>, id: ProgramId) -> Self {
        Self {
            device,
            id,
            stages: Vec::new(),
            linked: false,
            attributes: Vec::new(),
            uniforms: HashMap::new(),
        }
    }

    fn device(&self) -> Result<Rc<GraphicsDevice>, ShaderError> {
        self.device.upgrade().ok_or(ShaderError::DeviceLost)
    }

    /// Backend handle.
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Compile `source` as `stage` and attach it.
    pub fn attach(&mut self, stage: ShaderStage, source: &str) -> Result<(), ShaderError> {
        let device = self.device()?;
        device
            .backend()
            .attach_shader(self.id, stage, source)
            .map_err(|log| ShaderError::Compile { stage, log })?;
        self.stages.push(stage);
        Ok(())
    }

    /// Bind the channel's slot to its name. Null channels bind nothing.
    ///
    /// Takes effect on the next [`link`](Self::link).
    pub fn bind_channel(&self, channel: &ChannelDescriptor) {
        if channel.is_null() {
            return;
        }
        if self.linked {
            log::warn!(
                "Program {:?}: binding '{}' to slot {} after link, relink to apply",
                self.id,
                channel.name,
                channel.slot
            );
        }
        if let Some(device) = self.device.upgrade() {
            device.backend().bind_attribute_location(self.id, channel.slot, &channel.name);
        }
    }

    /// Bind every channel in order.
    pub fn bind_channels<'a>(&self, channels: impl IntoIterator<Item = &'a ChannelDescriptor>) {
        for channel in channels {
            self.bind_channel(channel);
        }
    }

    /// Bind every channel of an attribute set.
    pub fn bind_attribute_set(&self, attributes: &AttributeSet) {
        self.bind_channels(attributes.record().channels().iter().map(|c| c.descriptor()));
    }

    /// Bind every channel of a geometry buffer, position included.
    pub fn bind_geometry(&self, geometry: &GeometryBuffer) {
        self.bind_attribute_set(geometry.attributes());
    }

    /// Bind every channel of an instance stream.
    pub fn bind_instance_stream(&self, stream: &InstanceStream) {
        self.bind_attribute_set(stream.attributes());
    }

    /// Link attached stages and reflect active attributes and uniforms.
    ///
    /// On failure the program stays unlinked and reflection is empty.
    pub fn link(&mut self) -> Result<(), ShaderError> {
        let device = self.device()?;
        self.linked = false;
        self.attributes.clear();
        self.uniforms.clear();

        device
            .backend()
            .link_program(self.id)
            .map_err(|log| ShaderError::Link { log })?;

        self.attributes = device.backend().active_attributes(self.id);
        self.uniforms = device
            .backend()
            .active_uniforms(self.id)
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();
        self.linked = true;
        log::debug!(
            "Program {:?}: linked with {} attributes and {} uniforms",
            self.id,
            self.attributes.len(),
            self.uniforms.len()
        );
        Ok(())
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Make this program current. Returns `false` if it is not linked.
    pub fn use_program(&self) -> bool {
        if !self.linked {
            log::error!("Program {:?}: cannot use an unlinked program", self.id);
            return false;
        }
        match self.device.upgrade() {
            Some(device) => {
                device.use_program(Some(self.id));
                true
            }
            None => false,
        }
    }

    /// Stop using this program if it is current.
    pub fn release(&self) {
        if let Some(device) = self.device.upgrade() {
            if device.current_program() == Some(self.id) {
                device.use_program(None);
            }
        }
    }

    pub fn is_current(&self) -> bool {
        self.device
            .upgrade()
            .is_some_and(|device| device.current_program() == Some(self.id))
    }

    /// Set a uniform by name.
    ///
    /// The value must match the declared type (and fit the declared array
    /// length). On mismatch, an unknown name or an unlinked program the error
    /// is logged, nothing reaches the GPU and `false` is returned.
    ///
    /// The current program is the same before and after the call.
    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) -> bool {
        let value = value.into();
        if !self.linked {
            log::error!("Program {:?}: uniform '{}' set before link", self.id, name);
            return false;
        }
        let Some(info) = self.uniforms.get(name) else {
            log::error!("Program {:?}: no active uniform named '{}'", self.id, name);
            return false;
        };
        if let Err(mismatch) = info.accepts(&value) {
            log::error!("Program {:?}: {}", self.id, mismatch);
            return false;
        }
        let Some(device) = self.device.upgrade() else {
            return false;
        };
        // Uniform writes go to the current program; restore the caller's afterwards.
        let previous = device.current_program();
        device.use_program(Some(self.id));
        device.backend().set_uniform(self.id, name, &value);
        device.use_program(previous);
        true
    }

    /// Active uniforms by name.
    pub fn uniforms(&self) -> &HashMap<String, UniformInfo> {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.get(name)
    }

    /// Active vertex inputs.
    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    /// Slot of the active vertex input `name`.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes.iter().find(|a| a.name == name).map(|a| a.location)
    }

    /// Log the reflected interface.
    pub fn dump_info(&self) {
        log::info!(
            "Program {:?} ({}): stages {:?}",
            self.id,
            if self.linked { "linked" } else { "not linked" },
            self.stages
        );
        let mut attributes: Vec<_> = self.attributes.iter().collect();
        attributes.sort_by_key(|a| a.location);
        for attribute in attributes {
            log::info!("  attribute {} -> slot {}", attribute.name, attribute.location);
        }
        let mut uniforms: Vec<_> = self.uniforms.values().collect();
        uniforms.sort_by(|a, b| a.name.cmp(&b.name));
        for uniform in uniforms {
            if uniform.array_len > 1 {
                log::info!("  uniform {} {}[{}]", uniform.ty, uniform.name, uniform.array_len);
            } else {
                log::info!("  uniform {} {}", uniform.ty, uniform.name);
            }
        }
    }

    /// Detach every stage and forget the link.
    pub fn reset(&mut self) {
        self.release();
        if let Some(device) = self.device.upgrade() {
            device.backend().detach_shaders(self.id);
        }
        self.stages.clear();
        self.linked = false;
        self.attributes.clear();
        self.uniforms.clear();
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            if device.current_program() == Some(self.id) {
                device.use_program(None);
            }
            device.backend().destroy_program(self.id);
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.id)
            .field("stages", &self.stages)
            .field("linked", &self.linked)
            .finish()
    }
}
