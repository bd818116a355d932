//! Renderer: a program plus an ordered list of render capabilities.

mod capability;

pub use capability::{CameraCapability, ModelTransform, RenderCapability};

use crate::error::GraphicsError;
use crate::program::Program;
use crate::vertex::GeometryBuffer;

/// Anything the renderer can draw.
pub trait Drawable {
    /// Issue the draw for `instances` instances with the current program.
    fn draw_instanced(&self, instances: u32) -> Result<(), GraphicsError>;
}

impl Drawable for GeometryBuffer {
    fn draw_instanced(&self, instances: u32) -> Result<(), GraphicsError> {
        GeometryBuffer::draw_instanced(self, instances)
    }
}

/// Draws with one program, wrapping each draw in its capabilities.
///
/// # Example
///
/// ```
/// use glam::{Mat4, Vec3};
/// use redlilium_vertex::{
///     CameraCapability, GeometryBuffer, GraphicsDevice, ModelTransform, PrimitiveMode, Renderer, ShaderStage,
/// };
///
/// let device = GraphicsDevice::headless();
/// let mut program = device.create_program()?;
/// program.attach(
///     ShaderStage::Vertex,
///     "in vec3 position; uniform mat4 model_matrix; uniform mat4 view_matrix; void main() {}",
/// )?;
/// program.attach(ShaderStage::Fragment, "out vec4 color; void main() {}")?;
/// program.link()?;
///
/// let mut renderer = Renderer::new(program);
/// renderer.add_capability(CameraCapability::default());
/// renderer.add_capability(ModelTransform::new());
///
/// let mut triangle = GeometryBuffer::new(&device)?;
/// triangle.begin(PrimitiveMode::Triangles)?;
/// triangle.vertex(Vec3::ZERO)?;
/// triangle.vertex(Vec3::X)?;
/// triangle.vertex(Vec3::Y)?;
/// triangle.end()?;
///
/// if let Some(model) = renderer.capability_mut::<ModelTransform>() {
///     model.set(Mat4::from_translation(Vec3::Z));
/// }
/// renderer.draw(&triangle, 1)?;
/// # Ok::<(), redlilium_vertex::GraphicsError>(())
/// ```
pub struct Renderer {
    program: Program,
    capabilities: Vec<Box<dyn RenderCapability>>,
}

impl Renderer {
    /// Create a renderer around a linked program.
    pub fn new(program: Program) -> Self {
        Self {
            program,
            capabilities: Vec::new(),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    /// Append a capability. Capabilities run in insertion order.
    pub fn add_capability<C: RenderCapability + 'static>(&mut self, capability: C) -> &mut Self {
        self.capabilities.push(Box::new(capability));
        self
    }

    /// The first capability of type `C`.
    pub fn capability<C: RenderCapability + 'static>(&self) -> Option<&C> {
        self.capabilities.iter().find_map(|c| c.as_any().downcast_ref::<C>())
    }

    /// The first capability of type `C`, mutably.
    pub fn capability_mut<C: RenderCapability + 'static>(&mut self) -> Option<&mut C> {
        self.capabilities
            .iter_mut()
            .find_map(|c| c.as_any_mut().downcast_mut::<C>())
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &dyn RenderCapability> {
        self.capabilities.iter().map(|c| c.as_ref())
    }

    /// Use the program, run every `pre_draw`, draw, run every `post_draw`.
    ///
    /// `post_draw` runs even when the draw fails; the draw error is returned.
    pub fn draw(&mut self, drawable: &dyn Drawable, instances: u32) -> Result<(), GraphicsError> {
        if !self.program.use_program() {
            return Err(GraphicsError::InvalidParameter(format!(
                "program {:?} is not linked",
                self.program.id()
            )));
        }
        for capability in &mut self.capabilities {
            capability.pre_draw(&self.program);
        }
        let result = drawable.draw_instanced(instances);
        if let Err(err) = &result {
            log::warn!("Renderer: draw failed: {}", err);
        }
        for capability in &mut self.capabilities {
            capability.post_draw(&self.program);
        }
        result
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("program", &self.program)
            .field(
                "capabilities",
                &self.capabilities.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
