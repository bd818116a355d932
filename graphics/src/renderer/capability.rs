//! Render capabilities: uniform state a renderer applies around each draw.

use std::any::Any;

use glam::Mat4;

use crate::program::Program;

/// A piece of per-draw state injected into the program.
///
/// Capabilities run in the order they were added to the
/// [`Renderer`](super::Renderer): every `pre_draw` before the draw, every
/// `post_draw` after it.
pub trait RenderCapability {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Called with the program current, before the draw.
    fn pre_draw(&mut self, program: &Program);

    /// Called after the draw.
    fn post_draw(&mut self, _program: &Program) {}

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// Capabilities only write uniforms the program declares.
fn set_if_declared(program: &Program, name: &str, value: Mat4) {
    if program.uniform(name).is_some() {
        program.set_uniform(name, value);
    }
}

/// View and projection matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCapability {
    pub view: Mat4,
    pub projection: Mat4,
}

impl CameraCapability {
    pub const VIEW_UNIFORM: &'static str = "view_matrix";
    pub const PROJECTION_UNIFORM: &'static str = "projection_matrix";

    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Right-handed perspective camera looking from `eye` at `target`.
    pub fn look_at(eye: glam::Vec3, target: glam::Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, glam::Vec3::Y),
            projection: Mat4::perspective_rh_gl(fov_y, aspect, near, far),
        }
    }
}

impl Default for CameraCapability {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

impl RenderCapability for CameraCapability {
    fn name(&self) -> &str {
        "camera"
    }

    fn pre_draw(&mut self, program: &Program) {
        set_if_declared(program, Self::VIEW_UNIFORM, self.view);
        set_if_declared(program, Self::PROJECTION_UNIFORM, self.projection);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A model matrix with a push/pop stack.
///
/// The stack never becomes empty; the bottom entry starts as identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTransform {
    stack: Vec<Mat4>,
}

impl ModelTransform {
    pub const MODEL_UNIFORM: &'static str = "model_matrix";

    pub fn new() -> Self {
        Self {
            stack: vec![Mat4::IDENTITY],
        }
    }

    /// The top of the stack.
    pub fn current(&self) -> Mat4 {
        self.stack.last().copied().unwrap_or(Mat4::IDENTITY)
    }

    fn top_mut(&mut self) -> &mut Mat4 {
        if self.stack.is_empty() {
            self.stack.push(Mat4::IDENTITY);
        }
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Duplicate the top entry.
    pub fn push(&mut self) {
        let top = self.current();
        self.stack.push(top);
    }

    /// Drop the top entry. Returns `false` if only the bottom entry is left.
    pub fn pop(&mut self) -> bool {
        if self.stack.len() <= 1 {
            log::warn!("ModelTransform: pop on an empty matrix stack");
            return false;
        }
        self.stack.pop();
        true
    }

    /// Post-multiply the top entry by `matrix`.
    pub fn mult(&mut self, matrix: Mat4) {
        let top = self.top_mut();
        *top *= matrix;
    }

    /// Replace the top entry.
    pub fn set(&mut self, matrix: Mat4) {
        *self.top_mut() = matrix;
    }

    pub fn load_identity(&mut self) {
        self.set(Mat4::IDENTITY);
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCapability for ModelTransform {
    fn name(&self) -> &str {
        "model transform"
    }

    fn pre_draw(&mut self, program: &Program) {
        set_if_declared(program, Self::MODEL_UNIFORM, self.current());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_matrix_stack() {
        let mut model = ModelTransform::new();
        let shift = Mat4::from_translation(Vec3::X);
        model.push();
        model.mult(shift);
        assert_eq!(model.current(), shift);
        assert_eq!(model.depth(), 2);
        assert!(model.pop());
        assert_eq!(model.current(), Mat4::IDENTITY);
        assert!(!model.pop());
        assert_eq!(model.depth(), 1);
    }

    #[test]
    fn test_mult_composes_right() {
        let mut model = ModelTransform::new();
        let shift = Mat4::from_translation(Vec3::X);
        let scale = Mat4::from_scale(Vec3::splat(2.0));
        model.mult(shift);
        model.mult(scale);
        assert_eq!(model.current().transform_point3(Vec3::ONE), Vec3::new(3.0, 2.0, 2.0));
    }
}
