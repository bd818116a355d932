//! OpenGL backend using `glow`.
//!
//! The backend drives a caller-provided [`glow::Context`] that must be current
//! on the calling thread for the backend's whole lifetime. GL objects are
//! kept in handle tables keyed by the backend's own integer ids.
//!
//! Buffer uploads and readbacks go through the copy targets so that writing
//! an index buffer never disturbs the element binding of the current vertex
//! array.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use glow::HasContext;
use redlilium_vertex_core::{ElementFormat, PrimitiveMode, ScalarType, UniformInfo, UniformType, UniformValue};

use crate::error::GraphicsError;
use crate::program::ShaderStage;
use crate::types::{BufferDescriptor, BufferUsageHint, DeviceFeatures};

use super::{AttributeInfo, AttributePointer, BufferId, DrawCall, GpuBackend, ProgramId, VertexArrayId};

type RawBuffer = <glow::Context as HasContext>::Buffer;
type RawVertexArray = <glow::Context as HasContext>::VertexArray;
type RawProgram = <glow::Context as HasContext>::Program;
type RawShader = <glow::Context as HasContext>::Shader;
type RawUniformLocation = <glow::Context as HasContext>::UniformLocation;

struct GlBuffer {
    raw: RawBuffer,
    size: usize,
}

struct GlProgram {
    raw: RawProgram,
    shaders: Vec<RawShader>,
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    buffers: HashMap<BufferId, GlBuffer>,
    vertex_arrays: HashMap<VertexArrayId, RawVertexArray>,
    programs: HashMap<ProgramId, GlProgram>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// How the context breaks primitives at the restart index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartMode {
    /// `PRIMITIVE_RESTART_FIXED_INDEX` (GL 4.3, ES 3.0): always the maximum index.
    FixedIndex,
    /// `PRIMITIVE_RESTART` plus `glPrimitiveRestartIndex` (desktop GL 3.1).
    Indexed,
}

/// Features and restart mode of a context version.
fn detect(major: u32, minor: u32, is_embedded: bool) -> (DeviceFeatures, Option<RestartMode>) {
    let at_least = |a: u32, b: u32| (major, minor) >= (a, b);

    let mut features = DeviceFeatures::empty();
    if (is_embedded && at_least(3, 0)) || (!is_embedded && at_least(3, 3)) {
        features |= DeviceFeatures::INSTANCING;
    }
    let restart = if is_embedded {
        at_least(3, 0).then_some(RestartMode::FixedIndex)
    } else if at_least(4, 3) {
        Some(RestartMode::FixedIndex)
    } else if at_least(3, 1) {
        Some(RestartMode::Indexed)
    } else {
        None
    };
    if restart.is_some() {
        features |= DeviceFeatures::PRIMITIVE_RESTART;
    }
    if !is_embedded {
        features |= DeviceFeatures::BUFFER_READBACK;
    }
    (features, restart)
}

/// OpenGL / OpenGL ES backend.
pub struct GlBackend {
    gl: glow::Context,
    features: DeviceFeatures,
    restart: Option<RestartMode>,
    tables: RefCell<Tables>,
    bound_vertex_array: Cell<Option<VertexArrayId>>,
}

impl GlBackend {
    /// Wrap a context that is current on this thread.
    pub fn new(gl: glow::Context) -> Self {
        let version = gl.version();
        let (features, restart) = detect(version.major, version.minor, version.is_embedded);
        log::info!(
            "GlBackend: GL {}.{}{} ({:?}, restart {:?})",
            version.major,
            version.minor,
            if version.is_embedded { " ES" } else { "" },
            features,
            restart
        );

        Self {
            gl,
            features,
            restart,
            tables: RefCell::new(Tables::default()),
            bound_vertex_array: Cell::new(None),
        }
    }

    /// The wrapped context.
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    fn raw_vertex_array(&self, id: VertexArrayId) -> Result<RawVertexArray, GraphicsError> {
        self.tables
            .borrow()
            .vertex_arrays
            .get(&id)
            .copied()
            .ok_or_else(|| id.invalid())
    }

    fn raw_buffer(&self, id: BufferId) -> Result<(RawBuffer, usize), GraphicsError> {
        self.tables
            .borrow()
            .buffers
            .get(&id)
            .map(|b| (b.raw, b.size))
            .ok_or_else(|| id.invalid())
    }

    /// Run `f` with `vertex_array` bound, then restore the current binding.
    fn with_vertex_array<R>(&self, vertex_array: VertexArrayId, f: impl FnOnce(&glow::Context) -> R) -> Result<R, GraphicsError> {
        let raw = self.raw_vertex_array(vertex_array)?;
        let previous = self.bound_vertex_array.get();
        unsafe { self.gl.bind_vertex_array(Some(raw)) };
        let result = f(&self.gl);
        if previous != Some(vertex_array) {
            let restore = previous.and_then(|id| self.raw_vertex_array(id).ok());
            unsafe { self.gl.bind_vertex_array(restore) };
        }
        Ok(result)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<RawUniformLocation> {
        let tables = self.tables.borrow();
        let raw = tables.programs.get(&program)?.raw;
        unsafe { self.gl.get_uniform_location(raw, name) }
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn convert_scalar(scalar: ScalarType) -> u32 {
    match scalar {
        ScalarType::F32 => glow::FLOAT,
        ScalarType::I8 => glow::BYTE,
        ScalarType::U8 => glow::UNSIGNED_BYTE,
        ScalarType::I16 => glow::SHORT,
        ScalarType::U16 => glow::UNSIGNED_SHORT,
        ScalarType::I32 => glow::INT,
        ScalarType::U32 => glow::UNSIGNED_INT,
    }
}

fn convert_mode(mode: PrimitiveMode) -> u32 {
    match mode {
        PrimitiveMode::Points => glow::POINTS,
        PrimitiveMode::Lines => glow::LINES,
        PrimitiveMode::LineStrip => glow::LINE_STRIP,
        PrimitiveMode::LineLoop => glow::LINE_LOOP,
        PrimitiveMode::Triangles => glow::TRIANGLES,
        PrimitiveMode::TriangleStrip => glow::TRIANGLE_STRIP,
        PrimitiveMode::TriangleFan => glow::TRIANGLE_FAN,
    }
}

fn convert_usage(usage: BufferUsageHint) -> u32 {
    match usage {
        BufferUsageHint::Static => glow::STATIC_DRAW,
        BufferUsageHint::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsageHint::Stream => glow::STREAM_DRAW,
    }
}

fn convert_stage(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        ShaderStage::Geometry => glow::GEOMETRY_SHADER,
    }
}

fn convert_uniform_type(gl_type: u32) -> Option<UniformType> {
    let ty = match gl_type {
        glow::FLOAT => UniformType::FLOAT,
        glow::FLOAT_VEC2 => UniformType::VEC2,
        glow::FLOAT_VEC3 => UniformType::VEC3,
        glow::FLOAT_VEC4 => UniformType::VEC4,
        glow::INT => UniformType::INT,
        glow::INT_VEC2 => UniformType::IVEC2,
        glow::INT_VEC3 => UniformType::IVEC3,
        glow::INT_VEC4 => UniformType::IVEC4,
        glow::UNSIGNED_INT => UniformType::UINT,
        glow::UNSIGNED_INT_VEC2 => UniformType::UVEC2,
        glow::UNSIGNED_INT_VEC3 => UniformType::UVEC3,
        glow::UNSIGNED_INT_VEC4 => UniformType::UVEC4,
        glow::BOOL => UniformType::BOOL,
        glow::FLOAT_MAT3 => UniformType::MAT3,
        glow::FLOAT_MAT4 => UniformType::MAT4,
        glow::SAMPLER_2D
        | glow::SAMPLER_3D
        | glow::SAMPLER_CUBE
        | glow::SAMPLER_2D_ARRAY
        | glow::SAMPLER_2D_SHADOW
        | glow::INT_SAMPLER_2D
        | glow::UNSIGNED_INT_SAMPLER_2D => UniformType::SAMPLER,
        _ => return None,
    };
    Some(ty)
}

fn gl_size(value: usize, what: &str) -> Result<i32, GraphicsError> {
    i32::try_from(value).map_err(|_| GraphicsError::InvalidParameter(format!("{what} {value} exceeds the GL range")))
}

// ============================================================================
// Backend Implementation
// ============================================================================

impl GpuBackend for GlBackend {
    fn name(&self) -> &'static str {
        "OpenGL Backend"
    }

    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError> {
        let size = gl_size(descriptor.size, "buffer size")?;
        let raw = unsafe {
            let raw = self.gl.create_buffer().map_err(GraphicsError::ResourceCreationFailed)?;
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(raw));
            self.gl
                .buffer_data_size(glow::COPY_WRITE_BUFFER, size, convert_usage(descriptor.usage));
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
            raw
        };
        if let Some(label) = &descriptor.label {
            log::trace!("GlBackend: created buffer {label} ({:?})", descriptor.target);
        }

        let mut tables = self.tables.borrow_mut();
        let id = BufferId::from_raw(tables.next_id());
        tables.buffers.insert(
            id,
            GlBuffer {
                raw,
                size: descriptor.size,
            },
        );
        Ok(id)
    }

    fn write_buffer(&self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), GraphicsError> {
        let (raw, size) = self.raw_buffer(buffer)?;
        let end = offset + data.len();
        if end > size {
            return Err(GraphicsError::OutOfBounds { offset, end, size });
        }
        let offset = gl_size(offset, "offset")?;
        unsafe {
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(raw));
            self.gl.buffer_sub_data_u8_slice(glow::COPY_WRITE_BUFFER, offset, data);
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferId, offset: usize, size: usize) -> Result<Vec<u8>, GraphicsError> {
        if !self.features.contains(DeviceFeatures::BUFFER_READBACK) {
            return Err(GraphicsError::FeatureNotSupported("buffer readback".to_string()));
        }
        let (raw, buffer_size) = self.raw_buffer(buffer)?;
        let end = offset + size;
        if end > buffer_size {
            return Err(GraphicsError::OutOfBounds {
                offset,
                end,
                size: buffer_size,
            });
        }
        let mut data = vec![0u8; size];
        let offset = gl_size(offset, "offset")?;
        unsafe {
            self.gl.bind_buffer(glow::COPY_READ_BUFFER, Some(raw));
            self.gl.get_buffer_sub_data(glow::COPY_READ_BUFFER, offset, &mut data);
            self.gl.bind_buffer(glow::COPY_READ_BUFFER, None);
        }
        Ok(data)
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        if let Some(removed) = self.tables.borrow_mut().buffers.remove(&buffer) {
            unsafe { self.gl.delete_buffer(removed.raw) };
        }
    }

    fn create_vertex_array(&self) -> Result<VertexArrayId, GraphicsError> {
        let raw = unsafe { self.gl.create_vertex_array() }.map_err(GraphicsError::ResourceCreationFailed)?;
        let mut tables = self.tables.borrow_mut();
        let id = VertexArrayId::from_raw(tables.next_id());
        tables.vertex_arrays.insert(id, raw);
        Ok(id)
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>) {
        let raw = vertex_array.and_then(|id| self.raw_vertex_array(id).ok());
        unsafe { self.gl.bind_vertex_array(raw) };
        self.bound_vertex_array.set(vertex_array.filter(|_| raw.is_some()));
    }

    fn set_attribute(
        &self,
        vertex_array: VertexArrayId,
        slot: u32,
        pointer: &AttributePointer,
    ) -> Result<(), GraphicsError> {
        if pointer.divisor > 0 && !self.features.contains(DeviceFeatures::INSTANCING) {
            return Err(GraphicsError::FeatureNotSupported(
                "instanced attribute divisors".to_string(),
            ));
        }
        let (raw_buffer, _) = self.raw_buffer(pointer.buffer)?;
        let format: ElementFormat = pointer.format;
        let components = i32::from(format.components);
        let data_type = convert_scalar(format.scalar);
        let stride = gl_size(pointer.stride, "stride")?;
        let offset = gl_size(pointer.offset, "offset")?;
        let instancing = self.features.contains(DeviceFeatures::INSTANCING);

        self.with_vertex_array(vertex_array, |gl| unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(raw_buffer));
            if format.reads_as_float() {
                gl.vertex_attrib_pointer_f32(slot, components, data_type, format.normalized, stride, offset);
            } else {
                gl.vertex_attrib_pointer_i32(slot, components, data_type, stride, offset);
            }
            if instancing {
                gl.vertex_attrib_divisor(slot, pointer.divisor);
            }
            gl.enable_vertex_attrib_array(slot);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        })
    }

    fn disable_attribute(&self, vertex_array: VertexArrayId, slot: u32) -> Result<(), GraphicsError> {
        self.with_vertex_array(vertex_array, |gl| unsafe { gl.disable_vertex_attrib_array(slot) })
    }

    fn set_index_buffer(&self, vertex_array: VertexArrayId, buffer: BufferId) -> Result<(), GraphicsError> {
        let (raw_buffer, _) = self.raw_buffer(buffer)?;
        self.with_vertex_array(vertex_array, |gl| unsafe {
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(raw_buffer));
        })
    }

    fn destroy_vertex_array(&self, vertex_array: VertexArrayId) {
        if let Some(raw) = self.tables.borrow_mut().vertex_arrays.remove(&vertex_array) {
            if self.bound_vertex_array.get() == Some(vertex_array) {
                self.bound_vertex_array.set(None);
            }
            unsafe { self.gl.delete_vertex_array(raw) };
        }
    }

    fn draw_indexed(&self, vertex_array: VertexArrayId, call: &DrawCall) -> Result<(), GraphicsError> {
        if call.instance_count != 1 && !self.features.contains(DeviceFeatures::INSTANCING) {
            return Err(GraphicsError::FeatureNotSupported("instanced draws".to_string()));
        }
        let restart = match (call.restart_index, self.restart) {
            (None, _) => None,
            (Some(_), None) => {
                return Err(GraphicsError::FeatureNotSupported("primitive restart".to_string()));
            }
            (Some(index), Some(RestartMode::FixedIndex)) if index != u32::MAX => {
                return Err(GraphicsError::FeatureNotSupported(format!(
                    "restart index {index:#x} with fixed-index restart"
                )));
            }
            (Some(index), Some(mode)) => Some((index, mode)),
        };
        let count = gl_size(call.index_count, "index count")?;
        let instances = gl_size(call.instance_count as usize, "instance count")?;
        let mode = convert_mode(call.mode);
        let instanced = call.instance_count != 1;

        self.with_vertex_array(vertex_array, |gl| unsafe {
            match restart {
                Some((_, RestartMode::FixedIndex)) => gl.enable(glow::PRIMITIVE_RESTART_FIXED_INDEX),
                Some((index, RestartMode::Indexed)) => {
                    gl.enable(glow::PRIMITIVE_RESTART);
                    gl.primitive_restart_index(index);
                }
                None => {}
            }
            if instanced {
                gl.draw_elements_instanced(mode, count, glow::UNSIGNED_INT, 0, instances);
            } else {
                gl.draw_elements(mode, count, glow::UNSIGNED_INT, 0);
            }
            match restart {
                Some((_, RestartMode::FixedIndex)) => gl.disable(glow::PRIMITIVE_RESTART_FIXED_INDEX),
                Some((_, RestartMode::Indexed)) => gl.disable(glow::PRIMITIVE_RESTART),
                None => {}
            }
        })
    }

    fn create_program(&self) -> Result<ProgramId, GraphicsError> {
        let raw = unsafe { self.gl.create_program() }.map_err(GraphicsError::ResourceCreationFailed)?;
        let mut tables = self.tables.borrow_mut();
        let id = ProgramId::from_raw(tables.next_id());
        tables.programs.insert(
            id,
            GlProgram {
                raw,
                shaders: Vec::new(),
            },
        );
        Ok(id)
    }

    fn attach_shader(&self, program: ProgramId, stage: ShaderStage, source: &str) -> Result<(), String> {
        let mut tables = self.tables.borrow_mut();
        let target = tables
            .programs
            .get_mut(&program)
            .ok_or_else(|| program.invalid().to_string())?;

        unsafe {
            let shader = self.gl.create_shader(convert_stage(stage))?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(log);
            }
            self.gl.attach_shader(target.raw, shader);
            target.shaders.push(shader);
        }
        Ok(())
    }

    fn bind_attribute_location(&self, program: ProgramId, slot: u32, name: &str) {
        if let Some(target) = self.tables.borrow().programs.get(&program) {
            unsafe { self.gl.bind_attrib_location(target.raw, slot, name) };
        }
    }

    fn link_program(&self, program: ProgramId) -> Result<(), String> {
        let tables = self.tables.borrow();
        let target = tables
            .programs
            .get(&program)
            .ok_or_else(|| program.invalid().to_string())?;
        unsafe {
            self.gl.link_program(target.raw);
            if self.gl.get_program_link_status(target.raw) {
                Ok(())
            } else {
                Err(self.gl.get_program_info_log(target.raw))
            }
        }
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<AttributeInfo> {
        let tables = self.tables.borrow();
        let Some(target) = tables.programs.get(&program) else {
            return Vec::new();
        };
        unsafe {
            let count = self.gl.get_active_attributes(target.raw);
            (0..count)
                .filter_map(|index| self.gl.get_active_attribute(target.raw, index))
                .filter_map(|active| {
                    let location = self.gl.get_attrib_location(target.raw, &active.name)?;
                    Some(AttributeInfo {
                        name: active.name,
                        location,
                    })
                })
                .collect()
        }
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<UniformInfo> {
        let tables = self.tables.borrow();
        let Some(target) = tables.programs.get(&program) else {
            return Vec::new();
        };
        unsafe {
            let count = self.gl.get_active_uniforms(target.raw);
            (0..count)
                .filter_map(|index| self.gl.get_active_uniform(target.raw, index))
                .filter_map(|active| {
                    let Some(ty) = convert_uniform_type(active.utype) else {
                        log::warn!("GlBackend: skipping uniform '{}' of unsupported type {:#x}", active.name, active.utype);
                        return None;
                    };
                    Some(UniformInfo {
                        name: active.name.trim_end_matches("[0]").to_string(),
                        ty,
                        array_len: active.size.max(1) as usize,
                    })
                })
                .collect()
        }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        let raw = program.and_then(|id| self.tables.borrow().programs.get(&id).map(|p| p.raw));
        unsafe { self.gl.use_program(raw) };
    }

    fn set_uniform(&self, program: ProgramId, name: &str, value: &UniformValue) {
        let Some(location) = self.uniform_location(program, name) else {
            return;
        };
        let location = Some(&location);
        let gl = &self.gl;
        // SAFETY: the program owning `location` is current; `Program` binds it before setting uniforms.
        unsafe {
            match value {
                UniformValue::Float(v) => gl.uniform_1_f32(location, *v),
                UniformValue::Vec2(v) => gl.uniform_2_f32(location, v.x, v.y),
                UniformValue::Vec3(v) => gl.uniform_3_f32(location, v.x, v.y, v.z),
                UniformValue::Vec4(v) => gl.uniform_4_f32(location, v.x, v.y, v.z, v.w),
                UniformValue::Int(v) => gl.uniform_1_i32(location, *v),
                UniformValue::IVec2(v) => gl.uniform_2_i32(location, v.x, v.y),
                UniformValue::IVec3(v) => gl.uniform_3_i32(location, v.x, v.y, v.z),
                UniformValue::IVec4(v) => gl.uniform_4_i32(location, v.x, v.y, v.z, v.w),
                UniformValue::UInt(v) => gl.uniform_1_u32(location, *v),
                UniformValue::UVec2(v) => gl.uniform_2_u32(location, v.x, v.y),
                UniformValue::UVec3(v) => gl.uniform_3_u32(location, v.x, v.y, v.z),
                UniformValue::UVec4(v) => gl.uniform_4_u32(location, v.x, v.y, v.z, v.w),
                UniformValue::Mat3(m) => gl.uniform_matrix_3_f32_slice(location, false, &m.to_cols_array()),
                UniformValue::Mat4(m) => gl.uniform_matrix_4_f32_slice(location, false, &m.to_cols_array()),
                UniformValue::FloatArray { components, values } => match components {
                    1 => gl.uniform_1_f32_slice(location, values),
                    2 => gl.uniform_2_f32_slice(location, values),
                    3 => gl.uniform_3_f32_slice(location, values),
                    _ => gl.uniform_4_f32_slice(location, values),
                },
            }
        }
    }

    fn detach_shaders(&self, program: ProgramId) {
        if let Some(target) = self.tables.borrow_mut().programs.get_mut(&program) {
            for shader in target.shaders.drain(..) {
                unsafe {
                    self.gl.detach_shader(target.raw, shader);
                    self.gl.delete_shader(shader);
                }
            }
        }
    }

    fn destroy_program(&self, program: ProgramId) {
        if let Some(removed) = self.tables.borrow_mut().programs.remove(&program) {
            unsafe {
                for shader in removed.shaders {
                    self.gl.delete_shader(shader);
                }
                self.gl.delete_program(removed.raw);
            }
        }
    }
}
