//! Headless GPU backend.
//!
//! This backend runs the vertex pipeline on the CPU. Buffers are byte
//! vectors, vertex arrays are attribute tables, and every draw is executed:
//! indices are assembled into primitives and each attribute read the shader
//! stage would perform is carried out with the bound offset, stride and
//! divisor, then decoded the way the shader would see it. The result is kept
//! as a [`DrawRecord`] for inspection.
//!
//! Shader sources are not compiled. They are scanned for `in` / `attribute`
//! and `uniform` declarations so that linking and reflection behave like a
//! driver would.
//!
//! Cloning a `HeadlessBackend` yields another view of the same state, so a
//! test can keep a clone while the device owns the original.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use redlilium_vertex_core::{Primitive, PrimitiveMode, UniformInfo, UniformType, UniformValue};

use crate::error::GraphicsError;
use crate::program::ShaderStage;
use crate::types::{BufferDescriptor, BufferTarget, DeviceFeatures};

use super::{AttributeInfo, AttributePointer, BufferId, DrawCall, GpuBackend, ProgramId, VertexArrayId};

// ============================================================================
// Draw Records
// ============================================================================

/// Everything one executed draw produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    /// Vertex array the draw read from.
    pub vertex_array: VertexArrayId,
    /// Program current at draw time.
    pub program: Option<ProgramId>,
    /// Primitive mode.
    pub mode: PrimitiveMode,
    /// Indices consumed.
    pub index_count: usize,
    /// Instances drawn.
    pub instance_count: u32,
    /// Whether primitive restart was enabled.
    pub restart: bool,
    /// Assembled primitives, once per instance.
    pub primitives: Vec<Primitive>,
    /// Per-vertex attribute values: vertex index, then slot.
    pub vertices: BTreeMap<u32, BTreeMap<u32, Vec<f32>>>,
    /// Per-instance attribute values: instance, then slot.
    pub instances: Vec<BTreeMap<u32, Vec<f32>>>,
    /// Uniform values of the current program at draw time.
    pub uniforms: HashMap<String, UniformValue>,
}

impl DrawRecord {
    /// Value read for `slot` when processing vertex `vertex`.
    pub fn vertex_attribute(&self, vertex: u32, slot: u32) -> Option<&[f32]> {
        self.vertices.get(&vertex)?.get(&slot).map(Vec::as_slice)
    }

    /// Value read for instanced `slot` when processing instance `instance`.
    pub fn instance_attribute(&self, instance: u32, slot: u32) -> Option<&[f32]> {
        self.instances.get(instance as usize)?.get(&slot).map(Vec::as_slice)
    }

    /// Number of triangles emitted for one instance.
    pub fn triangle_count(&self) -> usize {
        self.primitives
            .iter()
            .filter(|p| matches!(p, Primitive::Triangle(_)))
            .count()
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug)]
struct HeadlessBuffer {
    target: BufferTarget,
    label: Option<String>,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct HeadlessVertexArray {
    attributes: BTreeMap<u32, AttributePointer>,
    index_buffer: Option<BufferId>,
}

#[derive(Debug, Clone)]
struct Declaration {
    name: String,
    type_name: String,
    location: Option<u32>,
    array_len: usize,
}

#[derive(Debug, Default)]
struct HeadlessProgram {
    shaders: Vec<(ShaderStage, Vec<Declaration>, Vec<Declaration>)>,
    bound_locations: BTreeMap<String, u32>,
    linked: bool,
    attributes: Vec<AttributeInfo>,
    uniforms: Vec<UniformInfo>,
    values: HashMap<String, UniformValue>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    buffers: HashMap<BufferId, HeadlessBuffer>,
    vertex_arrays: HashMap<VertexArrayId, HeadlessVertexArray>,
    programs: HashMap<ProgramId, HeadlessProgram>,
    bound_vertex_array: Option<VertexArrayId>,
    current_program: Option<ProgramId>,
    allocated: usize,
    draws: Vec<DrawRecord>,
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn buffer(&self, id: BufferId) -> Result<&HeadlessBuffer, GraphicsError> {
        self.buffers.get(&id).ok_or_else(|| id.invalid())
    }

    fn vertex_array_mut(&mut self, id: VertexArrayId) -> Result<&mut HeadlessVertexArray, GraphicsError> {
        self.vertex_arrays.get_mut(&id).ok_or_else(|| id.invalid())
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Headless GPU backend.
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
    features: DeviceFeatures,
    memory_budget: Option<usize>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// Create a headless backend with every feature and no memory limit.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HeadlessState::default())),
            features: DeviceFeatures::all(),
            memory_budget: None,
        }
    }

    /// Restrict the features the backend reports.
    pub fn with_features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Fail allocations once `bytes` are live.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// All draws executed so far.
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    /// The most recent draw.
    pub fn last_draw(&self) -> Option<DrawRecord> {
        self.state.borrow().draws.last().cloned()
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Bytes held by live buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.state.borrow().allocated
    }

    /// Current contents of a buffer.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer).map(|b| b.data.clone())
    }

    /// Number of live vertex arrays.
    pub fn vertex_array_count(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    /// Enabled attribute rows of a vertex array, by slot.
    pub fn attributes(&self, vertex_array: VertexArrayId) -> BTreeMap<u32, AttributePointer> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array)
            .map(|vao| vao.attributes.clone())
            .unwrap_or_default()
    }

    /// The current vertex array.
    pub fn bound_vertex_array(&self) -> Option<VertexArrayId> {
        self.state.borrow().bound_vertex_array
    }

    /// The current program.
    pub fn current_program(&self) -> Option<ProgramId> {
        self.state.borrow().current_program
    }

    /// Last value written to a uniform.
    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.values.get(name).cloned())
    }

    /// Number of live program objects.
    pub fn program_count(&self) -> usize {
        self.state.borrow().programs.len()
    }

    fn fetch(
        buffers: &HashMap<BufferId, HeadlessBuffer>,
        slot: u32,
        pointer: &AttributePointer,
        element: usize,
    ) -> Result<Vec<f32>, GraphicsError> {
        let buffer = buffers.get(&pointer.buffer).ok_or_else(|| pointer.buffer.invalid())?;
        let size = pointer.format.byte_size();
        let start = pointer.offset + element * pointer.stride;
        let end = start + size;
        if end > buffer.data.len() {
            return Err(GraphicsError::DrawFailed(format!(
                "attribute slot {slot} reads {start}..{end} past the end of a {}-byte buffer",
                buffer.data.len()
            )));
        }
        Ok(pointer.format.decode(&buffer.data[start..end]))
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless Backend"
    }

    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError> {
        let mut state = self.state.borrow_mut();
        if let Some(budget) = self.memory_budget {
            let available = budget.saturating_sub(state.allocated);
            if descriptor.size > available {
                return Err(GraphicsError::OutOfMemory {
                    requested: descriptor.size,
                    available,
                });
            }
        }

        let id = BufferId::from_raw(state.next_id());
        log::trace!(
            "HeadlessBackend: creating buffer {:?} {:?} ({:?}, {} bytes)",
            id,
            descriptor.label,
            descriptor.target,
            descriptor.size
        );
        state.allocated += descriptor.size;
        state.buffers.insert(
            id,
            HeadlessBuffer {
                target: descriptor.target,
                label: descriptor.label.clone(),
                data: vec![0; descriptor.size],
            },
        );
        Ok(id)
    }

    fn write_buffer(&self, buffer: BufferId, offset: usize, data: &[u8]) -> Result<(), GraphicsError> {
        let mut state = self.state.borrow_mut();
        let target = state.buffers.get_mut(&buffer).ok_or_else(|| buffer.invalid())?;
        let end = offset + data.len();
        if end > target.data.len() {
            return Err(GraphicsError::OutOfBounds {
                offset,
                end,
                size: target.data.len(),
            });
        }
        log::trace!("HeadlessBackend: writing {} bytes at {} to {:?}", data.len(), offset, buffer);
        target.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferId, offset: usize, size: usize) -> Result<Vec<u8>, GraphicsError> {
        let state = self.state.borrow();
        let source = state.buffer(buffer)?;
        let end = offset + size;
        if end > source.data.len() {
            return Err(GraphicsError::OutOfBounds {
                offset,
                end,
                size: source.data.len(),
            });
        }
        Ok(source.data[offset..end].to_vec())
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        let mut state = self.state.borrow_mut();
        if let Some(removed) = state.buffers.remove(&buffer) {
            log::trace!("HeadlessBackend: destroying buffer {:?} {:?}", buffer, removed.label);
            state.allocated -= removed.data.len();
        }
    }

    fn create_vertex_array(&self) -> Result<VertexArrayId, GraphicsError> {
        let mut state = self.state.borrow_mut();
        let id = VertexArrayId::from_raw(state.next_id());
        log::trace!("HeadlessBackend: creating vertex array {:?}", id);
        state.vertex_arrays.insert(id, HeadlessVertexArray::default());
        Ok(id)
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>) {
        self.state.borrow_mut().bound_vertex_array = vertex_array;
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
        let mut state = self.state.borrow_mut();
        state.buffer(pointer.buffer)?;
        log::trace!(
            "HeadlessBackend: {:?} slot {} <- {:?} {} offset {} stride {} divisor {}",
            vertex_array,
            slot,
            pointer.buffer,
            pointer.format,
            pointer.offset,
            pointer.stride,
            pointer.divisor
        );
        state.vertex_array_mut(vertex_array)?.attributes.insert(slot, *pointer);
        Ok(())
    }

    fn disable_attribute(&self, vertex_array: VertexArrayId, slot: u32) -> Result<(), GraphicsError> {
        let mut state = self.state.borrow_mut();
        state.vertex_array_mut(vertex_array)?.attributes.remove(&slot);
        Ok(())
    }

    fn set_index_buffer(&self, vertex_array: VertexArrayId, buffer: BufferId) -> Result<(), GraphicsError> {
        let mut state = self.state.borrow_mut();
        if state.buffer(buffer)?.target != BufferTarget::Index {
            return Err(GraphicsError::InvalidParameter(format!(
                "{buffer:?} is not an index buffer"
            )));
        }
        state.vertex_array_mut(vertex_array)?.index_buffer = Some(buffer);
        Ok(())
    }

    fn destroy_vertex_array(&self, vertex_array: VertexArrayId) {
        let mut state = self.state.borrow_mut();
        log::trace!("HeadlessBackend: destroying vertex array {:?}", vertex_array);
        state.vertex_arrays.remove(&vertex_array);
        if state.bound_vertex_array == Some(vertex_array) {
            state.bound_vertex_array = None;
        }
    }

    fn draw_indexed(&self, vertex_array: VertexArrayId, call: &DrawCall) -> Result<(), GraphicsError> {
        if call.instance_count != 1 && !self.features.contains(DeviceFeatures::INSTANCING) {
            return Err(GraphicsError::FeatureNotSupported("instanced draws".to_string()));
        }
        if call.restart_index.is_some() && !self.features.contains(DeviceFeatures::PRIMITIVE_RESTART) {
            return Err(GraphicsError::FeatureNotSupported("primitive restart".to_string()));
        }

        let mut state = self.state.borrow_mut();
        let vao = state.vertex_arrays.get(&vertex_array).ok_or_else(|| vertex_array.invalid())?;
        let index_buffer = vao
            .index_buffer
            .ok_or_else(|| GraphicsError::DrawFailed("no index buffer attached".to_string()))?;
        let index_bytes = &state.buffer(index_buffer)?.data;
        let needed = call.index_count * std::mem::size_of::<u32>();
        if needed > index_bytes.len() {
            return Err(GraphicsError::DrawFailed(format!(
                "{} indices need {needed} bytes, index buffer holds {}",
                call.index_count,
                index_bytes.len()
            )));
        }
        let indices: Vec<u32> = index_bytes[..needed]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let restart = call.restart_index;
        let primitives = match restart {
            Some(sentinel) if sentinel != redlilium_vertex_core::RESTART_INDEX => {
                return Err(GraphicsError::InvalidParameter(format!(
                    "unsupported restart index {sentinel:#x}"
                )));
            }
            Some(_) => call.mode.assemble(&indices, true),
            None => call.mode.assemble(&indices, false),
        };

        let mut vertices: BTreeMap<u32, BTreeMap<u32, Vec<f32>>> = BTreeMap::new();
        if call.instance_count > 0 {
            for &index in &indices {
                if restart == Some(index) || vertices.contains_key(&index) {
                    continue;
                }
                let mut row = BTreeMap::new();
                for (&slot, pointer) in vao.attributes.iter().filter(|(_, p)| p.divisor == 0) {
                    row.insert(slot, Self::fetch(&state.buffers, slot, pointer, index as usize)?);
                }
                vertices.insert(index, row);
            }
        }

        let mut instances = Vec::with_capacity(call.instance_count as usize);
        for instance in 0..call.instance_count {
            let mut row = BTreeMap::new();
            for (&slot, pointer) in vao.attributes.iter().filter(|(_, p)| p.divisor > 0) {
                let element = (instance / pointer.divisor) as usize;
                row.insert(slot, Self::fetch(&state.buffers, slot, pointer, element)?);
            }
            instances.push(row);
        }

        let program = state.current_program;
        let uniforms = program
            .and_then(|p| state.programs.get(&p))
            .map(|p| p.values.clone())
            .unwrap_or_default();

        log::trace!(
            "HeadlessBackend: draw {:?} {:?} x{} -> {} primitives",
            vertex_array,
            call.mode,
            call.instance_count,
            primitives.len()
        );

        state.draws.push(DrawRecord {
            vertex_array,
            program,
            mode: call.mode,
            index_count: call.index_count,
            instance_count: call.instance_count,
            restart: restart.is_some(),
            primitives,
            vertices,
            instances,
            uniforms,
        });
        Ok(())
    }

    fn create_program(&self) -> Result<ProgramId, GraphicsError> {
        let mut state = self.state.borrow_mut();
        let id = ProgramId::from_raw(state.next_id());
        log::trace!("HeadlessBackend: creating program {:?}", id);
        state.programs.insert(id, HeadlessProgram::default());
        Ok(id)
    }

    fn attach_shader(&self, program: ProgramId, stage: ShaderStage, source: &str) -> Result<(), String> {
        validate_source(source, stage)?;
        let (inputs, uniforms) = scan_declarations(source, stage)?;

        let mut state = self.state.borrow_mut();
        let target = state
            .programs
            .get_mut(&program)
            .ok_or_else(|| program.invalid().to_string())?;
        target.shaders.push((stage, inputs, uniforms));
        Ok(())
    }

    fn bind_attribute_location(&self, program: ProgramId, slot: u32, name: &str) {
        if let Some(target) = self.state.borrow_mut().programs.get_mut(&program) {
            target.bound_locations.insert(name.to_string(), slot);
        }
    }

    fn link_program(&self, program: ProgramId) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let target = state
            .programs
            .get_mut(&program)
            .ok_or_else(|| program.invalid().to_string())?;
        target.linked = false;
        target.attributes.clear();
        target.uniforms.clear();
        target.values.clear();

        for required in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if !target.shaders.iter().any(|(stage, ..)| *stage == required) {
                return Err(format!("link error: no {required} shader attached"));
            }
        }

        let mut uniforms: Vec<UniformInfo> = Vec::new();
        for (_, _, declared) in &target.shaders {
            for declaration in declared {
                let ty = UniformType::from_glsl(&declaration.type_name)
                    .ok_or_else(|| format!("link error: unsupported uniform type '{}'", declaration.type_name))?;
                match uniforms.iter().find(|u| u.name == declaration.name) {
                    Some(existing) if existing.ty != ty => {
                        return Err(format!(
                            "link error: uniform '{}' declared as {} and {}",
                            declaration.name, existing.ty, ty
                        ));
                    }
                    Some(_) => {}
                    None => uniforms.push(UniformInfo {
                        name: declaration.name.clone(),
                        ty,
                        array_len: declaration.array_len,
                    }),
                }
            }
        }

        let inputs: Vec<Declaration> = target
            .shaders
            .iter()
            .filter(|(stage, ..)| *stage == ShaderStage::Vertex)
            .flat_map(|(_, inputs, _)| inputs.iter().cloned())
            .collect();
        let mut attributes: Vec<AttributeInfo> = Vec::with_capacity(inputs.len());
        let mut unassigned = Vec::new();
        for input in inputs {
            match input.location.or_else(|| target.bound_locations.get(&input.name).copied()) {
                Some(location) => attributes.push(AttributeInfo {
                    name: input.name,
                    location,
                }),
                None => unassigned.push(input.name),
            }
        }
        for name in unassigned {
            let location = (0..)
                .find(|slot| !attributes.iter().any(|a| a.location == *slot))
                .unwrap_or_default();
            attributes.push(AttributeInfo { name, location });
        }
        attributes.sort_by_key(|a| a.location);

        target.attributes = attributes;
        target.uniforms = uniforms;
        target.linked = true;
        log::trace!("HeadlessBackend: linked program {:?}", program);
        Ok(())
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<AttributeInfo> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<UniformInfo> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.state.borrow_mut().current_program = program;
    }

    fn set_uniform(&self, program: ProgramId, name: &str, value: &UniformValue) {
        if let Some(target) = self.state.borrow_mut().programs.get_mut(&program) {
            target.values.insert(name.to_string(), value.clone());
        }
    }

    fn detach_shaders(&self, program: ProgramId) {
        if let Some(target) = self.state.borrow_mut().programs.get_mut(&program) {
            target.shaders.clear();
        }
    }

    fn destroy_program(&self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        log::trace!("HeadlessBackend: destroying program {:?}", program);
        state.programs.remove(&program);
        if state.current_program == Some(program) {
            state.current_program = None;
        }
    }
}

// ============================================================================
// Source Validation
// ============================================================================

/// Compile check of one stage.
///
/// Vertex and fragment stages are parsed by naga's GLSL frontend and its
/// diagnostics become the compile log. naga has no geometry stage and no
/// combined image samplers, so those stages only get the entry point check.
fn validate_source(source: &str, stage: ShaderStage) -> Result<(), String> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
        ShaderStage::Geometry => return require_main(source, stage),
    };
    let Some(translated) = naga_source(source, stage) else {
        return require_main(source, stage);
    };

    let options = naga::front::glsl::Options {
        stage: naga_stage,
        defines: naga::FastHashMap::default(),
    };
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&options, &translated)
        .map_err(|errors| format!("{stage} shader: {errors}"))?;
    if !module.entry_points.iter().any(|ep| ep.name == "main") {
        return Err(format!("{stage} shader: error: missing entry point 'main'"));
    }
    Ok(())
}

fn require_main(source: &str, stage: ShaderStage) -> Result<(), String> {
    if source.contains("main") {
        Ok(())
    } else {
        Err(format!("{stage} shader: error: missing entry point 'main'"))
    }
}

/// Rewrite a stage into the GLSL subset naga parses.
///
/// naga wants `#version 440` or later and rejects the default uniform
/// block: loose uniforms are gathered into one block at the position of the
/// first, `attribute`/`varying` become `in`/`out`, and interface variables
/// without a location get one. Returns `None` if the stage declares opaque
/// uniforms.
fn naga_source(source: &str, stage: ShaderStage) -> Option<String> {
    let mut directives = String::new();
    let mut body = String::new();
    for line in source.lines() {
        let code = line.split("//").next().unwrap_or_default();
        let trimmed = code.trim_start();
        if trimmed.starts_with('#') {
            if !trimmed.starts_with("#version") {
                directives.push_str(trimmed);
                directives.push('\n');
            }
        } else {
            body.push_str(code);
            body.push('\n');
        }
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut loose_uniforms: Vec<String> = Vec::new();
    let mut block_at = None;
    let (mut next_input, mut next_output) = (0u32, 0u32);
    for segment in top_level_segments(&body) {
        let text = segment.trim();
        if !text.ends_with(';') || text.contains('{') {
            pieces.push(text.to_string());
            continue;
        }
        let (location, rest) = split_layout(text);
        let layout = text[..text.len() - rest.len()].trim();
        let words: Vec<&str> = rest.split_whitespace().collect();
        let Some(qualifier_at) = words.iter().position(|w| {
            !matches!(
                *w,
                "flat" | "smooth" | "noperspective" | "centroid" | "lowp" | "mediump" | "highp"
            )
        }) else {
            pieces.push(text.to_string());
            continue;
        };

        let direction = match (words[qualifier_at], stage) {
            ("uniform", _) => {
                let ty = words.get(qualifier_at + 1).copied().unwrap_or_default();
                if is_opaque(ty) {
                    return None;
                }
                loose_uniforms.push(words[qualifier_at + 1..].join(" "));
                if block_at.is_none() {
                    block_at = Some(pieces.len());
                    pieces.push(String::new());
                }
                continue;
            }
            ("in" | "attribute", _) | ("varying", ShaderStage::Fragment) => "in",
            ("out", _) | ("varying", _) => "out",
            _ => {
                pieces.push(text.to_string());
                continue;
            }
        };

        let mut rewritten = words.clone();
        rewritten[qualifier_at] = direction;
        let layout = match location {
            Some(_) => layout.to_string(),
            None => {
                let counter = if direction == "in" { &mut next_input } else { &mut next_output };
                *counter += 1;
                format!("layout(location = {})", *counter - 1)
            }
        };
        pieces.push(format!("{layout} {}", rewritten.join(" ")));
    }

    if let Some(at) = block_at {
        pieces[at] = format!(
            "layout(set = 0, binding = 0) uniform HeadlessDefaultUniforms {{ {} }};",
            loose_uniforms.join(" ")
        );
    }
    Some(format!("#version 450 core\n{directives}{}\n", pieces.join("\n")))
}

fn is_opaque(type_name: &str) -> bool {
    ["sampler", "image", "texture", "isampler", "usampler", "iimage", "uimage"]
        .iter()
        .any(|prefix| type_name.starts_with(prefix))
}

/// Split at `;` and at the closing brace of function bodies, both at brace depth 0.
fn top_level_segments(source: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let (mut depth, mut start) = (0usize, 0usize);
    for (i, c) in source.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                let is_function = source[start..i]
                    .split('{')
                    .next()
                    .is_some_and(|head| head.trim_end().ends_with(')'));
                if depth == 0 && is_function {
                    segments.push(&source[start..=i]);
                    start = i + 1;
                }
            }
            ';' if depth == 0 => {
                segments.push(&source[start..=i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !source[start..].trim().is_empty() {
        segments.push(&source[start..]);
    }
    segments
}

// ============================================================================
// Source Scanning
// ============================================================================

/// Collect vertex inputs and uniforms declared at global scope.
fn scan_declarations(source: &str, stage: ShaderStage) -> Result<(Vec<Declaration>, Vec<Declaration>), String> {
    let stripped: String = source
        .lines()
        .map(|line| line.split("//").next().unwrap_or_default())
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let mut inputs = Vec::new();
    let mut uniforms = Vec::new();
    for statement in stripped.split([';', '{', '}']) {
        let (location, rest) = split_layout(statement.trim());
        let mut tokens = rest
            .split_whitespace()
            .filter(|t| !matches!(*t, "lowp" | "mediump" | "highp" | "flat" | "smooth"));
        let Some(qualifier) = tokens.next() else {
            continue;
        };
        let is_input = stage == ShaderStage::Vertex && matches!(qualifier, "in" | "attribute");
        let is_uniform = qualifier == "uniform";
        if !is_input && !is_uniform {
            continue;
        }
        let (Some(type_name), Some(name)) = (tokens.next(), tokens.next()) else {
            return Err(format!("{stage} shader: error: malformed declaration '{}'", statement.trim()));
        };
        let (name, array_len) = split_array(name)?;
        let declaration = Declaration {
            name,
            type_name: type_name.to_string(),
            location,
            array_len,
        };
        if is_input {
            inputs.push(declaration);
        } else {
            uniforms.push(declaration);
        }
    }
    Ok((inputs, uniforms))
}

/// Strip a leading `layout(...)` qualifier, returning its `location`.
fn split_layout(statement: &str) -> (Option<u32>, &str) {
    let Some(body) = statement.strip_prefix("layout") else {
        return (None, statement);
    };
    let Some(close) = body.find(')') else {
        return (None, statement);
    };
    let inner = body[..close].trim_start().trim_start_matches('(');
    let location = inner.split(',').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        (key.trim() == "location").then(|| value.trim().parse().ok())?
    });
    (location, body[close + 1..].trim_start())
}

/// Split `name[N]` into the name and the array length.
fn split_array(token: &str) -> Result<(String, usize), String> {
    match token.split_once('[') {
        Some((name, rest)) => {
            let len = rest
                .trim_end_matches(']')
                .trim()
                .parse()
                .map_err(|_| format!("error: unsized or invalid array '{token}'"))?;
            Ok((name.to_string(), len))
        }
        None => Ok((token.to_string(), 1)),
    }
}
