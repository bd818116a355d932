//! Headless integration tests for the vertex pipeline.
//!
//! Every test records data, uploads it, and checks what a draw actually
//! reads through the bound layout. Layout-sensitive tests run against both
//! the interleaved and the blocked buffer layout.
//!
//! ```bash
//! cargo test -p redlilium-vertex --test vertex_pipeline
//! ```

mod common;

use glam::{Mat4, Vec3};
use rstest::rstest;

use common::{instance_color, instance_offset, Quad, TestContext, INSTANCE_COLOR_SLOT, INSTANCE_OFFSET_SLOT, QUAD_CORNERS};
use redlilium_vertex::{
    AttributeSet, CameraCapability, ChannelDescriptor, DeviceFeatures, ElementFormat, GeometryBuffer,
    GraphicsError, HeadlessBackend, InstanceStream, LayoutMode, ModelTransform, Primitive, PrimitiveMode, Renderer,
    ShaderStage, UniformValue, RESTART_INDEX,
};

// ============================================================================
// Layout
// ============================================================================

#[rstest]
#[case::interleaved(LayoutMode::Interleaved)]
#[case::blocked(LayoutMode::Blocked)]
fn test_position_color_stride(#[case] layout: LayoutMode) {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, layout);
    quad.record(&QUAD_CORNERS);

    let attributes = quad.geometry.attributes();
    assert_eq!(attributes.stride(), 12 + 4);
    assert_eq!(attributes.vertex_count(), 4);
    assert_eq!(
        attributes.buffer().map(|b| b.size()),
        Some(attributes.stride() * attributes.vertex_count())
    );
    for channel in attributes.record().channels() {
        assert_eq!(channel.len(), 4);
        assert_eq!(channel.byte_size(), channel.descriptor().format.byte_size() * 4);
    }
}

#[rstest]
#[case::interleaved(LayoutMode::Interleaved, 12, 16)]
#[case::blocked(LayoutMode::Blocked, 48, 4)]
fn test_color_placement(#[case] layout: LayoutMode, #[case] offset: usize, #[case] stride: usize) {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, layout);
    quad.record(&QUAD_CORNERS);

    let binding = quad.geometry.descriptor().unwrap().binding(2).unwrap();
    assert_eq!((binding.offset, binding.stride), (offset, stride));
    assert_eq!(binding.format, ElementFormat::UNORM8X4);

    let applied = ctx.backend.attributes(quad.geometry.descriptor().unwrap().id());
    assert_eq!((applied[&2].offset, applied[&2].stride), (offset, stride));
}

// ============================================================================
// Quad Scenario
// ============================================================================

#[rstest]
#[case::interleaved(LayoutMode::Interleaved)]
#[case::blocked(LayoutMode::Blocked)]
fn test_quad_draws_two_triangles(#[case] layout: LayoutMode) {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, layout);
    quad.record(&QUAD_CORNERS);

    assert_eq!(
        quad.geometry.indices().as_slice(),
        &[RESTART_INDEX, 0, 1, 2, 0, 2, 3]
    );
    quad.geometry.draw().unwrap();

    let draw = ctx.backend.last_draw().unwrap();
    assert!(draw.restart);
    assert_eq!(draw.index_count, 7);
    assert_eq!(
        draw.primitives,
        vec![Primitive::Triangle([0, 1, 2]), Primitive::Triangle([0, 2, 3])]
    );
    for (i, corner) in QUAD_CORNERS.iter().enumerate() {
        assert_eq!(draw.vertex_attribute(i as u32, 0), Some(&corner.to_array()[..]));
    }
}

#[rstest]
#[case::interleaved(LayoutMode::Interleaved)]
#[case::blocked(LayoutMode::Blocked)]
fn test_quad_rerecord_keeps_size(#[case] layout: LayoutMode) {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, layout);
    quad.record(&QUAD_CORNERS);
    let stride = quad.geometry.attributes().stride();

    let mut moved = QUAD_CORNERS;
    moved[2] = Vec3::new(2.0, 2.0, 0.0);
    quad.record(&moved);

    assert_eq!(quad.geometry.vertex_count(), 4);
    assert_eq!(quad.geometry.attributes().buffer().map(|b| b.size()), Some(stride * 4));
    // one vertex buffer and one index buffer
    assert_eq!(ctx.backend.buffer_count(), 2);
    assert_eq!(ctx.backend.allocated_bytes(), stride * 4 + 7 * 4);

    quad.geometry.draw().unwrap();
    let draw = ctx.backend.last_draw().unwrap();
    assert_eq!(draw.vertex_attribute(2, 0), Some(&[2.0, 2.0, 0.0][..]));
}

// ============================================================================
// Round Trip
// ============================================================================

#[rstest]
#[case::interleaved(LayoutMode::Interleaved)]
#[case::blocked(LayoutMode::Blocked)]
fn test_readback_round_trip(#[case] layout: LayoutMode) {
    let ctx = TestContext::new();
    let mut set = AttributeSet::new(&ctx.device).with_layout_mode(layout);
    let position = set.add_channel::<[f32; 3]>(ChannelDescriptor::position()).unwrap();
    let normal = set.add_channel::<[f32; 3]>(ChannelDescriptor::normal()).unwrap();
    let uv = set.add_channel::<[f32; 2]>(ChannelDescriptor::texcoord0()).unwrap();

    set.begin().unwrap();
    for i in 0..5 {
        let f = i as f32;
        set.set(position, [f, f * 0.5, -f]).unwrap();
        set.set(normal, [0.0, 1.0, f.sin()]).unwrap();
        set.set(uv, [f / 4.0, 1.0 - f / 4.0]).unwrap();
        set.push().unwrap();
    }
    set.end().unwrap();

    let bytes = set.read_back().unwrap();
    let plan = set.plan().unwrap();
    assert_eq!(bytes.len(), plan.total_size());

    for placement in &plan.placements {
        let channel = &set.record().channels()[placement.channel];
        let size = placement.format.byte_size();
        for i in 0..5 {
            let start = placement.offset + i * placement.stride;
            assert_eq!(
                &bytes[start..start + size],
                &channel.bytes()[i * size..(i + 1) * size],
                "{} vertex {}",
                placement.name,
                i
            );
        }
    }
}

#[rstest]
#[case::interleaved(LayoutMode::Interleaved)]
#[case::blocked(LayoutMode::Blocked)]
fn test_normalized_color_within_quantization(#[case] layout: LayoutMode) {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, layout);
    quad.record(&QUAD_CORNERS);
    quad.geometry.draw().unwrap();

    let draw = ctx.backend.last_draw().unwrap();
    let step = ElementFormat::UNORM8X4.quantization_step().unwrap();
    for vertex in 0..4u32 {
        let expected = [vertex as f32 * 60.0 / 255.0, 0.0, 1.0, 1.0];
        let actual = draw.vertex_attribute(vertex, 2).unwrap();
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() <= step, "vertex {vertex}: {a} vs {e}");
        }
    }
}

// ============================================================================
// Descriptor Binding
// ============================================================================

#[rstest]
#[case::interleaved(LayoutMode::Interleaved)]
#[case::blocked(LayoutMode::Blocked)]
fn test_bind_is_idempotent(#[case] layout: LayoutMode) {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, layout);
    quad.record(&QUAD_CORNERS);

    let mut descriptor = ctx.device.create_vertex_layout().unwrap();
    quad.geometry.attributes().bind(&mut descriptor).unwrap();
    descriptor.bind_all().unwrap();
    let rows = descriptor.bindings().clone();
    let applied = ctx.backend.attributes(descriptor.id());

    quad.geometry.attributes().bind(&mut descriptor).unwrap();
    descriptor.bind_all().unwrap();
    assert_eq!(descriptor.bindings(), &rows);
    assert_eq!(ctx.backend.attributes(descriptor.id()), applied);
}

#[test]
fn test_bind_while_current_applies_immediately() {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, LayoutMode::Interleaved);
    quad.record(&QUAD_CORNERS);

    let mut descriptor = ctx.device.create_vertex_layout().unwrap();
    descriptor.bind().unwrap();
    quad.geometry.attributes().bind(&mut descriptor).unwrap();
    descriptor.unbind().unwrap();
    assert_eq!(ctx.backend.attributes(descriptor.id()).len(), 2);
}

// ============================================================================
// Primitive Restart
// ============================================================================

#[rstest]
#[case::strip(PrimitiveMode::TriangleStrip, 6)]
#[case::fan(PrimitiveMode::TriangleFan, 6)]
#[case::line_strip(PrimitiveMode::LineStrip, 8)]
#[case::line_loop(PrimitiveMode::LineLoop, 10)]
#[case::points(PrimitiveMode::Points, 10)]
fn test_restart_splits_runs(#[case] mode: PrimitiveMode, #[case] primitives: usize) {
    let ctx = TestContext::new();
    let mut geometry = GeometryBuffer::new(&ctx.device).unwrap();
    geometry.begin(mode).unwrap();
    for run in 0..2 {
        for i in 0..5 {
            geometry.vertex(Vec3::new(i as f32, run as f32, 0.0)).unwrap();
        }
        geometry.restart().unwrap();
    }
    geometry.end().unwrap();

    let indices = geometry.indices().as_slice();
    assert_eq!(indices[0], RESTART_INDEX);
    assert_ne!(indices[1], RESTART_INDEX);
    assert!(indices
        .iter()
        .all(|&i| i == RESTART_INDEX || (i as usize) < geometry.vertex_count()));

    geometry.draw().unwrap();
    let draw = ctx.backend.last_draw().unwrap();
    assert_eq!(draw.primitives.len(), primitives);
    // no primitive spans both runs
    for primitive in &draw.primitives {
        let runs: Vec<_> = primitive.vertices().iter().map(|&v| v / 5).collect();
        assert!(runs.windows(2).all(|w| w[0] == w[1]), "{primitive:?}");
    }
}

#[test]
fn test_index_out_of_range_rejected_at_end() {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, LayoutMode::Interleaved);
    let geometry = &mut quad.geometry;
    geometry.begin(PrimitiveMode::Triangles).unwrap();
    geometry.vertex(Vec3::ZERO).unwrap();
    geometry.index(0).unwrap();
    geometry.index(4).unwrap();
    assert!(matches!(geometry.end(), Err(GraphicsError::Vertex(_))));
    assert_eq!(ctx.backend.buffer_count(), 0);
}

// ============================================================================
// Instancing
// ============================================================================

fn triangle(ctx: &TestContext) -> GeometryBuffer {
    let mut geometry = GeometryBuffer::new(&ctx.device).unwrap();
    geometry.begin(PrimitiveMode::Triangles).unwrap();
    geometry.vertex(Vec3::ZERO).unwrap();
    geometry.vertex(Vec3::X).unwrap();
    geometry.vertex(Vec3::Y).unwrap();
    geometry.end().unwrap();
    geometry
}

#[rstest]
fn test_instances_group_by_divisor(#[values(1, 2, 3)] divisor: u32, #[values(1, 4, 6)] instances: u32) {
    let ctx = TestContext::new();
    let mut geometry = triangle(&ctx);

    let records = instances.div_ceil(divisor);
    let mut stream = InstanceStream::new(&ctx.device).with_label("offsets");
    let offset = stream.add_channel::<Vec3>(instance_offset()).unwrap();
    stream.begin().unwrap();
    for i in 0..records {
        stream.set(offset, Vec3::new(i as f32, 0.0, 0.0)).unwrap();
        stream.push().unwrap();
    }
    stream.end().unwrap();

    geometry.bind_instanced_attribute(&mut stream, divisor).unwrap();
    geometry.draw_instanced(instances).unwrap();

    let draw = ctx.backend.last_draw().unwrap();
    assert_eq!(draw.instance_count, instances);
    let mut advances = 0;
    let mut previous = None;
    for instance in 0..instances {
        let value = draw.instance_attribute(instance, INSTANCE_OFFSET_SLOT).unwrap()[0];
        assert_eq!(value, (instance / divisor) as f32);
        if previous.is_some_and(|p| p != value) {
            advances += 1;
        }
        previous = Some(value);
    }
    assert_eq!(advances, (instances - 1) / divisor);
    // per-vertex data is untouched by the instance stream
    assert_eq!(draw.vertex_attribute(1, 0), Some(&[1.0, 0.0, 0.0][..]));
}

#[test]
fn test_instance_stream_rebuilt_per_frame() {
    let ctx = TestContext::new();
    let mut geometry = triangle(&ctx);
    let mut stream = InstanceStream::new(&ctx.device);
    let color = stream.add_channel::<[u8; 4]>(instance_color()).unwrap();

    for frame in 0..3u8 {
        stream.begin().unwrap();
        for i in 0..2u8 {
            stream.set(color, [frame, i, 0, 255]).unwrap();
            stream.push().unwrap();
        }
        stream.end().unwrap();

        // the previous frame's buffer is gone, so the old row is stale
        if frame > 0 {
            assert_eq!(
                geometry.draw_instanced(2),
                Err(GraphicsError::StaleBinding {
                    slot: INSTANCE_COLOR_SLOT
                })
            );
        }
        geometry.bind_instanced_attribute(&mut stream, 1).unwrap();
        geometry.draw_instanced(2).unwrap();

        let draw = ctx.backend.last_draw().unwrap();
        let value = draw.instance_attribute(1, INSTANCE_COLOR_SLOT).unwrap();
        assert!((value[0] - frame as f32 / 255.0).abs() < 1e-6);
        assert!((value[1] - 1.0 / 255.0).abs() < 1e-6);
    }
    assert_eq!(ctx.backend.vertex_array_count(), 1);
}

#[test]
fn test_instancing_requires_feature() {
    let ctx = TestContext::with_backend(
        HeadlessBackend::new().with_features(DeviceFeatures::PRIMITIVE_RESTART | DeviceFeatures::BUFFER_READBACK),
    );
    let mut geometry = triangle(&ctx);
    geometry.draw().unwrap();
    assert!(matches!(
        geometry.draw_instanced(2),
        Err(GraphicsError::FeatureNotSupported(_))
    ));

    let mut stream = InstanceStream::new(&ctx.device);
    stream.add_channel::<Vec3>(instance_offset()).unwrap();
    stream.begin().unwrap();
    stream.push().unwrap();
    stream.end().unwrap();
    assert!(matches!(
        geometry.bind_instanced_attribute(&mut stream, 1),
        Err(GraphicsError::FeatureNotSupported(_))
    ));
}

// ============================================================================
// Program Boundary
// ============================================================================

const VERTEX_SHADER: &str = "#version 330 core
in vec3 position;
in vec4 color;
in vec3 instance_offset;
uniform mat4 model_matrix;
uniform mat4 view_matrix;
uniform mat4 projection_matrix;
void main() {
    gl_Position = projection_matrix * view_matrix * model_matrix * vec4(position + instance_offset, 1.0);
}
";

const FRAGMENT_SHADER: &str = "#version 330 core
out vec4 frag_color;
void main() { frag_color = vec4(1.0); }
";

#[test]
fn test_program_binds_channel_slots() {
    let ctx = TestContext::new();
    let quad = Quad::new(&ctx.device, LayoutMode::Interleaved);
    let mut stream = InstanceStream::new(&ctx.device);
    stream.add_null_channel().unwrap();
    stream.add_channel::<Vec3>(instance_offset()).unwrap();

    let mut program = ctx.device.create_program().unwrap();
    program.attach(ShaderStage::Vertex, VERTEX_SHADER).unwrap();
    program.attach(ShaderStage::Fragment, FRAGMENT_SHADER).unwrap();
    program.bind_geometry(&quad.geometry);
    program.bind_instance_stream(&stream);
    program.link().unwrap();

    assert_eq!(program.attribute_location("position"), Some(0));
    assert_eq!(program.attribute_location("color"), Some(2));
    assert_eq!(program.attribute_location("instance_offset"), Some(INSTANCE_OFFSET_SLOT));
}

#[test]
fn test_renderer_injects_matrices() {
    let ctx = TestContext::new();
    let mut quad = Quad::new(&ctx.device, LayoutMode::Interleaved);
    quad.record(&QUAD_CORNERS);

    let mut program = ctx.device.create_program().unwrap();
    program.attach(ShaderStage::Vertex, VERTEX_SHADER).unwrap();
    program.attach(ShaderStage::Fragment, FRAGMENT_SHADER).unwrap();
    program.bind_geometry(&quad.geometry);
    program.link().unwrap();
    let program_id = program.id();

    let camera = CameraCapability::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 1.0, 0.1, 100.0);
    let view = camera.view;
    let mut renderer = Renderer::new(program);
    renderer.add_capability(camera).add_capability(ModelTransform::new());

    let shift = Mat4::from_translation(Vec3::new(0.5, 0.0, 0.0));
    if let Some(model) = renderer.capability_mut::<ModelTransform>() {
        model.push();
        model.mult(shift);
    }
    renderer.draw(&quad.geometry, 1).unwrap();

    let draw = ctx.backend.last_draw().unwrap();
    assert_eq!(draw.program, Some(program_id));
    assert_eq!(draw.uniforms.get("model_matrix"), Some(&UniformValue::Mat4(shift)));
    assert_eq!(draw.uniforms.get("view_matrix"), Some(&UniformValue::Mat4(view)));
    assert_eq!(draw.triangle_count(), 2);
}
