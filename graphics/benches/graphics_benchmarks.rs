use criterion::{Criterion, black_box, criterion_group, criterion_main};

use glam::Vec3;
use redlilium_vertex::{
    ChannelDescriptor, ElementFormat, GeometryBuffer, GraphicsDevice, InstanceStream, LayoutMode, PrimitiveMode,
};

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

fn bench_geometry_upload(c: &mut Criterion, name: &str, layout: LayoutMode) {
    let device = GraphicsDevice::headless();
    let mut geometry = GeometryBuffer::new(&device).unwrap().with_layout_mode(layout);
    let color = geometry.add_channel::<[u8; 4]>(ChannelDescriptor::color()).unwrap();
    let uv = geometry.add_channel::<[f32; 2]>(ChannelDescriptor::texcoord0()).unwrap();

    c.bench_function(name, |b| {
        b.iter(|| {
            geometry.begin(PrimitiveMode::TriangleStrip).unwrap();
            for i in 0..4096 {
                let t = i as f32;
                geometry.set(color, [255, (i % 256) as u8, 0, 255]).unwrap();
                geometry.set(uv, [t / 4096.0, 0.5]).unwrap();
                geometry.vertex(Vec3::new(t, t.sin(), 0.0)).unwrap();
                if i % 64 == 63 {
                    geometry.restart().unwrap();
                }
            }
            geometry.end().unwrap();
            black_box(geometry.attributes().buffer());
        });
    });
}

fn bench_upload_interleaved(c: &mut Criterion) {
    bench_geometry_upload(c, "geometry_upload_interleaved_4k", LayoutMode::Interleaved);
}

fn bench_upload_blocked(c: &mut Criterion) {
    bench_geometry_upload(c, "geometry_upload_blocked_4k", LayoutMode::Blocked);
}

// ---------------------------------------------------------------------------
// Headless draws
// ---------------------------------------------------------------------------

fn bench_instanced_draw(c: &mut Criterion) {
    let device = GraphicsDevice::headless();
    let mut geometry = GeometryBuffer::new(&device).unwrap();
    geometry.begin(PrimitiveMode::Triangles).unwrap();
    geometry.vertex(Vec3::ZERO).unwrap();
    geometry.vertex(Vec3::X).unwrap();
    geometry.vertex(Vec3::Y).unwrap();
    geometry.end().unwrap();

    let mut stream = InstanceStream::new(&device);
    let offset = stream
        .add_channel::<Vec3>(ChannelDescriptor::new("instance_offset", 10, ElementFormat::FLOAT3))
        .unwrap();
    stream.begin().unwrap();
    for i in 0..256 {
        stream.set(offset, Vec3::new(i as f32, 0.0, 0.0)).unwrap();
        stream.push().unwrap();
    }
    stream.end().unwrap();
    geometry.bind_instanced_attribute(&mut stream, 1).unwrap();

    c.bench_function("headless_draw_256_instances", |b| {
        b.iter(|| {
            geometry.draw_instanced(black_box(256)).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_upload_interleaved,
    bench_upload_blocked,
    bench_instanced_draw,
);
criterion_main!(benches);
