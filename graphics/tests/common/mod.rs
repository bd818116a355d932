//! Common utilities for the headless integration tests.

#![allow(dead_code)]

use std::rc::Rc;

use glam::Vec3;
use redlilium_vertex::{
    ChannelDescriptor, ChannelKey, DeviceConfig, ElementFormat, GeometryBuffer, GraphicsDevice, HeadlessBackend,
    IndexingMode, LayoutMode, PrimitiveMode,
};

/// Slot of the per-instance offset channel.
pub const INSTANCE_OFFSET_SLOT: u32 = 10;
/// Slot of the per-instance color channel.
pub const INSTANCE_COLOR_SLOT: u32 = 11;

/// Unit quad corners, counter-clockwise.
pub const QUAD_CORNERS: [Vec3; 4] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
];

/// Two triangles over the quad corners.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A headless device plus a second view of its backend for inspection.
pub struct TestContext {
    pub backend: HeadlessBackend,
    pub device: Rc<GraphicsDevice>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_backend(HeadlessBackend::new())
    }

    pub fn with_backend(backend: HeadlessBackend) -> Self {
        init_logging();
        let device = GraphicsDevice::new(
            Box::new(backend.clone()),
            DeviceConfig::new().with_label("integration tests"),
        );
        Self { backend, device }
    }
}

pub fn instance_offset() -> ChannelDescriptor {
    ChannelDescriptor::new("instance_offset", INSTANCE_OFFSET_SLOT, ElementFormat::FLOAT3)
}

pub fn instance_color() -> ChannelDescriptor {
    ChannelDescriptor::new("instance_color", INSTANCE_COLOR_SLOT, ElementFormat::UNORM8X4)
}

/// A colored unit quad with shared corners: indices `[restart, 0, 1, 2, 0, 2, 3]`.
pub struct Quad {
    pub geometry: GeometryBuffer,
    pub color: ChannelKey<[u8; 4]>,
}

impl Quad {
    pub fn new(device: &Rc<GraphicsDevice>, layout: LayoutMode) -> Self {
        let mut geometry = GeometryBuffer::new(device)
            .unwrap()
            .with_layout_mode(layout)
            .with_indexing(IndexingMode::Explicit)
            .with_label("quad");
        let color = geometry.add_channel::<[u8; 4]>(ChannelDescriptor::color()).unwrap();
        Self { geometry, color }
    }

    pub fn record(&mut self, corners: &[Vec3; 4]) {
        self.geometry.begin(PrimitiveMode::Triangles).unwrap();
        for (i, corner) in corners.iter().enumerate() {
            self.geometry
                .set(self.color, [(i * 60) as u8, 0, 255, 255])
                .unwrap();
            self.geometry.vertex(*corner).unwrap();
        }
        for index in QUAD_INDICES {
            self.geometry.index(index).unwrap();
        }
        self.geometry.end().unwrap();
    }
}
