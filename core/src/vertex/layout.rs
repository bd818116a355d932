//! Byte layout of a recorded vertex set inside one buffer.
//!
//! Two layouts are supported:
//!
//! ```text
//! Interleaved (position 12 B, color 4 B, 3 vertices; stride 16):
//!   | p0 c0 | p1 c1 | p2 c2 |
//!   position: offset 0,  stride 16
//!   color:    offset 12, stride 16
//!
//! Blocked (same data):
//!   | p0 p1 p2 | c0 c1 c2 |
//!   position: offset 0,  stride 12
//!   color:    offset 36, stride 4
//! ```
//!
//! Both occupy `stride * vertex_count` bytes. Null channels get no placement.

use std::borrow::Cow;

use super::channel::Channel;
use super::format::ElementFormat;
use crate::error::VertexError;

/// How channels are arranged inside the vertex buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LayoutMode {
    /// One record per vertex holding every channel's element.
    #[default]
    Interleaved,
    /// Each channel's values contiguous, blocks in declaration order.
    Blocked,
}

/// Where one channel lives inside the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlacement {
    /// Position of the channel in the record.
    pub channel: usize,
    /// Binding slot.
    pub slot: u32,
    /// Channel name.
    pub name: Cow<'static, str>,
    /// Element format.
    pub format: ElementFormat,
    /// Byte offset of the first element.
    pub offset: usize,
    /// Bytes between consecutive elements.
    pub stride: usize,
}

/// Layout of a finished record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    /// Arrangement used.
    pub mode: LayoutMode,
    /// Sum of element sizes of all channels: bytes per vertex.
    pub stride: usize,
    /// Number of vertices laid out.
    pub vertex_count: usize,
    /// One placement per non-null channel, in declaration order.
    pub placements: Vec<ChannelPlacement>,
}

impl LayoutPlan {
    /// Compute placements for `channels` holding `vertex_count` values each.
    pub fn compute(mode: LayoutMode, channels: &[Box<dyn Channel>], vertex_count: usize) -> Self {
        let stride: usize = channels.iter().map(|c| c.element_size()).sum();

        let mut placements = Vec::with_capacity(channels.len());
        let mut offset = 0;
        for (index, channel) in channels.iter().enumerate() {
            let descriptor = channel.descriptor();
            if descriptor.is_null() {
                continue;
            }
            let element_size = descriptor.format.byte_size();
            let channel_stride = match mode {
                LayoutMode::Interleaved => stride,
                LayoutMode::Blocked => element_size,
            };
            placements.push(ChannelPlacement {
                channel: index,
                slot: descriptor.slot,
                name: descriptor.name.clone(),
                format: descriptor.format,
                offset,
                stride: channel_stride,
            });
            offset += match mode {
                LayoutMode::Interleaved => element_size,
                LayoutMode::Blocked => element_size * vertex_count,
            };
        }

        Self {
            mode,
            stride,
            vertex_count,
            placements,
        }
    }

    /// Total buffer size in bytes.
    pub fn total_size(&self) -> usize {
        self.stride * self.vertex_count
    }

    /// Placement of the channel bound to `slot`.
    pub fn placement(&self, slot: u32) -> Option<&ChannelPlacement> {
        self.placements.iter().find(|p| p.slot == slot)
    }

    /// Write every placed channel into `dst` per this plan.
    ///
    /// Returns the total number of bytes written.
    pub fn pack_into(&self, channels: &[Box<dyn Channel>], dst: &mut [u8]) -> Result<usize, VertexError> {
        let mut written = 0;
        for placement in &self.placements {
            let channel = channels
                .get(placement.channel)
                .ok_or(VertexError::UnknownChannel {
                    index: placement.channel,
                })?;
            if channel.len() != self.vertex_count {
                return Err(VertexError::LengthMismatch {
                    name: channel.descriptor().name.to_string(),
                    expected: self.vertex_count,
                    actual: channel.len(),
                });
            }
            written += channel.write_into(dst, placement.offset, placement.stride)?;
        }
        Ok(written)
    }

    /// Pack every placed channel into a new buffer of
    /// [`total_size`](Self::total_size) bytes.
    pub fn pack(&self, channels: &[Box<dyn Channel>]) -> Result<Vec<u8>, VertexError> {
        let mut bytes = vec![0u8; self.total_size()];
        self.pack_into(channels, &mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{AttributeChannel, ChannelDescriptor, NullChannel};

    fn channels() -> Vec<Box<dyn Channel>> {
        let mut position = AttributeChannel::<[f32; 3]>::new(ChannelDescriptor::position()).unwrap();
        let mut color = AttributeChannel::<[u8; 4]>::new(ChannelDescriptor::color()).unwrap();
        for i in 0..3 {
            position.set([i as f32, 0.0, 0.0]);
            position.push();
            color.set([i as u8; 4]);
            color.push();
        }
        let mut null = NullChannel::new();
        for _ in 0..3 {
            null.push();
        }
        vec![Box::new(position), Box::new(null), Box::new(color)]
    }

    #[test]
    fn test_interleaved_placements() {
        let channels = channels();
        let plan = LayoutPlan::compute(LayoutMode::Interleaved, &channels, 3);

        assert_eq!(plan.stride, 16);
        assert_eq!(plan.total_size(), 48);
        assert_eq!(plan.placements.len(), 2);

        let color = plan.placement(2).unwrap();
        assert_eq!((color.offset, color.stride, color.channel), (12, 16, 2));
    }

    #[test]
    fn test_blocked_placements() {
        let channels = channels();
        let plan = LayoutPlan::compute(LayoutMode::Blocked, &channels, 3);

        assert_eq!(plan.stride, 16);
        let position = plan.placement(0).unwrap();
        assert_eq!((position.offset, position.stride), (0, 12));
        let color = plan.placement(2).unwrap();
        assert_eq!((color.offset, color.stride), (36, 4));
    }

    #[test]
    fn test_pack_fills_whole_buffer() {
        let channels = channels();
        for mode in [LayoutMode::Interleaved, LayoutMode::Blocked] {
            let plan = LayoutPlan::compute(mode, &channels, 3);
            let mut bytes = vec![0xFFu8; plan.total_size()];
            let written = plan.pack_into(&channels, &mut bytes).unwrap();
            assert_eq!(written, plan.total_size());

            let color = plan.placement(2).unwrap();
            let at = color.offset + color.stride * 2;
            assert_eq!(&bytes[at..at + 4], &[2, 2, 2, 2]);
        }
    }

    #[test]
    fn test_pack_detects_length_mismatch() {
        let mut channels = channels();
        channels[2].push();
        let plan = LayoutPlan::compute(LayoutMode::Interleaved, &channels, 3);
        assert!(matches!(
            plan.pack(&channels),
            Err(VertexError::LengthMismatch { expected: 3, actual: 4, .. })
        ));
    }
}
