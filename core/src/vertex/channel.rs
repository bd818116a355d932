//! Attribute channels: one named, typed per-vertex data stream each.
//!
//! [`AttributeChannel<T>`] holds a working value and the sequence of values
//! pushed so far. The object-safe [`Channel`] trait is the view a
//! [`VertexRecord`](super::VertexRecord) uses to drive a heterogeneous list
//! of channels in lock-step.

use std::any::Any;
use std::borrow::Cow;

use super::format::ElementFormat;
use super::value::AttributeValue;
use crate::error::VertexError;

// ============================================================================
// Channel Descriptor
// ============================================================================

/// Binding slot of the built-in position channel.
pub const SLOT_POSITION: u32 = 0;
/// Binding slot of the built-in normal channel.
pub const SLOT_NORMAL: u32 = 1;
/// Binding slot of the built-in color channels.
pub const SLOT_COLOR: u32 = 2;
/// Binding slot of the built-in first texture coordinate channel.
pub const SLOT_TEXCOORD0: u32 = 6;

/// Identity of a channel: name, binding slot and element format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelDescriptor {
    /// Name the shader declares the input under.
    pub name: Cow<'static, str>,
    /// Binding slot the shader reads the channel from.
    pub slot: u32,
    /// Element format.
    pub format: ElementFormat,
}

impl ChannelDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<Cow<'static, str>>, slot: u32, format: ElementFormat) -> Self {
        Self {
            name: name.into(),
            slot,
            format,
        }
    }

    /// `position`: slot 0, 3 x f32.
    pub fn position() -> Self {
        Self::new("position", SLOT_POSITION, ElementFormat::FLOAT3)
    }

    /// `normal`: slot 1, 3 x f32.
    pub fn normal() -> Self {
        Self::new("normal", SLOT_NORMAL, ElementFormat::FLOAT3)
    }

    /// `color`: slot 2, 4 x u8 normalized.
    pub fn color() -> Self {
        Self::new("color", SLOT_COLOR, ElementFormat::UNORM8X4)
    }

    /// `color`: slot 2, 4 x f32.
    pub fn color_f32() -> Self {
        Self::new("color", SLOT_COLOR, ElementFormat::FLOAT4)
    }

    /// `texcoord0`: slot 6, 2 x f32.
    pub fn texcoord0() -> Self {
        Self::new("texcoord0", SLOT_TEXCOORD0, ElementFormat::FLOAT2)
    }

    /// Descriptor of a placeholder channel.
    pub fn null() -> Self {
        Self::new("", u32::MAX, ElementFormat::NONE)
    }

    /// Whether this describes a placeholder channel.
    pub fn is_null(&self) -> bool {
        self.format.is_null()
    }
}

// ============================================================================
// Channel Trait
// ============================================================================

/// Type-erased view of a channel.
pub trait Channel: Any {
    /// Name, slot and format.
    fn descriptor(&self) -> &ChannelDescriptor;

    /// Number of recorded values.
    fn len(&self) -> usize;

    /// Whether no values are recorded.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all recorded values. The working value is kept.
    fn reset(&mut self);

    /// Append the working value.
    fn push(&mut self);

    /// Raw bytes of the recorded values, tightly packed.
    fn bytes(&self) -> &[u8];

    /// Size of one element in bytes.
    fn element_size(&self) -> usize {
        self.descriptor().format.byte_size()
    }

    /// Size of all recorded values in bytes.
    fn byte_size(&self) -> usize {
        self.len() * self.element_size()
    }

    /// Copy the recorded values into `dst`, value `i` landing at
    /// `offset + i * stride`. Returns the number of bytes written.
    ///
    /// Fails without writing if `stride` is smaller than one element or the
    /// last value would not fit in `dst`.
    fn write_into(&self, dst: &mut [u8], offset: usize, stride: usize) -> Result<usize, VertexError> {
        let element_size = self.element_size();
        let count = self.len();
        if element_size == 0 || count == 0 {
            return Ok(0);
        }
        if stride < element_size {
            return Err(VertexError::InvalidStride {
                stride,
                element_size,
            });
        }
        let required = (count - 1) * stride + element_size;
        if offset.checked_add(required).map_or(true, |end| end > dst.len()) {
            return Err(VertexError::DestinationTooSmall {
                offset,
                required,
                available: dst.len(),
            });
        }

        let src = self.bytes();
        if stride == element_size {
            dst[offset..offset + src.len()].copy_from_slice(src);
        } else {
            for (i, element) in src.chunks_exact(element_size).enumerate() {
                let at = offset + i * stride;
                dst[at..at + element_size].copy_from_slice(element);
            }
        }
        Ok(src.len())
    }

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// Typed Channel
// ============================================================================

/// A strongly-typed channel.
#[derive(Debug, Clone)]
pub struct AttributeChannel<T: AttributeValue> {
    descriptor: ChannelDescriptor,
    current: T,
    values: Vec<T>,
}

impl<T: AttributeValue> AttributeChannel<T> {
    /// Create a channel, checking that `descriptor.format` describes `T`.
    pub fn new(descriptor: ChannelDescriptor) -> Result<Self, VertexError> {
        if !T::matches(&descriptor.format) {
            return Err(VertexError::FormatMismatch {
                name: descriptor.name.to_string(),
                declared: descriptor.format.to_string(),
                actual: T::format().to_string(),
            });
        }
        Ok(Self {
            descriptor,
            current: T::default(),
            values: Vec::new(),
        })
    }

    /// Set the working value that the next push appends.
    pub fn set(&mut self, value: T) {
        self.current = value;
    }

    /// The working value.
    pub fn current(&self) -> T {
        self.current
    }

    /// Recorded values.
    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T: AttributeValue> Channel for AttributeChannel<T> {
    fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn reset(&mut self) {
        self.values.clear();
    }

    fn push(&mut self) {
        self.values.push(self.current);
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Null Channel
// ============================================================================

/// Placeholder channel: counts pushes, stores nothing, binds nothing.
#[derive(Debug, Clone)]
pub struct NullChannel {
    descriptor: ChannelDescriptor,
    count: usize,
}

impl NullChannel {
    /// Create an empty placeholder.
    pub fn new() -> Self {
        Self {
            descriptor: ChannelDescriptor::null(),
            count: 0,
        }
    }
}

impl Default for NullChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for NullChannel {
    fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    fn len(&self) -> usize {
        self.count
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn push(&mut self) {
        self.count += 1;
    }

    fn bytes(&self) -> &[u8] {
        &[]
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

    #[test]
    fn test_builtin_descriptors() {
        assert_eq!(ChannelDescriptor::position().slot, 0);
        assert_eq!(ChannelDescriptor::normal().slot, 1);
        assert_eq!(ChannelDescriptor::color().slot, 2);
        assert_eq!(ChannelDescriptor::color().format, ElementFormat::UNORM8X4);
        assert_eq!(ChannelDescriptor::color_f32().format, ElementFormat::FLOAT4);
        assert_eq!(ChannelDescriptor::texcoord0().slot, 6);
        assert!(ChannelDescriptor::null().is_null());
    }

    #[test]
    fn test_format_mismatch_is_rejected() {
        let err = AttributeChannel::<[f32; 2]>::new(ChannelDescriptor::position()).unwrap_err();
        assert!(matches!(err, VertexError::FormatMismatch { .. }));
        assert!(AttributeChannel::<[f32; 3]>::new(ChannelDescriptor::position()).is_ok());
    }

    #[test]
    fn test_push_appends_working_value() {
        let mut channel = AttributeChannel::<[u8; 4]>::new(ChannelDescriptor::color()).unwrap();
        channel.set([255, 0, 0, 255]);
        channel.push();
        channel.push();
        channel.set([0, 255, 0, 255]);
        channel.push();

        assert_eq!(channel.len(), 3);
        assert_eq!(channel.byte_size(), 12);
        assert_eq!(channel.values()[1], [255, 0, 0, 255]);
        assert_eq!(channel.values()[2], [0, 255, 0, 255]);

        channel.reset();
        assert!(channel.is_empty());
        assert_eq!(channel.current(), [0, 255, 0, 255]);
    }

    #[test]
    fn test_write_before_push_is_empty() {
        let channel = AttributeChannel::<f32>::new(ChannelDescriptor::new("w", 3, ElementFormat::FLOAT)).unwrap();
        let mut dst = [0u8; 0];
        assert_eq!(channel.write_into(&mut dst, 0, 4), Ok(0));
    }

    #[test]
    fn test_strided_write() {
        let mut channel = AttributeChannel::<u16>::new(ChannelDescriptor::new(
            "id",
            4,
            ElementFormat::new(crate::ScalarType::U16, 1),
        ))
        .unwrap();
        for v in [0x0102u16, 0x0304] {
            channel.set(v);
            channel.push();
        }

        let mut dst = [0xAAu8; 8];
        assert_eq!(channel.write_into(&mut dst, 1, 4), Ok(4));
        assert_eq!(dst, [0xAA, 0x02, 0x01, 0xAA, 0xAA, 0x04, 0x03, 0xAA]);
    }

    #[test]
    fn test_write_rejects_bad_stride_and_short_destination() {
        let mut channel = AttributeChannel::<[f32; 3]>::new(ChannelDescriptor::position()).unwrap();
        channel.push();
        channel.push();

        let mut dst = [0u8; 24];
        assert_eq!(
            channel.write_into(&mut dst, 0, 8),
            Err(VertexError::InvalidStride {
                stride: 8,
                element_size: 12
            })
        );
        assert_eq!(
            channel.write_into(&mut dst, 4, 12),
            Err(VertexError::DestinationTooSmall {
                offset: 4,
                required: 24,
                available: 24
            })
        );
        assert_eq!(dst, [0u8; 24]);
    }

    #[test]
    fn test_null_channel_counts_without_bytes() {
        let mut channel = NullChannel::new();
        channel.push();
        channel.push();
        assert_eq!(channel.len(), 2);
        assert_eq!(channel.byte_size(), 0);
        assert!(channel.bytes().is_empty());
        assert!(channel.descriptor().is_null());
    }
}
