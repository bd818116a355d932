//! Rust value types that can be stored in an attribute channel.

use super::format::{ElementFormat, ScalarType};

/// A plain value that maps onto one channel element.
///
/// The type fixes the scalar type and the component count; whether
/// fixed-point components are read normalized is decided by the channel
/// descriptor, so `[u8; 4]` backs both `UNORM8X4` and `UINT8X4`.
pub trait AttributeValue: bytemuck::Pod + Default {
    /// Scalar type of each component.
    const SCALAR: ScalarType;
    /// Number of components.
    const COMPONENTS: u8;

    /// Unnormalized format implied by the type.
    fn format() -> ElementFormat {
        ElementFormat::new(Self::SCALAR, Self::COMPONENTS)
    }

    /// Whether `format` describes values of this type.
    fn matches(format: &ElementFormat) -> bool {
        format.scalar == Self::SCALAR && format.components == Self::COMPONENTS
    }
}

macro_rules! impl_scalar_values {
    ($($ty:ty => $scalar:ident),* $(,)?) => {
        $(
            impl AttributeValue for $ty {
                const SCALAR: ScalarType = ScalarType::$scalar;
                const COMPONENTS: u8 = 1;
            }
            impl AttributeValue for [$ty; 2] {
                const SCALAR: ScalarType = ScalarType::$scalar;
                const COMPONENTS: u8 = 2;
            }
            impl AttributeValue for [$ty; 3] {
                const SCALAR: ScalarType = ScalarType::$scalar;
                const COMPONENTS: u8 = 3;
            }
            impl AttributeValue for [$ty; 4] {
                const SCALAR: ScalarType = ScalarType::$scalar;
                const COMPONENTS: u8 = 4;
            }
        )*
    };
}

impl_scalar_values! {
    f32 => F32,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
}

macro_rules! impl_glam_values {
    ($($ty:ty => ($scalar:ident, $n:literal)),* $(,)?) => {
        $(
            impl AttributeValue for $ty {
                const SCALAR: ScalarType = ScalarType::$scalar;
                const COMPONENTS: u8 = $n;
            }
        )*
    };
}

impl_glam_values! {
    glam::Vec2 => (F32, 2),
    glam::Vec3 => (F32, 3),
    glam::Vec4 => (F32, 4),
    glam::IVec2 => (I32, 2),
    glam::IVec3 => (I32, 3),
    glam::IVec4 => (I32, 4),
    glam::UVec2 => (U32, 2),
    glam::UVec3 => (U32, 3),
    glam::UVec4 => (U32, 4),
}
