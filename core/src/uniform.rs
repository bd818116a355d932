//! Uniform type model used to validate values before they reach a program.
//!
//! A program reflects each active uniform as a [`UniformInfo`]. Setting a
//! [`UniformValue`] is only forwarded to the GPU when
//! [`UniformInfo::accepts`] succeeds.

use std::fmt;

use glam::{IVec2, IVec3, IVec4, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};

/// Component kind of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    /// 32-bit float components.
    Float,
    /// Signed 32-bit integer components.
    Int,
    /// Unsigned 32-bit integer components.
    UInt,
    /// Booleans, set from `Int` values.
    Bool,
    /// A texture sampler. Set with an `Int` texture unit.
    Sampler,
}

/// Shape of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformShape {
    /// A single component.
    Scalar,
    /// Vector of 2 to 4 components.
    Vector(u8),
    /// Square matrix of 2 to 4 columns.
    Matrix(u8),
}

/// Kind and shape of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformType {
    /// Component kind.
    pub kind: UniformKind,
    /// Scalar, vector or matrix.
    pub shape: UniformShape,
}

impl UniformType {
    /// GLSL `float`.
    pub const FLOAT: Self = Self::new(UniformKind::Float, UniformShape::Scalar);
    /// GLSL `vec2`.
    pub const VEC2: Self = Self::new(UniformKind::Float, UniformShape::Vector(2));
    /// GLSL `vec3`.
    pub const VEC3: Self = Self::new(UniformKind::Float, UniformShape::Vector(3));
    /// GLSL `vec4`.
    pub const VEC4: Self = Self::new(UniformKind::Float, UniformShape::Vector(4));
    /// GLSL `int`.
    pub const INT: Self = Self::new(UniformKind::Int, UniformShape::Scalar);
    /// GLSL `ivec2`.
    pub const IVEC2: Self = Self::new(UniformKind::Int, UniformShape::Vector(2));
    /// GLSL `ivec3`.
    pub const IVEC3: Self = Self::new(UniformKind::Int, UniformShape::Vector(3));
    /// GLSL `ivec4`.
    pub const IVEC4: Self = Self::new(UniformKind::Int, UniformShape::Vector(4));
    /// GLSL `uint`.
    pub const UINT: Self = Self::new(UniformKind::UInt, UniformShape::Scalar);
    /// GLSL `uvec2`.
    pub const UVEC2: Self = Self::new(UniformKind::UInt, UniformShape::Vector(2));
    /// GLSL `uvec3`.
    pub const UVEC3: Self = Self::new(UniformKind::UInt, UniformShape::Vector(3));
    /// GLSL `uvec4`.
    pub const UVEC4: Self = Self::new(UniformKind::UInt, UniformShape::Vector(4));
    /// GLSL `bool`.
    pub const BOOL: Self = Self::new(UniformKind::Bool, UniformShape::Scalar);
    /// GLSL `mat3`.
    pub const MAT3: Self = Self::new(UniformKind::Float, UniformShape::Matrix(3));
    /// GLSL `mat4`.
    pub const MAT4: Self = Self::new(UniformKind::Float, UniformShape::Matrix(4));
    /// Any GLSL `sampler*` type.
    pub const SAMPLER: Self = Self::new(UniformKind::Sampler, UniformShape::Scalar);

    /// Combine a kind and a shape.
    pub const fn new(kind: UniformKind, shape: UniformShape) -> Self {
        Self { kind, shape }
    }

    /// Parse a GLSL type name such as `vec3` or `sampler2D`.
    pub fn from_glsl(name: &str) -> Option<Self> {
        if name.starts_with("sampler") || name.starts_with("isampler") || name.starts_with("usampler") {
            return Some(Self::SAMPLER);
        }
        let ty = match name {
            "float" => Self::FLOAT,
            "vec2" => Self::VEC2,
            "vec3" => Self::VEC3,
            "vec4" => Self::VEC4,
            "int" => Self::INT,
            "ivec2" => Self::IVEC2,
            "ivec3" => Self::IVEC3,
            "ivec4" => Self::IVEC4,
            "uint" => Self::UINT,
            "uvec2" => Self::UVEC2,
            "uvec3" => Self::UVEC3,
            "uvec4" => Self::UVEC4,
            "bool" => Self::BOOL,
            "mat2" => Self::new(UniformKind::Float, UniformShape::Matrix(2)),
            "mat3" => Self::MAT3,
            "mat4" => Self::MAT4,
            _ => return None,
        };
        Some(ty)
    }

    /// Number of scalar components per element.
    pub fn components(&self) -> usize {
        match self.shape {
            UniformShape::Scalar => 1,
            UniformShape::Vector(n) => n as usize,
            UniformShape::Matrix(n) => (n as usize) * (n as usize),
        }
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            UniformKind::Float => "",
            UniformKind::Int => "i",
            UniformKind::UInt => "u",
            UniformKind::Bool => "b",
            UniformKind::Sampler => return f.write_str("sampler"),
        };
        match self.shape {
            UniformShape::Scalar => f.write_str(match self.kind {
                UniformKind::Float => "float",
                UniformKind::Int => "int",
                UniformKind::UInt => "uint",
                _ => "bool",
            }),
            UniformShape::Vector(n) => write!(f, "{prefix}vec{n}"),
            UniformShape::Matrix(n) => write!(f, "mat{n}"),
        }
    }
}

/// One active uniform of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    /// Name as declared, without any array suffix.
    pub name: String,
    pub ty: UniformType,
    /// Number of array elements, 1 for non-arrays.
    pub array_len: usize,
}

/// Why a value was refused by a uniform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniformMismatch {
    #[error("uniform '{name}' is {expected}, got {actual}")]
    Type {
        name: String,
        expected: UniformType,
        actual: UniformType,
    },
    #[error("uniform '{name}' holds {capacity} elements, got {len}")]
    ArrayTooLong { name: String, len: usize, capacity: usize },
    #[error("uniform '{name}': {len} floats do not split into {components}-component elements")]
    RaggedArray { name: String, len: usize, components: usize },
}

impl UniformInfo {
    /// Check that `value` can be written to this uniform.
    pub fn accepts(&self, value: &UniformValue) -> Result<(), UniformMismatch> {
        let actual = value.uniform_type();
        let type_ok = actual == self.ty
            || (actual == UniformType::INT && matches!(self.ty, UniformType::SAMPLER | UniformType::BOOL));
        if !type_ok {
            return Err(UniformMismatch::Type {
                name: self.name.clone(),
                expected: self.ty,
                actual,
            });
        }

        if let UniformValue::FloatArray { values, .. } = value {
            let components = actual.components();
            if values.len() % components != 0 {
                return Err(UniformMismatch::RaggedArray {
                    name: self.name.clone(),
                    len: values.len(),
                    components,
                });
            }
            let len = values.len() / components;
            if len > self.array_len {
                return Err(UniformMismatch::ArrayTooLong {
                    name: self.name.clone(),
                    len,
                    capacity: self.array_len,
                });
            }
        }
        Ok(())
    }
}

/// A value destined for a uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// `float`.
    Float(f32),
    /// `vec2`.
    Vec2(Vec2),
    /// `vec3`.
    Vec3(Vec3),
    /// `vec4`.
    Vec4(Vec4),
    /// `int`, `bool` or a sampler's texture unit.
    Int(i32),
    /// `ivec2`.
    IVec2(IVec2),
    /// `ivec3`.
    IVec3(IVec3),
    /// `ivec4`.
    IVec4(IVec4),
    /// `uint`.
    UInt(u32),
    /// `uvec2`.
    UVec2(UVec2),
    /// `uvec3`.
    UVec3(UVec3),
    /// `uvec4`.
    UVec4(UVec4),
    /// `mat3`, column-major.
    Mat3(Mat3),
    /// `mat4`, column-major.
    Mat4(Mat4),
    /// Array of float scalars or vectors, flattened.
    FloatArray {
        /// Components per element (1 to 4).
        components: u8,
        /// `components` floats per element.
        values: Vec<f32>,
    },
}

impl UniformValue {
    /// Uniform type this value writes.
    pub fn uniform_type(&self) -> UniformType {
        match self {
            Self::Float(_) => UniformType::FLOAT,
            Self::Vec2(_) => UniformType::VEC2,
            Self::Vec3(_) => UniformType::VEC3,
            Self::Vec4(_) => UniformType::VEC4,
            Self::Int(_) => UniformType::INT,
            Self::IVec2(_) => UniformType::IVEC2,
            Self::IVec3(_) => UniformType::IVEC3,
            Self::IVec4(_) => UniformType::IVEC4,
            Self::UInt(_) => UniformType::UINT,
            Self::UVec2(_) => UniformType::UVEC2,
            Self::UVec3(_) => UniformType::UVEC3,
            Self::UVec4(_) => UniformType::UVEC4,
            Self::Mat3(_) => UniformType::MAT3,
            Self::Mat4(_) => UniformType::MAT4,
            Self::FloatArray { components, .. } => match components {
                1 => UniformType::FLOAT,
                n => UniformType::new(UniformKind::Float, UniformShape::Vector(*n)),
            },
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_value! {
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    i32 => Int,
    IVec2 => IVec2,
    IVec3 => IVec3,
    IVec4 => IVec4,
    u32 => UInt,
    UVec2 => UVec2,
    UVec3 => UVec3,
    UVec4 => UVec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, ty: UniformType, array_len: usize) -> UniformInfo {
        UniformInfo {
            name: name.to_string(),
            ty,
            array_len,
        }
    }

    #[test]
    fn test_from_glsl() {
        assert_eq!(UniformType::from_glsl("mat4"), Some(UniformType::MAT4));
        assert_eq!(UniformType::from_glsl("sampler2D"), Some(UniformType::SAMPLER));
        assert_eq!(UniformType::from_glsl("ivec3"), Some(UniformType::IVEC3));
        assert_eq!(UniformType::from_glsl("struct"), None);
    }

    #[test]
    fn test_display_uses_glsl_names() {
        assert_eq!(UniformType::VEC3.to_string(), "vec3");
        assert_eq!(UniformType::MAT4.to_string(), "mat4");
        assert_eq!(UniformType::UVEC2.to_string(), "uvec2");
        assert_eq!(UniformType::INT.to_string(), "int");
    }

    #[test]
    fn test_accepts_matching_shape() {
        let model = info("model_matrix", UniformType::MAT4, 1);
        assert!(model.accepts(&Mat4::IDENTITY.into()).is_ok());
        assert!(matches!(
            model.accepts(&Mat3::IDENTITY.into()),
            Err(UniformMismatch::Type { .. })
        ));
        assert!(model.accepts(&UniformValue::Float(1.0)).is_err());
    }

    #[test]
    fn test_sampler_takes_int_unit() {
        let tex = info("tex", UniformType::SAMPLER, 1);
        assert!(tex.accepts(&UniformValue::Int(0)).is_ok());
        assert!(tex.accepts(&UniformValue::Float(0.0)).is_err());
    }

    #[test]
    fn test_float_arrays() {
        let lights = info("lights", UniformType::VEC3, 2);
        let two = UniformValue::FloatArray {
            components: 3,
            values: vec![0.0; 6],
        };
        assert!(lights.accepts(&two).is_ok());

        let three = UniformValue::FloatArray {
            components: 3,
            values: vec![0.0; 9],
        };
        assert!(matches!(
            lights.accepts(&three),
            Err(UniformMismatch::ArrayTooLong { len: 3, capacity: 2, .. })
        ));

        let ragged = UniformValue::FloatArray {
            components: 3,
            values: vec![0.0; 5],
        };
        assert!(matches!(
            lights.accepts(&ragged),
            Err(UniformMismatch::RaggedArray { .. })
        ));
    }
}
