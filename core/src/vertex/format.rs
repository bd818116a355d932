//! Numeric encodings and element formats.
//!
//! An [`ElementFormat`] is what the shader stage is told about one channel
//! element: the scalar type, how many components it has, and whether
//! fixed-point values are normalized when read.
//!
//! | Scalar | Normalized read | Unnormalized read |
//! |--------|-----------------|-------------------|
//! | `F32`  | n/a             | float             |
//! | `U8`, `U16`, `U32` | `[0, 1]`  | raw unsigned integer |
//! | `I8`, `I16`, `I32` | `[-1, 1]` | raw signed integer   |

use std::fmt;

/// Scalar type of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 32-bit IEEE float.
    F32,
    /// 8-bit signed integer.
    I8,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit signed integer.
    I16,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit signed integer.
    I32,
    /// 32-bit unsigned integer.
    U32,
}

impl ScalarType {
    /// Size of one component in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
        }
    }

    /// Whether this is the floating point type.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32)
    }

    /// Whether this is a signed fixed-point type.
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32)
    }

    /// Short name used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
        }
    }

    /// Decode one little-endian component as the shader stage reads it.
    ///
    /// `bytes` must hold exactly [`size`](Self::size) bytes.
    pub fn decode(self, bytes: &[u8], normalized: bool) -> f32 {
        debug_assert_eq!(bytes.len(), self.size());
        match self {
            Self::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::U8 => {
                let v = bytes[0];
                if normalized {
                    v as f32 / u8::MAX as f32
                } else {
                    v as f32
                }
            }
            Self::I8 => {
                let v = bytes[0] as i8;
                if normalized {
                    (v as f32 / i8::MAX as f32).max(-1.0)
                } else {
                    v as f32
                }
            }
            Self::U16 => {
                let v = u16::from_le_bytes([bytes[0], bytes[1]]);
                if normalized {
                    v as f32 / u16::MAX as f32
                } else {
                    v as f32
                }
            }
            Self::I16 => {
                let v = i16::from_le_bytes([bytes[0], bytes[1]]);
                if normalized {
                    (v as f32 / i16::MAX as f32).max(-1.0)
                } else {
                    v as f32
                }
            }
            Self::U32 => {
                let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if normalized {
                    (v as f64 / u32::MAX as f64) as f32
                } else {
                    v as f32
                }
            }
            Self::I32 => {
                let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if normalized {
                    ((v as f64 / i32::MAX as f64) as f32).max(-1.0)
                } else {
                    v as f32
                }
            }
        }
    }

    /// Largest error introduced by normalizing a value into this type.
    ///
    /// Returns `None` for floats, which are stored exactly.
    pub fn quantization_step(self) -> Option<f32> {
        let levels = match self {
            Self::F32 => return None,
            Self::U8 => u8::MAX as f64,
            Self::I8 => i8::MAX as f64,
            Self::U16 => u16::MAX as f64,
            Self::I16 => i16::MAX as f64,
            Self::U32 => u32::MAX as f64,
            Self::I32 => i32::MAX as f64,
        };
        Some((0.5 / levels) as f32)
    }
}

/// Format of one channel element as seen by the shader stage.
///
/// A format with zero components is the null format: it occupies no bytes
/// and never produces a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementFormat {
    /// Scalar type of each component.
    pub scalar: ScalarType,
    /// Number of components (0 to 4).
    pub components: u8,
    /// Whether fixed-point components are normalized when read.
    pub normalized: bool,
}

impl ElementFormat {
    /// The null format used by placeholder channels.
    pub const NONE: Self = Self::new(ScalarType::F32, 0);

    /// One 32-bit float.
    pub const FLOAT: Self = Self::new(ScalarType::F32, 1);
    /// Two 32-bit floats.
    pub const FLOAT2: Self = Self::new(ScalarType::F32, 2);
    /// Three 32-bit floats.
    pub const FLOAT3: Self = Self::new(ScalarType::F32, 3);
    /// Four 32-bit floats.
    pub const FLOAT4: Self = Self::new(ScalarType::F32, 4);
    /// One 32-bit signed integer.
    pub const INT: Self = Self::new(ScalarType::I32, 1);
    /// Four 32-bit signed integers.
    pub const INT4: Self = Self::new(ScalarType::I32, 4);
    /// One 32-bit unsigned integer.
    pub const UINT: Self = Self::new(ScalarType::U32, 1);
    /// Four 32-bit unsigned integers.
    pub const UINT4: Self = Self::new(ScalarType::U32, 4);
    /// Four 8-bit unsigned integers read as `[0, 1]`.
    pub const UNORM8X4: Self = Self::new(ScalarType::U8, 4).normalized();
    /// Four 8-bit signed integers read as `[-1, 1]`.
    pub const SNORM8X4: Self = Self::new(ScalarType::I8, 4).normalized();
    /// Four 8-bit unsigned integers read as raw integers.
    pub const UINT8X4: Self = Self::new(ScalarType::U8, 4);
    /// Two 16-bit unsigned integers read as `[0, 1]`.
    pub const UNORM16X2: Self = Self::new(ScalarType::U16, 2).normalized();
    /// Two 16-bit signed integers read as `[-1, 1]`.
    pub const SNORM16X2: Self = Self::new(ScalarType::I16, 2).normalized();

    /// Create an unnormalized format.
    pub const fn new(scalar: ScalarType, components: u8) -> Self {
        Self {
            scalar,
            components,
            normalized: false,
        }
    }

    /// Mark the format as normalized.
    ///
    /// Has no effect on how floats are read.
    pub const fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }

    /// Size of one element in bytes.
    pub const fn byte_size(&self) -> usize {
        self.scalar.size() * self.components as usize
    }

    /// Whether this is the null format.
    pub const fn is_null(&self) -> bool {
        self.components == 0
    }

    /// Whether the shader stage reads this format through the float path.
    ///
    /// Floats and normalized fixed-point go through the float path;
    /// unnormalized integers are read as integers.
    pub const fn reads_as_float(&self) -> bool {
        self.scalar.is_float() || self.normalized
    }

    /// Decode one element into the per-component values the shader sees.
    ///
    /// `bytes` must hold exactly [`byte_size`](Self::byte_size) bytes.
    pub fn decode(&self, bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(self.scalar.size())
            .map(|c| self.scalar.decode(c, self.normalized))
            .collect()
    }

    /// Quantization error bound for this format, `None` when exact.
    pub fn quantization_step(&self) -> Option<f32> {
        if self.normalized {
            self.scalar.quantization_step()
        } else {
            None
        }
    }
}

impl fmt::Display for ElementFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "null");
        }
        write!(f, "{} x {}", self.components, self.scalar.name())?;
        if self.normalized && !self.scalar.is_float() {
            write!(f, " (normalized)")?;
        }
        Ok(())
    }
}

/// Encode a float in `[0, 1]` as a normalized `u8`, rounding to nearest.
pub fn encode_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * u8::MAX as f32).round() as u8
}

/// Encode a float in `[-1, 1]` as a normalized `i8`, rounding to nearest.
pub fn encode_snorm8(value: f32) -> i8 {
    (value.clamp(-1.0, 1.0) * i8::MAX as f32).round() as i8
}
