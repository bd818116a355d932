//! Device configuration.

use crate::types::BufferUsageHint;

/// Configuration passed to [`GraphicsDevice::new`](crate::GraphicsDevice::new).
///
/// # Example
///
/// ```
/// use redlilium_vertex::{BufferUsageHint, DeviceConfig};
///
/// let config = DeviceConfig::new()
///     .with_label("preview")
///     .with_max_buffer_size(64 << 20)
///     .with_default_usage(BufferUsageHint::Dynamic);
/// assert_eq!(config.max_buffer_size, 64 << 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Debug label of the device.
    pub label: Option<String>,
    /// Largest buffer the device will create, in bytes.
    pub max_buffer_size: usize,
    /// Usage hint for buffers whose owner did not pick one.
    pub default_usage: BufferUsageHint,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_buffer_size: 1 << 30, // 1 GB
            default_usage: BufferUsageHint::Static,
        }
    }
}

impl DeviceConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the largest buffer size.
    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Set the default usage hint.
    pub fn with_default_usage(mut self, usage: BufferUsageHint) -> Self {
        self.default_usage = usage;
        self
    }
}
