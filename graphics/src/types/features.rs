//! Optional device features.

use bitflags::bitflags;

bitflags! {
    /// Features a backend may or may not provide.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceFeatures: u32 {
        /// Instanced draws and per-instance attribute divisors.
        const INSTANCING = 1 << 0;
        /// Primitive restart on the fixed maximum index.
        const PRIMITIVE_RESTART = 1 << 1;
        /// Reading buffer contents back to the CPU.
        const BUFFER_READBACK = 1 << 2;
    }
}

impl Default for DeviceFeatures {
    fn default() -> Self {
        Self::all()
    }
}
