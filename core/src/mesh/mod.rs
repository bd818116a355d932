//! Index sequences and primitive assembly.
//!
//! - [`IndexList`] - 32-bit index sequence with the restart sentinel
//! - [`PrimitiveMode`] - How indices are assembled into primitives
//! - [`Primitive`] - One assembled point, line or triangle

mod index;
mod primitive;

pub use index::{IndexList, IndexingMode, RESTART_INDEX};
pub use primitive::{Primitive, PrimitiveMode};
