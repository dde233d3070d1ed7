//! Geometry kernel boundary and backends

mod memory;
mod spec;
mod traits;
#[cfg(feature = "truck")]
mod truck;

pub use memory::{EdgeGeometry, FaceGeometry, MemoryKernel, RepairScript, TessellationScript};
pub use spec::ShapeSpec;
pub use traits::*;
#[cfg(feature = "truck")]
pub use truck::TruckKernel;
