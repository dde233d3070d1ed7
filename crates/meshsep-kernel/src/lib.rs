//! Shape Tree and Geometry Kernel Abstraction
//!
//! This crate provides:
//! - A read-only, typed view of a B-rep model (`ShapeTree`)
//! - The geometry kernel boundary consumed by the classifier (`GeometryKernel`)
//! - An in-memory arena kernel with scripted behaviour, loadable from RON
//! - An optional adapter over the Truck B-rep kernel (feature `truck`)

pub mod kernel;

pub use glam;

// Re-exports for convenience
pub use kernel::{
    CONFUSION_TOLERANCE, CheckStatus, CurveClass, EdgeGeometry, EdgeIssue, FaceGeometry,
    FaceTriangulation, GeometryKernel, KernelError, KernelResult, MemoryKernel, NullKernel,
    RepairScript, ShapeId, ShapeSpec, ShapeTree, ShapeType, TessellationOutcome,
    TessellationParams, TessellationScript, TopologyReport,
};

#[cfg(feature = "truck")]
pub use kernel::TruckKernel;
