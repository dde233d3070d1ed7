//! Meshability Classification Engine
//!
//! This crate provides:
//! - Shape separation into meshable and non-meshable parts
//! - Per-shape diagnostics with a structured failure taxonomy
//! - Interchangeable acceptance policies (strict, coverage, diagnostic)
//! - A per-call diagnostic cache keyed by shape identity
//! - Statistics and human-readable analysis reports

pub mod analysis;
pub mod cache;
pub mod config;
pub mod diagnostic;
pub mod engine;
pub mod policy;
pub mod report;
pub mod stats;

// Re-exports for convenience
pub use analysis::{
    EdgeMetrics, EdgeValidity, FaceValidity, check_edge_validity, check_face_validity,
    diagnose_rejection, edge_metrics, is_watertight,
};
pub use cache::{CacheEntry, DiagnosticCache};
pub use config::{ConfigError, PolicyKind, SeparationConfig};
pub use diagnostic::{ClassificationResult, FailureReason};
pub use engine::{SeparateResult, Separation, SeparationError, ShapeSeparator};
pub use policy::{AcceptancePolicy, CoveragePolicy, DiagnosticPolicy, StrictPolicy, Traversal};
pub use report::{AnalysisReport, ReasonCount, ReportEntry, TypeCounts};
pub use stats::Statistics;

pub use meshsep_kernel as kernel;
