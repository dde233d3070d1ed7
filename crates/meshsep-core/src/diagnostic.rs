//! Per-shape diagnostic records

use std::fmt;

use meshsep_kernel::{ShapeId, ShapeType};
use serde::{Deserialize, Serialize};

/// Why a shape was rejected, or `Success` when it was accepted
///
/// Ordered by the point in the pipeline where the problem is discovered,
/// not by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureReason {
    Success,
    NullGeometry,
    NoTriangles,
    MeshingFailed,
    DegenerateEdge,
    DegenerateFace,
    SelfIntersecting,
    NonManifold,
    ComplexCurve,
    UnsupportedSurface,
    OtherReason,
}

impl FailureReason {
    /// Display name of this reason
    pub fn name(self) -> &'static str {
        match self {
            FailureReason::Success => "SUCCESS",
            FailureReason::NullGeometry => "NULL_GEOMETRY",
            FailureReason::NoTriangles => "NO_TRIANGLES",
            FailureReason::MeshingFailed => "MESHING_FAILED",
            FailureReason::DegenerateEdge => "DEGENERATE_EDGE",
            FailureReason::DegenerateFace => "DEGENERATE_FACE",
            FailureReason::SelfIntersecting => "SELF_INTERSECTING",
            FailureReason::NonManifold => "NON_MANIFOLD",
            FailureReason::ComplexCurve => "COMPLEX_CURVE",
            FailureReason::UnsupportedSurface => "UNSUPPORTED_SURFACE",
            FailureReason::OtherReason => "OTHER_REASON",
        }
    }

    /// Short explanation shown in reports
    pub fn summary(self) -> &'static str {
        match self {
            FailureReason::Success => "meshed successfully",
            FailureReason::NullGeometry => "missing geometry",
            FailureReason::NoTriangles => "triangulation produced no triangles",
            FailureReason::MeshingFailed => "mesher failed",
            FailureReason::DegenerateEdge => "degenerate edge",
            FailureReason::DegenerateFace => "invalid face topology",
            FailureReason::SelfIntersecting => "self-intersecting boundary",
            FailureReason::NonManifold => "non-manifold topology",
            FailureReason::ComplexCurve => "complex curves could not be meshed",
            FailureReason::UnsupportedSurface => "shape kind carries no surface",
            FailureReason::OtherReason => "unclassified failure",
        }
    }

    pub fn is_success(self) -> bool {
        self == FailureReason::Success
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Diagnostic record for one classified shape
///
/// Created once per routed shape and not modified after it is placed into
/// an output list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Identity of the classified shape (the original, even when a repaired copy was meshed)
    pub shape: ShapeId,
    pub shape_type: ShapeType,
    pub failure_reason: FailureReason,
    pub reason_description: String,
    /// Shortest edge (Face/Edge only)
    pub min_edge_length: f64,
    /// Longest edge (Face/Edge only)
    pub max_edge_length: f64,
    pub has_complex_curves: bool,
    /// Solid/Shell only
    pub is_watertight: bool,
    pub face_count: usize,
    pub triangle_count: usize,
    /// Whether the mesh came from a repaired copy
    pub repaired: bool,
}

impl ClassificationResult {
    /// A record with no findings yet
    pub fn new(shape: ShapeId, shape_type: ShapeType) -> Self {
        Self {
            shape,
            shape_type,
            failure_reason: FailureReason::Success,
            reason_description: String::new(),
            min_edge_length: 0.0,
            max_edge_length: 0.0,
            has_complex_curves: false,
            is_watertight: false,
            face_count: 0,
            triangle_count: 0,
            repaired: false,
        }
    }

    /// Mark as rejected
    pub fn reject(mut self, reason: FailureReason, description: impl Into<String>) -> Self {
        self.failure_reason = reason;
        self.reason_description = description.into();
        self
    }

    /// Whether the shape was accepted
    pub fn is_meshable(&self) -> bool {
        self.failure_reason.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_names() {
        assert_eq!(FailureReason::Success.to_string(), "SUCCESS");
        assert_eq!(
            FailureReason::UnsupportedSurface.to_string(),
            "UNSUPPORTED_SURFACE"
        );
        assert!(FailureReason::NullGeometry < FailureReason::OtherReason);
    }

    #[test]
    fn test_reject() {
        let result = ClassificationResult::new(ShapeId::new(3), ShapeType::Face);
        assert!(result.is_meshable());

        let result = result.reject(FailureReason::NoTriangles, "empty");
        assert!(!result.is_meshable());
        assert_eq!(result.failure_reason, FailureReason::NoTriangles);
        assert_eq!(result.reason_description, "empty");
    }
}
