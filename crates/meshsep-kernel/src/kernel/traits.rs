//! Kernel trait definitions
//!
//! These traits define the boundary between the classifier and whichever
//! geometry kernel owns the B-rep data.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length below which an edge is considered degenerate
pub const CONFUSION_TOLERANCE: f64 = 1e-7;

/// Kernel-issued identity of a shape
///
/// Two handles refer to the same underlying entity iff their ids are equal,
/// regardless of the path through which they were reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(u64);

impl ShapeId {
    /// Create a shape id from a raw kernel value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw kernel value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Topological kind of a shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeType {
    Compound,
    CompSolid,
    Solid,
    Shell,
    Face,
    Wire,
    Edge,
    Vertex,
    /// Catch-all kind the kernel could not classify
    Unknown,
}

impl ShapeType {
    /// Display name of this shape type
    pub fn name(self) -> &'static str {
        match self {
            ShapeType::Compound => "Compound",
            ShapeType::CompSolid => "CompSolid",
            ShapeType::Solid => "Solid",
            ShapeType::Shell => "Shell",
            ShapeType::Face => "Face",
            ShapeType::Wire => "Wire",
            ShapeType::Edge => "Edge",
            ShapeType::Vertex => "Vertex",
            ShapeType::Unknown => "Unknown",
        }
    }

    /// Pure grouping constructs that never carry a classification themselves
    pub fn is_container(self) -> bool {
        matches!(self, ShapeType::Compound | ShapeType::CompSolid)
    }

    /// Kinds that can never carry a surface mesh
    pub fn is_surfaceless(self) -> bool {
        matches!(self, ShapeType::Wire | ShapeType::Edge | ShapeType::Vertex)
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geometric class of an edge's underlying curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CurveClass {
    #[default]
    Line,
    Circle,
    Ellipse,
    BSpline,
    Bezier,
    Offset,
    Other,
}

impl CurveClass {
    /// Anything beyond line, circle and ellipse
    pub fn is_complex(self) -> bool {
        !matches!(self, CurveClass::Line | CurveClass::Circle | CurveClass::Ellipse)
    }
}

/// Status reported by the kernel's topology checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckStatus {
    NoCurveOnSurface,
    InvalidCurveOnSurface,
    InvalidPointOnCurve,
    InvalidSameRangeFlag,
    InvalidSameParameterFlag,
    InvalidDegeneratedFlag,
    InvalidRange,
    FreeEdge,
    InvalidMultiConnexity,
    NotClosed,
    SelfIntersectingWire,
    BadOrientation,
}

impl CheckStatus {
    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            CheckStatus::NoCurveOnSurface => "no curve on surface",
            CheckStatus::InvalidCurveOnSurface => "invalid curve on surface",
            CheckStatus::InvalidPointOnCurve => "invalid point on curve",
            CheckStatus::InvalidSameRangeFlag => "invalid same-range flag",
            CheckStatus::InvalidSameParameterFlag => "invalid same-parameter flag",
            CheckStatus::InvalidDegeneratedFlag => "invalid degenerated flag",
            CheckStatus::InvalidRange => "invalid parameter range",
            CheckStatus::FreeEdge => "free edge",
            CheckStatus::InvalidMultiConnexity => "invalid multi-connexity",
            CheckStatus::NotClosed => "wire not closed",
            CheckStatus::SelfIntersectingWire => "self-intersecting wire",
            CheckStatus::BadOrientation => "bad orientation",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single checker finding, optionally attached to the offending edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeIssue {
    pub edge: Option<ShapeId>,
    pub status: CheckStatus,
}

impl EdgeIssue {
    pub fn new(edge: Option<ShapeId>, status: CheckStatus) -> Self {
        Self { edge, status }
    }
}

/// Result of running the kernel's topology checker on a shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyReport {
    pub issues: Vec<EdgeIssue>,
}

impl TopologyReport {
    /// A report without findings
    pub fn valid() -> Self {
        Self::default()
    }

    /// Whether the checker was satisfied
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether any finding carries the given status
    pub fn has_status(&self, status: CheckStatus) -> bool {
        self.issues.iter().any(|i| i.status == status)
    }
}

/// Tessellation tolerances forwarded to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TessellationParams {
    /// Maximum distance between surface and triangles
    pub linear_deflection: f64,
    /// Maximum angle between adjacent triangle normals (radians)
    pub angular_deflection: f64,
    /// Whether `linear_deflection` is relative to the shape's size
    pub relative: bool,
    /// Hint that the kernel may mesh faces in parallel
    pub parallel: bool,
}

impl Default for TessellationParams {
    fn default() -> Self {
        Self {
            linear_deflection: 0.01,
            angular_deflection: 0.5,
            relative: false,
            parallel: true,
        }
    }
}

/// Triangle count produced for one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceTriangulation {
    pub face: ShapeId,
    pub triangles: usize,
}

/// Outcome of a tessellation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TessellationOutcome {
    /// Whether the mesher reported completion
    pub done: bool,
    /// Per-face triangle counts for every face of the tessellated unit
    pub faces: Vec<FaceTriangulation>,
}

impl TessellationOutcome {
    /// Number of faces in the tessellated unit
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Number of faces with at least one triangle
    pub fn triangulated_faces(&self) -> usize {
        self.faces.iter().filter(|f| f.triangles > 0).count()
    }

    /// Total triangle count
    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(|f| f.triangles).sum()
    }

    /// Fraction of faces that produced a non-empty triangulation (0 when there are no faces)
    pub fn coverage(&self) -> f64 {
        if self.faces.is_empty() {
            0.0
        } else {
            self.triangulated_faces() as f64 / self.faces.len() as f64
        }
    }

    /// Whether every face produced at least one triangle
    pub fn all_faces_triangulated(&self) -> bool {
        !self.faces.is_empty() && self.faces.iter().all(|f| f.triangles > 0)
    }
}

/// Error type for kernel primitives
#[derive(Debug, Clone, Error)]
pub enum KernelError {
    #[error("Null or unknown shape: {0}")]
    NullShape(ShapeId),

    #[error("Tessellation failed: {0}")]
    Tessellation(String),

    #[error("Topology check failed: {0}")]
    Validation(String),

    #[error("Repair failed: {0}")]
    Repair(String),

    #[error("Geometry query failed: {0}")]
    Geometry(String),

    #[error("Invalid model: {0}")]
    Model(String),

    #[error("Kernel not available: {0}")]
    KernelNotAvailable(String),
}

/// Result type for kernel primitives
pub type KernelResult<T> = Result<T, KernelError>;

/// Read-only view of a B-rep model as a typed tree
pub trait ShapeTree {
    /// Type of a shape, or `None` for a null/unknown handle
    fn shape_type(&self, shape: ShapeId) -> Option<ShapeType>;

    /// Immediate children of a shape
    fn children(&self, shape: ShapeId) -> Vec<ShapeId>;

    /// All distinct sub-shapes of the given kind, depth first
    ///
    /// Includes `shape` itself when it has the requested kind.
    fn sub_shapes(&self, shape: ShapeId, kind: ShapeType) -> Vec<ShapeId> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![shape];

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if self.shape_type(current) == Some(kind) {
                found.push(current);
                // Only containers nest inside their own kind
                if !kind.is_container() {
                    continue;
                }
            }
            let children = self.children(current);
            stack.extend(children.into_iter().rev());
        }

        found
    }

    /// All distinct shapes below `shape`, depth first, excluding `shape`
    fn descendants(&self, shape: ShapeId) -> Vec<ShapeId> {
        let mut found = Vec::new();
        let mut seen = HashSet::from([shape]);
        let mut stack: Vec<ShapeId> = self.children(shape).into_iter().rev().collect();

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            found.push(current);
            let children = self.children(current);
            stack.extend(children.into_iter().rev());
        }

        found
    }

    /// Check whether the handle refers to a live shape
    fn is_null(&self, shape: ShapeId) -> bool {
        self.shape_type(shape).is_none()
    }
}

/// The geometry kernel primitives consumed by the classifier
///
/// Implementations must be reentrant if shared between concurrent classifiers.
pub trait GeometryKernel: ShapeTree + Send + Sync {
    /// Get the name of this kernel
    fn name(&self) -> &str;

    /// Tessellate a shape
    ///
    /// # Arguments
    /// * `shape` - The shape to mesh
    /// * `params` - Tessellation tolerances and hints
    fn tessellate(
        &self,
        shape: ShapeId,
        params: &TessellationParams,
    ) -> KernelResult<TessellationOutcome>;

    /// Run the topology checker on a shape
    fn validate_topology(&self, shape: ShapeId) -> KernelResult<TopologyReport>;

    /// Best-effort repair, returning a repaired copy or the input unchanged
    fn repair(&self, shape: ShapeId) -> KernelResult<ShapeId>;

    /// Arc length of an edge's curve
    fn curve_length(&self, edge: ShapeId) -> KernelResult<f64>;

    /// Geometric class of an edge's curve
    fn curve_class(&self, edge: ShapeId) -> KernelResult<CurveClass>;

    /// Whether a face has underlying surface geometry
    fn has_surface(&self, face: ShapeId) -> bool;
}

/// A null kernel that knows no shapes (used when no kernel is available)
#[derive(Debug, Default)]
pub struct NullKernel;

impl ShapeTree for NullKernel {
    fn shape_type(&self, _shape: ShapeId) -> Option<ShapeType> {
        None
    }

    fn children(&self, _shape: ShapeId) -> Vec<ShapeId> {
        Vec::new()
    }
}

impl GeometryKernel for NullKernel {
    fn name(&self) -> &str {
        "null"
    }

    fn tessellate(
        &self,
        _shape: ShapeId,
        _params: &TessellationParams,
    ) -> KernelResult<TessellationOutcome> {
        Err(KernelError::KernelNotAvailable(
            "No geometry kernel available".into(),
        ))
    }

    fn validate_topology(&self, _shape: ShapeId) -> KernelResult<TopologyReport> {
        Err(KernelError::KernelNotAvailable(
            "No geometry kernel available".into(),
        ))
    }

    fn repair(&self, _shape: ShapeId) -> KernelResult<ShapeId> {
        Err(KernelError::KernelNotAvailable(
            "No geometry kernel available".into(),
        ))
    }

    fn curve_length(&self, _edge: ShapeId) -> KernelResult<f64> {
        Err(KernelError::KernelNotAvailable(
            "No geometry kernel available".into(),
        ))
    }

    fn curve_class(&self, _edge: ShapeId) -> KernelResult<CurveClass> {
        Err(KernelError::KernelNotAvailable(
            "No geometry kernel available".into(),
        ))
    }

    fn has_surface(&self, _face: ShapeId) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(counts: &[usize]) -> TessellationOutcome {
        TessellationOutcome {
            done: true,
            faces: counts
                .iter()
                .enumerate()
                .map(|(i, &triangles)| FaceTriangulation {
                    face: ShapeId::new(i as u64),
                    triangles,
                })
                .collect(),
        }
    }

    #[test]
    fn test_outcome_coverage() {
        let o = outcome(&[4, 0, 2, 2, 0]);
        assert_eq!(o.face_count(), 5);
        assert_eq!(o.triangulated_faces(), 3);
        assert_eq!(o.triangle_count(), 8);
        approx::assert_relative_eq!(o.coverage(), 0.6);
        assert!(!o.all_faces_triangulated());
    }

    #[test]
    fn test_empty_outcome_is_not_triangulated() {
        let o = outcome(&[]);
        assert_eq!(o.coverage(), 0.0);
        assert!(!o.all_faces_triangulated());
    }

    #[test]
    fn test_curve_complexity() {
        assert!(!CurveClass::Line.is_complex());
        assert!(!CurveClass::Circle.is_complex());
        assert!(!CurveClass::Ellipse.is_complex());
        assert!(CurveClass::BSpline.is_complex());
        assert!(CurveClass::Bezier.is_complex());
        assert!(CurveClass::Offset.is_complex());
        assert!(CurveClass::Other.is_complex());
    }

    #[test]
    fn test_null_kernel() {
        let kernel = NullKernel;
        let id = ShapeId::new(1);
        assert!(kernel.is_null(id));
        assert!(kernel.sub_shapes(id, ShapeType::Face).is_empty());
        assert!(matches!(
            kernel.tessellate(id, &TessellationParams::default()),
            Err(KernelError::KernelNotAvailable(_))
        ));
    }
}
