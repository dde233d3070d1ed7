//! Validity and diagnostic analysis
//!
//! Lightweight geometric checks run around tessellation attempts:
//! - Face topology validity (kernel checker + surface presence)
//! - Edge validity (arc length against the confusion tolerance, curve class)
//! - Edge length bounds and the complex-curve signal
//! - The watertight proxy for solids and shells

use meshsep_kernel::{
    CONFUSION_TOLERANCE, CheckStatus, GeometryKernel, ShapeId, ShapeType, TessellationOutcome,
};

use crate::diagnostic::FailureReason;

/// Outcome of checking a single face
#[derive(Debug, Clone, PartialEq)]
pub struct FaceValidity {
    pub ok: bool,
    /// `Success` when `ok`
    pub reason: FailureReason,
    pub description: String,
}

impl FaceValidity {
    fn valid() -> Self {
        Self {
            ok: true,
            reason: FailureReason::Success,
            description: String::new(),
        }
    }

    fn invalid(reason: FailureReason, description: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason,
            description: description.into(),
        }
    }
}

/// Outcome of checking a single edge
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeValidity {
    pub ok: bool,
    pub description: String,
    pub length: f64,
    /// Curve is something other than a line, circle or ellipse
    pub complex: bool,
}

/// Edge statistics over every distinct edge of a shape
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EdgeMetrics {
    pub edge_count: usize,
    pub min_length: f64,
    pub max_length: f64,
    pub has_complex_curves: bool,
    pub degenerate_edges: usize,
}

/// Check a face: topology first, then presence of surface geometry
pub fn check_face_validity<K: GeometryKernel + ?Sized>(kernel: &K, face: ShapeId) -> FaceValidity {
    let report = match kernel.validate_topology(face) {
        Ok(report) => report,
        Err(e) => {
            return FaceValidity::invalid(
                FailureReason::OtherReason,
                format!("topology check could not run: {}", e),
            );
        }
    };

    if !report.is_valid() {
        let findings: Vec<String> = report
            .issues
            .iter()
            .map(|issue| match issue.edge {
                Some(edge) => format!("edge {}: {}", edge, issue.status),
                None => issue.status.to_string(),
            })
            .collect();
        return FaceValidity::invalid(
            FailureReason::DegenerateFace,
            format!("invalid topology: {}", findings.join("; ")),
        );
    }

    if !kernel.has_surface(face) {
        return FaceValidity::invalid(
            FailureReason::NullGeometry,
            "face has no underlying surface",
        );
    }

    FaceValidity::valid()
}

/// Check an edge: arc length and curve class
pub fn check_edge_validity<K: GeometryKernel + ?Sized>(kernel: &K, edge: ShapeId) -> EdgeValidity {
    let complex = kernel
        .curve_class(edge)
        .map(|class| class.is_complex())
        .unwrap_or(false);

    match kernel.curve_length(edge) {
        Ok(length) if length < CONFUSION_TOLERANCE => EdgeValidity {
            ok: false,
            description: format!("degenerate edge: length {:.2e}", length),
            length,
            complex,
        },
        Ok(length) => EdgeValidity {
            ok: true,
            description: String::new(),
            length,
            complex,
        },
        Err(e) => EdgeValidity {
            ok: false,
            description: format!("edge length unavailable: {}", e),
            length: 0.0,
            complex,
        },
    }
}

/// Collect edge length bounds and curve complexity for a shape
pub fn edge_metrics<K: GeometryKernel + ?Sized>(kernel: &K, shape: ShapeId) -> EdgeMetrics {
    let mut metrics = EdgeMetrics::default();
    let mut min = f64::INFINITY;
    let mut max = 0.0_f64;

    for edge in kernel.sub_shapes(shape, ShapeType::Edge) {
        let validity = check_edge_validity(kernel, edge);
        metrics.edge_count += 1;
        metrics.has_complex_curves |= validity.complex;
        if !validity.ok {
            metrics.degenerate_edges += 1;
        }
        min = min.min(validity.length);
        max = max.max(validity.length);
    }

    if metrics.edge_count > 0 {
        metrics.min_length = min;
        metrics.max_length = max;
    }
    metrics
}

/// Watertight proxy: at least one face, and no face with more than one wire
pub fn is_watertight<K: GeometryKernel + ?Sized>(kernel: &K, shape: ShapeId) -> bool {
    let faces = kernel.sub_shapes(shape, ShapeType::Face);
    !faces.is_empty()
        && faces.iter().all(|face| {
            kernel
                .children(*face)
                .iter()
                .filter(|c| kernel.shape_type(**c) == Some(ShapeType::Wire))
                .count()
                <= 1
        })
}

/// Pick the most specific reason for a unit that failed its acceptance test
///
/// Checker findings take precedence over curve complexity, which takes
/// precedence over an empty triangulation.
pub fn diagnose_rejection<K: GeometryKernel + ?Sized>(
    kernel: &K,
    shape: ShapeId,
    outcome: &TessellationOutcome,
    metrics: &EdgeMetrics,
) -> (FailureReason, String) {
    let coverage = format!(
        "{}/{} faces triangulated",
        outcome.triangulated_faces(),
        outcome.face_count()
    );

    if let Ok(report) = kernel.validate_topology(shape) {
        if report.has_status(CheckStatus::SelfIntersectingWire) {
            return (
                FailureReason::SelfIntersecting,
                format!("self-intersecting wire ({})", coverage),
            );
        }
        if report.has_status(CheckStatus::InvalidMultiConnexity)
            || report.has_status(CheckStatus::FreeEdge)
        {
            return (
                FailureReason::NonManifold,
                format!("non-manifold edges ({})", coverage),
            );
        }
        if report.has_status(CheckStatus::InvalidDegeneratedFlag) || metrics.degenerate_edges > 0 {
            return (
                FailureReason::DegenerateEdge,
                format!("degenerate edges ({})", coverage),
            );
        }
    }

    if metrics.has_complex_curves {
        return (
            FailureReason::ComplexCurve,
            format!("complex curves ({})", coverage),
        );
    }

    (FailureReason::NoTriangles, coverage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsep_kernel::{CurveClass, EdgeGeometry, FaceGeometry, MemoryKernel};
    use meshsep_kernel::glam::DVec3;

    #[test]
    fn test_valid_face() {
        let kernel = MemoryKernel::new();
        let face = kernel.add_square_face(FaceGeometry::default());
        let validity = check_face_validity(&kernel, face);
        assert!(validity.ok);
        assert_eq!(validity.reason, FailureReason::Success);
    }

    #[test]
    fn test_face_issues_are_listed() {
        let kernel = MemoryKernel::new();
        let face = kernel.add_square_face(
            FaceGeometry::default()
                .with_issue(CheckStatus::NoCurveOnSurface)
                .with_issue(CheckStatus::InvalidRange),
        );
        let validity = check_face_validity(&kernel, face);
        assert!(!validity.ok);
        assert_eq!(validity.reason, FailureReason::DegenerateFace);
        assert!(validity.description.contains("no curve on surface"));
        assert!(validity.description.contains("invalid parameter range"));
    }

    #[test]
    fn test_face_without_surface() {
        let kernel = MemoryKernel::new();
        let face = kernel.add_square_face(FaceGeometry::without_surface());
        let validity = check_face_validity(&kernel, face);
        assert_eq!(validity.reason, FailureReason::NullGeometry);
    }

    #[test]
    fn test_edge_validity() {
        let kernel = MemoryKernel::new();
        let good = kernel.add_edge(EdgeGeometry::line(DVec3::ZERO, DVec3::new(2.0, 0.0, 0.0)));
        let tiny = kernel.add_edge(EdgeGeometry::line(DVec3::ZERO, DVec3::new(1e-9, 0.0, 0.0)));
        let spline = kernel.add_edge(
            EdgeGeometry::line(DVec3::ZERO, DVec3::X).with_curve(CurveClass::Bezier),
        );

        let v = check_edge_validity(&kernel, good);
        assert!(v.ok);
        approx::assert_relative_eq!(v.length, 2.0);
        assert!(!v.complex);

        let v = check_edge_validity(&kernel, tiny);
        assert!(!v.ok);
        assert!(v.description.contains("degenerate"));

        let v = check_edge_validity(&kernel, spline);
        assert!(v.ok);
        assert!(v.complex);
    }

    #[test]
    fn test_edge_metrics() {
        let kernel = MemoryKernel::new();
        let a = kernel.add_edge(EdgeGeometry::line(DVec3::ZERO, DVec3::new(0.5, 0.0, 0.0)));
        let b = kernel.add_edge(
            EdgeGeometry::line(DVec3::ZERO, DVec3::X)
                .with_curve(CurveClass::BSpline)
                .with_length(3.0),
        );
        let wire = kernel.add_wire(&[a, b]);
        let face = kernel.add_face(FaceGeometry::default(), &[wire]);

        let metrics = edge_metrics(&kernel, face);
        assert_eq!(metrics.edge_count, 2);
        approx::assert_relative_eq!(metrics.min_length, 0.5);
        approx::assert_relative_eq!(metrics.max_length, 3.0);
        assert!(metrics.has_complex_curves);
        assert_eq!(metrics.degenerate_edges, 0);
    }

    #[test]
    fn test_watertight_proxy() {
        let kernel = MemoryKernel::new();
        let solid = kernel.add_faceted_solid(&[FaceGeometry::default(), FaceGeometry::default()]);
        assert!(is_watertight(&kernel, solid));

        let outer = kernel.add_wire(&[]);
        let hole = kernel.add_wire(&[]);
        let holed = kernel.add_face(FaceGeometry::default(), &[outer, hole]);
        let shell = kernel.add_shell(&[holed]);
        assert!(!is_watertight(&kernel, shell));

        let empty = kernel.add_shell(&[]);
        assert!(!is_watertight(&kernel, empty));
    }

    #[test]
    fn test_diagnose_prefers_checker_findings() {
        let kernel = MemoryKernel::new();
        let solid = kernel.add_faceted_solid(&[
            FaceGeometry::untriangulable().with_issue(CheckStatus::SelfIntersectingWire),
        ]);
        let outcome = TessellationOutcome {
            done: true,
            faces: Vec::new(),
        };
        let metrics = edge_metrics(&kernel, solid);
        let (reason, _) = diagnose_rejection(&kernel, solid, &outcome, &metrics);
        assert_eq!(reason, FailureReason::SelfIntersecting);

        let plain = kernel.add_faceted_solid(&[FaceGeometry::untriangulable()]);
        let metrics = edge_metrics(&kernel, plain);
        let (reason, description) = diagnose_rejection(&kernel, plain, &outcome, &metrics);
        assert_eq!(reason, FailureReason::NoTriangles);
        assert_eq!(description, "0/0 faces triangulated");
    }
}
