//! In-memory arena kernel
//!
//! Stores a B-rep tree as an arena of nodes addressed by `ShapeId`, with
//! scripted tessellation, checker and repair behaviour per node. Shared
//! sub-shapes are plain repeated ids in several child lists.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::DVec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{
    CONFUSION_TOLERANCE, CheckStatus, CurveClass, EdgeIssue, FaceTriangulation, GeometryKernel,
    KernelError, KernelResult, ShapeId, ShapeTree, ShapeType, TessellationOutcome,
    TessellationParams, TopologyReport,
};

/// Scripted response of the mesher for a shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum TessellationScript {
    /// Mesh every face according to its face geometry
    #[default]
    Auto,
    /// Mesher reports that it did not complete
    Fail,
    /// Mesher raises an error with the given message
    Error(String),
}

/// Scripted response of the repair primitive for a shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum RepairScript {
    /// Return the input unchanged
    #[default]
    Identity,
    /// Return the given shape as the repaired copy
    Replace(ShapeId),
    /// Repair raises an error with the given message
    Error(String),
}

/// Surface data of a face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceGeometry {
    /// Triangles produced when the face is meshed (0 = empty triangulation)
    pub triangles: usize,
    /// Whether the face has an underlying surface
    pub has_surface: bool,
    /// Findings reported by the topology checker
    pub issues: Vec<CheckStatus>,
}

impl FaceGeometry {
    /// A valid face that meshes into the given number of triangles
    pub fn triangulated(triangles: usize) -> Self {
        Self {
            triangles,
            has_surface: true,
            issues: Vec::new(),
        }
    }

    /// A valid face whose triangulation comes out empty
    pub fn untriangulable() -> Self {
        Self::triangulated(0)
    }

    /// A face whose surface geometry is missing
    pub fn without_surface() -> Self {
        Self {
            triangles: 0,
            has_surface: false,
            issues: Vec::new(),
        }
    }

    /// Add a checker finding
    pub fn with_issue(mut self, status: CheckStatus) -> Self {
        self.issues.push(status);
        self
    }
}

impl Default for FaceGeometry {
    fn default() -> Self {
        Self::triangulated(2)
    }
}

/// Curve data of an edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeGeometry {
    pub start: DVec3,
    pub end: DVec3,
    pub curve: CurveClass,
    /// Arc length override for curved edges
    pub length: Option<f64>,
}

impl EdgeGeometry {
    /// A straight edge between two points
    pub fn line(start: DVec3, end: DVec3) -> Self {
        Self {
            start,
            end,
            curve: CurveClass::Line,
            length: None,
        }
    }

    /// Set the curve class
    pub fn with_curve(mut self, curve: CurveClass) -> Self {
        self.curve = curve;
        self
    }

    /// Override the arc length
    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    /// Arc length of the edge
    pub fn length(&self) -> f64 {
        self.length
            .unwrap_or_else(|| self.start.distance(self.end))
    }
}

#[derive(Debug, Clone)]
enum NodeGeometry {
    None,
    Vertex(DVec3),
    Edge(EdgeGeometry),
    Face(FaceGeometry),
}

#[derive(Debug, Clone)]
struct Node {
    kind: ShapeType,
    children: Vec<ShapeId>,
    geometry: NodeGeometry,
    tessellation: TessellationScript,
    repair: RepairScript,
}

impl Node {
    fn new(kind: ShapeType, children: Vec<ShapeId>, geometry: NodeGeometry) -> Self {
        Self {
            kind,
            children,
            geometry,
            tessellation: TessellationScript::Auto,
            repair: RepairScript::Identity,
        }
    }
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn insert(&mut self, node: Node) -> ShapeId {
        self.nodes.push(node);
        ShapeId::new(self.nodes.len() as u64)
    }

    fn get(&self, id: ShapeId) -> Option<&Node> {
        let index = usize::try_from(id.raw()).ok()?.checked_sub(1)?;
        self.nodes.get(index)
    }

    fn get_mut(&mut self, id: ShapeId) -> Option<&mut Node> {
        let index = usize::try_from(id.raw()).ok()?.checked_sub(1)?;
        self.nodes.get_mut(index)
    }
}

/// Arena-backed kernel with scripted behaviour
#[derive(Debug, Default)]
pub struct MemoryKernel {
    arena: RwLock<Arena>,
    tessellation_calls: AtomicUsize,
    repair_calls: AtomicUsize,
}

impl MemoryKernel {
    /// Create an empty kernel
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shapes stored
    pub fn shape_count(&self) -> usize {
        self.arena.read().nodes.len()
    }

    /// Number of tessellation calls made so far
    pub fn tessellation_calls(&self) -> usize {
        self.tessellation_calls.load(Ordering::Relaxed)
    }

    /// Number of repair calls made so far
    pub fn repair_calls(&self) -> usize {
        self.repair_calls.load(Ordering::Relaxed)
    }

    fn insert(&self, node: Node) -> ShapeId {
        self.arena.write().insert(node)
    }

    // ========== Builders ==========

    /// Add a shape of any kind with the given children and no geometry
    pub fn add_node(&self, kind: ShapeType, children: &[ShapeId]) -> ShapeId {
        self.insert(Node::new(kind, children.to_vec(), NodeGeometry::None))
    }

    /// Add a vertex
    pub fn add_vertex(&self, point: DVec3) -> ShapeId {
        self.insert(Node::new(
            ShapeType::Vertex,
            Vec::new(),
            NodeGeometry::Vertex(point),
        ))
    }

    /// Add an edge and its two end vertices
    pub fn add_edge(&self, geometry: EdgeGeometry) -> ShapeId {
        let v0 = self.add_vertex(geometry.start);
        let v1 = self.add_vertex(geometry.end);
        self.insert(Node::new(
            ShapeType::Edge,
            vec![v0, v1],
            NodeGeometry::Edge(geometry),
        ))
    }

    /// Add a wire made of the given edges
    pub fn add_wire(&self, edges: &[ShapeId]) -> ShapeId {
        self.add_node(ShapeType::Wire, edges)
    }

    /// Add a face bounded by the given wires
    pub fn add_face(&self, geometry: FaceGeometry, wires: &[ShapeId]) -> ShapeId {
        self.insert(Node::new(
            ShapeType::Face,
            wires.to_vec(),
            NodeGeometry::Face(geometry),
        ))
    }

    /// Add a unit square face bounded by four straight edges
    pub fn add_square_face(&self, geometry: FaceGeometry) -> ShapeId {
        let corners = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ];
        let edges: Vec<ShapeId> = (0..corners.len())
            .map(|i| {
                let next = corners[(i + 1) % corners.len()];
                self.add_edge(EdgeGeometry::line(corners[i], next))
            })
            .collect();
        let wire = self.add_wire(&edges);
        self.add_face(geometry, &[wire])
    }

    /// Add a shell made of the given faces
    pub fn add_shell(&self, faces: &[ShapeId]) -> ShapeId {
        self.add_node(ShapeType::Shell, faces)
    }

    /// Add a solid bounded by the given shells
    pub fn add_solid(&self, shells: &[ShapeId]) -> ShapeId {
        self.add_node(ShapeType::Solid, shells)
    }

    /// Add a solid with a single shell of square faces
    pub fn add_faceted_solid(&self, faces: &[FaceGeometry]) -> ShapeId {
        let faces: Vec<ShapeId> = faces
            .iter()
            .map(|g| self.add_square_face(g.clone()))
            .collect();
        let shell = self.add_shell(&faces);
        self.add_solid(&[shell])
    }

    /// Add a compsolid grouping the given solids
    pub fn add_comp_solid(&self, solids: &[ShapeId]) -> ShapeId {
        self.add_node(ShapeType::CompSolid, solids)
    }

    /// Add a compound grouping arbitrary shapes
    pub fn add_compound(&self, children: &[ShapeId]) -> ShapeId {
        self.add_node(ShapeType::Compound, children)
    }

    // ========== Scripting ==========

    /// Set the mesher response for a shape
    pub fn set_tessellation(&self, shape: ShapeId, script: TessellationScript) -> KernelResult<()> {
        let mut arena = self.arena.write();
        let node = arena.get_mut(shape).ok_or(KernelError::NullShape(shape))?;
        node.tessellation = script;
        Ok(())
    }

    /// Set the repair response for a shape
    pub fn set_repair(&self, shape: ShapeId, script: RepairScript) -> KernelResult<()> {
        let mut arena = self.arena.write();
        let node = arena.get_mut(shape).ok_or(KernelError::NullShape(shape))?;
        node.repair = script;
        Ok(())
    }

    /// Replace the surface data of a face
    pub fn set_face_geometry(&self, face: ShapeId, geometry: FaceGeometry) -> KernelResult<()> {
        let mut arena = self.arena.write();
        let node = arena.get_mut(face).ok_or(KernelError::NullShape(face))?;
        if node.kind != ShapeType::Face {
            return Err(KernelError::Model(format!("{} is not a face", face)));
        }
        node.geometry = NodeGeometry::Face(geometry);
        Ok(())
    }

    /// Triangles a face contributes when meshed as part of a larger unit
    fn face_triangles(&self, arena: &Arena, face: ShapeId) -> usize {
        match arena.get(face) {
            Some(Node {
                geometry: NodeGeometry::Face(geometry),
                tessellation: TessellationScript::Auto,
                ..
            }) if geometry.has_surface => geometry.triangles,
            _ => 0,
        }
    }

    fn edge_geometry(&self, edge: ShapeId) -> KernelResult<EdgeGeometry> {
        let arena = self.arena.read();
        match arena.get(edge) {
            Some(Node {
                geometry: NodeGeometry::Edge(geometry),
                ..
            }) => Ok(geometry.clone()),
            Some(node) => Err(KernelError::Geometry(format!(
                "{} is a {}, not an edge",
                edge, node.kind
            ))),
            None => Err(KernelError::NullShape(edge)),
        }
    }
}

impl ShapeTree for MemoryKernel {
    fn shape_type(&self, shape: ShapeId) -> Option<ShapeType> {
        self.arena.read().get(shape).map(|n| n.kind)
    }

    fn children(&self, shape: ShapeId) -> Vec<ShapeId> {
        self.arena
            .read()
            .get(shape)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }
}

impl GeometryKernel for MemoryKernel {
    fn name(&self) -> &str {
        "memory"
    }

    fn tessellate(
        &self,
        shape: ShapeId,
        params: &TessellationParams,
    ) -> KernelResult<TessellationOutcome> {
        self.tessellation_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            "Tessellating {} (deflection {}, angle {})",
            shape,
            params.linear_deflection,
            params.angular_deflection
        );

        let script = {
            let arena = self.arena.read();
            let node = arena.get(shape).ok_or(KernelError::NullShape(shape))?;
            node.tessellation.clone()
        };

        let faces = self.sub_shapes(shape, ShapeType::Face);
        let arena = self.arena.read();

        match script {
            TessellationScript::Error(message) => Err(KernelError::Tessellation(message)),
            TessellationScript::Fail => Ok(TessellationOutcome {
                done: false,
                faces: faces
                    .into_iter()
                    .map(|face| FaceTriangulation { face, triangles: 0 })
                    .collect(),
            }),
            TessellationScript::Auto => Ok(TessellationOutcome {
                done: true,
                faces: faces
                    .into_iter()
                    .map(|face| FaceTriangulation {
                        face,
                        triangles: self.face_triangles(&arena, face),
                    })
                    .collect(),
            }),
        }
    }

    fn validate_topology(&self, shape: ShapeId) -> KernelResult<TopologyReport> {
        if self.is_null(shape) {
            return Err(KernelError::NullShape(shape));
        }

        let mut report = TopologyReport::valid();
        let faces = self.sub_shapes(shape, ShapeType::Face);
        {
            let arena = self.arena.read();
            for face in &faces {
                if let Some(Node {
                    geometry: NodeGeometry::Face(geometry),
                    ..
                }) = arena.get(*face)
                {
                    report.issues.extend(
                        geometry
                            .issues
                            .iter()
                            .map(|status| EdgeIssue::new(None, *status)),
                    );
                }
            }
        }

        for edge in self.sub_shapes(shape, ShapeType::Edge) {
            let geometry = self.edge_geometry(edge)?;
            if geometry.length() < CONFUSION_TOLERANCE {
                report.issues.push(EdgeIssue::new(
                    Some(edge),
                    CheckStatus::InvalidDegeneratedFlag,
                ));
            }
        }

        Ok(report)
    }

    fn repair(&self, shape: ShapeId) -> KernelResult<ShapeId> {
        self.repair_calls.fetch_add(1, Ordering::Relaxed);
        let arena = self.arena.read();
        let node = arena.get(shape).ok_or(KernelError::NullShape(shape))?;
        match &node.repair {
            RepairScript::Identity => Ok(shape),
            RepairScript::Replace(repaired) => Ok(*repaired),
            RepairScript::Error(message) => Err(KernelError::Repair(message.clone())),
        }
    }

    fn curve_length(&self, edge: ShapeId) -> KernelResult<f64> {
        Ok(self.edge_geometry(edge)?.length())
    }

    fn curve_class(&self, edge: ShapeId) -> KernelResult<CurveClass> {
        Ok(self.edge_geometry(edge)?.curve)
    }

    fn has_surface(&self, face: ShapeId) -> bool {
        matches!(
            self.arena.read().get(face),
            Some(Node {
                geometry: NodeGeometry::Face(FaceGeometry {
                    has_surface: true,
                    ..
                }),
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_face_structure() {
        let kernel = MemoryKernel::new();
        let face = kernel.add_square_face(FaceGeometry::triangulated(2));

        assert_eq!(kernel.shape_type(face), Some(ShapeType::Face));
        assert_eq!(kernel.sub_shapes(face, ShapeType::Wire).len(), 1);
        assert_eq!(kernel.sub_shapes(face, ShapeType::Edge).len(), 4);
        assert_eq!(kernel.sub_shapes(face, ShapeType::Vertex).len(), 8);
    }

    #[test]
    fn test_shared_face_is_explored_once() {
        let kernel = MemoryKernel::new();
        let face = kernel.add_square_face(FaceGeometry::default());
        let a = kernel.add_shell(&[face]);
        let b = kernel.add_shell(&[face]);
        let root = kernel.add_compound(&[a, b]);

        assert_eq!(kernel.sub_shapes(root, ShapeType::Face), vec![face]);
        assert_eq!(kernel.sub_shapes(root, ShapeType::Shell), vec![a, b]);

        // shell, face, wire, 4 edges and 8 vertices under `a`, then `b`
        let below = kernel.descendants(root);
        assert_eq!(below.len(), 16);
        assert_eq!(below[0], a);
        assert_eq!(below[1], face);
        assert_eq!(below.last(), Some(&b));
        assert!(!below.contains(&root));
        assert!(kernel.descendants(face).iter().all(|s| *s != a && *s != b));
    }

    #[test]
    fn test_tessellate_reports_every_face() {
        let kernel = MemoryKernel::new();
        let solid = kernel.add_faceted_solid(&[
            FaceGeometry::triangulated(4),
            FaceGeometry::untriangulable(),
            FaceGeometry::without_surface(),
        ]);

        let outcome = kernel
            .tessellate(solid, &TessellationParams::default())
            .unwrap();
        assert!(outcome.done);
        assert_eq!(outcome.face_count(), 3);
        assert_eq!(outcome.triangulated_faces(), 1);
        assert_eq!(outcome.triangle_count(), 4);
        assert_eq!(kernel.tessellation_calls(), 1);
    }

    #[test]
    fn test_scripted_failures() {
        let kernel = MemoryKernel::new();
        let solid = kernel.add_faceted_solid(&[FaceGeometry::default()]);
        let params = TessellationParams::default();

        kernel
            .set_tessellation(solid, TessellationScript::Fail)
            .unwrap();
        let outcome = kernel.tessellate(solid, &params).unwrap();
        assert!(!outcome.done);
        assert_eq!(outcome.triangulated_faces(), 0);

        kernel
            .set_tessellation(solid, TessellationScript::Error("boom".into()))
            .unwrap();
        let err = kernel.tessellate(solid, &params).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_failing_face_inside_meshable_shell() {
        let kernel = MemoryKernel::new();
        let good = kernel.add_square_face(FaceGeometry::triangulated(2));
        let bad = kernel.add_square_face(FaceGeometry::triangulated(2));
        kernel.set_tessellation(bad, TessellationScript::Fail).unwrap();
        let shell = kernel.add_shell(&[good, bad]);

        let outcome = kernel
            .tessellate(shell, &TessellationParams::default())
            .unwrap();
        assert_eq!(outcome.triangulated_faces(), 1);
    }

    #[test]
    fn test_degenerate_edge_is_reported() {
        let kernel = MemoryKernel::new();
        let short = kernel.add_edge(EdgeGeometry::line(DVec3::ZERO, DVec3::new(1e-9, 0.0, 0.0)));
        let long = kernel.add_edge(EdgeGeometry::line(DVec3::ZERO, DVec3::X));
        let wire = kernel.add_wire(&[short, long]);
        let face = kernel.add_face(FaceGeometry::default(), &[wire]);

        let report = kernel.validate_topology(face).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].edge, Some(short));
        assert!(report.has_status(CheckStatus::InvalidDegeneratedFlag));
    }

    #[test]
    fn test_edge_queries() {
        let kernel = MemoryKernel::new();
        let edge = kernel.add_edge(
            EdgeGeometry::line(DVec3::ZERO, DVec3::X)
                .with_curve(CurveClass::BSpline)
                .with_length(2.5),
        );
        approx::assert_relative_eq!(kernel.curve_length(edge).unwrap(), 2.5);
        assert_eq!(kernel.curve_class(edge).unwrap(), CurveClass::BSpline);

        let face = kernel.add_square_face(FaceGeometry::default());
        assert!(matches!(
            kernel.curve_length(face),
            Err(KernelError::Geometry(_))
        ));
    }

    #[test]
    fn test_repair_scripts() {
        let kernel = MemoryKernel::new();
        let original = kernel.add_square_face(FaceGeometry::untriangulable());
        let fixed = kernel.add_square_face(FaceGeometry::triangulated(2));

        assert_eq!(kernel.repair(original).unwrap(), original);
        kernel
            .set_repair(original, RepairScript::Replace(fixed))
            .unwrap();
        assert_eq!(kernel.repair(original).unwrap(), fixed);
        kernel
            .set_repair(original, RepairScript::Error("cannot sew".into()))
            .unwrap();
        assert!(matches!(kernel.repair(original), Err(KernelError::Repair(_))));
        assert_eq!(kernel.repair_calls(), 3);
    }

    #[test]
    fn test_unknown_handle() {
        let kernel = MemoryKernel::new();
        let missing = ShapeId::new(42);
        assert!(kernel.is_null(missing));
        assert!(kernel.children(missing).is_empty());
        assert!(matches!(
            kernel.tessellate(missing, &TessellationParams::default()),
            Err(KernelError::NullShape(_))
        ));
    }
}
