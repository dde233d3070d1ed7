//! Truck Kernel Backend
//!
//! Exposes Truck B-rep solids through the shape tree and kernel traits.
//!
//! Note: Truck has no compound or healing primitives. Compounds are kept
//! by this adapter, and repair returns its input unchanged.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::RwLock;
use truck_meshalgo::prelude::*;
use truck_modeling::{Curve, Edge, Face, InnerSpace, Point3, Shell, Solid, Vertex, Wire};
use truck_modeling::{BSplineCurve, BoundedCurve, ParametricCurve, Vector4};
use truck_polymesh::PolygonMesh;
use truck_topology::{EdgeID, FaceID, VertexID};

use super::{
    CheckStatus, CurveClass, EdgeIssue, FaceTriangulation, GeometryKernel, KernelError,
    KernelResult, ShapeId, ShapeTree, ShapeType, TessellationOutcome, TessellationParams,
    TopologyReport, CONFUSION_TOLERANCE,
};

/// Samples used to approximate arc length
const LENGTH_SAMPLES: usize = 64;

enum TruckNode {
    Compound,
    Solid(Solid),
    Shell(Shell),
    Face(Face),
    Wire(Wire),
    Edge(Edge),
    Vertex(Vertex),
}

impl TruckNode {
    fn kind(&self) -> ShapeType {
        match self {
            TruckNode::Compound => ShapeType::Compound,
            TruckNode::Solid(_) => ShapeType::Solid,
            TruckNode::Shell(_) => ShapeType::Shell,
            TruckNode::Face(_) => ShapeType::Face,
            TruckNode::Wire(_) => ShapeType::Wire,
            TruckNode::Edge(_) => ShapeType::Edge,
            TruckNode::Vertex(_) => ShapeType::Vertex,
        }
    }
}

struct Entry {
    node: TruckNode,
    children: Vec<ShapeId>,
}

/// Registered shapes, with Truck's own ids mapped to ours so shared
/// faces, edges and vertices keep a single identity
#[derive(Default)]
struct Store {
    entries: Vec<Entry>,
    faces: HashMap<FaceID<truck_modeling::Surface>, ShapeId>,
    edges: HashMap<EdgeID<Curve>, ShapeId>,
    vertices: HashMap<VertexID<Point3>, ShapeId>,
}

impl Store {
    fn push(&mut self, node: TruckNode, children: Vec<ShapeId>) -> ShapeId {
        self.entries.push(Entry { node, children });
        ShapeId::new(self.entries.len() as u64)
    }

    fn get(&self, id: ShapeId) -> Option<&Entry> {
        let index = usize::try_from(id.raw()).ok()?.checked_sub(1)?;
        self.entries.get(index)
    }

    fn register_vertex(&mut self, vertex: &Vertex) -> ShapeId {
        if let Some(id) = self.vertices.get(&vertex.id()) {
            return *id;
        }
        let id = self.push(TruckNode::Vertex(vertex.clone()), Vec::new());
        self.vertices.insert(vertex.id(), id);
        id
    }

    fn register_edge(&mut self, edge: &Edge) -> ShapeId {
        if let Some(id) = self.edges.get(&edge.id()) {
            return *id;
        }
        let front = self.register_vertex(edge.absolute_front());
        let back = self.register_vertex(edge.absolute_back());
        let id = self.push(TruckNode::Edge(edge.clone()), vec![front, back]);
        self.edges.insert(edge.id(), id);
        id
    }

    fn register_wire(&mut self, wire: &Wire) -> ShapeId {
        let edges = wire.edge_iter().map(|e| self.register_edge(e)).collect();
        self.push(TruckNode::Wire(wire.clone()), edges)
    }

    fn register_face(&mut self, face: &Face) -> ShapeId {
        if let Some(id) = self.faces.get(&face.id()) {
            return *id;
        }
        let wires = face
            .absolute_boundaries()
            .iter()
            .map(|w| self.register_wire(w))
            .collect();
        let id = self.push(TruckNode::Face(face.clone()), wires);
        self.faces.insert(face.id(), id);
        id
    }

    fn register_shell(&mut self, shell: &Shell) -> ShapeId {
        let faces = shell.face_iter().map(|f| self.register_face(f)).collect();
        self.push(TruckNode::Shell(shell.clone()), faces)
    }

    fn register_solid(&mut self, solid: &Solid) -> ShapeId {
        let shells = solid
            .boundaries()
            .iter()
            .map(|s| self.register_shell(s))
            .collect();
        self.push(TruckNode::Solid(solid.clone()), shells)
    }
}

/// Truck-based geometry kernel
pub struct TruckKernel {
    store: RwLock<Store>,
}

impl TruckKernel {
    /// Create an empty Truck kernel
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
        }
    }

    /// Register a solid and return its id
    pub fn insert_solid(&self, solid: &Solid) -> ShapeId {
        self.store.write().register_solid(solid)
    }

    /// Register a shell and return its id
    pub fn insert_shell(&self, shell: &Shell) -> ShapeId {
        self.store.write().register_shell(shell)
    }

    /// Register a face and return its id
    pub fn insert_face(&self, face: &Face) -> ShapeId {
        self.store.write().register_face(face)
    }

    /// Register several solids grouped under one compound
    pub fn insert_compound(&self, solids: &[Solid]) -> ShapeId {
        let mut store = self.store.write();
        let children = solids.iter().map(|s| store.register_solid(s)).collect();
        store.push(TruckNode::Compound, children)
    }

    /// Linear tolerance for a shape, scaled by its extent when relative
    fn tolerance(&self, shape: ShapeId, params: &TessellationParams) -> f64 {
        if !params.relative {
            return params.linear_deflection;
        }
        let vertices = self.sub_shapes(shape, ShapeType::Vertex);
        let store = self.store.read();
        let points: Vec<Point3> = vertices
            .into_iter()
            .filter_map(|v| match store.get(v).map(|e| &e.node) {
                Some(TruckNode::Vertex(vertex)) => Some(vertex.point()),
                _ => None,
            })
            .collect();
        let Some(first) = points.first().copied() else {
            return params.linear_deflection;
        };
        let (mut min, mut max) = (first, first);
        for p in &points {
            min = Point3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Point3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        let diameter = (max - min).magnitude();
        if diameter > CONFUSION_TOLERANCE {
            params.linear_deflection * diameter
        } else {
            params.linear_deflection
        }
    }

    fn edge(&self, edge: ShapeId) -> KernelResult<Edge> {
        match self.store.read().get(edge).map(|e| &e.node) {
            Some(TruckNode::Edge(e)) => Ok(e.clone()),
            Some(other) => Err(KernelError::Geometry(format!(
                "{} is a {}, not an edge",
                edge,
                other.kind()
            ))),
            None => Err(KernelError::NullShape(edge)),
        }
    }
}

impl Default for TruckKernel {
    fn default() -> Self {
        Self::new()
    }
}

fn triangle_count(mesh: &PolygonMesh) -> usize {
    mesh.tri_faces().len()
        + mesh.quad_faces().len() * 2
        + mesh
            .other_faces()
            .iter()
            .map(|f| f.len().saturating_sub(2))
            .sum::<usize>()
}

fn shell_triangles(shell: &Shell, tol: f64) -> Vec<usize> {
    shell
        .triangulation(tol)
        .face_iter()
        .map(|face| face.surface().as_ref().map(triangle_count).unwrap_or(0))
        .collect()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "mesher panicked".to_string()
    }
}

fn arc_length(curve: &Curve) -> f64 {
    let (t0, t1) = curve.range_tuple();
    let mut previous = curve.subs(t0);
    let mut length = 0.0;
    for i in 1..=LENGTH_SAMPLES {
        let t = t0 + (t1 - t0) * i as f64 / LENGTH_SAMPLES as f64;
        let point = curve.subs(t);
        length += (point - previous).magnitude();
        previous = point;
    }
    length
}

/// Quadratic with varying weights: a conic arc
fn is_rational_conic(curve: &BSplineCurve<Vector4>) -> bool {
    let mut weights = curve.control_points().iter().map(|point| point.w);
    let Some(first) = weights.next() else {
        return false;
    };
    curve.degree() == 2 && weights.any(|w| (w - first).abs() > CONFUSION_TOLERANCE)
}

impl ShapeTree for TruckKernel {
    fn shape_type(&self, shape: ShapeId) -> Option<ShapeType> {
        self.store.read().get(shape).map(|e| e.node.kind())
    }

    fn children(&self, shape: ShapeId) -> Vec<ShapeId> {
        self.store
            .read()
            .get(shape)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }
}

impl GeometryKernel for TruckKernel {
    fn name(&self) -> &str {
        "truck"
    }

    fn tessellate(
        &self,
        shape: ShapeId,
        params: &TessellationParams,
    ) -> KernelResult<TessellationOutcome> {
        let tol = self.tolerance(shape, params);
        let kind = self.shape_type(shape).ok_or(KernelError::NullShape(shape))?;

        let shell_ids = self.sub_shapes(shape, ShapeType::Shell);

        // Faces in the order the mesher returns them
        let (faces, shells): (Vec<ShapeId>, Vec<Shell>) = {
            let store = self.store.read();
            match kind {
                ShapeType::Face => match store.get(shape).map(|e| &e.node) {
                    Some(TruckNode::Face(face)) => {
                        (vec![shape], vec![Shell::from(vec![face.clone()])])
                    }
                    _ => return Err(KernelError::NullShape(shape)),
                },
                ShapeType::Wire | ShapeType::Edge | ShapeType::Vertex => {
                    return Ok(TessellationOutcome {
                        done: true,
                        faces: Vec::new(),
                    });
                }
                _ => {
                    let mut faces = Vec::new();
                    let mut shells = Vec::new();
                    for shell_id in shell_ids {
                        if let Some(Entry {
                            node: TruckNode::Shell(shell),
                            children,
                        }) = store.get(shell_id)
                        {
                            faces.extend(children.iter().copied());
                            shells.push(shell.clone());
                        }
                    }
                    (faces, shells)
                }
            }
        };

        let meshed = panic::catch_unwind(AssertUnwindSafe(|| {
            shells
                .iter()
                .flat_map(|shell| shell_triangles(shell, tol))
                .collect::<Vec<usize>>()
        }))
        .map_err(|payload| KernelError::Tessellation(panic_message(payload)))?;

        if meshed.len() != faces.len() {
            return Ok(TessellationOutcome {
                done: false,
                faces: faces
                    .into_iter()
                    .map(|face| FaceTriangulation { face, triangles: 0 })
                    .collect(),
            });
        }

        Ok(TessellationOutcome {
            done: true,
            faces: faces
                .into_iter()
                .zip(meshed)
                .map(|(face, triangles)| FaceTriangulation { face, triangles })
                .collect(),
        })
    }

    fn validate_topology(&self, shape: ShapeId) -> KernelResult<TopologyReport> {
        if self.is_null(shape) {
            return Err(KernelError::NullShape(shape));
        }

        let mut report = TopologyReport::valid();
        for wire_id in self.sub_shapes(shape, ShapeType::Wire) {
            let closed = match self.store.read().get(wire_id).map(|e| &e.node) {
                Some(TruckNode::Wire(wire)) => wire.is_closed(),
                _ => true,
            };
            if !closed {
                report
                    .issues
                    .push(EdgeIssue::new(None, CheckStatus::NotClosed));
            }
        }
        for edge_id in self.sub_shapes(shape, ShapeType::Edge) {
            if self.curve_length(edge_id)? < CONFUSION_TOLERANCE {
                report.issues.push(EdgeIssue::new(
                    Some(edge_id),
                    CheckStatus::InvalidDegeneratedFlag,
                ));
            }
        }
        Ok(report)
    }

    fn repair(&self, shape: ShapeId) -> KernelResult<ShapeId> {
        if self.is_null(shape) {
            return Err(KernelError::NullShape(shape));
        }
        tracing::trace!("Truck kernel has no healing, keeping {}", shape);
        Ok(shape)
    }

    fn curve_length(&self, edge: ShapeId) -> KernelResult<f64> {
        let curve = self.edge(edge)?.curve();
        panic::catch_unwind(AssertUnwindSafe(|| arc_length(&curve)))
            .map_err(|payload| KernelError::Geometry(panic_message(payload)))
    }

    fn curve_class(&self, edge: ShapeId) -> KernelResult<CurveClass> {
        let class = match self.edge(edge)?.curve() {
            Curve::Line(_) => CurveClass::Line,
            // Truck stores circle and ellipse arcs as rational quadratic NURBS;
            // the two cannot be told apart here, both report as Circle
            Curve::NurbsCurve(nurbs) if is_rational_conic(nurbs.non_rationalized()) => {
                CurveClass::Circle
            }
            Curve::BSplineCurve(_) | Curve::NurbsCurve(_) => CurveClass::BSpline,
            #[allow(unreachable_patterns)]
            _ => CurveClass::Other,
        };
        Ok(class)
    }

    fn has_surface(&self, face: ShapeId) -> bool {
        matches!(
            self.store.read().get(face).map(|e| &e.node),
            Some(TruckNode::Face(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truck_modeling::{Vector3, builder};

    fn unit_cube() -> Solid {
        let vertex = builder::vertex(Point3::new(0.0, 0.0, 0.0));
        let edge = builder::tsweep(&vertex, Vector3::new(1.0, 0.0, 0.0));
        let face = builder::tsweep(&edge, Vector3::new(0.0, 1.0, 0.0));
        builder::tsweep(&face, Vector3::new(0.0, 0.0, 1.0))
    }

    fn unit_cylinder() -> Solid {
        let vertex = builder::vertex(Point3::new(1.0, 0.0, 0.0));
        let circle = builder::rsweep(
            &vertex,
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_z(),
            truck_modeling::Rad(7.0),
        );
        let disk = builder::try_attach_plane(&[circle]).unwrap();
        builder::tsweep(&disk, Vector3::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn test_cube_structure() {
        let kernel = TruckKernel::new();
        let cube = kernel.insert_solid(&unit_cube());

        assert_eq!(kernel.shape_type(cube), Some(ShapeType::Solid));
        assert_eq!(kernel.sub_shapes(cube, ShapeType::Face).len(), 6);
        assert_eq!(kernel.sub_shapes(cube, ShapeType::Edge).len(), 12);
        assert_eq!(kernel.sub_shapes(cube, ShapeType::Vertex).len(), 8);
    }

    #[test]
    fn test_cube_tessellates() {
        let kernel = TruckKernel::new();
        let cube = kernel.insert_solid(&unit_cube());

        let outcome = kernel
            .tessellate(cube, &TessellationParams::default())
            .unwrap();
        assert!(outcome.done);
        assert_eq!(outcome.face_count(), 6);
        assert!(outcome.all_faces_triangulated());
    }

    #[test]
    fn test_cube_edges_are_valid_lines() {
        let kernel = TruckKernel::new();
        let cube = kernel.insert_solid(&unit_cube());

        assert!(kernel.validate_topology(cube).unwrap().is_valid());
        for edge in kernel.sub_shapes(cube, ShapeType::Edge) {
            assert_eq!(kernel.curve_class(edge).unwrap(), CurveClass::Line);
            approx::assert_relative_eq!(kernel.curve_length(edge).unwrap(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_cylinder_circles_are_not_complex() {
        let kernel = TruckKernel::new();
        let cylinder = kernel.insert_solid(&unit_cylinder());

        let classes: Vec<CurveClass> = kernel
            .sub_shapes(cylinder, ShapeType::Edge)
            .into_iter()
            .map(|edge| kernel.curve_class(edge).unwrap())
            .collect();
        assert!(classes.contains(&CurveClass::Circle));
        assert!(classes.contains(&CurveClass::Line));
        assert!(classes.iter().all(|class| !class.is_complex()));
    }
}
