//! Model description files
//!
//! A `ShapeSpec` describes a B-rep tree together with the scripted kernel
//! behaviour of each node, so a `MemoryKernel` can be built from a RON file.

use std::collections::HashMap;
use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{
    CheckStatus, CurveClass, EdgeGeometry, FaceGeometry, KernelError, KernelResult, MemoryKernel,
    RepairScript, ShapeId, ShapeType, TessellationScript,
};

/// One node of a model description
///
/// Faces without wires get a unit square boundary. Edges always get two
/// end vertices. A node with `reference` set reuses the shape labelled with
/// that name instead of creating a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeSpec {
    pub kind: ShapeType,
    /// Name other nodes can refer to
    pub label: Option<String>,
    /// Label of a previously described shape to share
    pub reference: Option<String>,
    pub children: Vec<ShapeSpec>,
    pub tessellation: TessellationScript,
    /// Label of the shape returned by the repair primitive
    pub repair_with: Option<String>,
    /// Error raised by the repair primitive
    pub repair_error: Option<String>,
    /// Face: triangles produced when meshed
    pub triangles: usize,
    /// Face: whether surface geometry is present
    pub surface: bool,
    /// Face: checker findings
    pub issues: Vec<CheckStatus>,
    /// Edge: arc length
    pub length: f64,
    /// Edge: curve class
    pub curve: CurveClass,
}

impl Default for ShapeSpec {
    fn default() -> Self {
        Self {
            kind: ShapeType::Compound,
            label: None,
            reference: None,
            children: Vec::new(),
            tessellation: TessellationScript::Auto,
            repair_with: None,
            repair_error: None,
            triangles: 2,
            surface: true,
            issues: Vec::new(),
            length: 1.0,
            curve: CurveClass::Line,
        }
    }
}

impl ShapeSpec {
    /// A node of the given kind with default behaviour
    pub fn new(kind: ShapeType) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// A node that shares a labelled shape
    pub fn reference(label: impl Into<String>) -> Self {
        Self {
            reference: Some(label.into()),
            ..Default::default()
        }
    }

    /// Set the children
    pub fn with_children(mut self, children: Vec<ShapeSpec>) -> Self {
        self.children = children;
        self
    }

    /// Set the label
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mesher script
    pub fn with_tessellation(mut self, script: TessellationScript) -> Self {
        self.tessellation = script;
        self
    }

    /// Set the face triangle count
    pub fn with_triangles(mut self, triangles: usize) -> Self {
        self.triangles = triangles;
        self
    }

    /// Parse a description from RON text
    pub fn from_ron_str(content: &str) -> KernelResult<Self> {
        ron::from_str(content).map_err(|e| KernelError::Model(e.to_string()))
    }

    /// Serialize the description to RON text
    pub fn to_ron_string(&self) -> KernelResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| KernelError::Model(e.to_string()))
    }
}

/// Pending repair mappings, resolved once every label is known
struct PendingRepair {
    shape: ShapeId,
    target: String,
}

struct SpecBuilder<'a> {
    kernel: &'a MemoryKernel,
    labels: HashMap<String, ShapeId>,
    repairs: Vec<PendingRepair>,
}

impl SpecBuilder<'_> {
    fn build(&mut self, spec: &ShapeSpec) -> KernelResult<ShapeId> {
        if let Some(label) = &spec.reference {
            return self
                .labels
                .get(label)
                .copied()
                .ok_or_else(|| KernelError::Model(format!("Unknown shape label '{}'", label)));
        }

        let id = match spec.kind {
            ShapeType::Vertex => self.kernel.add_vertex(DVec3::ZERO),
            ShapeType::Edge => self.kernel.add_edge(
                EdgeGeometry::line(DVec3::ZERO, DVec3::new(spec.length, 0.0, 0.0))
                    .with_curve(spec.curve),
            ),
            ShapeType::Face => {
                let geometry = FaceGeometry {
                    triangles: spec.triangles,
                    has_surface: spec.surface,
                    issues: spec.issues.clone(),
                };
                if spec.children.is_empty() {
                    self.kernel.add_square_face(geometry)
                } else {
                    let wires = self.build_children(spec)?;
                    self.kernel.add_face(geometry, &wires)
                }
            }
            kind => {
                let children = self.build_children(spec)?;
                self.kernel.add_node(kind, &children)
            }
        };

        if spec.tessellation != TessellationScript::Auto {
            self.kernel.set_tessellation(id, spec.tessellation.clone())?;
        }
        if let Some(message) = &spec.repair_error {
            self.kernel
                .set_repair(id, RepairScript::Error(message.clone()))?;
        }
        if let Some(target) = &spec.repair_with {
            self.repairs.push(PendingRepair {
                shape: id,
                target: target.clone(),
            });
        }
        if let Some(label) = &spec.label {
            if self.labels.insert(label.clone(), id).is_some() {
                return Err(KernelError::Model(format!(
                    "Duplicate shape label '{}'",
                    label
                )));
            }
        }

        Ok(id)
    }

    fn build_children(&mut self, spec: &ShapeSpec) -> KernelResult<Vec<ShapeId>> {
        spec.children.iter().map(|c| self.build(c)).collect()
    }

    fn resolve_repairs(&mut self) -> KernelResult<()> {
        for pending in std::mem::take(&mut self.repairs) {
            let target = self.labels.get(&pending.target).copied().ok_or_else(|| {
                KernelError::Model(format!("Unknown repair target '{}'", pending.target))
            })?;
            self.kernel
                .set_repair(pending.shape, RepairScript::Replace(target))?;
        }
        Ok(())
    }
}

impl MemoryKernel {
    /// Add the shapes described by `spec`, returning the id of its root
    pub fn add_spec(&self, spec: &ShapeSpec) -> KernelResult<ShapeId> {
        let mut builder = SpecBuilder {
            kernel: self,
            labels: HashMap::new(),
            repairs: Vec::new(),
        };
        let root = builder.build(spec)?;
        builder.resolve_repairs()?;
        Ok(root)
    }

    /// Build a kernel holding the described model
    pub fn from_spec(spec: &ShapeSpec) -> KernelResult<(Self, ShapeId)> {
        let kernel = Self::new();
        let root = kernel.add_spec(spec)?;
        tracing::debug!("Built model with {} shapes", kernel.shape_count());
        Ok((kernel, root))
    }

    /// Load a model description from a RON file
    pub fn load_model(path: impl AsRef<Path>) -> KernelResult<(Self, ShapeId)> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Model(format!("{}: {}", path.display(), e)))?;
        let spec = ShapeSpec::from_ron_str(&content)?;
        Self::from_spec(&spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{GeometryKernel, ShapeTree, TessellationParams};

    const MODEL: &str = r#"
        (
            kind: Compound,
            children: [
                (
                    kind: Solid,
                    children: [
                        (kind: Shell, children: [
                            (kind: Face, label: Some("shared"), triangles: 8),
                            (kind: Face, triangles: 0),
                        ]),
                    ],
                ),
                (kind: Shell, children: [(reference: Some("shared"))]),
                (kind: Wire, children: [(kind: Edge, length: 3.0, curve: BSpline)]),
                (kind: Face, tessellation: Error("kernel exploded"), repair_with: Some("fixed")),
                (kind: Face, label: Some("fixed")),
            ],
        )
    "#;

    #[test]
    fn test_build_from_ron() {
        let spec = ShapeSpec::from_ron_str(MODEL).unwrap();
        let (kernel, root) = MemoryKernel::from_spec(&spec).unwrap();

        assert_eq!(kernel.shape_type(root), Some(ShapeType::Compound));
        assert_eq!(kernel.children(root).len(), 5);
        // The shared face is a single entity reachable twice
        assert_eq!(kernel.sub_shapes(root, ShapeType::Face).len(), 4);

        let solid = kernel.children(root)[0];
        let outcome = kernel
            .tessellate(solid, &TessellationParams::default())
            .unwrap();
        assert_eq!(outcome.triangle_count(), 8);
        assert_eq!(outcome.triangulated_faces(), 1);

        let edge = kernel.sub_shapes(root, ShapeType::Edge)
            .into_iter()
            .find(|e| kernel.curve_class(*e).unwrap() == CurveClass::BSpline)
            .unwrap();
        approx::assert_relative_eq!(kernel.curve_length(edge).unwrap(), 3.0);

        let broken = kernel.children(root)[3];
        let fixed = kernel.children(root)[4];
        assert_eq!(kernel.repair(broken).unwrap(), fixed);
    }

    #[test]
    fn test_unknown_reference() {
        let spec = ShapeSpec::new(ShapeType::Compound)
            .with_children(vec![ShapeSpec::reference("missing")]);
        assert!(matches!(
            MemoryKernel::from_spec(&spec),
            Err(KernelError::Model(_))
        ));
    }

    #[test]
    fn test_duplicate_label() {
        let spec = ShapeSpec::new(ShapeType::Compound).with_children(vec![
            ShapeSpec::new(ShapeType::Face).labeled("a"),
            ShapeSpec::new(ShapeType::Face).labeled("a"),
        ]);
        assert!(MemoryKernel::from_spec(&spec).is_err());
    }

    #[test]
    fn test_load_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ron");
        let spec = ShapeSpec::new(ShapeType::Shell).with_children(vec![
            ShapeSpec::new(ShapeType::Face).with_triangles(6),
        ]);
        std::fs::write(&path, spec.to_ron_string().unwrap()).unwrap();

        let (kernel, root) = MemoryKernel::load_model(&path).unwrap();
        assert_eq!(kernel.shape_type(root), Some(ShapeType::Shell));
        assert_eq!(kernel.sub_shapes(root, ShapeType::Face).len(), 1);

        assert!(MemoryKernel::load_model(dir.path().join("missing.ron")).is_err());
    }
}
