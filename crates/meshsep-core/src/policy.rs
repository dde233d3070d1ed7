//! Acceptance policies
//!
//! A policy decides whether a tessellation outcome is good enough to keep a
//! unit whole, and how the engine walks the tree when it is not.

use std::fmt;

use meshsep_kernel::{ShapeType, TessellationOutcome};

use crate::config::{PolicyKind, SeparationConfig};

/// Slack for comparing face ratios against a threshold
const RATIO_EPSILON: f64 = 1e-9;

/// How the engine walks the tree under a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Try each unit whole and decompose it one level down on rejection
    Recursive,
    /// Classify every unit of the coarsest populated level once, without decomposing
    CoarsestLevel,
}

/// Accept/reject rule plugged into the separation engine
pub trait AcceptancePolicy: fmt::Debug + Send + Sync {
    /// Get the name of this policy
    fn name(&self) -> &str;

    /// Whether a tessellated unit is kept whole
    fn accepts(&self, outcome: &TessellationOutcome) -> bool;

    fn traversal(&self) -> Traversal {
        Traversal::Recursive
    }

    /// Level a rejected unit of `kind` is split into
    fn next_level(&self, kind: ShapeType) -> Option<ShapeType> {
        match kind {
            ShapeType::Compound | ShapeType::CompSolid => Some(ShapeType::Solid),
            ShapeType::Solid => Some(ShapeType::Shell),
            ShapeType::Shell => Some(ShapeType::Face),
            _ => None,
        }
    }
}

/// Mesher success with at least one triangle on every face
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPolicy;

impl AcceptancePolicy for StrictPolicy {
    fn name(&self) -> &str {
        "strict"
    }

    fn accepts(&self, outcome: &TessellationOutcome) -> bool {
        outcome.done && outcome.all_faces_triangulated()
    }
}

/// Triangulated face ratio at or above a threshold
#[derive(Debug, Clone, Copy)]
pub struct CoveragePolicy {
    pub threshold: f64,
}

impl CoveragePolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for CoveragePolicy {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl AcceptancePolicy for CoveragePolicy {
    fn name(&self) -> &str {
        "coverage"
    }

    fn accepts(&self, outcome: &TessellationOutcome) -> bool {
        let total = outcome.face_count();
        if !outcome.done || total == 0 {
            return false;
        }
        // Exactly threshold * total faces passes
        outcome.triangulated_faces() as f64 + RATIO_EPSILON >= self.threshold * total as f64
    }
}

/// Triangulated face ratio strictly above a threshold, evaluated at one level only
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticPolicy {
    pub threshold: f64,
}

impl DiagnosticPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for DiagnosticPolicy {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl AcceptancePolicy for DiagnosticPolicy {
    fn name(&self) -> &str {
        "diagnostic"
    }

    fn accepts(&self, outcome: &TessellationOutcome) -> bool {
        let total = outcome.face_count();
        if !outcome.done || total == 0 {
            return false;
        }
        outcome.triangulated_faces() as f64 > self.threshold * total as f64 + RATIO_EPSILON
    }

    fn traversal(&self) -> Traversal {
        Traversal::CoarsestLevel
    }

    fn next_level(&self, _kind: ShapeType) -> Option<ShapeType> {
        None
    }
}

impl PolicyKind {
    /// Build the policy selected by a configuration
    pub fn build(config: &SeparationConfig) -> Box<dyn AcceptancePolicy> {
        match config.policy {
            PolicyKind::Strict => Box::new(StrictPolicy),
            PolicyKind::Coverage => Box::new(CoveragePolicy::new(config.coverage_threshold)),
            PolicyKind::Diagnostic => Box::new(DiagnosticPolicy::new(config.coverage_threshold)),
        }
    }
}
