//! Classification and decomposition engine
//!
//! Walks a shape tree with an explicit work stack, tries to mesh each
//! Solid/Shell as a whole, splits rejected units one level down and routes
//! every terminal decision into the meshable or non-meshable output.
//! Compounds are pure grouping and are never routed themselves.

use std::collections::HashSet;

use meshsep_kernel::{GeometryKernel, ShapeId, ShapeType, TessellationOutcome};
use serde::Serialize;

use crate::analysis::{
    check_face_validity, diagnose_rejection, edge_metrics, is_watertight,
};
use crate::cache::{CacheEntry, DiagnosticCache};
use crate::config::{ConfigError, PolicyKind, SeparationConfig};
use crate::diagnostic::{ClassificationResult, FailureReason};
use crate::policy::{AcceptancePolicy, Traversal};
use crate::report::AnalysisReport;
use crate::stats::Statistics;

/// Levels tried by the coarsest-level traversal, coarsest first
const COARSEST_LEVELS: [ShapeType; 3] = [ShapeType::Solid, ShapeType::Shell, ShapeType::Face];

/// Result type for separation runs
pub type SeparateResult<T> = Result<T, SeparationError>;

/// Precondition failures of a separation run
///
/// Rejected shapes are never errors; they are reported as data.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SeparationError {
    #[error("Cannot separate a null or invalid shape ({0})")]
    NullShape(ShapeId),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The two disjoint outputs of a run, in routing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Separation {
    pub meshable: Vec<ShapeId>,
    pub non_meshable: Vec<ShapeId>,
}

impl Separation {
    /// Total number of routed shapes
    pub fn len(&self) -> usize {
        self.meshable.len() + self.non_meshable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshable.is_empty() && self.non_meshable.is_empty()
    }
}

/// One meshing attempt, after the optional repair
struct Attempt {
    /// Kernel errors are flattened to their message
    outcome: Result<TessellationOutcome, String>,
    repaired: bool,
}

impl Attempt {
    fn accepted(&self, policy: &dyn AcceptancePolicy) -> bool {
        matches!(&self.outcome, Ok(outcome) if policy.accepts(outcome))
    }

    /// Reason a rejected attempt fell short, without consulting the checker
    fn shortfall(&self) -> (FailureReason, String) {
        match &self.outcome {
            Err(message) => (FailureReason::MeshingFailed, message.clone()),
            Ok(outcome) if !outcome.done => (
                FailureReason::MeshingFailed,
                "tessellation did not complete".to_string(),
            ),
            Ok(outcome) if outcome.triangle_count() == 0 => (
                FailureReason::NoTriangles,
                "tessellation produced no triangles".to_string(),
            ),
            Ok(outcome) => (
                FailureReason::NoTriangles,
                format!(
                    "{}/{} faces triangulated",
                    outcome.triangulated_faces(),
                    outcome.face_count()
                ),
            ),
        }
    }
}

/// Separates a shape tree into meshable and non-meshable parts
///
/// One instance holds the per-run cache and statistics, so concurrent runs
/// need separate instances. The kernel may be shared.
pub struct ShapeSeparator<'k, K: GeometryKernel + ?Sized> {
    kernel: &'k K,
    config: SeparationConfig,
    policy: Box<dyn AcceptancePolicy>,
    cache: DiagnosticCache,
    statistics: Statistics,
    meshable_info: Vec<ClassificationResult>,
    non_meshable_info: Vec<ClassificationResult>,
    /// Shapes placed into an output during the current run
    routed: HashSet<ShapeId>,
    /// Shells and faces inside an accepted unit
    covered: HashSet<ShapeId>,
    /// Compounds whose children were already queued
    expanded: HashSet<ShapeId>,
}

impl<'k, K: GeometryKernel + ?Sized> ShapeSeparator<'k, K> {
    /// Create a separator using the policy selected by `config`
    pub fn new(kernel: &'k K, config: SeparationConfig) -> Self {
        let policy = PolicyKind::build(&config);
        let cache = DiagnosticCache::new(config.use_cache);
        Self {
            kernel,
            config,
            policy,
            cache,
            statistics: Statistics::default(),
            meshable_info: Vec::new(),
            non_meshable_info: Vec::new(),
            routed: HashSet::new(),
            covered: HashSet::new(),
            expanded: HashSet::new(),
        }
    }

    /// Replace the acceptance policy
    pub fn with_policy(mut self, policy: Box<dyn AcceptancePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    pub fn policy(&self) -> &dyn AcceptancePolicy {
        self.policy.as_ref()
    }

    /// Classify every part of `root`
    ///
    /// Only a null root or an unusable configuration is an error; the outputs
    /// are left empty in both cases.
    pub fn separate(&mut self, root: ShapeId) -> SeparateResult<Separation> {
        self.reset();

        if let Err(e) = self.config.validate() {
            tracing::error!("Refusing to separate {}: {}", root, e);
            return Err(e.into());
        }
        if self.kernel.is_null(root) {
            tracing::error!("Cannot separate null shape {}", root);
            return Err(SeparationError::NullShape(root));
        }

        tracing::info!(
            "Separating {} with {} policy on {} kernel",
            root,
            self.policy.name(),
            self.kernel.name()
        );

        let mut separation = Separation::default();
        match self.policy.traversal() {
            Traversal::Recursive => self.walk(root, &mut separation),
            Traversal::CoarsestLevel => self.classify_coarsest_level(root, &mut separation),
        }

        tracing::info!(
            "Separation finished: {} meshable, {} non-meshable ({:.1}% success)",
            self.statistics.meshable_shapes,
            self.statistics.non_meshable_shapes,
            self.statistics.success_rate() * 100.0
        );
        tracing::debug!(
            "Cache: {} hits, {} misses",
            self.cache.hits(),
            self.cache.misses()
        );

        Ok(separation)
    }

    /// Run a separation and keep only the parts that could not be meshed
    pub fn remove_meshable(&mut self, root: ShapeId) -> SeparateResult<Vec<ShapeId>> {
        let separation = self.separate(root)?;
        tracing::info!(
            "Removed {} meshable parts, {} remain",
            separation.meshable.len(),
            separation.non_meshable.len()
        );
        Ok(separation.non_meshable)
    }

    /// Counters of the last run
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Records of the accepted shapes of the last run
    pub fn meshable_info(&self) -> &[ClassificationResult] {
        &self.meshable_info
    }

    /// Records of the rejected shapes of the last run
    pub fn non_meshable_info(&self) -> &[ClassificationResult] {
        &self.non_meshable_info
    }

    /// Structured summary of the last run
    pub fn report(&self) -> AnalysisReport {
        AnalysisReport::build(
            &self.statistics,
            &self.meshable_info,
            &self.non_meshable_info,
            self.config.report_limit,
        )
    }

    /// Text summary of the last run
    pub fn analysis_report(&self) -> String {
        self.report().to_string()
    }

    pub fn cache(&self) -> &DiagnosticCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Turn the decision cache on or off for subsequent runs
    pub fn enable_caching(&mut self, enabled: bool) {
        self.config.use_cache = enabled;
        self.cache.set_enabled(enabled);
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.statistics.reset();
        self.meshable_info.clear();
        self.non_meshable_info.clear();
        self.routed.clear();
        self.covered.clear();
        self.expanded.clear();
    }

    // ========== Traversal ==========

    fn walk(&mut self, root: ShapeId, out: &mut Separation) {
        let mut stack = vec![root];

        while let Some(shape) = stack.pop() {
            if let Some(entry) = self.cache.lookup(shape) {
                if entry.decomposed {
                    tracing::trace!("Cache hit: {} was already decomposed", shape);
                    let kind = self.kernel.shape_type(shape).unwrap_or(ShapeType::Unknown);
                    let parts = self.parts(shape, kind);
                    stack.extend(parts.into_iter().rev());
                } else {
                    tracing::trace!("Cache hit: {} already routed", shape);
                }
                continue;
            }
            if self.is_claimed(shape) {
                continue;
            }

            match self.kernel.shape_type(shape) {
                None => {
                    let result = ClassificationResult::new(shape, ShapeType::Unknown)
                        .reject(FailureReason::NullGeometry, "null shape handle");
                    self.route(result, out);
                }
                Some(kind) if kind.is_container() => {
                    if self.expanded.insert(shape) {
                        let children = self.kernel.children(shape);
                        tracing::debug!("Expanding {} {} ({} children)", kind, shape, children.len());
                        stack.extend(children.into_iter().rev());
                    }
                }
                Some(kind @ (ShapeType::Solid | ShapeType::Shell)) => {
                    self.process_unit(shape, kind, &mut stack, out);
                }
                Some(ShapeType::Face) => {
                    let result = self.classify_face(shape);
                    self.route(result, out);
                }
                Some(kind) if kind.is_surfaceless() => {
                    let result = self.classify_surfaceless(shape, kind);
                    self.route(result, out);
                }
                Some(kind) => {
                    let result = ClassificationResult::new(shape, kind).reject(
                        FailureReason::OtherReason,
                        format!("unsupported shape kind {}", kind),
                    );
                    self.route(result, out);
                }
            }
        }
    }

    /// Try a Solid/Shell whole, queueing its parts when it is rejected
    fn process_unit(
        &mut self,
        unit: ShapeId,
        kind: ShapeType,
        stack: &mut Vec<ShapeId>,
        out: &mut Separation,
    ) {
        // A face routed on its own must not reappear inside an accepted unit.
        // Faces covered by an accepted sibling do not block the whole attempt.
        let faces = self.kernel.sub_shapes(unit, ShapeType::Face);
        let routed = faces.iter().filter(|face| self.routed.contains(*face)).count();
        if routed > 0 {
            let parts = self.parts(unit, kind);
            tracing::debug!(
                "{} {} holds {}/{} faces routed on their own, decomposing into {} parts",
                kind,
                unit,
                routed,
                faces.len(),
                parts.len()
            );
            stack.extend(parts.into_iter().rev());
            return;
        }

        let attempt = self.attempt(unit);

        if attempt.accepted(self.policy.as_ref()) {
            let result = self.classify_unit(unit, kind, &attempt);
            self.cover(unit);
            self.route(result, out);
            return;
        }

        let parts = self.parts(unit, kind);
        if parts.is_empty() {
            let result = self.classify_unit(unit, kind, &attempt).reject(
                FailureReason::NullGeometry,
                format!("{} has no sub-shapes to decompose into", kind),
            );
            self.route(result, out);
            return;
        }

        let (reason, description) = attempt.shortfall();
        tracing::debug!(
            "{} {} rejected ({}: {}), decomposing into {} parts",
            kind,
            unit,
            reason,
            description,
            parts.len()
        );
        self.cache.insert(unit, CacheEntry::decomposed(reason));
        stack.extend(parts.into_iter().rev());
    }

    /// Classify each unit of the coarsest populated level once
    fn classify_coarsest_level(&mut self, root: ShapeId, out: &mut Separation) {
        let level = COARSEST_LEVELS.into_iter().find_map(|kind| {
            let units = self.kernel.sub_shapes(root, kind);
            (!units.is_empty()).then_some((kind, units))
        });

        let Some((kind, units)) = level else {
            tracing::debug!("{} has no solids, shells or faces; walking it instead", root);
            self.walk(root, out);
            return;
        };

        tracing::info!("Classifying {} {} units of {}", units.len(), kind, root);
        for unit in units {
            let result = if kind == ShapeType::Face {
                self.classify_face(unit)
            } else {
                let attempt = self.attempt(unit);
                self.classify_unit(unit, kind, &attempt)
            };
            self.route(result, out);
        }
    }

    /// Parts a rejected unit splits into
    ///
    /// The next level down, then every direct child that none of those parts
    /// contains (a loose face or wire beside the shells of a solid).
    fn parts(&self, unit: ShapeId, kind: ShapeType) -> Vec<ShapeId> {
        let mut parts = self
            .policy
            .next_level(kind)
            .map(|next| self.kernel.sub_shapes(unit, next))
            .unwrap_or_default();
        parts.retain(|part| *part != unit);
        if parts.is_empty() {
            // Malformed topology: fall through to the faces
            parts = self.kernel.sub_shapes(unit, ShapeType::Face);
            parts.retain(|face| *face != unit);
        }

        let mut inside: HashSet<ShapeId> = parts.iter().copied().collect();
        for part in &parts {
            inside.extend(self.kernel.descendants(*part));
        }
        let loose: Vec<ShapeId> = self
            .kernel
            .children(unit)
            .into_iter()
            .filter(|child| *child != unit && !inside.contains(child))
            .collect();
        if !loose.is_empty() {
            tracing::debug!("{} {} has {} loose children", kind, unit, loose.len());
        }

        parts.extend(loose);
        parts
    }

    /// Already routed, or inside an accepted unit
    fn is_claimed(&self, shape: ShapeId) -> bool {
        self.routed.contains(&shape) || self.covered.contains(&shape)
    }

    /// Mark everything inside an accepted unit as handled
    fn cover(&mut self, unit: ShapeId) {
        self.covered.extend(self.kernel.descendants(unit));
    }

    fn route(&mut self, result: ClassificationResult, out: &mut Separation) {
        self.statistics.record(&result);
        self.routed.insert(result.shape);

        if result.is_meshable() {
            tracing::trace!("{} {} is meshable", result.shape_type, result.shape);
            self.cache.insert(result.shape, CacheEntry::accepted());
            out.meshable.push(result.shape);
            self.meshable_info.push(result);
        } else {
            tracing::debug!(
                "{} {} is not meshable: {} {}",
                result.shape_type,
                result.shape,
                result.failure_reason,
                result.reason_description
            );
            self.cache
                .insert(result.shape, CacheEntry::rejected(result.failure_reason));
            out.non_meshable.push(result.shape);
            self.non_meshable_info.push(result);
        }
    }

    // ========== Classification ==========

    /// Repair (when enabled) and tessellate a shape
    fn attempt(&self, shape: ShapeId) -> Attempt {
        let mut target = shape;
        let mut repaired = false;

        if self.config.try_fix_before_meshing {
            match self.kernel.repair(shape) {
                Ok(fixed) if fixed != shape => {
                    tracing::debug!("Meshing repaired copy {} of {}", fixed, shape);
                    target = fixed;
                    repaired = true;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Repair of {} failed: {}", shape, e);
                    return Attempt {
                        outcome: Err(e.to_string()),
                        repaired: false,
                    };
                }
            }
        }

        let params = self.config.tessellation_params();
        let outcome = self.kernel.tessellate(target, &params).map_err(|e| {
            tracing::warn!("Tessellation of {} failed: {}", shape, e);
            e.to_string()
        });

        Attempt { outcome, repaired }
    }

    /// Record for a Solid/Shell attempt, diagnosed when rejected
    fn classify_unit(&self, unit: ShapeId, kind: ShapeType, attempt: &Attempt) -> ClassificationResult {
        let metrics = edge_metrics(self.kernel, unit);
        let mut result = ClassificationResult::new(unit, kind);
        result.has_complex_curves = metrics.has_complex_curves;
        result.is_watertight = is_watertight(self.kernel, unit);
        result.repaired = attempt.repaired;

        match &attempt.outcome {
            Ok(outcome) => {
                result.face_count = outcome.face_count();
                result.triangle_count = outcome.triangle_count();
            }
            Err(_) => {
                result.face_count = self.kernel.sub_shapes(unit, ShapeType::Face).len();
            }
        }

        if attempt.accepted(self.policy.as_ref()) {
            return result;
        }

        let (reason, description) = match &attempt.outcome {
            Ok(outcome) if outcome.done => diagnose_rejection(self.kernel, unit, outcome, &metrics),
            _ => attempt.shortfall(),
        };
        result.reject(reason, description)
    }

    /// Faces are atomic: validity first, then one meshing attempt
    fn classify_face(&self, face: ShapeId) -> ClassificationResult {
        let metrics = edge_metrics(self.kernel, face);
        let mut result = ClassificationResult::new(face, ShapeType::Face);
        result.face_count = 1;
        result.min_edge_length = metrics.min_length;
        result.max_edge_length = metrics.max_length;
        result.has_complex_curves = metrics.has_complex_curves;

        let validity = check_face_validity(self.kernel, face);
        if !validity.ok {
            return result.reject(validity.reason, validity.description);
        }

        let attempt = self.attempt(face);
        result.repaired = attempt.repaired;
        if let Ok(outcome) = &attempt.outcome {
            result.triangle_count = outcome.triangle_count();
        }

        if attempt.accepted(self.policy.as_ref()) {
            return result;
        }
        let (reason, description) = attempt.shortfall();
        result.reject(reason, description)
    }

    /// Wires, edges and vertices never carry a surface
    fn classify_surfaceless(&self, shape: ShapeId, kind: ShapeType) -> ClassificationResult {
        let metrics = edge_metrics(self.kernel, shape);
        let mut result = ClassificationResult::new(shape, kind);
        result.min_edge_length = metrics.min_length;
        result.max_edge_length = metrics.max_length;
        result.has_complex_curves = metrics.has_complex_curves;
        result.reject(
            FailureReason::UnsupportedSurface,
            format!("a {} carries no surface", kind.name().to_lowercase()),
        )
    }
}
