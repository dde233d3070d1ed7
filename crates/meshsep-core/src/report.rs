//! Analysis report
//!
//! A pure summary of one run: success rate, failures grouped by reason,
//! counts per shape type and the first few rejected shapes. Rendered as
//! text through `Display` or as JSON through serde.

use std::collections::BTreeMap;
use std::fmt;

use meshsep_kernel::{ShapeId, ShapeType};
use serde::Serialize;

use crate::diagnostic::{ClassificationResult, FailureReason};
use crate::stats::Statistics;

/// Accepted and rejected shapes of one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub meshable: usize,
    pub non_meshable: usize,
}

impl TypeCounts {
    pub fn total(&self) -> usize {
        self.meshable + self.non_meshable
    }
}

/// Occurrences of one rejection reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReasonCount {
    pub reason: FailureReason,
    pub count: usize,
}

/// One listed non-meshable shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub shape: ShapeId,
    pub shape_type: ShapeType,
    pub reason: FailureReason,
    pub description: String,
}

/// Summary of a separation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub total_shapes: usize,
    pub meshable_shapes: usize,
    pub non_meshable_shapes: usize,
    pub faces_processed: usize,
    pub solids_processed: usize,
    pub shells_processed: usize,
    pub success_rate: f64,
    /// Most frequent first
    pub failures: Vec<ReasonCount>,
    pub by_type: BTreeMap<ShapeType, TypeCounts>,
    /// First `limit` non-meshable shapes in routing order
    pub entries: Vec<ReportEntry>,
    /// Non-meshable shapes left out of `entries`
    pub omitted: usize,
}

impl AnalysisReport {
    /// Summarize statistics and classification records without modifying them
    pub fn build(
        stats: &Statistics,
        meshable: &[ClassificationResult],
        non_meshable: &[ClassificationResult],
        limit: usize,
    ) -> Self {
        let mut failures: Vec<ReasonCount> = stats
            .failure_reasons
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(reason, count)| ReasonCount {
                reason: *reason,
                count: *count,
            })
            .collect();
        failures.sort_by(|a, b| b.count.cmp(&a.count).then(a.reason.cmp(&b.reason)));

        let mut by_type: BTreeMap<ShapeType, TypeCounts> = BTreeMap::new();
        for result in meshable {
            by_type.entry(result.shape_type).or_default().meshable += 1;
        }
        for result in non_meshable {
            by_type.entry(result.shape_type).or_default().non_meshable += 1;
        }

        let entries: Vec<ReportEntry> = non_meshable
            .iter()
            .take(limit)
            .map(|result| ReportEntry {
                shape: result.shape,
                shape_type: result.shape_type,
                reason: result.failure_reason,
                description: result.reason_description.clone(),
            })
            .collect();

        Self {
            total_shapes: stats.total_shapes,
            meshable_shapes: stats.meshable_shapes,
            non_meshable_shapes: stats.non_meshable_shapes,
            faces_processed: stats.faces_processed,
            solids_processed: stats.solids_processed,
            shells_processed: stats.shells_processed,
            success_rate: stats.success_rate(),
            failures,
            omitted: non_meshable.len().saturating_sub(entries.len()),
            by_type,
            entries,
        }
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Meshability Analysis ===")?;
        writeln!(f, "Total shapes:        {}", self.total_shapes)?;
        writeln!(f, "Meshable shapes:     {}", self.meshable_shapes)?;
        writeln!(f, "Non-meshable shapes: {}", self.non_meshable_shapes)?;
        writeln!(f, "Success rate:        {:.1}%", self.success_rate * 100.0)?;
        writeln!(
            f,
            "Processed: {} solids, {} shells, {} faces",
            self.solids_processed, self.shells_processed, self.faces_processed
        )?;

        if !self.by_type.is_empty() {
            writeln!(f)?;
            writeln!(f, "By shape type:")?;
            for (kind, counts) in &self.by_type {
                writeln!(
                    f,
                    "  {:<10} {} meshable, {} non-meshable",
                    kind.name(),
                    counts.meshable,
                    counts.non_meshable
                )?;
            }
        }

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failure reasons:")?;
            for failure in &self.failures {
                writeln!(
                    f,
                    "  {:<20} {} ({})",
                    failure.reason.name(),
                    failure.count,
                    failure.reason.summary()
                )?;
            }
        }

        if !self.entries.is_empty() {
            writeln!(f)?;
            writeln!(f, "Non-meshable shapes:")?;
            for entry in &self.entries {
                if entry.description.is_empty() {
                    writeln!(f, "  {} {}: {}", entry.shape_type, entry.shape, entry.reason)?;
                } else {
                    writeln!(
                        f,
                        "  {} {}: {} - {}",
                        entry.shape_type, entry.shape, entry.reason, entry.description
                    )?;
                }
            }
            if self.omitted > 0 {
                writeln!(f, "  ... and {} more", self.omitted)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(id: u64, kind: ShapeType, reason: FailureReason) -> ClassificationResult {
        ClassificationResult::new(ShapeId::new(id), kind).reject(reason, format!("shape {}", id))
    }

    fn sample() -> (Statistics, Vec<ClassificationResult>, Vec<ClassificationResult>) {
        let meshable = vec![
            ClassificationResult::new(ShapeId::new(1), ShapeType::Solid),
            ClassificationResult::new(ShapeId::new(2), ShapeType::Face),
        ];
        let non_meshable = vec![
            rejected(3, ShapeType::Face, FailureReason::NoTriangles),
            rejected(4, ShapeType::Face, FailureReason::DegenerateFace),
            rejected(5, ShapeType::Face, FailureReason::NoTriangles),
            rejected(6, ShapeType::Wire, FailureReason::UnsupportedSurface),
        ];
        let mut stats = Statistics::default();
        for result in meshable.iter().chain(&non_meshable) {
            stats.record(result);
        }
        (stats, meshable, non_meshable)
    }

    #[test]
    fn test_build() {
        let (stats, meshable, non_meshable) = sample();
        let report = AnalysisReport::build(&stats, &meshable, &non_meshable, 2);

        assert_eq!(report.total_shapes, 6);
        approx::assert_relative_eq!(report.success_rate, 2.0 / 6.0);
        assert_eq!(
            report.failures[0],
            ReasonCount {
                reason: FailureReason::NoTriangles,
                count: 2
            }
        );
        assert_eq!(report.failures.len(), 3);
        assert_eq!(report.by_type[&ShapeType::Face].meshable, 1);
        assert_eq!(report.by_type[&ShapeType::Face].non_meshable, 3);
        assert_eq!(report.by_type[&ShapeType::Wire].total(), 1);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].shape, ShapeId::new(3));
        assert_eq!(report.omitted, 2);
    }

    #[test]
    fn test_build_is_repeatable() {
        let (stats, meshable, non_meshable) = sample();
        let first = AnalysisReport::build(&stats, &meshable, &non_meshable, 10);
        let second = AnalysisReport::build(&stats, &meshable, &non_meshable, 10);
        assert_eq!(first, second);
        assert_eq!(first.omitted, 0);
    }

    #[test]
    fn test_empty_report() {
        let report = AnalysisReport::build(&Statistics::default(), &[], &[], 10);
        assert_eq!(report.success_rate, 0.0);
        let text = report.to_string();
        assert!(text.contains("Total shapes:        0"));
        assert!(text.contains("Success rate:        0.0%"));
        assert!(!text.contains("Failure reasons"));
    }

    #[test]
    fn test_text_and_json() {
        let (stats, meshable, non_meshable) = sample();
        let report = AnalysisReport::build(&stats, &meshable, &non_meshable, 1);

        let text = report.to_string();
        assert!(text.contains("NO_TRIANGLES"));
        assert!(text.contains("Face #3: NO_TRIANGLES - shape 3"));
        assert!(text.contains("... and 3 more"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["total_shapes"], 6);
        assert_eq!(json["failures"][0]["reason"], "NoTriangles");
        assert_eq!(json["by_type"]["Wire"]["non_meshable"], 1);
    }
}
