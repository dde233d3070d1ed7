//! Run counters

use std::collections::BTreeMap;

use meshsep_kernel::ShapeType;
use serde::Serialize;

use crate::diagnostic::{ClassificationResult, FailureReason};

/// Counters for one separation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_shapes: usize,
    pub meshable_shapes: usize,
    pub non_meshable_shapes: usize,
    pub faces_processed: usize,
    pub solids_processed: usize,
    pub shells_processed: usize,
    /// Occurrences of each rejection reason
    pub failure_reasons: BTreeMap<FailureReason, usize>,
}

impl Statistics {
    /// Fraction of routed shapes that were accepted, 0 when nothing was routed
    pub fn success_rate(&self) -> f64 {
        if self.total_shapes == 0 {
            0.0
        } else {
            self.meshable_shapes as f64 / self.total_shapes as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Count one routed classification
    pub fn record(&mut self, result: &ClassificationResult) {
        self.total_shapes += 1;
        if result.is_meshable() {
            self.meshable_shapes += 1;
        } else {
            self.non_meshable_shapes += 1;
            *self.failure_reasons.entry(result.failure_reason).or_insert(0) += 1;
        }

        match result.shape_type {
            ShapeType::Face => self.faces_processed += 1,
            ShapeType::Solid => self.solids_processed += 1,
            ShapeType::Shell => self.shells_processed += 1,
            _ => {}
        }
    }

    /// Occurrences of one rejection reason
    pub fn failures(&self, reason: FailureReason) -> usize {
        self.failure_reasons.get(&reason).copied().unwrap_or(0)
    }
}
