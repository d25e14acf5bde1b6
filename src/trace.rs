use std::time::Duration;

use serde::Serialize;

/// One outer-iteration record (spec §4.7, §3 "Lifecycles"). Populated even
/// on rejected iterations, using `alpha = 0.0` as the sentinel for "no
/// step accepted".
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iter: usize,
    pub cost_before: f64,
    pub cost_after: f64,
    pub lambda: f64,
    pub dlambda: f64,
    pub alpha: f64,
    pub accepted: bool,
    pub k_rel_norm: f64,
    pub cost_update_ratio: f64,
    pub derivatives_time: Duration,
    pub backward_time: Duration,
    pub forward_time: Duration,
}

/// Append-only per-iteration log used for convergence diagnostics and
/// tests (spec §4.7, §6.3).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Trace {
    records: Vec<IterationRecord>,
}

impl Trace {
    pub fn push(&mut self, record: IterationRecord) {
        if record.accepted {
            tracing::debug!(
                iter = record.iter,
                cost_after = record.cost_after,
                alpha = record.alpha,
                lambda = record.lambda,
                "ddp iteration accepted"
            );
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
