//! One-sided and two-sided quadratic penalties.

use crate::error::{Result, StelloptError};
use crate::graph::{Evaluation, Graph, NodeId, NodeOp};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Which side of the threshold is penalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyKind {
    /// Penalize `J > t`: `h = max(0, J - t)`
    Max,
    /// Penalize `J < t`: `h = min(0, J - t)`
    Min,
    /// Penalize any deviation: `h = J - t`
    Identity,
}

/// `Σ_i h_i²` with `h` given by the [`PenaltyKind`].
///
/// The derivative is `2 Σ_i h_i dJ_i`. On the inactive side of the
/// threshold `h_i` is exactly zero, and so is its contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticPenalty {
    threshold: f64,
    kind: PenaltyKind,
}

impl QuadraticPenalty {
    pub fn new(threshold: f64, kind: PenaltyKind) -> Result<Self> {
        if !threshold.is_finite() {
            return Err(StelloptError::ConfigError(format!(
                "penalty threshold must be finite, got {}",
                threshold
            )));
        }
        Ok(Self { threshold, kind })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn kind(&self) -> PenaltyKind {
        self.kind
    }

    fn excess(&self, value: &Array1<f64>) -> Array1<f64> {
        let t = self.threshold;
        match self.kind {
            PenaltyKind::Max => value.mapv(|j| (j - t).max(0.0)),
            PenaltyKind::Min => value.mapv(|j| (j - t).min(0.0)),
            PenaltyKind::Identity => value.mapv(|j| j - t),
        }
    }

    pub(crate) fn evaluate(&self, input: &Evaluation) -> Result<Evaluation> {
        let h = self.excess(&input.value);
        let value = h.dot(&h);

        let derivative = input.derivative.contract(&(&h * 2.0))?;

        Ok(Evaluation::new(Array1::from_elem(1, value), derivative))
    }
}

impl Graph {
    /// Add a quadratic penalty on `child` crossing `threshold`.
    pub fn add_quadratic_penalty(
        &mut self,
        label: &str,
        child: NodeId,
        threshold: f64,
        kind: PenaltyKind,
    ) -> Result<NodeId> {
        let penalty = QuadraticPenalty::new(threshold, kind)?;
        self.add_node(label, NodeOp::QuadraticPenalty(penalty), None, &[child])
    }
}
