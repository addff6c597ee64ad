//! Elementwise sum of children.

use crate::derivative::Derivative;
use crate::error::{Result, StelloptError};
use crate::graph::{Evaluation, Graph, NodeId, NodeOp};
use ndarray::Array1;

/// `Σ J_i`, elementwise for vector-valued children of equal length.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sum;

impl Sum {
    pub(crate) fn evaluate(&self, inputs: &[Evaluation]) -> Result<Evaluation> {
        let first = inputs
            .first()
            .ok_or_else(|| StelloptError::ConfigError("Sum of no terms".to_string()))?;
        let len = first.len();

        let mut value = Array1::zeros(len);
        let mut derivative = Derivative::zeros(len);
        for (i, input) in inputs.iter().enumerate() {
            if input.len() != len {
                return Err(StelloptError::DimensionMismatch(format!(
                    "Sum term {} has {} outputs, term 0 has {}",
                    i,
                    input.len(),
                    len
                )));
            }
            value += &input.value;
            derivative = derivative.checked_add(&input.derivative)?;
        }

        Ok(Evaluation::new(value, derivative))
    }
}

impl Graph {
    /// Add a node summing `terms`. The same node may appear more than once.
    pub fn add_sum(&mut self, label: &str, terms: &[NodeId]) -> Result<NodeId> {
        if terms.is_empty() {
            return Err(StelloptError::ConfigError(format!(
                "Sum '{}' needs at least one term",
                label
            )));
        }
        self.add_node(label, NodeOp::Sum(Sum), None, terms)
    }
}
