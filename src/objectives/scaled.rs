//! Constant multiple of a child.

use crate::error::{Result, StelloptError};
use crate::graph::{Evaluation, Graph, NodeId, NodeOp};

/// `c · J`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaled {
    factor: f64,
}

impl Scaled {
    pub fn new(factor: f64) -> Result<Self> {
        if !factor.is_finite() {
            return Err(StelloptError::ConfigError(format!(
                "scale factor must be finite, got {}",
                factor
            )));
        }
        Ok(Self { factor })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub(crate) fn evaluate(&self, input: &Evaluation) -> Result<Evaluation> {
        Ok(Evaluation::new(
            &input.value * self.factor,
            &input.derivative * self.factor,
        ))
    }
}

impl Graph {
    /// Add a node holding `factor` times `child`.
    pub fn add_scaled(&mut self, label: &str, child: NodeId, factor: f64) -> Result<NodeId> {
        let scaled = Scaled::new(factor)?;
        self.add_node(label, NodeOp::Scaled(scaled), None, &[child])
    }
}
