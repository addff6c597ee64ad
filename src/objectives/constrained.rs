//! An objective together with bounded constraint functions.
//!
//! The node's children are `[objective, g_1, ..., g_k]` and its value is
//! their concatenation `[J, g_1, ..., g_k]`. The objective must be scalar;
//! a vector-valued constraint applies its bounds to every component.

use crate::derivative::Derivative;
use crate::dofs::Bounds;
use crate::error::{Result, StelloptError};
use crate::graph::{Evaluation, Graph, NodeId, NodeOp};
use ndarray::{concatenate, ArrayView1, Axis};

#[derive(Debug, Clone, PartialEq)]
pub struct Constrained {
    bounds: Vec<Bounds>,
}

/// One constraint component at the current DOF state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintValue {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ConstraintValue {
    /// Amount by which the component leaves `[lower, upper]`, zero if inside.
    pub fn violation(&self) -> f64 {
        (self.lower - self.value).max(self.value - self.upper).max(0.0)
    }
}

impl Constrained {
    /// One `(lower, upper)` pair per constraint function.
    pub fn new(bounds: &[(f64, f64)]) -> Result<Self> {
        let bounds = bounds
            .iter()
            .map(|&(lower, upper)| Bounds::new(lower, upper))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { bounds })
    }

    /// Number of constraint functions.
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    pub(crate) fn evaluate(&self, inputs: &[Evaluation]) -> Result<Evaluation> {
        let objective = inputs.first().ok_or_else(|| {
            StelloptError::ConfigError("constrained problem without an objective".to_string())
        })?;
        if objective.len() != 1 {
            return Err(StelloptError::ConfigError(format!(
                "constrained objective must be scalar, got {} outputs",
                objective.len()
            )));
        }

        let views: Vec<ArrayView1<f64>> = inputs.iter().map(|e| e.value.view()).collect();
        let value = concatenate(Axis(0), &views)
            .map_err(|e| StelloptError::Evaluation(format!("stacking constraints: {}", e)))?;
        let derivatives: Vec<Derivative> = inputs.iter().map(|e| e.derivative.clone()).collect();

        Ok(Evaluation::new(value, Derivative::stack(&derivatives)?))
    }

    /// Pair every constraint component in `value` (the node's output) with
    /// its bounds.
    pub(crate) fn components(&self, value: &[f64], lengths: &[usize]) -> Vec<ConstraintValue> {
        let mut out = Vec::with_capacity(value.len().saturating_sub(1));
        let mut offset = 1;
        for (bounds, &len) in self.bounds.iter().zip(lengths) {
            for &v in &value[offset..offset + len] {
                out.push(ConstraintValue {
                    value: v,
                    lower: bounds.min,
                    upper: bounds.max,
                });
            }
            offset += len;
        }
        out
    }
}

impl Graph {
    /// Add `objective` subject to `lower <= g <= upper` for every
    /// `(g, lower, upper)` in `constraints`. Use infinities for one-sided
    /// constraints.
    pub fn add_constrained(
        &mut self,
        label: &str,
        objective: NodeId,
        constraints: &[(NodeId, f64, f64)],
    ) -> Result<NodeId> {
        let bounds: Vec<(f64, f64)> = constraints.iter().map(|&(_, lo, hi)| (lo, hi)).collect();
        let constrained = Constrained::new(&bounds)?;

        let mut children = Vec::with_capacity(constraints.len() + 1);
        children.push(objective);
        children.extend(constraints.iter().map(|&(g, _, _)| g));
        self.add_node(label, NodeOp::Constrained(constrained), None, &children)
    }

    /// Constraint components of a constrained node with their bounds.
    pub fn constraint_values(&mut self, id: NodeId) -> Result<Vec<ConstraintValue>> {
        let constrained = match self.op(id)? {
            NodeOp::Constrained(c) => c.clone(),
            other => {
                return Err(StelloptError::ConfigError(format!(
                    "node {} is a {}, not a constrained problem",
                    id,
                    other.kind()
                )))
            }
        };

        let mut lengths = Vec::with_capacity(constrained.len());
        for child in self.children(id)?.to_vec().into_iter().skip(1) {
            lengths.push(self.value(child)?.len());
        }
        let value = self.value(id)?;
        Ok(constrained.components(&value.to_vec(), &lengths))
    }
}
