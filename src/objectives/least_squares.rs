//! Weighted least-squares stacks.
//!
//! A least-squares node holds one term per child. Term `k` contributes the
//! residuals `(f_k - goal_k) · w_k`, one per output of child `k`, and the
//! node's value is the concatenation of all residuals. The scalar objective
//! is `Σ r²` with gradient `2 Jᵀ r`.

use crate::derivative::Derivative;
use crate::error::{Result, StelloptError};
use crate::graph::{Evaluation, Graph, NodeId, NodeOp};
use ndarray::{concatenate, Array1, ArrayView1, Axis};

#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquares {
    goals: Vec<f64>,
    weights: Vec<f64>,
}

impl LeastSquares {
    /// Terms with the given goals and weights. Weights must be finite and
    /// non-negative.
    pub fn new(goals: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        if goals.len() != weights.len() {
            return Err(StelloptError::ConfigError(format!(
                "{} goals but {} weights",
                goals.len(),
                weights.len()
            )));
        }
        for &w in &weights {
            Self::check_weight(w)?;
        }
        for &g in &goals {
            Self::check_goal(g)?;
        }
        Ok(Self { goals, weights })
    }

    /// Terms weighted by `1 / σ`, so each residual is measured in units of
    /// its tolerance.
    pub fn from_sigmas(goals: Vec<f64>, sigmas: &[f64]) -> Result<Self> {
        let weights = sigmas
            .iter()
            .map(|&sigma| {
                if sigma == 0.0 || !sigma.is_finite() {
                    Err(StelloptError::ConfigError(format!(
                        "sigma must be finite and non-zero, got {}",
                        sigma
                    )))
                } else {
                    Ok(1.0 / sigma.abs())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(goals, weights)
    }

    fn check_weight(weight: f64) -> Result<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(StelloptError::ConfigError(format!(
                "least-squares weight must be finite and non-negative, got {}",
                weight
            )));
        }
        Ok(())
    }

    fn check_goal(goal: f64) -> Result<()> {
        if !goal.is_finite() {
            return Err(StelloptError::ConfigError(format!(
                "least-squares goal must be finite, got {}",
                goal
            )));
        }
        Ok(())
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn goals(&self) -> &[f64] {
        &self.goals
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub(crate) fn evaluate(&self, inputs: &[Evaluation]) -> Result<Evaluation> {
        if inputs.len() != self.len() {
            return Err(StelloptError::ConfigError(format!(
                "least-squares stack has {} terms but {} inputs",
                self.len(),
                inputs.len()
            )));
        }

        let mut residuals = Vec::with_capacity(inputs.len());
        let mut derivatives = Vec::with_capacity(inputs.len());
        for ((input, &goal), &weight) in inputs.iter().zip(&self.goals).zip(&self.weights) {
            residuals.push(input.value.mapv(|f| (f - goal) * weight));
            derivatives.push(input.derivative.scale(weight));
        }

        let views: Vec<ArrayView1<f64>> = residuals.iter().map(|r| r.view()).collect();
        let value = if views.is_empty() {
            Array1::zeros(0)
        } else {
            concatenate(Axis(0), &views).map_err(|e| {
                StelloptError::Evaluation(format!("stacking residuals: {}", e))
            })?
        };

        Ok(Evaluation::new(value, Derivative::stack(&derivatives)?))
    }
}

impl Graph {
    /// Add a least-squares stack over `funcs`.
    pub fn add_least_squares(
        &mut self,
        label: &str,
        funcs: &[NodeId],
        goals: &[f64],
        weights: &[f64],
    ) -> Result<NodeId> {
        if goals.len() != funcs.len() {
            return Err(StelloptError::ConfigError(format!(
                "{} functions but {} goals",
                funcs.len(),
                goals.len()
            )));
        }
        let lsq = LeastSquares::new(goals.to_vec(), weights.to_vec())?;
        self.add_node(label, NodeOp::LeastSquares(lsq), None, funcs)
    }

    /// Add a least-squares stack with weights `1 / σ`.
    pub fn add_least_squares_from_sigmas(
        &mut self,
        label: &str,
        funcs: &[NodeId],
        goals: &[f64],
        sigmas: &[f64],
    ) -> Result<NodeId> {
        if goals.len() != funcs.len() {
            return Err(StelloptError::ConfigError(format!(
                "{} functions but {} goals",
                funcs.len(),
                goals.len()
            )));
        }
        let lsq = LeastSquares::from_sigmas(goals.to_vec(), sigmas)?;
        self.add_node(label, NodeOp::LeastSquares(lsq), None, funcs)
    }

    fn least_squares(&self, id: NodeId) -> Result<&LeastSquares> {
        match self.op(id)? {
            NodeOp::LeastSquares(lsq) => Ok(lsq),
            other => Err(StelloptError::ConfigError(format!(
                "node {} is a {}, not a least-squares stack",
                id,
                other.kind()
            ))),
        }
    }

    /// Append a term to an existing least-squares stack.
    pub fn push_least_squares_term(
        &mut self,
        id: NodeId,
        func: NodeId,
        goal: f64,
        weight: f64,
    ) -> Result<()> {
        let mut lsq = self.least_squares(id)?.clone();
        LeastSquares::check_goal(goal)?;
        LeastSquares::check_weight(weight)?;
        lsq.goals.push(goal);
        lsq.weights.push(weight);

        let mut children = self.children(id)?.to_vec();
        children.push(func);
        self.rewire(id, NodeOp::LeastSquares(lsq), children)
    }

    /// Remove term `index` from a least-squares stack. At least one term
    /// must remain.
    pub fn remove_least_squares_term(&mut self, id: NodeId, index: usize) -> Result<()> {
        let mut lsq = self.least_squares(id)?.clone();
        if index >= lsq.len() {
            return Err(StelloptError::ConfigError(format!(
                "least-squares stack {} has no term {}",
                id, index
            )));
        }
        if lsq.len() == 1 {
            return Err(StelloptError::ConfigError(format!(
                "cannot remove the last term of least-squares stack {}",
                id
            )));
        }
        lsq.goals.remove(index);
        lsq.weights.remove(index);

        let mut children = self.children(id)?.to_vec();
        children.remove(index);
        self.rewire(id, NodeOp::LeastSquares(lsq), children)
    }

    /// `Σ r²` for a least-squares stack.
    pub fn least_squares_objective(&mut self, id: NodeId) -> Result<f64> {
        self.least_squares(id)?;
        let r = self.value(id)?;
        Ok(r.dot(&r))
    }

    /// `2 Jᵀ r` for a least-squares stack, in the free-DOF ordering of `id`.
    pub fn least_squares_gradient(&mut self, id: NodeId) -> Result<Array1<f64>> {
        self.least_squares(id)?;
        let r = self.value(id)?;
        let jacobian = self.jacobian(id)?;
        Ok(jacobian.t().dot(&r) * 2.0)
    }
}
