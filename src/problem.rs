//! Optimizer-facing views of a graph.
//!
//! An optimizer sees a flat parameter vector `x` (the free DOFs of a root
//! node) and asks for the objective and its gradient, or for residuals and
//! their Jacobian. [`GraphProblem`] provides both views over an owned
//! [`Graph`]; [`ConstrainedProblem`] adds the constraint values and rows of
//! a `Constrained` root. The [`Problem`] trait is the least-squares
//! interface shared with hand-written problems.

use crate::config::FiniteDifferenceConfig;
use crate::error::{Result, StelloptError};
use crate::graph::{Graph, NodeId, NodeOp};
use crate::objectives::ConstraintValue;
use log::warn;
use ndarray::{s, Array1, Array2};

/// A nonlinear least-squares problem.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Number of parameters.
    fn parameter_count(&self) -> Result<usize>;

    /// Number of residuals.
    fn residual_count(&mut self) -> Result<usize>;

    /// Evaluate the Jacobian of the residuals at the given parameters.
    ///
    /// The default implementation uses finite differences with the default
    /// [`FiniteDifferenceConfig`].
    fn jacobian(&mut self, params: &Array1<f64>) -> Result<Array2<f64>> {
        crate::finite_difference::jacobian(
            |p| self.eval(p),
            params,
            &FiniteDifferenceConfig::default(),
        )
    }

    /// Whether `jacobian` is analytic rather than the finite-difference default.
    fn has_custom_jacobian(&self) -> bool {
        false
    }

    /// Sum of squared residuals.
    fn eval_cost(&mut self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

/// Replaces a blown-up objective (non-finite or above `threshold`) with
/// `threshold` and a zero gradient, so line searches back off instead of
/// failing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlowupGuard {
    pub threshold: f64,
}

impl Default for BlowupGuard {
    fn default() -> Self {
        Self { threshold: 1e4 }
    }
}

impl BlowupGuard {
    pub fn new(threshold: f64) -> Result<Self> {
        if !threshold.is_finite() {
            return Err(StelloptError::ConfigError(format!(
                "blow-up threshold must be finite, got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn is_blown(&self, value: f64) -> bool {
        !value.is_finite() || value > self.threshold
    }

    /// Clamp `(value, gradient)` if the value blew up.
    pub fn apply(&self, value: f64, gradient: Array1<f64>) -> (f64, Array1<f64>) {
        if self.is_blown(value) {
            warn!(
                "objective {} exceeds blow-up threshold {}, returning threshold and zero gradient",
                value, self.threshold
            );
            (self.threshold, Array1::zeros(gradient.len()))
        } else {
            (value, gradient)
        }
    }
}

/// Objective and residual views of a graph root.
///
/// A scalar root is used as the objective directly. A vector root is
/// treated as residuals, with objective `Σ r²` and gradient `2 Jᵀ r`.
#[derive(Debug, Clone)]
pub struct GraphProblem {
    graph: Graph,
    root: NodeId,
    guard: Option<BlowupGuard>,
}

impl GraphProblem {
    pub fn new(graph: Graph, root: NodeId) -> Result<Self> {
        graph.node(root)?;
        Ok(Self {
            graph,
            root,
            guard: None,
        })
    }

    /// Clamp blown-up objectives with `guard`.
    pub fn with_guard(mut self, guard: BlowupGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Current free DOFs of the root.
    pub fn x(&self) -> Result<Array1<f64>> {
        self.graph.free_vector(self.root)
    }

    pub fn set_x(&mut self, x: &[f64]) -> Result<()> {
        self.graph.set_free_vector(self.root, x)
    }

    fn raw_objective(&mut self) -> Result<f64> {
        let value = self.graph.value(self.root)?;
        if value.len() == 1 {
            Ok(value[0])
        } else {
            Ok(value.dot(&value))
        }
    }

    fn raw_gradient(&mut self) -> Result<Array1<f64>> {
        let value = self.graph.value(self.root)?;
        if value.len() == 1 {
            self.graph.gradient(self.root)
        } else {
            let jacobian = self.graph.jacobian(self.root)?;
            Ok(jacobian.t().dot(&value) * 2.0)
        }
    }

    /// Objective at the current state.
    pub fn j(&mut self) -> Result<f64> {
        let value = self.raw_objective()?;
        match self.guard {
            Some(guard) if guard.is_blown(value) => {
                warn!("objective {} exceeds blow-up threshold {}", value, guard.threshold);
                Ok(guard.threshold)
            }
            _ => Ok(value),
        }
    }

    /// Gradient of the objective at the current state.
    pub fn dj(&mut self) -> Result<Array1<f64>> {
        Ok(self.objective_and_gradient()?.1)
    }

    fn objective_and_gradient(&mut self) -> Result<(f64, Array1<f64>)> {
        let value = self.raw_objective()?;
        if let Some(guard) = self.guard {
            if guard.is_blown(value) {
                let n = self.graph.free_count(self.root)?;
                return Ok(guard.apply(value, Array1::zeros(n)));
            }
        }
        Ok((value, self.raw_gradient()?))
    }

    /// Move to `x` and return the objective and its gradient there.
    pub fn value_and_gradient(&mut self, x: &[f64]) -> Result<(f64, Array1<f64>)> {
        self.set_x(x)?;
        self.objective_and_gradient()
    }

    /// Root value at the current state.
    pub fn residuals(&mut self) -> Result<Array1<f64>> {
        self.graph.value(self.root)
    }

    /// Root Jacobian at the current state, one column per free DOF.
    pub fn jacobian(&mut self) -> Result<Array2<f64>> {
        self.graph.jacobian(self.root)
    }
}

impl Problem for GraphProblem {
    fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.set_x(&params.to_vec())?;
        self.residuals()
    }

    fn parameter_count(&self) -> Result<usize> {
        self.graph.free_count(self.root)
    }

    fn residual_count(&mut self) -> Result<usize> {
        Ok(self.residuals()?.len())
    }

    fn jacobian(&mut self, params: &Array1<f64>) -> Result<Array2<f64>> {
        self.set_x(&params.to_vec())?;
        GraphProblem::jacobian(self)
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}

/// View of a `Constrained` root: a scalar objective plus bounded
/// constraint functions, all over the root's free DOFs.
#[derive(Debug, Clone)]
pub struct ConstrainedProblem {
    graph: Graph,
    root: NodeId,
}

impl ConstrainedProblem {
    pub fn new(graph: Graph, root: NodeId) -> Result<Self> {
        let op = graph.node(root)?.op();
        if !matches!(op, NodeOp::Constrained(_)) {
            return Err(StelloptError::ConfigError(format!(
                "node {} is a {}, not a constrained problem",
                root,
                op.kind()
            )));
        }
        Ok(Self { graph, root })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn x(&self) -> Result<Array1<f64>> {
        self.graph.free_vector(self.root)
    }

    pub fn set_x(&mut self, x: &[f64]) -> Result<()> {
        self.graph.set_free_vector(self.root, x)
    }

    pub fn objective(&mut self) -> Result<f64> {
        Ok(self.graph.value(self.root)?[0])
    }

    pub fn objective_gradient(&mut self) -> Result<Array1<f64>> {
        Ok(self.graph.jacobian(self.root)?.row(0).to_owned())
    }

    /// Constraint components with their bounds.
    pub fn constraints(&mut self) -> Result<Vec<ConstraintValue>> {
        self.graph.constraint_values(self.root)
    }

    /// Jacobian of the constraint components, one row per component.
    pub fn constraint_jacobian(&mut self) -> Result<Array2<f64>> {
        let jacobian = self.graph.jacobian(self.root)?;
        Ok(jacobian.slice(s![1.., ..]).to_owned())
    }

    /// `true` if every constraint is violated by at most `tol`.
    pub fn is_feasible(&mut self, tol: f64) -> Result<bool> {
        Ok(self.constraints()?.iter().all(|c| c.violation() <= tol))
    }
}
