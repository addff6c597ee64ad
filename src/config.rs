//! Configuration options for graphs and gradient drivers.
//!
//! Everything that would otherwise be process-wide state (bounds enforcement,
//! finite-difference steps, worker counts) is carried in these structs and
//! threaded explicitly through constructors.

use serde::{Deserialize, Serialize};

/// What happens when a DOF is assigned a value outside its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsPolicy {
    /// Fail with `StelloptError::OutOfBounds` and leave the container untouched.
    Reject,

    /// Clamp the value onto the nearest bound.
    Clamp,
}

impl Default for BoundsPolicy {
    fn default() -> Self {
        BoundsPolicy::Reject
    }
}

/// Configuration for a DOF graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Bounds policy given to every container the graph creates. Default: Reject
    pub bounds_policy: BoundsPolicy,
}

impl GraphConfig {
    /// Set the bounds policy.
    pub fn with_bounds_policy(mut self, policy: BoundsPolicy) -> Self {
        self.bounds_policy = policy;
        self
    }
}

/// Finite-difference stencil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffMethod {
    /// One-sided: (f(x + h) - f(x)) / h
    Forward,

    /// Two-sided: (f(x + h) - f(x - h)) / 2h
    Centered,
}

impl Default for DiffMethod {
    fn default() -> Self {
        DiffMethod::Centered
    }
}

/// Configuration for finite-difference gradients.
///
/// The step for coordinate `j` is `abs_step + rel_step * |x_j|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiniteDifferenceConfig {
    /// Stencil to use. Default: Centered
    pub method: DiffMethod,

    /// Absolute part of the step. Default: 1e-7
    pub abs_step: f64,

    /// Relative part of the step. Default: 0.0
    pub rel_step: f64,

    /// Maximum number of concurrent workers, `None` for the rayon default. Default: None
    pub max_workers: Option<usize>,
}

impl Default for FiniteDifferenceConfig {
    fn default() -> Self {
        Self {
            method: DiffMethod::default(),
            abs_step: 1e-7,
            rel_step: 0.0,
            max_workers: None,
        }
    }
}

impl FiniteDifferenceConfig {
    /// Set the stencil.
    pub fn with_method(mut self, method: DiffMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the absolute and relative step sizes.
    pub fn with_steps(mut self, abs_step: f64, rel_step: f64) -> Self {
        self.abs_step = abs_step;
        self.rel_step = rel_step;
        self
    }

    /// Limit the number of concurrent workers.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    /// Step size for a coordinate with value `x`.
    pub fn step_for(&self, x: f64) -> f64 {
        self.abs_step + self.rel_step * x.abs()
    }
}
