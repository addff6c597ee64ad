//! Finite-difference derivatives and Taylor tests.
//!
//! Used to cross-check the analytic derivatives a graph assembles. The
//! generic [`gradient`] and [`jacobian`] work on any closure. The graph
//! drivers [`graph_gradient`] and [`graph_jacobian`] perturb the free-DOF
//! vector of a node column by column in parallel; each rayon worker clones
//! the graph once and only flattened vectors cross thread boundaries, so the
//! caller's graph is never touched.

use crate::config::{DiffMethod, FiniteDifferenceConfig};
use crate::error::{Result, StelloptError};
use crate::graph::{Graph, NodeId};
use log::info;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Gradient of a scalar function.
pub fn gradient<F>(
    mut f: F,
    x: &Array1<f64>,
    config: &FiniteDifferenceConfig,
) -> Result<Array1<f64>>
where
    F: FnMut(&Array1<f64>) -> Result<f64>,
{
    let f0 = match config.method {
        DiffMethod::Forward => Some(f(x)?),
        DiffMethod::Centered => None,
    };

    let mut grad = Array1::zeros(x.len());
    for j in 0..x.len() {
        let h = config.step_for(x[j]);
        let mut forward = x.clone();
        forward[j] += h;
        let f_forward = f(&forward)?;

        grad[j] = match f0 {
            Some(f0) => (f_forward - f0) / h,
            None => {
                let mut backward = x.clone();
                backward[j] -= h;
                (f_forward - f(&backward)?) / (2.0 * h)
            }
        };
    }

    Ok(grad)
}

/// Jacobian of a vector function, one column per coordinate of `x`.
pub fn jacobian<F>(
    mut f: F,
    x: &Array1<f64>,
    config: &FiniteDifferenceConfig,
) -> Result<Array2<f64>>
where
    F: FnMut(&Array1<f64>) -> Result<Array1<f64>>,
{
    let f0 = f(x)?;
    let mut jac = Array2::zeros((f0.len(), x.len()));

    for j in 0..x.len() {
        let h = config.step_for(x[j]);
        let mut forward = x.clone();
        forward[j] += h;
        let f_forward = f(&forward)?;
        check_len(f0.len(), f_forward.len())?;

        let column = match config.method {
            DiffMethod::Forward => (f_forward - &f0) / h,
            DiffMethod::Centered => {
                let mut backward = x.clone();
                backward[j] -= h;
                let f_backward = f(&backward)?;
                check_len(f0.len(), f_backward.len())?;
                (f_forward - f_backward) / (2.0 * h)
            }
        };
        jac.column_mut(j).assign(&column);
    }

    Ok(jac)
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(StelloptError::DimensionMismatch(format!(
            "Expected {} outputs, got {}",
            expected, actual
        )));
    }
    Ok(())
}

/// One Jacobian column of `root` by perturbing free DOF `j` of a private graph.
fn graph_column(
    graph: &mut Graph,
    root: NodeId,
    x: &Array1<f64>,
    f0: &Array1<f64>,
    j: usize,
    config: &FiniteDifferenceConfig,
) -> Result<Array1<f64>> {
    let h = config.step_for(x[j]);
    let mut forward = x.to_vec();
    forward[j] += h;
    graph.set_free_vector(root, &forward)?;
    let f_forward = graph.value(root)?;
    check_len(f0.len(), f_forward.len())?;

    match config.method {
        DiffMethod::Forward => Ok((f_forward - f0) / h),
        DiffMethod::Centered => {
            let mut backward = x.to_vec();
            backward[j] -= h;
            graph.set_free_vector(root, &backward)?;
            let f_backward = graph.value(root)?;
            check_len(f0.len(), f_backward.len())?;
            Ok((f_forward - f_backward) / (2.0 * h))
        }
    }
}

/// Finite-difference Jacobian of `root` with respect to its free DOFs.
///
/// Steps that leave a DOF's bounds fail with `OutOfBounds` under the
/// `Reject` policy.
pub fn graph_jacobian(
    graph: &Graph,
    root: NodeId,
    config: &FiniteDifferenceConfig,
) -> Result<Array2<f64>> {
    let x = graph.free_vector(root)?;
    let f0 = graph.clone().value(root)?;
    info!(
        "finite-difference Jacobian of node {}: {} outputs, {} free DOFs, {:?}",
        root,
        f0.len(),
        x.len(),
        config.method
    );

    let compute = || -> Result<Vec<Array1<f64>>> {
        (0..x.len())
            .into_par_iter()
            .map_init(
                || graph.clone(),
                |worker, j| graph_column(worker, root, &x, &f0, j, config),
            )
            .collect()
    };

    let columns = match config.max_workers {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| StelloptError::ConfigError(format!("building worker pool: {}", e)))?
            .install(compute)?,
        None => compute()?,
    };

    let mut jac = Array2::zeros((f0.len(), x.len()));
    for (j, column) in columns.into_iter().enumerate() {
        jac.column_mut(j).assign(&column);
    }
    Ok(jac)
}

/// Finite-difference gradient of a scalar `root`.
pub fn graph_gradient(
    graph: &Graph,
    root: NodeId,
    config: &FiniteDifferenceConfig,
) -> Result<Array1<f64>> {
    let jac = graph_jacobian(graph, root, config)?;
    if jac.nrows() != 1 {
        return Err(StelloptError::ShapeMismatch(format!(
            "gradient requested for node {} with {} outputs",
            root,
            jac.nrows()
        )));
    }
    Ok(jac.row(0).to_owned())
}

/// Errors of a Taylor test, one per step size.
#[derive(Debug, Clone, PartialEq)]
pub struct TaylorReport {
    pub epsilons: Vec<f64>,
    pub errors: Vec<f64>,
    /// `max(1, |f(x)|)`, the magnitude round-off is measured against.
    pub scale: f64,
}

impl TaylorReport {
    /// Errors below this are treated as round-off.
    pub fn noise_floor(&self) -> f64 {
        1e-8 * self.scale
    }

    /// `true` if each error is below the noise floor or at most 0.3 times
    /// the previous one: second-order decay of a centered difference until
    /// round-off takes over.
    pub fn converged(&self) -> bool {
        let floor = self.noise_floor();
        self.errors
            .windows(2)
            .all(|w| w[1] < floor || w[1] < 0.3 * w[0])
    }
}

/// Compare the directional derivative `df · h` with centered differences of
/// `f` along `h` for a sequence of halving step sizes.
///
/// If `direction` is `None`, a random direction with entries in `[-1, 1]`
/// is drawn from a generator seeded with `seed`.
pub fn taylor_test<F>(
    mut f: F,
    df: &Array1<f64>,
    x: &Array1<f64>,
    direction: Option<&Array1<f64>>,
    seed: u64,
) -> Result<TaylorReport>
where
    F: FnMut(&Array1<f64>) -> Result<f64>,
{
    if df.len() != x.len() {
        return Err(StelloptError::DimensionMismatch(format!(
            "gradient has {} entries for {} DOFs",
            df.len(),
            x.len()
        )));
    }
    let h = match direction {
        Some(h) if h.len() == x.len() => h.clone(),
        Some(h) => {
            return Err(StelloptError::DimensionMismatch(format!(
                "direction has {} entries for {} DOFs",
                h.len(),
                x.len()
            )))
        }
        None => {
            let mut rng = StdRng::seed_from_u64(seed);
            Array1::from_shape_fn(x.len(), |_| rng.gen_range(-1.0..=1.0))
        }
    };

    let exact = df.dot(&h);
    let scale = f(x)?.abs().max(1.0);
    let epsilons: Vec<f64> = (0..10).map(|k| 1e-2 * 0.5f64.powi(k)).collect();
    let mut errors = Vec::with_capacity(epsilons.len());
    for &eps in &epsilons {
        let f_plus = f(&(x + &(&h * eps)))?;
        let f_minus = f(&(x - &(&h * eps)))?;
        errors.push(((f_plus - f_minus) / (2.0 * eps) - exact).abs());
    }

    Ok(TaylorReport {
        epsilons,
        errors,
        scale,
    })
}
