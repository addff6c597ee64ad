//! Closed curves in Cartesian Fourier representation.
//!
//! Each coordinate is a truncated Fourier series in the curve parameter
//! `θ ∈ [0, 1)`:
//!
//! ```text
//! x(θ) = xc(0) + Σ_{m=1}^{order} [ xs(m) sin(2πmθ) + xc(m) cos(2πmθ) ]
//! ```
//!
//! and likewise for `y` and `z`. The DOFs are ordered per coordinate,
//! `xc(0), xs(1), xc(1), ..., xs(order), xc(order)`, then the `y` block,
//! then the `z` block. The output is the position at every quadrature
//! point, flattened row-major as `[x_0, y_0, z_0, x_1, ...]`.

use crate::error::{Result, StelloptError};
use crate::kernels::GeometryKernel;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::PI;

const COORDINATES: [char; 3] = ['x', 'y', 'z'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveXYZFourier {
    order: usize,
    quadpoints: Vec<f64>,
    #[serde(default)]
    initial: Vec<f64>,
}

impl CurveXYZFourier {
    /// A curve evaluated at the given quadrature points.
    pub fn new(order: usize, quadpoints: Vec<f64>) -> Self {
        Self {
            order,
            quadpoints,
            initial: Vec::new(),
        }
    }

    /// A curve evaluated at `n` equispaced points `i / n`.
    pub fn uniform(order: usize, n: usize) -> Self {
        let quadpoints = (0..n).map(|i| i as f64 / n as f64).collect();
        Self::new(order, quadpoints)
    }

    /// A circle of the given radius in the plane `z = center[2]`.
    pub fn circle(order: usize, n: usize, center: [f64; 3], radius: f64) -> Self {
        let curve = Self::uniform(order, n);
        let mut dofs = vec![0.0; curve.dofs_per_coordinate() * 3];
        let per = curve.dofs_per_coordinate();
        for (k, c) in center.iter().enumerate() {
            dofs[k * per] = *c;
        }
        if order >= 1 {
            // xc(1) and ys(1)
            dofs[2] = radius;
            dofs[per + 1] = radius;
        }
        curve.with_dofs(dofs)
    }

    /// Start from `dofs` instead of zeros.
    pub fn with_dofs(mut self, dofs: Vec<f64>) -> Self {
        self.initial = dofs;
        self
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn quadpoints(&self) -> &[f64] {
        &self.quadpoints
    }

    fn dofs_per_coordinate(&self) -> usize {
        2 * self.order + 1
    }

    /// Fourier basis at `theta`: `[1, sin(2πθ), cos(2πθ), sin(4πθ), ...]`.
    fn basis(&self, theta: f64) -> Vec<f64> {
        let mut phi = Vec::with_capacity(self.dofs_per_coordinate());
        phi.push(1.0);
        for m in 1..=self.order {
            let arg = 2.0 * PI * m as f64 * theta;
            phi.push(arg.sin());
            phi.push(arg.cos());
        }
        phi
    }

    fn check_len(&self, dofs: &[f64]) -> Result<()> {
        let expected = 3 * self.dofs_per_coordinate();
        if dofs.len() != expected {
            return Err(StelloptError::ShapeMismatch(format!(
                "CurveXYZFourier of order {} takes {} DOFs, got {}",
                self.order,
                expected,
                dofs.len()
            )));
        }
        Ok(())
    }

    /// Positions at the quadrature points, one row per point.
    pub fn gamma(&self, dofs: &[f64]) -> Result<Array2<f64>> {
        self.check_len(dofs)?;
        let per = self.dofs_per_coordinate();
        let mut gamma = Array2::zeros((self.quadpoints.len(), 3));
        for (i, &theta) in self.quadpoints.iter().enumerate() {
            let phi = self.basis(theta);
            for k in 0..3 {
                gamma[[i, k]] = phi
                    .iter()
                    .zip(&dofs[k * per..(k + 1) * per])
                    .map(|(p, c)| p * c)
                    .sum();
            }
        }
        Ok(gamma)
    }
}

impl GeometryKernel for CurveXYZFourier {
    fn kind(&self) -> &str {
        "CurveXYZFourier"
    }

    fn dof_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(3 * self.dofs_per_coordinate());
        for c in COORDINATES {
            names.push(format!("{}c(0)", c));
            for m in 1..=self.order {
                names.push(format!("{}s({})", c, m));
                names.push(format!("{}c({})", c, m));
            }
        }
        names
    }

    fn initial_dofs(&self) -> Vec<f64> {
        if self.initial.is_empty() {
            vec![0.0; 3 * self.dofs_per_coordinate()]
        } else {
            self.initial.clone()
        }
    }

    fn output_len(&self) -> usize {
        3 * self.quadpoints.len()
    }

    fn value(&self, dofs: &[f64]) -> Result<Array1<f64>> {
        let gamma = self.gamma(dofs)?;
        Ok(Array1::from_iter(gamma.iter().copied()))
    }

    fn dvalue_by_dcoeff(&self, dofs: &[f64]) -> Result<Array2<f64>> {
        self.check_len(dofs)?;
        let per = self.dofs_per_coordinate();
        let mut partial = Array2::zeros((self.output_len(), dofs.len()));
        for (i, &theta) in self.quadpoints.iter().enumerate() {
            let phi = self.basis(theta);
            for k in 0..3 {
                for (j, p) in phi.iter().enumerate() {
                    partial[[3 * i + k, k * per + j]] = *p;
                }
            }
        }
        Ok(partial)
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
