//! Radial profiles: polynomial and spline kernels plus functionals that
//! combine profiles.
//!
//! A profile is a function of the normalized flux `s ∈ [0, 1]` sampled at a
//! fixed set of points. Combining profiles pointwise keeps the sample
//! points, so every child of a [`ProfilePressure`] must be sampled on the
//! same grid.

use crate::error::{Result, StelloptError};
use crate::kernels::{Functional, FunctionalOutput, GeometryKernel};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `f(s) = Σ c_i s^i`, with coefficients `c(0), c(1), ...` as DOFs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePolynomial {
    coefficients: Vec<f64>,
    points: Vec<f64>,
}

impl ProfilePolynomial {
    /// Polynomial with the given initial coefficients, sampled at `points`.
    pub fn new(coefficients: Vec<f64>, points: Vec<f64>) -> Self {
        Self {
            coefficients,
            points,
        }
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// `f(s)` for coefficients `c`.
    pub fn f(c: &[f64], s: f64) -> f64 {
        c.iter().rev().fold(0.0, |acc, ci| acc * s + ci)
    }

    /// `df/ds` for coefficients `c`.
    pub fn dfds(c: &[f64], s: f64) -> f64 {
        c.iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, ci)| acc * s + i as f64 * ci)
    }
}

impl GeometryKernel for ProfilePolynomial {
    fn kind(&self) -> &str {
        "ProfilePolynomial"
    }

    fn dof_names(&self) -> Vec<String> {
        (0..self.coefficients.len()).map(|i| format!("c({})", i)).collect()
    }

    fn initial_dofs(&self) -> Vec<f64> {
        self.coefficients.clone()
    }

    fn output_len(&self) -> usize {
        self.points.len()
    }

    fn value(&self, dofs: &[f64]) -> Result<Array1<f64>> {
        Ok(self.points.iter().map(|&s| Self::f(dofs, s)).collect())
    }

    fn dvalue_by_dcoeff(&self, dofs: &[f64]) -> Result<Array2<f64>> {
        Ok(Array2::from_shape_fn((self.points.len(), dofs.len()), |(j, i)| {
            self.points[j].powi(i as i32)
        }))
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Interpolating spline through values at fixed knots, with the knot values
/// `f(0), f(1), ...` as DOFs.
///
/// `degree` 1 is piecewise linear; `degree` 3 is a cubic spline with
/// not-a-knot ends, so cubic data are reproduced exactly. Points outside the
/// knots are extrapolated with the end pieces. The output is linear in the
/// DOFs, so the interpolation basis is built once and `dvalue_by_dcoeff` is
/// that matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SplineRecord", into = "SplineRecord")]
pub struct ProfileSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    points: Vec<f64>,
    degree: usize,
    basis: Array2<f64>,
    dbasis: Array2<f64>,
}

#[derive(Serialize, Deserialize)]
struct SplineRecord {
    knots: Vec<f64>,
    values: Vec<f64>,
    points: Vec<f64>,
    degree: usize,
}

impl TryFrom<SplineRecord> for ProfileSpline {
    type Error = StelloptError;

    fn try_from(record: SplineRecord) -> Result<Self> {
        ProfileSpline::with_degree(record.knots, record.values, record.points, record.degree)
    }
}

impl From<ProfileSpline> for SplineRecord {
    fn from(spline: ProfileSpline) -> Self {
        SplineRecord {
            knots: spline.knots,
            values: spline.values,
            points: spline.points,
            degree: spline.degree,
        }
    }
}

impl ProfileSpline {
    /// Cubic spline through `values` at `knots`, sampled at `points`.
    pub fn new(knots: Vec<f64>, values: Vec<f64>, points: Vec<f64>) -> Result<Self> {
        Self::with_degree(knots, values, points, 3)
    }

    pub fn with_degree(
        knots: Vec<f64>,
        values: Vec<f64>,
        points: Vec<f64>,
        degree: usize,
    ) -> Result<Self> {
        if degree != 1 && degree != 3 {
            return Err(StelloptError::ConfigError(format!(
                "spline degree must be 1 or 3, got {}",
                degree
            )));
        }
        if knots.len() != values.len() {
            return Err(StelloptError::ConfigError(format!(
                "{} knots but {} values",
                knots.len(),
                values.len()
            )));
        }
        if knots.len() <= degree {
            return Err(StelloptError::ConfigError(format!(
                "a degree {} spline needs at least {} knots, got {}",
                degree,
                degree + 1,
                knots.len()
            )));
        }
        if knots.iter().any(|k| !k.is_finite()) || knots.windows(2).any(|w| w[1] <= w[0]) {
            return Err(StelloptError::ConfigError(
                "spline knots must be finite and strictly increasing".to_string(),
            ));
        }

        let curvature = if degree == 3 {
            not_a_knot_curvature(&knots)?
        } else {
            Array2::zeros((knots.len(), knots.len()))
        };
        let (basis, dbasis) = spline_basis(&knots, &curvature, &points);

        Ok(Self {
            knots,
            values,
            points,
            degree,
            basis,
            dbasis,
        })
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// `df/ds` at the sample points for knot values `dofs`.
    pub fn dfds(&self, dofs: &[f64]) -> Result<Array1<f64>> {
        self.check_len(dofs)?;
        Ok(self.dbasis.dot(&ArrayView1::from(dofs)))
    }

    fn check_len(&self, dofs: &[f64]) -> Result<()> {
        if dofs.len() != self.knots.len() {
            return Err(StelloptError::DimensionMismatch(format!(
                "spline has {} knots, got {} values",
                self.knots.len(),
                dofs.len()
            )));
        }
        Ok(())
    }
}

/// Maps knot values to the second derivatives at the knots of the
/// not-a-knot cubic spline, as an `n x n` matrix.
fn not_a_knot_curvature(knots: &[f64]) -> Result<Array2<f64>> {
    let n = knots.len();
    let h: Vec<f64> = knots.windows(2).map(|w| w[1] - w[0]).collect();
    let mut lhs = Array2::zeros((n, n));
    let mut rhs = Array2::zeros((n, n));

    // Third derivative continuous across the second and second-to-last knots
    lhs[[0, 0]] = h[1];
    lhs[[0, 1]] = -(h[0] + h[1]);
    lhs[[0, 2]] = h[0];
    lhs[[n - 1, n - 3]] = h[n - 2];
    lhs[[n - 1, n - 2]] = -(h[n - 3] + h[n - 2]);
    lhs[[n - 1, n - 1]] = h[n - 3];

    for i in 1..n - 1 {
        lhs[[i, i - 1]] = h[i - 1];
        lhs[[i, i]] = 2.0 * (h[i - 1] + h[i]);
        lhs[[i, i + 1]] = h[i];
        rhs[[i, i - 1]] = 6.0 / h[i - 1];
        rhs[[i, i]] = -6.0 / h[i - 1] - 6.0 / h[i];
        rhs[[i, i + 1]] = 6.0 / h[i];
    }

    solve(lhs, rhs)
}

/// Gaussian elimination with partial pivoting for `lhs · x = rhs`.
fn solve(mut lhs: Array2<f64>, mut rhs: Array2<f64>) -> Result<Array2<f64>> {
    let n = lhs.nrows();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| lhs[[a, col]].abs().total_cmp(&lhs[[b, col]].abs()))
            .unwrap_or(col);
        if lhs[[pivot, col]].abs() < 1e-300 {
            return Err(StelloptError::ConfigError("singular spline system".to_string()));
        }
        if pivot != col {
            for j in 0..n {
                lhs.swap([pivot, j], [col, j]);
                rhs.swap([pivot, j], [col, j]);
            }
        }
        for row in col + 1..n {
            let factor = lhs[[row, col]] / lhs[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                lhs[[row, j]] -= factor * lhs[[col, j]];
            }
            for j in 0..n {
                rhs[[row, j]] -= factor * rhs[[col, j]];
            }
        }
    }

    for row in (0..n).rev() {
        for j in 0..n {
            let mut acc = rhs[[row, j]];
            for k in row + 1..n {
                acc -= lhs[[row, k]] * rhs[[k, j]];
            }
            rhs[[row, j]] = acc / lhs[[row, row]];
        }
    }
    Ok(rhs)
}

/// Value and `d/ds` rows of the interpolation at each point, given the
/// knot-value to curvature map.
fn spline_basis(
    knots: &[f64],
    curvature: &Array2<f64>,
    points: &[f64],
) -> (Array2<f64>, Array2<f64>) {
    let n = knots.len();
    let mut basis = Array2::zeros((points.len(), n));
    let mut dbasis = Array2::zeros((points.len(), n));

    for (row, &s) in points.iter().enumerate() {
        let i = knots[1..n - 1].iter().take_while(|&&k| k <= s).count();
        let h = knots[i + 1] - knots[i];
        let t = s - knots[i];
        let u = knots[i + 1] - s;

        basis[[row, i]] += u / h;
        basis[[row, i + 1]] += t / h;
        dbasis[[row, i]] -= 1.0 / h;
        dbasis[[row, i + 1]] += 1.0 / h;

        let c_lo = u.powi(3) / (6.0 * h) - h * u / 6.0;
        let c_hi = t.powi(3) / (6.0 * h) - h * t / 6.0;
        let d_lo = h / 6.0 - u * u / (2.0 * h);
        let d_hi = t * t / (2.0 * h) - h / 6.0;
        for k in 0..n {
            basis[[row, k]] += c_lo * curvature[[i, k]] + c_hi * curvature[[i + 1, k]];
            dbasis[[row, k]] += d_lo * curvature[[i, k]] + d_hi * curvature[[i + 1, k]];
        }
    }

    (basis, dbasis)
}

impl GeometryKernel for ProfileSpline {
    fn kind(&self) -> &str {
        "ProfileSpline"
    }

    fn dof_names(&self) -> Vec<String> {
        (0..self.knots.len()).map(|i| format!("f({})", i)).collect()
    }

    fn initial_dofs(&self) -> Vec<f64> {
        self.values.clone()
    }

    fn output_len(&self) -> usize {
        self.points.len()
    }

    fn value(&self, dofs: &[f64]) -> Result<Array1<f64>> {
        self.check_len(dofs)?;
        Ok(self.basis.dot(&ArrayView1::from(dofs)))
    }

    fn dvalue_by_dcoeff(&self, dofs: &[f64]) -> Result<Array2<f64>> {
        self.check_len(dofs)?;
        Ok(self.basis.clone())
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A child profile times its own `scalefac` DOF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileScaled {
    scalefac: f64,
}

impl ProfileScaled {
    pub fn new(scalefac: f64) -> Self {
        Self { scalefac }
    }
}

impl Functional for ProfileScaled {
    fn kind(&self) -> &str {
        "ProfileScaled"
    }

    fn local_dof_names(&self) -> Vec<String> {
        vec!["scalefac".to_string()]
    }

    fn initial_dofs(&self) -> Vec<f64> {
        vec![self.scalefac]
    }

    fn accepts(&self, n: usize) -> bool {
        n == 1
    }

    fn apply(&self, local: &[f64], inputs: &[&Array1<f64>]) -> Result<FunctionalOutput> {
        let scalefac = local[0];
        let base = inputs[0];
        let n = base.len();
        Ok(FunctionalOutput {
            value: base * scalefac,
            d_local: Some(base.view().insert_axis(Axis(1)).to_owned()),
            d_inputs: vec![Array2::<f64>::eye(n) * scalefac],
        })
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Pressure `p = Σ_k n_k T_k` from children `[n_0, T_0, n_1, T_1, ...]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePressure;

impl Functional for ProfilePressure {
    fn kind(&self) -> &str {
        "ProfilePressure"
    }

    fn accepts(&self, n: usize) -> bool {
        n > 0 && n % 2 == 0
    }

    fn apply(&self, _local: &[f64], inputs: &[&Array1<f64>]) -> Result<FunctionalOutput> {
        if !self.accepts(inputs.len()) {
            return Err(StelloptError::ConfigError(format!(
                "ProfilePressure needs density/temperature pairs, got {} profiles",
                inputs.len()
            )));
        }
        let n = inputs[0].len();
        if let Some(bad) = inputs.iter().find(|p| p.len() != n) {
            return Err(StelloptError::DimensionMismatch(format!(
                "profiles sampled at {} and {} points",
                n,
                bad.len()
            )));
        }

        let mut value = Array1::zeros(n);
        let mut d_inputs = Vec::with_capacity(inputs.len());
        for pair in inputs.chunks(2) {
            let (density, temperature) = (pair[0], pair[1]);
            value += &(density * temperature);
            d_inputs.push(Array2::from_diag(temperature));
            d_inputs.push(Array2::from_diag(density));
        }

        Ok(FunctionalOutput {
            value,
            d_local: None,
            d_inputs,
        })
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
