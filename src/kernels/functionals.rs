//! Functionals over curve positions.
//!
//! Inputs are flattened position arrays as produced by
//! [`CurveXYZFourier`](crate::kernels::CurveXYZFourier): `[x_0, y_0, z_0, x_1, ...]`.

use crate::error::{Result, StelloptError};
use crate::kernels::{Functional, FunctionalOutput};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn points(gamma: &Array1<f64>) -> Result<usize> {
    if gamma.len() % 3 != 0 {
        return Err(StelloptError::ShapeMismatch(format!(
            "curve positions must come in triples, got {} values",
            gamma.len()
        )));
    }
    Ok(gamma.len() / 3)
}

fn point(gamma: &Array1<f64>, i: usize) -> [f64; 3] {
    [gamma[3 * i], gamma[3 * i + 1], gamma[3 * i + 2]]
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Length of the closed polygon through the quadrature points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveLength;

impl Functional for CurveLength {
    fn kind(&self) -> &str {
        "CurveLength"
    }

    fn accepts(&self, n: usize) -> bool {
        n == 1
    }

    fn apply(&self, _local: &[f64], inputs: &[&Array1<f64>]) -> Result<FunctionalOutput> {
        let gamma = inputs[0];
        let n = points(gamma)?;

        let mut length = 0.0;
        let mut grad = Array2::zeros((1, gamma.len()));
        for i in 0..n {
            let j = (i + 1) % n;
            let (a, b) = (point(gamma, i), point(gamma, j));
            let d = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let l = norm(d);
            length += l;
            // Coincident points have no well-defined direction
            if l > 0.0 {
                for k in 0..3 {
                    grad[[0, 3 * j + k]] += d[k] / l;
                    grad[[0, 3 * i + k]] -= d[k] / l;
                }
            }
        }

        Ok(FunctionalOutput {
            value: Array1::from_elem(1, length),
            d_local: None,
            d_inputs: vec![grad],
        })
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Penalty on curves coming closer than `minimum_distance`.
///
/// For every pair of curves `(a, b)`:
///
/// ```text
/// J_ab = 1/(N_a N_b) Σ_i Σ_j max(0, d_min - |γa_i - γb_j|)²
/// ```
///
/// and the output is the sum over pairs.
///
/// This is an unweighted average over point pairs. The arc-length form that
/// weights each pair by `|γa'_i| |γb'_j|` needs curve tangents, which a
/// functional over sampled positions does not see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveCurveDistance {
    minimum_distance: f64,
}

impl CurveCurveDistance {
    pub fn new(minimum_distance: f64) -> Self {
        Self { minimum_distance }
    }

    pub fn minimum_distance(&self) -> f64 {
        self.minimum_distance
    }

    /// Smallest point-to-point distance between any two of the curves.
    pub fn shortest_distance(inputs: &[&Array1<f64>]) -> Result<f64> {
        let mut shortest = f64::INFINITY;
        for (ia, a) in inputs.iter().enumerate() {
            for b in &inputs[ia + 1..] {
                for i in 0..points(a)? {
                    for j in 0..points(b)? {
                        let (p, q) = (point(a, i), point(b, j));
                        shortest = shortest.min(norm([p[0] - q[0], p[1] - q[1], p[2] - q[2]]));
                    }
                }
            }
        }
        Ok(shortest)
    }
}

impl Functional for CurveCurveDistance {
    fn kind(&self) -> &str {
        "CurveCurveDistance"
    }

    fn accepts(&self, n: usize) -> bool {
        n >= 2
    }

    fn apply(&self, _local: &[f64], inputs: &[&Array1<f64>]) -> Result<FunctionalOutput> {
        let dmin = self.minimum_distance;
        if !dmin.is_finite() || dmin < 0.0 {
            return Err(StelloptError::ConfigError(format!(
                "minimum distance must be finite and non-negative, got {}",
                dmin
            )));
        }

        let mut value = 0.0;
        let mut d_inputs: Vec<Array2<f64>> = inputs
            .iter()
            .map(|g| Array2::zeros((1, g.len())))
            .collect();

        for ia in 0..inputs.len() {
            for ib in ia + 1..inputs.len() {
                let (a, b) = (inputs[ia], inputs[ib]);
                let (na, nb) = (points(a)?, points(b)?);
                if na == 0 || nb == 0 {
                    continue;
                }
                let weight = 1.0 / (na * nb) as f64;

                for i in 0..na {
                    for j in 0..nb {
                        let (p, q) = (point(a, i), point(b, j));
                        let diff = [p[0] - q[0], p[1] - q[1], p[2] - q[2]];
                        let d = norm(diff);
                        let gap = dmin - d;
                        if gap <= 0.0 {
                            continue;
                        }
                        value += weight * gap * gap;
                        if d > 0.0 {
                            let factor = -2.0 * weight * gap / d;
                            for k in 0..3 {
                                d_inputs[ia][[0, 3 * i + k]] += factor * diff[k];
                                d_inputs[ib][[0, 3 * j + k]] -= factor * diff[k];
                            }
                        }
                    }
                }
            }
        }

        Ok(FunctionalOutput {
            value: Array1::from_elem(1, value),
            d_local: None,
            d_inputs,
        })
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
