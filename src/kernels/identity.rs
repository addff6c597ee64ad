//! A kernel whose output is its DOF vector.

use crate::error::Result;
use crate::kernels::GeometryKernel;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Plain named parameters exposed as a vector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    names: Vec<String>,
    #[serde(default)]
    initial: Vec<f64>,
}

impl Identity {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            initial: Vec::new(),
        }
    }

    /// Start from `values` instead of zeros. Lengths are checked when the
    /// leaf is created.
    pub fn with_values(mut self, values: &[f64]) -> Self {
        self.initial = values.to_vec();
        self
    }
}

impl GeometryKernel for Identity {
    fn kind(&self) -> &str {
        "Identity"
    }

    fn dof_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn initial_dofs(&self) -> Vec<f64> {
        if self.initial.is_empty() {
            vec![0.0; self.names.len()]
        } else {
            self.initial.clone()
        }
    }

    fn output_len(&self) -> usize {
        self.names.len()
    }

    fn value(&self, dofs: &[f64]) -> Result<Array1<f64>> {
        Ok(Array1::from_vec(dofs.to_vec()))
    }

    fn dvalue_by_dcoeff(&self, dofs: &[f64]) -> Result<Array2<f64>> {
        Ok(Array2::eye(dofs.len()))
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
