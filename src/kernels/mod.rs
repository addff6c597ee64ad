//! # Geometry kernels and functionals
//!
//! Physical objects enter the graph through two traits:
//!
//! - [`GeometryKernel`]: a primitive object (coil curve, profile) whose
//!   output depends only on its own DOFs. Wrapped by a `Leaf` node.
//! - [`Functional`]: a quantity computed from the outputs of child nodes,
//!   optionally with DOFs of its own (a scale factor, say). Wrapped by a
//!   `Functional` node, which applies the chain rule through the children.
//!
//! Both report partial derivatives with respect to *full* local DOF
//! vectors; the graph handles fixed DOFs.

pub mod curve;
pub mod functionals;
pub mod identity;
pub mod profile;
pub mod registry;

pub use curve::CurveXYZFourier;
pub use functionals::{CurveCurveDistance, CurveLength};
pub use identity::Identity;
pub use profile::{ProfilePolynomial, ProfilePressure, ProfileScaled, ProfileSpline};
pub use registry::KernelRegistry;

use crate::derivative::Derivative;
use crate::dofs::DofContainer;
use crate::error::{Result, StelloptError};
use crate::graph::{Evaluation, Graph, NodeId, NodeOp};
use ndarray::{Array1, Array2};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// A primitive object whose output depends only on its own DOFs.
///
/// Implementations must be deterministic in `dofs`.
pub trait GeometryKernel: Debug + Send + Sync {
    /// Name used in snapshots and to look the kernel up in a [`KernelRegistry`].
    fn kind(&self) -> &str;

    /// Names of the local DOFs, in order.
    fn dof_names(&self) -> Vec<String>;

    /// DOF values a fresh leaf starts from.
    fn initial_dofs(&self) -> Vec<f64> {
        vec![0.0; self.dof_names().len()]
    }

    /// Number of outputs.
    fn output_len(&self) -> usize;

    fn value(&self, dofs: &[f64]) -> Result<Array1<f64>>;

    /// Partial of the output with respect to the full local DOF vector,
    /// `output_len x dof_names().len()`.
    fn dvalue_by_dcoeff(&self, dofs: &[f64]) -> Result<Array2<f64>>;

    /// Serializable parameters (not the DOFs).
    fn to_value(&self) -> Result<Value>;
}

/// Output of [`Functional::apply`].
#[derive(Debug, Clone)]
pub struct FunctionalOutput {
    pub value: Array1<f64>,
    /// Partial with respect to the functional's own DOFs, if it has any.
    pub d_local: Option<Array2<f64>>,
    /// Partial with respect to each input, `value.len() x inputs[k].len()`.
    pub d_inputs: Vec<Array2<f64>>,
}

/// A quantity computed from the outputs of child nodes.
pub trait Functional: Debug + Send + Sync {
    fn kind(&self) -> &str;

    /// Names of the functional's own DOFs. Empty for most functionals.
    fn local_dof_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn initial_dofs(&self) -> Vec<f64> {
        vec![0.0; self.local_dof_names().len()]
    }

    /// Whether the functional can be applied to `n` inputs.
    fn accepts(&self, n: usize) -> bool;

    fn apply(&self, local: &[f64], inputs: &[&Array1<f64>]) -> Result<FunctionalOutput>;

    fn to_value(&self) -> Result<Value>;
}

/// Glue between a [`GeometryKernel`] and a node's [`DofContainer`].
#[derive(Debug, Clone)]
pub struct LeafAdapter {
    kernel: Arc<dyn GeometryKernel>,
}

impl LeafAdapter {
    pub fn new(kernel: Arc<dyn GeometryKernel>) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &dyn GeometryKernel {
        self.kernel.as_ref()
    }

    pub(crate) fn evaluate(&self, id: NodeId, dofs: Option<&DofContainer>) -> Result<Evaluation> {
        let dofs = dofs.ok_or_else(|| {
            StelloptError::ConfigError(format!("leaf node {} owns no DOFs", id))
        })?;
        let x = dofs.full().to_vec();

        let value = self.kernel.value(&x)?;
        if value.len() != self.kernel.output_len() {
            return Err(StelloptError::ShapeMismatch(format!(
                "{} kernel declares {} outputs but returned {}",
                self.kernel.kind(),
                self.kernel.output_len(),
                value.len()
            )));
        }
        let partial = self.kernel.dvalue_by_dcoeff(&x)?;
        if partial.dim() != (value.len(), x.len()) {
            return Err(StelloptError::ShapeMismatch(format!(
                "{} kernel returned a {:?} partial for {} outputs and {} DOFs",
                self.kernel.kind(),
                partial.dim(),
                value.len(),
                x.len()
            )));
        }

        Ok(Evaluation::new(value, Derivative::local(id, partial)))
    }
}

/// Glue between a [`Functional`] and the evaluations of a node's children.
#[derive(Debug, Clone)]
pub struct FunctionalAdapter {
    functional: Arc<dyn Functional>,
}

impl FunctionalAdapter {
    pub fn new(functional: Arc<dyn Functional>) -> Self {
        Self { functional }
    }

    pub fn functional(&self) -> &dyn Functional {
        self.functional.as_ref()
    }

    pub(crate) fn accepts(&self, n: usize) -> bool {
        self.functional.accepts(n)
    }

    pub(crate) fn evaluate(
        &self,
        id: NodeId,
        dofs: Option<&DofContainer>,
        inputs: &[Evaluation],
    ) -> Result<Evaluation> {
        let local = dofs.map(|d| d.full().to_vec()).unwrap_or_default();
        let values: Vec<&Array1<f64>> = inputs.iter().map(|e| &e.value).collect();
        let output = self.functional.apply(&local, &values)?;

        if output.d_inputs.len() != inputs.len() {
            return Err(StelloptError::ShapeMismatch(format!(
                "{} returned {} input partials for {} inputs",
                self.functional.kind(),
                output.d_inputs.len(),
                inputs.len()
            )));
        }

        let rows = output.value.len();
        let mut derivative = Derivative::zeros(rows);
        for (input, partial) in inputs.iter().zip(&output.d_inputs) {
            derivative = derivative.checked_add(&input.derivative.left_mul(partial)?)?;
        }
        if let Some(partial) = output.d_local {
            if partial.dim() != (rows, local.len()) {
                return Err(StelloptError::ShapeMismatch(format!(
                    "{} returned a {:?} local partial for {} outputs and {} DOFs",
                    self.functional.kind(),
                    partial.dim(),
                    rows,
                    local.len()
                )));
            }
            derivative = derivative.checked_add(&Derivative::local(id, partial))?;
        }

        Ok(Evaluation::new(output.value, derivative))
    }
}

impl Graph {
    /// Add a leaf backed by `kernel`, with a fresh all-free DOF container.
    pub fn add_leaf(
        &mut self,
        label: &str,
        kernel: impl GeometryKernel + 'static,
    ) -> Result<NodeId> {
        self.add_leaf_shared(label, Arc::new(kernel))
    }

    /// Add a leaf backed by a kernel that may be shared with other leaves.
    pub fn add_leaf_shared(
        &mut self,
        label: &str,
        kernel: Arc<dyn GeometryKernel>,
    ) -> Result<NodeId> {
        let dofs = DofContainer::new(
            &kernel.dof_names(),
            &kernel.initial_dofs(),
            self.config().bounds_policy,
        )?;
        self.add_node(label, NodeOp::Leaf(LeafAdapter::new(kernel)), Some(dofs), &[])
    }

    /// Add a functional over `children`.
    pub fn add_functional(
        &mut self,
        label: &str,
        functional: impl Functional + 'static,
        children: &[NodeId],
    ) -> Result<NodeId> {
        self.add_functional_shared(label, Arc::new(functional), children)
    }

    pub fn add_functional_shared(
        &mut self,
        label: &str,
        functional: Arc<dyn Functional>,
        children: &[NodeId],
    ) -> Result<NodeId> {
        let names = functional.local_dof_names();
        let dofs = if names.is_empty() {
            None
        } else {
            Some(DofContainer::new(
                &names,
                &functional.initial_dofs(),
                self.config().bounds_policy,
            )?)
        };
        self.add_node(
            label,
            NodeOp::Functional(FunctionalAdapter::new(functional)),
            dofs,
            children,
        )
    }
}
