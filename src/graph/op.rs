//! The operation carried by a node.
//!
//! Every node evaluates through one of these variants. Leaves adapt a
//! [`GeometryKernel`](crate::kernels::GeometryKernel) to the node's DOF
//! container; functionals chain a [`Functional`](crate::kernels::Functional)
//! through its children; the rest are the objective combinators.

use crate::dofs::DofContainer;
use crate::error::{Result, StelloptError};
use crate::graph::node::{Evaluation, NodeId};
use crate::kernels::{FunctionalAdapter, LeafAdapter};
use crate::objectives::{Constrained, LeastSquares, QuadraticPenalty, Scaled, Sum};

#[derive(Debug, Clone)]
pub enum NodeOp {
    Leaf(LeafAdapter),
    Functional(FunctionalAdapter),
    Sum(Sum),
    Scaled(Scaled),
    QuadraticPenalty(QuadraticPenalty),
    LeastSquares(LeastSquares),
    Constrained(Constrained),
}

impl NodeOp {
    /// Short name of the operation, as written in snapshots and logs.
    pub fn kind(&self) -> &str {
        match self {
            NodeOp::Leaf(leaf) => leaf.kernel().kind(),
            NodeOp::Functional(functional) => functional.functional().kind(),
            NodeOp::Sum(_) => "Sum",
            NodeOp::Scaled(_) => "Scaled",
            NodeOp::QuadraticPenalty(_) => "QuadraticPenalty",
            NodeOp::LeastSquares(_) => "LeastSquares",
            NodeOp::Constrained(_) => "Constrained",
        }
    }

    /// Check that the operation accepts `n` children.
    pub(crate) fn check_arity(&self, n: usize) -> Result<()> {
        let ok = match self {
            NodeOp::Leaf(_) => n == 0,
            NodeOp::Functional(functional) => functional.accepts(n),
            NodeOp::Sum(_) => n >= 1,
            NodeOp::Scaled(_) | NodeOp::QuadraticPenalty(_) => n == 1,
            NodeOp::LeastSquares(lsq) => n == lsq.len(),
            NodeOp::Constrained(constrained) => n == constrained.len() + 1,
        };

        if ok {
            Ok(())
        } else {
            Err(StelloptError::ConfigError(format!(
                "{} node cannot have {} children",
                self.kind(),
                n
            )))
        }
    }

    /// Whether the operation owns a DOF container.
    pub(crate) fn owns_dofs(&self) -> bool {
        match self {
            NodeOp::Leaf(_) => true,
            NodeOp::Functional(functional) => !functional.functional().local_dof_names().is_empty(),
            _ => false,
        }
    }

    pub(crate) fn evaluate(
        &self,
        id: NodeId,
        dofs: Option<&DofContainer>,
        inputs: &[Evaluation],
    ) -> Result<Evaluation> {
        self.check_arity(inputs.len())?;
        match self {
            NodeOp::Leaf(leaf) => leaf.evaluate(id, dofs),
            NodeOp::Functional(functional) => functional.evaluate(id, dofs, inputs),
            NodeOp::Sum(sum) => sum.evaluate(inputs),
            NodeOp::Scaled(scaled) => scaled.evaluate(&inputs[0]),
            NodeOp::QuadraticPenalty(penalty) => penalty.evaluate(&inputs[0]),
            NodeOp::LeastSquares(lsq) => lsq.evaluate(inputs),
            NodeOp::Constrained(constrained) => constrained.evaluate(inputs),
        }
    }
}
