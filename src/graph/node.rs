//! Node identities and per-node state

use crate::derivative::Derivative;
use crate::dofs::DofContainer;
use crate::graph::op::NodeOp;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a node: its index in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        NodeId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value and derivative of a node at the current DOF state.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: Array1<f64>,
    pub derivative: Derivative,
}

impl Evaluation {
    pub fn new(value: Array1<f64>, derivative: Derivative) -> Self {
        Self { value, derivative }
    }

    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Cache key: graph structure epoch plus the sum of the version counters of
/// every container in the dependency closure. Both only ever increase, so
/// any write below a node changes its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stamp {
    pub epoch: u64,
    pub versions: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct CachedEvaluation {
    pub stamp: Stamp,
    pub evaluation: Evaluation,
}

/// One free-DOF block in the flattened vector of a target node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofBlock {
    /// Node owning the DOFs.
    pub node: NodeId,
    /// Full local DOF count of the node.
    pub local_len: usize,
    /// Local indices of the free DOFs, in container order.
    pub free: Vec<usize>,
    /// Position of the first free DOF in the flattened vector.
    pub offset: usize,
}

/// A node of the DOF graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) label: String,
    pub(crate) op: NodeOp,
    pub(crate) dofs: Option<DofContainer>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) cache: Option<CachedEvaluation>,
}

impl Node {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn op(&self) -> &NodeOp {
        &self.op
    }

    pub fn dofs(&self) -> Option<&DofContainer> {
        self.dofs.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// `true` if a cached evaluation exists, whether or not it is current.
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }
}
