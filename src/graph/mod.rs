//! # DOF Graph
//!
//! Optimizable objects live in an arena of [`Node`]s addressed by
//! [`NodeId`]. A node optionally owns a [`DofContainer`] and has an ordered
//! list of children it depends on. The dependency relation is kept acyclic.
//!
//! The free-DOF vector of a node is assembled by a depth-first walk over
//! its dependency closure, children in stored order, each node visited at
//! most once. A node shared by several branches (the same coil curve used
//! by a length penalty and a distance penalty, say) therefore contributes
//! its free DOFs exactly once, and [`Derivative::project`] uses the same
//! walk so gradients line up with [`Graph::free_vector`].
//!
//! ```rust
//! use stellopt_rs::config::GraphConfig;
//! use stellopt_rs::graph::Graph;
//! use stellopt_rs::kernels::Identity;
//!
//! let mut graph = Graph::new(GraphConfig::default());
//! let a = graph.add_leaf("a", Identity::new(&["a0", "a1", "a2"])).unwrap();
//! let b = graph.add_leaf("b", Identity::new(&["b0", "b1"])).unwrap();
//! graph.fix(b, "b0").unwrap();
//!
//! let total = graph.add_sum("total", &[a, b]).unwrap();
//! assert_eq!(graph.free_count(total).unwrap(), 4);
//!
//! graph.set_free_vector(total, &[1.0, 2.0, 3.0, 4.0]).unwrap();
//! assert_eq!(graph.free_vector(total).unwrap().to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
//! ```
//!
//! Evaluations are memoized per node and keyed on the version counters of
//! every container below the node, so reading a value twice without an
//! intervening write evaluates the kernels once.

pub mod node;
pub mod op;
pub mod serialize;

pub use node::{DofBlock, Evaluation, Node, NodeId};
pub use op::NodeOp;
pub use serialize::{GraphSnapshot, NodeRecord, OpRecord};

use crate::config::GraphConfig;
use crate::derivative::Derivative;
use crate::dofs::{Bounds, DofContainer, DofRef};
use crate::error::{Result, StelloptError};
use log::{debug, trace};
use ndarray::{Array1, Array2};
use node::{CachedEvaluation, Stamp};
use std::collections::HashSet;

/// Arena of optimizable nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    config: GraphConfig,
    epoch: u64,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(config: GraphConfig) -> Self {
        Self {
            nodes: Vec::new(),
            config,
            epoch: 0,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::from_index)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .ok_or(StelloptError::NodeNotFound(id.index()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .ok_or(StelloptError::NodeNotFound(id.index()))
    }

    pub fn label(&self, id: NodeId) -> Result<&str> {
        Ok(self.node(id)?.label())
    }

    /// Add a node with the given operation, DOFs and children.
    ///
    /// The children must already exist, which keeps the graph acyclic at
    /// insertion. The container, if any, takes the graph's bounds policy.
    pub fn add_node(
        &mut self,
        label: &str,
        op: NodeOp,
        dofs: Option<DofContainer>,
        children: &[NodeId],
    ) -> Result<NodeId> {
        for &child in children {
            self.node(child)?;
        }
        op.check_arity(children.len())?;
        if op.owns_dofs() != dofs.is_some() {
            return Err(StelloptError::ConfigError(format!(
                "{} node '{}' {} a DOF container",
                op.kind(),
                label,
                if op.owns_dofs() { "requires" } else { "cannot own" }
            )));
        }

        let dofs = dofs.map(|mut d| {
            d.set_policy(self.config.bounds_policy);
            d
        });

        let id = NodeId::from_index(self.nodes.len());
        debug!(
            "adding node {} '{}' ({}) with {} children",
            id,
            label,
            op.kind(),
            children.len()
        );
        self.nodes.push(Node {
            label: label.to_string(),
            op,
            dofs,
            children: children.to_vec(),
            parents: Vec::new(),
            cache: None,
        });
        for &child in children {
            let parents = &mut self.nodes[child.index()].parents;
            if !parents.contains(&id) {
                parents.push(id);
            }
        }
        Ok(id)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.children())
    }

    pub fn parents(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.parents())
    }

    /// Append a child edge. Fails with `CyclicDependency` if `parent` is
    /// reachable from `child`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let op = self.node(parent)?.op.clone();
        let mut children = self.node(parent)?.children.clone();
        children.push(child);
        self.rewire(parent, op, children)
    }

    /// Remove the first edge from `parent` to `child`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let op = self.node(parent)?.op.clone();
        let mut children = self.node(parent)?.children.clone();
        let position = children.iter().position(|&c| c == child).ok_or_else(|| {
            StelloptError::ConfigError(format!("node {} is not a child of node {}", child, parent))
        })?;
        children.remove(position);
        self.rewire(parent, op, children)
    }

    /// Replace the operation and children of a node in one step.
    ///
    /// Everything is validated before the graph is touched: the children
    /// exist, the operation accepts their number, and no new edge closes a
    /// cycle.
    pub(crate) fn rewire(&mut self, id: NodeId, op: NodeOp, children: Vec<NodeId>) -> Result<()> {
        self.node(id)?;
        for &child in &children {
            self.node(child)?;
            if child == id || self.is_ancestor_of(child, id)? {
                return Err(StelloptError::CyclicDependency(format!(
                    "edge {} -> {} would close a cycle",
                    id, child
                )));
            }
        }
        op.check_arity(children.len())?;

        debug!("rewiring node {} to {} children", id, children.len());
        let old_children = std::mem::replace(&mut self.node_mut(id)?.children, children.clone());
        self.node_mut(id)?.op = op;

        for child in old_children {
            if !children.contains(&child) {
                self.nodes[child.index()].parents.retain(|&p| p != id);
            }
        }
        for &child in &children {
            let parents = &mut self.nodes[child.index()].parents;
            if !parents.contains(&id) {
                parents.push(id);
            }
        }

        self.epoch += 1;
        Ok(())
    }

    /// The DOF container of a node, if it owns one.
    pub fn dofs(&self, id: NodeId) -> Result<Option<&DofContainer>> {
        Ok(self.node(id)?.dofs())
    }

    /// Mutable access to the DOF container of a node.
    pub fn dofs_mut(&mut self, id: NodeId) -> Result<&mut DofContainer> {
        // Whole-container replacement through this reference would not bump
        // the container version, so invalidate by epoch as well.
        self.epoch += 1;
        self.node_mut(id)?
            .dofs
            .as_mut()
            .ok_or_else(|| StelloptError::ConfigError(format!("node {} owns no DOFs", id)))
    }

    pub fn fix(&mut self, id: NodeId, dof: impl Into<DofRef>) -> Result<()> {
        self.dofs_mut(id)?.fix(dof)
    }

    pub fn unfix(&mut self, id: NodeId, dof: impl Into<DofRef>) -> Result<()> {
        self.dofs_mut(id)?.unfix(dof)
    }

    /// Fix every local DOF of a node.
    pub fn fix_all(&mut self, id: NodeId) -> Result<()> {
        self.dofs_mut(id)?.fix_all();
        Ok(())
    }

    /// Unfix every local DOF of a node.
    pub fn unfix_all(&mut self, id: NodeId) -> Result<()> {
        self.dofs_mut(id)?.unfix_all();
        Ok(())
    }

    /// Fix or unfix every DOF in the dependency closure of a node.
    pub fn set_closure_fixed(&mut self, id: NodeId, fixed: bool) -> Result<()> {
        for node in self.dependency_closure(id)? {
            if let Some(dofs) = self.nodes[node.index()].dofs.as_mut() {
                if fixed {
                    dofs.fix_all();
                } else {
                    dofs.unfix_all();
                }
            }
        }
        Ok(())
    }

    /// The node and everything it depends on, in DOF order: depth-first,
    /// children in stored order, first encounter wins.
    pub fn dependency_closure(&self, id: NodeId) -> Result<Vec<NodeId>> {
        fn visit(
            graph: &Graph,
            id: NodeId,
            visited: &mut HashSet<NodeId>,
            order: &mut Vec<NodeId>,
        ) {
            if !visited.insert(id) {
                return;
            }
            order.push(id);
            for &child in &graph.nodes[id.index()].children {
                visit(graph, child, visited, order);
            }
        }

        self.node(id)?;
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        visit(self, id, &mut visited, &mut order);
        Ok(order)
    }

    /// `true` if `descendant` is reachable from `ancestor` through child edges.
    pub fn is_ancestor_of(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool> {
        self.node(descendant)?;
        if ancestor == descendant {
            return Ok(false);
        }
        Ok(self.dependency_closure(ancestor)?.contains(&descendant))
    }

    /// Free-DOF blocks of the closure of `id`, in flattened order.
    pub fn dof_layout(&self, id: NodeId) -> Result<Vec<DofBlock>> {
        let mut offset = 0;
        let mut layout = Vec::new();
        for node in self.dependency_closure(id)? {
            let Some(dofs) = self.nodes[node.index()].dofs.as_ref() else {
                continue;
            };
            let free = dofs.free_indices();
            if free.is_empty() {
                continue;
            }
            let n = free.len();
            layout.push(DofBlock {
                node,
                local_len: dofs.len(),
                free,
                offset,
            });
            offset += n;
        }
        Ok(layout)
    }

    /// Length of the free-DOF vector of `id`. Re-query after any fix/unfix.
    pub fn free_count(&self, id: NodeId) -> Result<usize> {
        Ok(self.dof_layout(id)?.iter().map(|b| b.free.len()).sum())
    }

    /// The flattened free-DOF vector of `id`.
    pub fn free_vector(&self, id: NodeId) -> Result<Array1<f64>> {
        let mut values = Vec::new();
        for block in self.dof_layout(id)? {
            if let Some(dofs) = self.nodes[block.node.index()].dofs.as_ref() {
                values.extend(dofs.free().iter());
            }
        }
        Ok(Array1::from_vec(values))
    }

    /// Distribute a flattened free-DOF vector back to the containers in the
    /// closure of `id`. Nothing is written unless every value is admissible.
    pub fn set_free_vector(&mut self, id: NodeId, values: &[f64]) -> Result<()> {
        let layout = self.dof_layout(id)?;
        let expected: usize = layout.iter().map(|b| b.free.len()).sum();
        if values.len() != expected {
            return Err(StelloptError::DimensionMismatch(format!(
                "node {} has {} free DOFs, got {} values",
                id,
                expected,
                values.len()
            )));
        }

        for block in &layout {
            if let Some(dofs) = self.nodes[block.node.index()].dofs.as_ref() {
                let policy = dofs.policy();
                for (k, &i) in block.free.iter().enumerate() {
                    dofs.dofs()[i].admit(values[block.offset + k], policy)?;
                }
            }
        }

        trace!("setting {} free DOFs below node {}", values.len(), id);
        for block in &layout {
            if let Some(dofs) = self.nodes[block.node.index()].dofs.as_mut() {
                dofs.set_free(&values[block.offset..block.offset + block.free.len()])?;
            }
        }
        Ok(())
    }

    /// Qualified names (`label:dof`) of the free DOFs of `id`, in vector order.
    pub fn free_dof_names(&self, id: NodeId) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for block in self.dof_layout(id)? {
            let node = &self.nodes[block.node.index()];
            if let Some(dofs) = node.dofs.as_ref() {
                for &i in &block.free {
                    names.push(format!("{}:{}", node.label, dofs.dofs()[i].name()));
                }
            }
        }
        Ok(names)
    }

    /// Bounds of the free DOFs of `id`, in vector order.
    pub fn free_bounds(&self, id: NodeId) -> Result<Vec<Bounds>> {
        let mut bounds = Vec::new();
        for block in self.dof_layout(id)? {
            if let Some(dofs) = self.nodes[block.node.index()].dofs.as_ref() {
                bounds.extend(block.free.iter().map(|&i| *dofs.dofs()[i].bounds()));
            }
        }
        Ok(bounds)
    }

    fn stamp(&self, id: NodeId) -> Result<Stamp> {
        let versions = self
            .dependency_closure(id)?
            .into_iter()
            .filter_map(|n| self.nodes[n.index()].dofs.as_ref())
            .map(|d| d.version())
            .sum();
        Ok(Stamp {
            epoch: self.epoch,
            versions,
        })
    }

    /// `true` if the node holds an evaluation for the current DOF state.
    pub fn is_cached(&self, id: NodeId) -> Result<bool> {
        let stamp = self.stamp(id)?;
        Ok(matches!(&self.node(id)?.cache, Some(c) if c.stamp == stamp))
    }

    /// Drop every memoized evaluation.
    pub fn clear_caches(&mut self) {
        for node in &mut self.nodes {
            node.cache = None;
        }
    }

    /// Value and derivative of a node, recomputed only if something below
    /// it changed since the last evaluation.
    pub fn evaluate(&mut self, id: NodeId) -> Result<Evaluation> {
        let stamp = self.stamp(id)?;
        if let Some(cached) = &self.nodes[id.index()].cache {
            if cached.stamp == stamp {
                return Ok(cached.evaluation.clone());
            }
        }

        let children = self.nodes[id.index()].children.clone();
        let mut inputs = Vec::with_capacity(children.len());
        for child in children {
            inputs.push(self.evaluate(child)?);
        }

        let node = &self.nodes[id.index()];
        debug!("evaluating node {} '{}' ({})", id, node.label, node.op.kind());
        let evaluation = node.op.evaluate(id, node.dofs.as_ref(), &inputs)?;
        if evaluation.derivative.rows() != evaluation.value.len() {
            return Err(StelloptError::ShapeMismatch(format!(
                "node {} produced {} values but a derivative with {} rows",
                id,
                evaluation.value.len(),
                evaluation.derivative.rows()
            )));
        }

        self.nodes[id.index()].cache = Some(CachedEvaluation {
            stamp,
            evaluation: evaluation.clone(),
        });
        Ok(evaluation)
    }

    /// Current value of a node.
    pub fn value(&mut self, id: NodeId) -> Result<Array1<f64>> {
        Ok(self.evaluate(id)?.value)
    }

    /// Current value of a scalar node.
    pub fn scalar(&mut self, id: NodeId) -> Result<f64> {
        let value = self.value(id)?;
        if value.len() != 1 {
            return Err(StelloptError::ShapeMismatch(format!(
                "node {} has {} outputs, expected a scalar",
                id,
                value.len()
            )));
        }
        Ok(value[0])
    }

    /// Derivative of a node, not yet projected.
    pub fn derivative(&mut self, id: NodeId) -> Result<Derivative> {
        Ok(self.evaluate(id)?.derivative)
    }

    /// Gradient of a scalar node with respect to its free DOFs.
    pub fn gradient(&mut self, id: NodeId) -> Result<Array1<f64>> {
        let derivative = self.derivative(id)?;
        derivative.gradient(self, id)
    }

    /// Jacobian (`outputs x free DOFs`) of a node.
    pub fn jacobian(&mut self, id: NodeId) -> Result<Array2<f64>> {
        let derivative = self.derivative(id)?;
        derivative.project(self, id)
    }

    pub(crate) fn op(&self, id: NodeId) -> Result<&NodeOp> {
        Ok(&self.node(id)?.op)
    }
}
