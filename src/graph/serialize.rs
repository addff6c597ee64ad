//! Saving and restoring a whole graph as JSON.
//!
//! A snapshot stores every node once, in id order, with its operation
//! parameters, its DOF container (values, fixed flags, bounds) and the ids
//! of its children. Shared children are written once and referenced by
//! id, so sharing survives a round trip.
//!
//! Kernels and functionals are trait objects; they are written as their
//! `kind()` plus `to_value()` and rebuilt through a [`KernelRegistry`].

use crate::config::GraphConfig;
use crate::dofs::{Bounds, DofContainer};
use crate::error::{Result, StelloptError};
use crate::graph::node::{Node, NodeId};
use crate::graph::op::NodeOp;
use crate::graph::Graph;
use crate::kernels::{FunctionalAdapter, KernelRegistry, LeafAdapter};
use crate::objectives::{Constrained, LeastSquares, PenaltyKind, QuadraticPenalty, Scaled, Sum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Format tag written to every snapshot.
pub const SNAPSHOT_FORMAT: &str = "stellopt-graph/1";

/// Serialized form of a node operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OpRecord {
    Leaf { kind: String, params: Value },
    Functional { kind: String, params: Value },
    Sum,
    Scaled { factor: f64 },
    QuadraticPenalty { threshold: f64, kind: PenaltyKind },
    LeastSquares { goals: Vec<f64>, weights: Vec<f64> },
    Constrained { bounds: Vec<Bounds> },
}

/// Serialized form of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub label: String,
    pub op: OpRecord,
    #[serde(default)]
    pub dofs: Option<DofContainer>,
    #[serde(default)]
    pub children: Vec<NodeId>,
}

/// Serialized form of a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub format: String,
    #[serde(default)]
    pub config: GraphConfig,
    pub nodes: Vec<NodeRecord>,
}

impl OpRecord {
    fn from_op(op: &NodeOp) -> Result<Self> {
        Ok(match op {
            NodeOp::Leaf(leaf) => OpRecord::Leaf {
                kind: leaf.kernel().kind().to_string(),
                params: leaf.kernel().to_value()?,
            },
            NodeOp::Functional(functional) => OpRecord::Functional {
                kind: functional.functional().kind().to_string(),
                params: functional.functional().to_value()?,
            },
            NodeOp::Sum(_) => OpRecord::Sum,
            NodeOp::Scaled(scaled) => OpRecord::Scaled {
                factor: scaled.factor(),
            },
            NodeOp::QuadraticPenalty(penalty) => OpRecord::QuadraticPenalty {
                threshold: penalty.threshold(),
                kind: penalty.kind(),
            },
            NodeOp::LeastSquares(lsq) => OpRecord::LeastSquares {
                goals: lsq.goals().to_vec(),
                weights: lsq.weights().to_vec(),
            },
            NodeOp::Constrained(constrained) => OpRecord::Constrained {
                bounds: constrained.bounds().to_vec(),
            },
        })
    }

    fn into_op(self, registry: &KernelRegistry) -> Result<NodeOp> {
        Ok(match self {
            OpRecord::Leaf { kind, params } => {
                NodeOp::Leaf(LeafAdapter::new(registry.build_kernel(&kind, &params)?))
            }
            OpRecord::Functional { kind, params } => NodeOp::Functional(FunctionalAdapter::new(
                registry.build_functional(&kind, &params)?,
            )),
            OpRecord::Sum => NodeOp::Sum(Sum),
            OpRecord::Scaled { factor } => NodeOp::Scaled(Scaled::new(factor)?),
            OpRecord::QuadraticPenalty { threshold, kind } => {
                NodeOp::QuadraticPenalty(QuadraticPenalty::new(threshold, kind)?)
            }
            OpRecord::LeastSquares { goals, weights } => {
                NodeOp::LeastSquares(LeastSquares::new(goals, weights)?)
            }
            OpRecord::Constrained { bounds } => {
                let pairs: Vec<(f64, f64)> = bounds.iter().map(|b| (b.min, b.max)).collect();
                NodeOp::Constrained(Constrained::new(&pairs)?)
            }
        })
    }
}

impl Graph {
    /// Snapshot of the whole graph.
    pub fn snapshot(&self) -> Result<GraphSnapshot> {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                Ok(NodeRecord {
                    id: NodeId::from_index(i),
                    label: node.label.clone(),
                    op: OpRecord::from_op(&node.op)?,
                    dofs: node.dofs.clone(),
                    children: node.children.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GraphSnapshot {
            format: SNAPSHOT_FORMAT.to_string(),
            config: self.config,
            nodes,
        })
    }

    /// Serialize the graph to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot()?)?)
    }

    /// Save the graph to a JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &self.snapshot()?)?;
        Ok(())
    }

    /// Rebuild a graph from a JSON string.
    pub fn from_json(json: &str, registry: &KernelRegistry) -> Result<Self> {
        let snapshot: GraphSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot, registry)
    }

    /// Load a graph from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P, registry: &KernelRegistry) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents, registry)
    }

    /// Rebuild a graph from a snapshot.
    ///
    /// Children may refer to nodes with higher ids (edges added after
    /// construction), so the nodes are created first and the edges are
    /// checked afterwards: every child must exist, each operation must
    /// accept its number of children, and the edges must not form a cycle.
    pub fn from_snapshot(snapshot: GraphSnapshot, registry: &KernelRegistry) -> Result<Self> {
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(StelloptError::ConfigError(format!(
                "unsupported snapshot format '{}'",
                snapshot.format
            )));
        }

        let mut graph = Graph::new(snapshot.config);
        let n = snapshot.nodes.len();
        for (i, record) in snapshot.nodes.into_iter().enumerate() {
            if record.id.index() != i {
                return Err(StelloptError::ConfigError(format!(
                    "snapshot node at position {} has id {}",
                    i, record.id
                )));
            }
            if let Some(&child) = record.children.iter().find(|c| c.index() >= n) {
                return Err(StelloptError::NodeNotFound(child.index()));
            }

            let op = record.op.into_op(registry)?;
            op.check_arity(record.children.len())?;
            if op.owns_dofs() != record.dofs.is_some() {
                return Err(StelloptError::ConfigError(format!(
                    "{} node '{}' has an inconsistent DOF container",
                    op.kind(),
                    record.label
                )));
            }
            let dofs = match record.dofs {
                Some(mut dofs) => {
                    let expected = match &op {
                        NodeOp::Leaf(leaf) => leaf.kernel().dof_names(),
                        NodeOp::Functional(f) => f.functional().local_dof_names(),
                        _ => Vec::new(),
                    };
                    if dofs.names() != expected {
                        return Err(StelloptError::ConfigError(format!(
                            "node '{}' stores DOFs {:?}, its {} kernel expects {:?}",
                            record.label,
                            dofs.names(),
                            op.kind(),
                            expected
                        )));
                    }
                    dofs.set_policy(graph.config.bounds_policy);
                    Some(dofs)
                }
                None => None,
            };

            graph.nodes.push(Node {
                label: record.label,
                op,
                dofs,
                children: record.children,
                parents: Vec::new(),
                cache: None,
            });
        }

        graph.check_acyclic()?;

        for i in 0..n {
            let id = NodeId::from_index(i);
            for child in graph.nodes[i].children.clone() {
                let parents = &mut graph.nodes[child.index()].parents;
                if !parents.contains(&id) {
                    parents.push(id);
                }
            }
        }

        Ok(graph)
    }

    /// Depth-first search with in-progress marks over every node.
    fn check_acyclic(&self) -> Result<()> {
        fn visit(
            graph: &Graph,
            id: NodeId,
            visited: &mut HashSet<NodeId>,
            in_progress: &mut HashSet<NodeId>,
        ) -> Result<()> {
            if visited.contains(&id) {
                return Ok(());
            }
            if !in_progress.insert(id) {
                return Err(StelloptError::CyclicDependency(format!(
                    "node {} depends on itself",
                    id
                )));
            }
            for &child in &graph.nodes[id.index()].children {
                visit(graph, child, visited, in_progress)?;
            }
            in_progress.remove(&id);
            visited.insert(id);
            Ok(())
        }

        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();
        for id in self.node_ids() {
            visit(self, id, &mut visited, &mut in_progress)?;
        }
        Ok(())
    }
}
