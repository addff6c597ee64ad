//! # stellopt-rs
//!
//! `stellopt-rs` is the optimization-state layer of a stellarator design
//! code: a graph of optimizable objects (coil curves, profiles, surfaces)
//! whose scalar degrees of freedom can be fixed, freed, bounded, and
//! gathered into the flat vector an optimizer works on, together with the
//! derivative algebra that turns per-object partials into gradients in
//! that same ordering.
//!
//! The library provides:
//! - Named DOF containers with free/fixed flags and bounds ([`dofs`])
//! - An arena DAG of nodes with deduplicated free-DOF assembly ([`graph`])
//! - A sparse, node-keyed derivative with the chain rule and projection ([`derivative`])
//! - Objective combinators: sums, scalings, penalties, least squares, constraints ([`objectives`])
//! - Geometry kernels and functionals, with a registry for snapshots ([`kernels`])
//! - Optimizer-facing problem views ([`problem`])
//! - Finite-difference checks and Taylor tests ([`finite_difference`])
//!
//! ## Basic Usage
//!
//! ```
//! use stellopt_rs::config::GraphConfig;
//! use stellopt_rs::graph::Graph;
//! use stellopt_rs::kernels::{CurveLength, CurveXYZFourier};
//! use stellopt_rs::objectives::PenaltyKind;
//! use stellopt_rs::GraphProblem;
//!
//! let mut graph = Graph::new(GraphConfig::default());
//! let coil = graph
//!     .add_leaf("coil", CurveXYZFourier::circle(2, 32, [0.0; 3], 1.0))
//!     .unwrap();
//! graph.fix(coil, "zc(0)").unwrap();
//!
//! let length = graph.add_functional("length", CurveLength, &[coil]).unwrap();
//! let objective = graph
//!     .add_quadratic_penalty("length_target", length, 5.0, PenaltyKind::Identity)
//!     .unwrap();
//!
//! let mut problem = GraphProblem::new(graph, objective).unwrap();
//! let x = problem.x().unwrap();
//! let (j, dj) = problem.value_and_gradient(&x.to_vec()).unwrap();
//! assert_eq!(dj.len(), 14);
//! assert!(j > 0.0);
//! ```

pub mod config;
pub mod derivative;
pub mod dofs;
pub mod error;
pub mod finite_difference;
pub mod graph;
pub mod kernels;
pub mod objectives;
pub mod problem;

// Re-exports for convenience
pub use derivative::Derivative;
pub use error::{Result, StelloptError};
pub use graph::{Graph, NodeId};
pub use problem::{ConstrainedProblem, GraphProblem, Problem};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
