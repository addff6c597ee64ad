//! # Objective combinators
//!
//! Nodes without DOFs of their own whose value and derivative are pure
//! functions of their children's evaluations. Each combinator comes with a
//! `Graph::add_*` constructor that validates its parameters before the node
//! is inserted.
//!
//! ```rust
//! use stellopt_rs::config::GraphConfig;
//! use stellopt_rs::graph::Graph;
//! use stellopt_rs::kernels::Identity;
//! use stellopt_rs::objectives::PenaltyKind;
//!
//! let mut graph = Graph::new(GraphConfig::default());
//! let x = graph.add_leaf("x", Identity::new(&["x0"]).with_values(&[3.0])).unwrap();
//! let doubled = graph.add_scaled("2x", x, 2.0).unwrap();
//! let penalty = graph
//!     .add_quadratic_penalty("p", doubled, 4.0, PenaltyKind::Max)
//!     .unwrap();
//!
//! // (6 - 4)^2 and its gradient 2 * 2 * 2
//! assert_eq!(graph.scalar(penalty).unwrap(), 4.0);
//! assert_eq!(graph.gradient(penalty).unwrap().to_vec(), vec![8.0]);
//! ```

pub mod constrained;
pub mod least_squares;
pub mod penalty;
pub mod scaled;
pub mod sum;

pub use constrained::{ConstraintValue, Constrained};
pub use least_squares::LeastSquares;
pub use penalty::{PenaltyKind, QuadraticPenalty};
pub use scaled::Scaled;
pub use sum::Sum;
