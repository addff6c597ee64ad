//! # Degrees of Freedom
//!
//! The parameter layer of the optimization state. Each primitive object
//! (a curve, a profile, a surface) owns one [`DofContainer`]: an ordered,
//! named list of scalar [`Dof`]s, each with a free/fixed flag and
//! [`Bounds`].
//!
//! ```rust
//! use stellopt_rs::config::BoundsPolicy;
//! use stellopt_rs::dofs::DofContainer;
//!
//! let names = ["rc(0,0)", "rc(1,0)", "zs(1,0)"];
//! let mut dofs = DofContainer::new(&names, &[1.0, 0.1, 0.1], BoundsPolicy::Reject).unwrap();
//!
//! // Fix the major radius; its value stays, it just leaves the free vector
//! dofs.fix("rc(0,0)").unwrap();
//! assert_eq!(dofs.free().to_vec(), vec![0.1, 0.1]);
//!
//! dofs.set_free(&[0.2, 0.3]).unwrap();
//! assert_eq!(dofs.full().to_vec(), vec![1.0, 0.2, 0.3]);
//! ```

pub mod bounds;
pub mod container;
pub mod dof;

pub use bounds::{Bounds, BoundsError};
pub use container::{DofContainer, DofRef};
pub use dof::Dof;
