//! A single named degree of freedom
//!
//! A `Dof` is the smallest unit of the optimization state: a named scalar
//! with a fixed/free flag and bounds. Dofs never exist on their own in a
//! graph; they are always owned by a [`DofContainer`](super::DofContainer).

use crate::config::BoundsPolicy;
use crate::dofs::bounds::{Bounds, BoundsError};
use serde::{Deserialize, Serialize};

/// A named scalar degree of freedom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dof {
    name: String,
    value: f64,
    fixed: bool,
    bounds: Bounds,
}

impl Dof {
    /// Create a free, unbounded DOF
    ///
    /// # Examples
    ///
    /// ```
    /// use stellopt_rs::dofs::Dof;
    ///
    /// let dof = Dof::new("xc(0)", 1.0);
    /// assert_eq!(dof.name(), "xc(0)");
    /// assert_eq!(dof.value(), 1.0);
    /// assert!(dof.is_free());
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            fixed: false,
            bounds: Bounds::default(),
        }
    }

    /// Create a free DOF with bounds. The initial value is clamped into the bounds.
    pub fn with_bounds(name: &str, value: f64, min: f64, max: f64) -> Result<Self, BoundsError> {
        let bounds = Bounds::new(min, max)?;

        Ok(Self {
            name: name.to_string(),
            value: bounds.clamp(value),
            fixed: false,
            bounds,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the value that would be stored for `value` under `policy`,
    /// without storing it.
    pub fn admit(&self, value: f64, policy: BoundsPolicy) -> Result<f64, BoundsError> {
        if !value.is_finite() {
            return Err(BoundsError::NonFiniteValue(value));
        }
        match policy {
            BoundsPolicy::Reject => {
                self.bounds.check(value)?;
                Ok(value)
            }
            BoundsPolicy::Clamp => Ok(self.bounds.clamp(value)),
        }
    }

    /// Set the value, enforcing bounds according to `policy`
    pub fn set_value(&mut self, value: f64, policy: BoundsPolicy) -> Result<(), BoundsError> {
        self.value = self.admit(value, policy)?;
        Ok(())
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn is_free(&self) -> bool {
        !self.fixed
    }

    /// Change the fixed flag. The value is retained.
    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Replace the bounds. The current value is clamped into the new interval.
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), BoundsError> {
        let bounds = Bounds::new(min, max)?;
        self.bounds = bounds;
        self.value = bounds.clamp(self.value);
        Ok(())
    }
}
