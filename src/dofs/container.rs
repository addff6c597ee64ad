//! Ordered DOF containers
//!
//! A `DofContainer` owns the degrees of freedom of exactly one primitive
//! object (one curve's Fourier coefficients, one profile's polynomial
//! coefficients). The order of the DOFs is fixed at construction and
//! survives any fix/unfix; the free vector is the subsequence of DOFs whose
//! `fixed` flag is unset, in container order.
//!
//! Every mutation bumps a version counter. Graph nodes use these counters
//! as cache keys, so the counter must only ever increase.

use crate::config::BoundsPolicy;
use crate::dofs::dof::Dof;
use crate::error::{Result, StelloptError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Reference to a DOF inside a container, by name or by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DofRef {
    Name(String),
    Index(usize),
}

impl From<&str> for DofRef {
    fn from(name: &str) -> Self {
        DofRef::Name(name.to_string())
    }
}

impl From<String> for DofRef {
    fn from(name: String) -> Self {
        DofRef::Name(name)
    }
}

impl From<usize> for DofRef {
    fn from(index: usize) -> Self {
        DofRef::Index(index)
    }
}

impl fmt::Display for DofRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DofRef::Name(name) => write!(f, "'{}'", name),
            DofRef::Index(index) => write!(f, "#{}", index),
        }
    }
}

/// An ordered collection of DOFs belonging to one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ContainerRecord", into = "ContainerRecord")]
pub struct DofContainer {
    dofs: Vec<Dof>,
    policy: BoundsPolicy,
    version: u64,
}

#[derive(Serialize, Deserialize)]
struct ContainerRecord {
    dofs: Vec<Dof>,
    policy: BoundsPolicy,
}

impl TryFrom<ContainerRecord> for DofContainer {
    type Error = StelloptError;

    fn try_from(record: ContainerRecord) -> Result<Self> {
        DofContainer::from_dofs(record.dofs, record.policy)
    }
}

impl From<DofContainer> for ContainerRecord {
    fn from(container: DofContainer) -> Self {
        ContainerRecord {
            dofs: container.dofs,
            policy: container.policy,
        }
    }
}

impl DofContainer {
    /// Create a container of free, unbounded DOFs
    ///
    /// # Examples
    ///
    /// ```
    /// use stellopt_rs::config::BoundsPolicy;
    /// use stellopt_rs::dofs::DofContainer;
    ///
    /// let dofs =
    ///     DofContainer::new(&["a", "b", "c"], &[1.0, 2.0, 3.0], BoundsPolicy::Reject).unwrap();
    /// assert_eq!(dofs.len(), 3);
    /// assert_eq!(dofs.free_count(), 3);
    /// ```
    pub fn new<S: AsRef<str>>(names: &[S], values: &[f64], policy: BoundsPolicy) -> Result<Self> {
        if names.len() != values.len() {
            return Err(StelloptError::ConfigError(format!(
                "{} DOF names but {} values",
                names.len(),
                values.len()
            )));
        }

        let dofs = names
            .iter()
            .zip(values)
            .map(|(name, &value)| Dof::new(name.as_ref(), value))
            .collect();

        Self::from_dofs(dofs, policy)
    }

    /// Create a container from prepared DOFs, rejecting duplicate names and
    /// values outside their bounds
    pub fn from_dofs(dofs: Vec<Dof>, policy: BoundsPolicy) -> Result<Self> {
        let mut seen = HashSet::new();
        for dof in &dofs {
            if !seen.insert(dof.name()) {
                return Err(StelloptError::ConfigError(format!(
                    "duplicate DOF name '{}'",
                    dof.name()
                )));
            }
            if !dof.value().is_finite() {
                return Err(StelloptError::ConfigError(format!(
                    "DOF '{}' has non-finite value {}",
                    dof.name(),
                    dof.value()
                )));
            }
            dof.bounds().check(dof.value()).map_err(|e| {
                StelloptError::OutOfBounds(format!("DOF '{}': {}", dof.name(), e))
            })?;
        }

        Ok(Self {
            dofs,
            policy,
            version: 0,
        })
    }

    /// Total number of DOFs, fixed or free
    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    /// Number of free DOFs
    pub fn free_count(&self) -> usize {
        self.dofs.iter().filter(|d| d.is_free()).count()
    }

    /// Monotone counter bumped by every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn policy(&self) -> BoundsPolicy {
        self.policy
    }

    /// Change the bounds policy for future assignments
    pub fn set_policy(&mut self, policy: BoundsPolicy) {
        self.policy = policy;
        self.touch();
    }

    pub fn dofs(&self) -> &[Dof] {
        &self.dofs
    }

    pub fn names(&self) -> Vec<String> {
        self.dofs.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn free_names(&self) -> Vec<String> {
        self.dofs
            .iter()
            .filter(|d| d.is_free())
            .map(|d| d.name().to_string())
            .collect()
    }

    /// `true` for every fixed DOF, in container order
    pub fn fixed_mask(&self) -> Vec<bool> {
        self.dofs.iter().map(|d| d.is_fixed()).collect()
    }

    /// Local indices of the free DOFs, in container order
    pub fn free_indices(&self) -> Vec<usize> {
        self.dofs
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_free())
            .map(|(i, _)| i)
            .collect()
    }

    /// Resolve a name or index to a position
    pub fn index_of(&self, dof: impl Into<DofRef>) -> Result<usize> {
        match dof.into() {
            DofRef::Index(index) if index < self.dofs.len() => Ok(index),
            DofRef::Index(index) => Err(StelloptError::DofNotFound(format!(
                "index {} in container of {} DOFs",
                index,
                self.dofs.len()
            ))),
            DofRef::Name(name) => self
                .dofs
                .iter()
                .position(|d| d.name() == name)
                .ok_or(StelloptError::DofNotFound(name)),
        }
    }

    pub fn get(&self, dof: impl Into<DofRef>) -> Result<f64> {
        let index = self.index_of(dof)?;
        Ok(self.dofs[index].value())
    }

    /// Set a single DOF regardless of its fixed flag
    pub fn set(&mut self, dof: impl Into<DofRef>, value: f64) -> Result<()> {
        let index = self.index_of(dof)?;
        self.dofs[index].set_value(value, self.policy)?;
        self.touch();
        Ok(())
    }

    /// All values, in container order
    pub fn full(&self) -> Array1<f64> {
        self.dofs.iter().map(|d| d.value()).collect()
    }

    /// Overwrite all values. Nothing is written unless every value is admissible.
    pub fn set_full(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.dofs.len() {
            return Err(StelloptError::DimensionMismatch(format!(
                "expected {} values for the full DOF vector, got {}",
                self.dofs.len(),
                values.len()
            )));
        }

        let admitted = self
            .dofs
            .iter()
            .zip(values)
            .map(|(dof, &v)| dof.admit(v, self.policy))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (dof, value) in self.dofs.iter_mut().zip(admitted) {
            dof.set_value(value, BoundsPolicy::Clamp)?;
        }
        self.touch();
        Ok(())
    }

    /// Free values, in container order
    pub fn free(&self) -> Array1<f64> {
        self.dofs
            .iter()
            .filter(|d| d.is_free())
            .map(|d| d.value())
            .collect()
    }

    /// Overwrite the free values. Fixed values are untouched.
    pub fn set_free(&mut self, values: &[f64]) -> Result<()> {
        let free = self.free_indices();
        if values.len() != free.len() {
            return Err(StelloptError::DimensionMismatch(format!(
                "expected {} values for the free DOF vector, got {}",
                free.len(),
                values.len()
            )));
        }

        let admitted = free
            .iter()
            .zip(values)
            .map(|(&i, &v)| self.dofs[i].admit(v, self.policy))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (&i, value) in free.iter().zip(admitted) {
            self.dofs[i].set_value(value, BoundsPolicy::Clamp)?;
        }
        self.touch();
        Ok(())
    }

    pub fn fix(&mut self, dof: impl Into<DofRef>) -> Result<()> {
        self.set_fixed(dof, true)
    }

    pub fn unfix(&mut self, dof: impl Into<DofRef>) -> Result<()> {
        self.set_fixed(dof, false)
    }

    pub fn fix_all(&mut self) {
        self.dofs.iter_mut().for_each(|d| d.set_fixed(true));
        self.touch();
    }

    pub fn unfix_all(&mut self) {
        self.dofs.iter_mut().for_each(|d| d.set_fixed(false));
        self.touch();
    }

    /// Fix or unfix every DOF whose name satisfies the predicate.
    /// Returns how many DOFs matched.
    pub fn set_fixed_where<F>(&mut self, fixed: bool, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut matched = 0;
        for dof in self.dofs.iter_mut().filter(|d| predicate(d.name())) {
            dof.set_fixed(fixed);
            matched += 1;
        }
        self.touch();
        matched
    }

    pub fn is_free(&self, dof: impl Into<DofRef>) -> Result<bool> {
        let index = self.index_of(dof)?;
        Ok(self.dofs[index].is_free())
    }

    pub fn set_bounds(&mut self, dof: impl Into<DofRef>, min: f64, max: f64) -> Result<()> {
        let index = self.index_of(dof)?;
        self.dofs[index].set_bounds(min, max)?;
        self.touch();
        Ok(())
    }

    fn set_fixed(&mut self, dof: impl Into<DofRef>, fixed: bool) -> Result<()> {
        let index = self.index_of(dof)?;
        self.dofs[index].set_fixed(fixed);
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}
