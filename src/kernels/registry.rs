//! Rebuilding kernels and functionals from their serialized parameters.

use crate::error::{Result, StelloptError};
use crate::kernels::{
    CurveCurveDistance, CurveLength, CurveXYZFourier, Functional, GeometryKernel, Identity,
    ProfilePolynomial, ProfilePressure, ProfileScaled, ProfileSpline,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

type KernelBuilder = fn(&Value) -> Result<Arc<dyn GeometryKernel>>;
type FunctionalBuilder = fn(&Value) -> Result<Arc<dyn Functional>>;

fn kernel_from<K>(params: &Value) -> Result<Arc<dyn GeometryKernel>>
where
    K: GeometryKernel + DeserializeOwned + 'static,
{
    Ok(Arc::new(serde_json::from_value::<K>(params.clone())?))
}

fn functional_from<F>(params: &Value) -> Result<Arc<dyn Functional>>
where
    F: Functional + DeserializeOwned + 'static,
{
    Ok(Arc::new(serde_json::from_value::<F>(params.clone())?))
}

/// Maps the `kind()` names written to snapshots back to constructors.
#[derive(Debug, Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<String, KernelBuilder>,
    functionals: HashMap<String, FunctionalBuilder>,
}

impl KernelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing every kernel and functional in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_kernel::<Identity>("Identity");
        registry.register_kernel::<CurveXYZFourier>("CurveXYZFourier");
        registry.register_kernel::<ProfilePolynomial>("ProfilePolynomial");
        registry.register_kernel::<ProfileSpline>("ProfileSpline");
        registry.register_functional::<CurveLength>("CurveLength");
        registry.register_functional::<CurveCurveDistance>("CurveCurveDistance");
        registry.register_functional::<ProfileScaled>("ProfileScaled");
        registry.register_functional::<ProfilePressure>("ProfilePressure");
        registry
    }

    /// Register a kernel type under `kind`, replacing any previous entry.
    pub fn register_kernel<K>(&mut self, kind: &str)
    where
        K: GeometryKernel + DeserializeOwned + 'static,
    {
        self.kernels.insert(kind.to_string(), kernel_from::<K>);
    }

    pub fn register_functional<F>(&mut self, kind: &str)
    where
        F: Functional + DeserializeOwned + 'static,
    {
        self.functionals.insert(kind.to_string(), functional_from::<F>);
    }

    pub fn build_kernel(&self, kind: &str, params: &Value) -> Result<Arc<dyn GeometryKernel>> {
        let build = self.kernels.get(kind).ok_or_else(|| {
            StelloptError::ConfigError(format!("unknown kernel kind '{}'", kind))
        })?;
        build(params)
    }

    pub fn build_functional(&self, kind: &str, params: &Value) -> Result<Arc<dyn Functional>> {
        let build = self.functionals.get(kind).ok_or_else(|| {
            StelloptError::ConfigError(format!("unknown functional kind '{}'", kind))
        })?;
        build(params)
    }
}
