pub mod configured;

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::Result;
use crate::factory::TensorHandleFactoryRegistry;
use crate::types::{BackendId, FactoryId};

pub use configured::{accelerator_backend, reference_backend, vectorized_backend, ConfiguredBackend};

/// Execution target exposing the tensor representations it can work with
pub trait Backend: Send + Sync + Debug {
    fn id(&self) -> &BackendId;

    /// Acceptable factory ids, most preferred first
    fn handle_factory_preferences(&self) -> Vec<FactoryId>;

    /// Instantiate this backend's factories and memory managers into `registry`.
    ///
    /// Calling this more than once with the same registry must not register
    /// anything twice.
    fn register_tensor_handle_factories(&self, registry: &mut TensorHandleFactoryRegistry) -> Result<()>;
}

/// Backends available to a network, keyed by id
pub type BackendsMap = HashMap<BackendId, Box<dyn Backend>>;

/// Build a backends map from a list of backends
pub fn backends_map(backends: Vec<Box<dyn Backend>>) -> BackendsMap {
    backends
        .into_iter()
        .map(|backend| (backend.id().clone(), backend))
        .collect()
}

/// Register the factories of every backend in `backends`, in id order
pub fn register_all(backends: &BackendsMap, registry: &mut TensorHandleFactoryRegistry) -> Result<()> {
    let mut ids: Vec<&BackendId> = backends.keys().collect();
    ids.sort();

    for id in ids {
        backends[id].register_tensor_handle_factories(registry)?;
    }

    Ok(())
}
