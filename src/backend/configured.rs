use std::sync::{Arc, OnceLock};

use crate::backend::Backend;
use crate::config::{BackendConfig, FactoryConfig};
use crate::error::Result;
use crate::factory::{HostTensorHandleFactory, TensorHandleFactoryRegistry};
use crate::memory::manager::same_manager;
use crate::memory::{HostMemoryManager, MemoryManager};
use crate::types::{BackendId, FactoryId};

pub const REFERENCE_BACKEND_ID: &str = "CpuRef";
pub const VECTORIZED_BACKEND_ID: &str = "CpuAcc";
pub const ACCELERATOR_BACKEND_ID: &str = "GpuAcc";

pub const REFERENCE_FACTORY_ID: &str = "CpuRef/HostTensorHandleFactory";
pub const VECTORIZED_FACTORY_ID: &str = "CpuAcc/TensorHandleFactory";
pub const ACCELERATOR_FACTORY_ID: &str = "GpuAcc/TensorHandleFactory";

/// Backend whose preferences and factories come from a `BackendConfig`.
///
/// All factories of one backend share a single host memory manager, created
/// the first time the backend registers itself.
#[derive(Debug)]
pub struct ConfiguredBackend {
    id: BackendId,
    preferences: Vec<FactoryId>,
    factories: Vec<FactoryConfig>,
    memory_manager: OnceLock<Arc<dyn MemoryManager>>,
}

impl ConfiguredBackend {
    /// Create a new backend
    pub fn new(id: impl Into<BackendId>, preferences: Vec<FactoryId>, factories: Vec<FactoryConfig>) -> Self {
        Self {
            id: id.into(),
            preferences,
            factories,
            memory_manager: OnceLock::new(),
        }
    }

    /// Create a backend from its configuration
    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.id.clone(), config.preferences.clone(), config.factories.clone())
    }

    /// Factories this backend registers
    pub fn factories(&self) -> &[FactoryConfig] {
        &self.factories
    }

    fn shared_memory_manager(&self) -> &Arc<dyn MemoryManager> {
        self.memory_manager.get_or_init(|| {
            log::debug!("Creating memory manager for backend '{}'", self.id);
            Arc::new(HostMemoryManager::new()) as Arc<dyn MemoryManager>
        })
    }
}

impl Backend for ConfiguredBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn handle_factory_preferences(&self) -> Vec<FactoryId> {
        self.preferences.clone()
    }

    fn register_tensor_handle_factories(&self, registry: &mut TensorHandleFactoryRegistry) -> Result<()> {
        let memory_manager = self.shared_memory_manager();
        registry.register_memory_manager(Arc::clone(memory_manager));

        for factory in &self.factories {
            // Already registered by this backend on an earlier call
            let ours = registry
                .get_factory(&factory.id)
                .and_then(|existing| existing.memory_manager())
                .map_or(false, |existing| same_manager(&existing, memory_manager));
            if ours {
                continue;
            }

            registry.register_factory(Box::new(HostTensorHandleFactory::new(
                factory.id.clone(),
                memory_manager,
                factory.supports_sub_tensors,
            )))?;
        }

        Ok(())
    }
}

/// Portable reference CPU backend without sub-tensor support
pub fn reference_backend() -> ConfiguredBackend {
    ConfiguredBackend::new(
        REFERENCE_BACKEND_ID,
        vec![FactoryId::from(REFERENCE_FACTORY_ID)],
        vec![FactoryConfig::new(REFERENCE_FACTORY_ID, false)],
    )
}

/// Vectorized CPU backend; can also consume the accelerator's mapped memory
pub fn vectorized_backend() -> ConfiguredBackend {
    ConfiguredBackend::new(
        VECTORIZED_BACKEND_ID,
        vec![
            FactoryId::from(VECTORIZED_FACTORY_ID),
            FactoryId::from(ACCELERATOR_FACTORY_ID),
        ],
        vec![FactoryConfig::new(VECTORIZED_FACTORY_ID, true)],
    )
}

/// Accelerator backend
pub fn accelerator_backend() -> ConfiguredBackend {
    ConfiguredBackend::new(
        ACCELERATOR_BACKEND_ID,
        vec![FactoryId::from(ACCELERATOR_FACTORY_ID)],
        vec![FactoryConfig::new(ACCELERATOR_FACTORY_ID, true)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_is_idempotent() {
        let backend = vectorized_backend();
        let mut registry = TensorHandleFactoryRegistry::new();

        backend.register_tensor_handle_factories(&mut registry).unwrap();
        backend.register_tensor_handle_factories(&mut registry).unwrap();

        assert_eq!(registry.factory_count(), 1);
        assert_eq!(registry.memory_manager_count(), 1);
    }

    #[test]
    fn test_conflicting_backends_are_reported() {
        let first = ConfiguredBackend::new("First", vec![FactoryId::from("Shared")], vec![FactoryConfig::new("Shared", false)]);
        let second = ConfiguredBackend::new("Second", vec![FactoryId::from("Shared")], vec![FactoryConfig::new("Shared", false)]);
        let mut registry = TensorHandleFactoryRegistry::new();

        first.register_tensor_handle_factories(&mut registry).unwrap();
        assert!(second.register_tensor_handle_factories(&mut registry).is_err());
    }

    #[test]
    fn test_from_config() {
        let config = BackendConfig {
            id: BackendId::from("Npu"),
            preferences: vec![FactoryId::from("Npu/Dma"), FactoryId::from(REFERENCE_FACTORY_ID)],
            factories: vec![FactoryConfig::new("Npu/Dma", true)],
        };
        let backend = ConfiguredBackend::from_config(&config);

        assert_eq!(backend.id().as_str(), "Npu");
        assert_eq!(backend.handle_factory_preferences(), config.preferences);
        assert_eq!(backend.factories(), config.factories.as_slice());

        let mut registry = TensorHandleFactoryRegistry::new();
        backend.register_tensor_handle_factories(&mut registry).unwrap();
        for factory in backend.factories() {
            let registered = registry.get_factory(&factory.id).unwrap();
            assert_eq!(registered.supports_sub_tensors(), factory.supports_sub_tensors);
        }
    }

    #[test]
    fn test_preset_preferences() {
        let backend = vectorized_backend();
        let prefs = backend.handle_factory_preferences();
        assert_eq!(prefs[0].as_str(), VECTORIZED_FACTORY_ID);
        assert_eq!(prefs[1].as_str(), ACCELERATOR_FACTORY_ID);
        assert_eq!(reference_backend().id().as_str(), REFERENCE_BACKEND_ID);
    }
}
