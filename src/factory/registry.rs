use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};
use crate::factory::TensorHandleFactory;
use crate::memory::manager::same_manager;
use crate::memory::MemoryManager;
use crate::types::FactoryId;

/// What to do when a factory id is registered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
pub enum DuplicateFactoryPolicy {
    /// Keep the first factory and return an error
    #[default]
    Reject,
    /// Replace the previously registered factory
    Overwrite,
}

/// Catalog of tensor handle factories and the memory managers backing them.
///
/// The registry, and everything it owns, must outlive every tensor handle
/// created through it and every workload holding on to one of its factories.
#[derive(Debug, Default)]
pub struct TensorHandleFactoryRegistry {
    factories: HashMap<FactoryId, Box<dyn TensorHandleFactory>>,
    memory_managers: Vec<Arc<dyn MemoryManager>>,
    policy: DuplicateFactoryPolicy,
}

impl TensorHandleFactoryRegistry {
    /// Create a new registry that rejects duplicate factory ids
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new registry with the given duplicate id policy
    pub fn with_policy(policy: DuplicateFactoryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> DuplicateFactoryPolicy {
        self.policy
    }

    /// Share ownership of a memory manager. Registering the same manager twice is a no-op.
    pub fn register_memory_manager(&mut self, manager: Arc<dyn MemoryManager>) {
        if self.memory_managers.iter().any(|m| same_manager(m, &manager)) {
            return;
        }
        self.memory_managers.push(manager);
    }

    /// Take ownership of a factory, keyed by its id
    pub fn register_factory(&mut self, factory: Box<dyn TensorHandleFactory>) -> Result<()> {
        let id = factory.id().clone();

        if self.factories.contains_key(&id) {
            match self.policy {
                DuplicateFactoryPolicy::Reject => return Err(Error::DuplicateFactory(id)),
                DuplicateFactoryPolicy::Overwrite => {
                    log::warn!("Overwriting previously registered tensor handle factory '{}'", id);
                }
            }
        } else {
            log::debug!("Registered tensor handle factory '{}'", id);
        }

        self.factories.insert(id, factory);
        Ok(())
    }

    /// Look up a factory. `None` means no factory with that id is registered.
    pub fn get_factory(&self, id: &FactoryId) -> Option<&dyn TensorHandleFactory> {
        self.factories.get(id).map(|factory| factory.as_ref())
    }

    pub fn contains(&self, id: &FactoryId) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered factory ids in sorted order
    pub fn factory_ids(&self) -> Vec<&FactoryId> {
        let mut ids: Vec<&FactoryId> = self.factories.keys().collect();
        ids.sort();
        ids
    }

    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }

    pub fn memory_manager_count(&self) -> usize {
        self.memory_managers.len()
    }

    /// Acquire every registered memory manager ahead of an inference
    pub fn acquire_memory(&self) {
        for manager in &self.memory_managers {
            manager.acquire();
        }
    }

    /// Release every registered memory manager after an inference
    pub fn release_memory(&self) {
        for manager in &self.memory_managers {
            manager.release();
        }
    }
}
