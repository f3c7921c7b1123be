use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendsMap, ConfiguredBackend};
use crate::error::{Error, Result};
use crate::factory::DuplicateFactoryPolicy;
use crate::types::{BackendId, FactoryId};

/// Options controlling tensor handle planning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerOptions {
    /// Policy for factory ids registered more than once
    pub duplicate_factory_policy: DuplicateFactoryPolicy,
    /// Treat edges leaving input layers or entering output layers as directly compatible
    pub boundary_exemption: bool,
    /// Escalate compatibility warnings to errors
    pub warnings_as_errors: bool,
    /// Check graph invariants after copy layers have been inserted
    pub validate_after_insertion: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            duplicate_factory_policy: DuplicateFactoryPolicy::Reject,
            boundary_exemption: true,
            warnings_as_errors: false,
            validate_after_insertion: true,
        }
    }
}

impl PlannerOptions {
    /// Create a new planner options object
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duplicate factory id policy
    pub fn set_duplicate_factory_policy(mut self, policy: DuplicateFactoryPolicy) -> Self {
        self.duplicate_factory_policy = policy;
        self
    }

    /// Enable or disable the graph boundary exemption
    pub fn enable_boundary_exemption(mut self, enable: bool) -> Self {
        self.boundary_exemption = enable;
        self
    }

    /// Enable or disable escalation of warnings
    pub fn set_warnings_as_errors(mut self, enable: bool) -> Self {
        self.warnings_as_errors = enable;
        self
    }

    /// Enable or disable validation after copy insertion
    pub fn enable_validation(mut self, enable: bool) -> Self {
        self.validate_after_insertion = enable;
        self
    }
}

/// A factory a configured backend registers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub id: FactoryId,
    #[serde(default)]
    pub supports_sub_tensors: bool,
}

impl FactoryConfig {
    pub fn new(id: impl Into<FactoryId>, supports_sub_tensors: bool) -> Self {
        Self {
            id: id.into(),
            supports_sub_tensors,
        }
    }
}

/// Declarative description of a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: BackendId,
    /// Factory ids in priority order
    pub preferences: Vec<FactoryId>,
    #[serde(default)]
    pub factories: Vec<FactoryConfig>,
}

/// Planner options together with the backends available to a network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub options: PlannerOptions,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl PlannerConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Serialize the configuration to pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject configurations that name the same backend twice.
    ///
    /// Empty preference lists are allowed here; strategy selection reports
    /// them against the layers that use the backend.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(&backend.id) {
                return Err(Error::Configuration(format!(
                    "backend '{}' is configured more than once",
                    backend.id
                )));
            }
        }
        Ok(())
    }

    /// Instantiate the configured backends
    pub fn build_backends(&self) -> BackendsMap {
        self.backends
            .iter()
            .map(|config| {
                let backend: Box<dyn Backend> = Box::new(ConfiguredBackend::from_config(config));
                (config.id.clone(), backend)
            })
            .collect()
    }
}
