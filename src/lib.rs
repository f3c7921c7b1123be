pub mod backend;
pub mod config;
pub mod error;
pub mod factory;
pub mod graph;
pub mod memory;
pub mod optimization;
pub mod planner;
pub mod types;

// Re-export commonly used types
pub use backend::{Backend, BackendsMap, ConfiguredBackend};
pub use config::{BackendConfig, FactoryConfig, PlannerConfig, PlannerOptions};
pub use error::{Error, Result};
pub use factory::{DuplicateFactoryPolicy, HostTensorHandleFactory, TensorHandleFactory, TensorHandleFactoryRegistry};
pub use graph::{Graph, InputSlotRef, Layer, LayerId, LayerType, MemoryStrategy, OutputSlotRef, SlotPlan};
pub use memory::{HostMemoryManager, HostTensorHandle, MemoryManager, TensorHandle};
pub use optimization::{select_tensor_handle_strategy, Diagnostic, DiagnosticKind, StrategyResult};
pub use planner::{PhaseResult, PlanningReport, TensorHandlePlanner};
pub use types::{BackendId, DataType, FactoryId, TensorInfo, TensorShape};
