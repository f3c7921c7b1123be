pub mod copy_layers;
pub mod strategy;
pub mod validation;

pub use strategy::{select_tensor_handle_strategy, Diagnostic, DiagnosticKind, StrategyResult};
pub use validation::{validate_connections, validate_strategies};
