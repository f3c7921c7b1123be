use std::time::{Duration, Instant};

use crate::backend::{register_all, BackendsMap};
use crate::config::PlannerOptions;
use crate::error::{Error, Result};
use crate::factory::TensorHandleFactoryRegistry;
use crate::graph::Graph;
use crate::optimization::{select_tensor_handle_strategy, validate_connections, validate_strategies, StrategyResult};

/// Result of running one planning phase
#[derive(Debug, Clone)]
pub struct PhaseResult {
    /// Name of the phase
    pub name: String,
    /// Number of changes the phase made (slots annotated, layers inserted, ...)
    pub changes: usize,
    /// Duration of the phase
    pub duration: Duration,
}

/// Outcome of planning a graph
#[derive(Debug, Clone, Default)]
pub struct PlanningReport {
    /// Result of strategy selection, including warnings
    pub strategy: StrategyResult,
    /// Number of copy layers inserted
    pub copy_layers_added: usize,
    /// Results from each phase, in execution order
    pub phases: Vec<PhaseResult>,
    /// Total time spent planning
    pub total_duration: Duration,
}

impl PlanningReport {
    fn add_phase(&mut self, name: &str, changes: usize, started: Instant) {
        let duration = started.elapsed();
        self.total_duration += duration;
        self.phases.push(PhaseResult {
            name: name.to_string(),
            changes,
            duration,
        });
    }
}

/// Runs backend registration, strategy selection and copy insertion on a graph.
///
/// The planner owns the factory registry; it must be kept alive for as long
/// as any tensor handle created through it is in use.
#[derive(Debug)]
pub struct TensorHandlePlanner {
    options: PlannerOptions,
    registry: TensorHandleFactoryRegistry,
}

impl TensorHandlePlanner {
    /// Create a new planner with an empty registry
    pub fn new(options: PlannerOptions) -> Self {
        let registry = TensorHandleFactoryRegistry::with_policy(options.duplicate_factory_policy);
        Self { options, registry }
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    pub fn registry(&self) -> &TensorHandleFactoryRegistry {
        &self.registry
    }

    /// Hand the registry over to the engine that will run the network
    pub fn into_registry(self) -> TensorHandleFactoryRegistry {
        self.registry
    }

    /// Register the factories of every backend
    pub fn register_backends(&mut self, backends: &BackendsMap) -> Result<()> {
        register_all(backends, &mut self.registry)
    }

    /// Plan tensor handles for `graph` and insert the required copy layers.
    ///
    /// Fails with `Error::Configuration` listing every problem if strategy
    /// selection reported errors; warnings are logged and kept in the report.
    pub fn plan(&mut self, graph: &mut Graph, backends: &BackendsMap) -> Result<PlanningReport> {
        let mut report = PlanningReport::default();

        let started = Instant::now();
        self.register_backends(backends)?;
        report.add_phase("RegisterTensorHandleFactories", self.registry.factory_count(), started);

        let started = Instant::now();
        graph.topological_sort()?;
        report.add_phase("TopologicalSort", graph.num_layers(), started);

        let started = Instant::now();
        let strategy = select_tensor_handle_strategy(graph, backends, &self.registry, &self.options)?;
        report.add_phase("SelectTensorHandleStrategy", strategy.messages.len(), started);

        if strategy.has_error {
            return Err(Error::Configuration(strategy.messages.join("; ")));
        }
        if strategy.has_warning {
            log::warn!(
                "Tensor handle planning finished with {} warning(s)",
                strategy.messages.len()
            );
        }
        report.strategy = strategy;

        let started = Instant::now();
        report.copy_layers_added = graph.add_copy_layers(backends, &self.registry)?;
        report.add_phase("AddCopyLayers", report.copy_layers_added, started);

        if self.options.validate_after_insertion {
            let started = Instant::now();
            validate_connections(graph)?;
            validate_strategies(graph)?;
            report.add_phase("Validate", 0, started);
        }

        log::info!(
            "Planned tensor handles for {} layers: {} copy layer(s) inserted in {:?}",
            graph.num_layers(),
            report.copy_layers_added,
            report.total_duration
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{accelerator_backend, backends_map, reference_backend, vectorized_backend, Backend};
    use crate::graph::{InputSlotRef, LayerType, OutputSlotRef};

    fn presets() -> BackendsMap {
        let backends: Vec<Box<dyn Backend>> = vec![
            Box::new(reference_backend()),
            Box::new(vectorized_backend()),
            Box::new(accelerator_backend()),
        ];
        backends_map(backends)
    }

    #[test]
    fn test_vectorized_cpu_reads_accelerator_memory() {
        let backends = presets();
        let mut graph = Graph::new();
        let input = graph.add_layer(LayerType::Input, "input", "GpuAcc");
        let gpu = graph.add_layer(LayerType::Activation, "gpu", "GpuAcc");
        let cpu = graph.add_layer(LayerType::Softmax, "cpu", "CpuAcc");
        let reference = graph.add_layer(LayerType::Activation, "reference", "CpuRef");
        let output = graph.add_layer(LayerType::Output, "output", "CpuRef");
        graph.connect(OutputSlotRef::new(input, 0), InputSlotRef::new(gpu, 0)).unwrap();
        graph.connect(OutputSlotRef::new(gpu, 0), InputSlotRef::new(cpu, 0)).unwrap();
        graph.connect(OutputSlotRef::new(cpu, 0), InputSlotRef::new(reference, 0)).unwrap();
        graph.connect(OutputSlotRef::new(reference, 0), InputSlotRef::new(output, 0)).unwrap();

        let mut planner = TensorHandlePlanner::new(PlannerOptions::default());
        let report = planner.plan(&mut graph, &backends).unwrap();

        // GpuAcc -> CpuAcc is direct, CpuAcc -> CpuRef needs a copy
        assert_eq!(report.copy_layers_added, 1);
        assert_eq!(graph.count_layers(LayerType::MemCopy), 1);
        assert_eq!(planner.registry().factory_count(), 3);
        assert_eq!(report.phases.len(), 5);
        assert_eq!(report.phases[3].name, "AddCopyLayers");
    }

    #[test]
    fn test_configuration_errors_abort() {
        let backends = presets();
        let mut graph = Graph::new();
        let input = graph.add_layer(LayerType::Input, "input", "CpuRef");
        let act = graph.add_layer(LayerType::Activation, "act", "Npu");
        graph.connect(OutputSlotRef::new(input, 0), InputSlotRef::new(act, 0)).unwrap();

        let mut planner = TensorHandlePlanner::new(PlannerOptions::default());
        let err = planner.plan(&mut graph, &backends).unwrap_err();
        match err {
            Error::Configuration(message) => assert!(message.contains("Npu")),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(graph.count_layers(LayerType::MemCopy), 0);
    }

    #[test]
    fn test_planning_twice_is_stable() {
        let backends = presets();
        let mut graph = Graph::new();
        let a = graph.add_layer(LayerType::Activation, "a", "CpuRef");
        let b = graph.add_layer(LayerType::Activation, "b", "GpuAcc");
        graph.connect(OutputSlotRef::new(a, 0), InputSlotRef::new(b, 0)).unwrap();

        let mut planner = TensorHandlePlanner::new(PlannerOptions::default());
        assert_eq!(planner.plan(&mut graph, &backends).unwrap().copy_layers_added, 1);
        assert_eq!(planner.plan(&mut graph, &backends).unwrap().copy_layers_added, 0);
        assert_eq!(graph.num_layers(), 3);
    }
}
