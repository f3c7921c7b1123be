use strum_macros::Display;

use crate::backend::BackendsMap;
use crate::config::PlannerOptions;
use crate::error::Result;
use crate::factory::TensorHandleFactoryRegistry;
use crate::graph::{Graph, Layer, LayerType, MemoryStrategy, OutputSlotRef, SlotPlan};
use crate::types::FactoryId;

/// Severity of a problem found while selecting strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DiagnosticKind {
    /// A backend cannot produce any usable tensor; compilation must abort
    ConfigurationError,
    /// A degraded but workable choice was made
    CompatibilityWarning,
}

/// A problem attributed to one output slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub layer: String,
    pub slot: OutputSlotRef,
    pub message: String,
}

/// Aggregate outcome of strategy selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyResult {
    pub has_error: bool,
    pub has_warning: bool,
    /// Human readable messages, in the order problems were found
    pub messages: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl StrategyResult {
    fn report(&mut self, kind: DiagnosticKind, layer: &Layer, slot: OutputSlotRef, message: String) {
        let text = format!("{}: layer '{}' output {}: {}", kind, layer.name(), slot.slot, message);
        match kind {
            DiagnosticKind::ConfigurationError => {
                log::error!("{}", text);
                self.has_error = true;
            }
            DiagnosticKind::CompatibilityWarning => {
                log::warn!("{}", text);
                self.has_warning = true;
            }
        }
        self.messages.push(text);
        self.diagnostics.push(Diagnostic {
            kind,
            layer: layer.name().to_string(),
            slot,
            message,
        });
    }

    /// Diagnostics of the given kind
    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn is_ok(&self) -> bool {
        !self.has_error
    }
}

/// What strategy selection knows about one consumer of a slot
struct Consumer {
    /// `None` for consumers that accept any representation
    preferences: Option<Vec<FactoryId>>,
}

impl Consumer {
    fn accepts(&self, id: &FactoryId) -> bool {
        match &self.preferences {
            Some(preferences) => preferences.contains(id),
            None => true,
        }
    }
}

/// Whether the connection between `producer` and `consumer` is exempt from
/// representation matching.
///
/// Copy layers read whatever they are given. Boundary layers exchange data
/// with the caller through a generic transfer outside this planner.
fn is_exempt(producer: LayerType, consumer: LayerType, options: &PlannerOptions) -> bool {
    if consumer == LayerType::MemCopy {
        return true;
    }
    options.boundary_exemption && (producer == LayerType::Input || consumer == LayerType::Output)
}

/// Choose a materializing factory for every output slot and a memory strategy
/// for every outgoing connection.
///
/// Problems local to a slot are collected in the returned result and the pass
/// carries on with the next slot; the caller decides whether to abort. An
/// `Err` is only returned when the graph cannot be ordered.
pub fn select_tensor_handle_strategy(
    graph: &mut Graph,
    backends: &BackendsMap,
    registry: &TensorHandleFactoryRegistry,
    options: &PlannerOptions,
) -> Result<StrategyResult> {
    let order = graph.topological_order()?;
    let mut result = StrategyResult::default();
    let mut planned = 0;

    for layer_id in order {
        let num_outputs = graph.layer(layer_id).map_or(0, |layer| layer.output_slots().len());

        for slot in 0..num_outputs {
            let slot_ref = OutputSlotRef::new(layer_id, slot);
            let plan = plan_output_slot(graph, slot_ref, backends, registry, options, &mut result);
            if matches!(plan, SlotPlan::Planned { .. }) {
                planned += 1;
            }
            graph.output_slot_mut(slot_ref)?.plan = plan;
        }
    }

    log::debug!(
        "Tensor handle strategy selection planned {} output slots ({} messages)",
        planned,
        result.messages.len()
    );

    Ok(result)
}

fn plan_output_slot(
    graph: &Graph,
    slot_ref: OutputSlotRef,
    backends: &BackendsMap,
    registry: &TensorHandleFactoryRegistry,
    options: &PlannerOptions,
    result: &mut StrategyResult,
) -> SlotPlan {
    let layer = match graph.layer(slot_ref.layer) {
        Some(layer) => layer,
        None => return SlotPlan::Failed,
    };
    let output = match layer.output_slot(slot_ref.slot) {
        Some(output) => output,
        None => return SlotPlan::Failed,
    };

    // Producer preferences, restricted to factories that actually exist
    let backend = match backends.get(layer.backend_id()) {
        Some(backend) => backend,
        None => {
            result.report(
                DiagnosticKind::ConfigurationError,
                layer,
                slot_ref,
                format!("backend '{}' is not available", layer.backend_id()),
            );
            return SlotPlan::Failed;
        }
    };

    let preferences = backend.handle_factory_preferences();
    if preferences.is_empty() {
        result.report(
            DiagnosticKind::ConfigurationError,
            layer,
            slot_ref,
            format!("backend '{}' declares no tensor handle factories", layer.backend_id()),
        );
        return SlotPlan::Failed;
    }

    let candidates: Vec<&FactoryId> = preferences.iter().filter(|id| registry.contains(id)).collect();
    if candidates.is_empty() {
        let names: Vec<&str> = preferences.iter().map(|id| id.as_str()).collect();
        result.report(
            DiagnosticKind::ConfigurationError,
            layer,
            slot_ref,
            format!(
                "none of the factories preferred by backend '{}' are registered: [{}]",
                layer.backend_id(),
                names.join(", ")
            ),
        );
        return SlotPlan::Failed;
    }

    let mut consumers = Vec::with_capacity(output.num_connections());
    let mut needs_sub_tensors = layer.layer_type().produces_sub_tensors();

    for target in output.connections() {
        let consumer = match graph.layer(target.layer) {
            Some(consumer) => consumer,
            None => {
                result.report(
                    DiagnosticKind::ConfigurationError,
                    layer,
                    slot_ref,
                    format!("connection targets missing layer {}", target.layer),
                );
                return SlotPlan::Failed;
            }
        };

        needs_sub_tensors |= consumer.layer_type().consumes_sub_tensors();

        if is_exempt(layer.layer_type(), consumer.layer_type(), options) {
            consumers.push(Consumer { preferences: None });
            continue;
        }

        match backends.get(consumer.backend_id()) {
            Some(consumer_backend) => consumers.push(Consumer {
                preferences: Some(consumer_backend.handle_factory_preferences()),
            }),
            None => {
                result.report(
                    DiagnosticKind::ConfigurationError,
                    layer,
                    slot_ref,
                    format!(
                        "consumer '{}' runs on unavailable backend '{}'",
                        consumer.name(),
                        consumer.backend_id()
                    ),
                );
                return SlotPlan::Failed;
            }
        }
    }

    // First producer preference every consumer accepts, else the producer's own top choice
    let factory_id = candidates
        .iter()
        .find(|id| consumers.iter().all(|consumer| consumer.accepts(id)))
        .copied()
        .unwrap_or(candidates[0])
        .clone();

    let strategies: Vec<MemoryStrategy> = consumers
        .iter()
        .map(|consumer| {
            if consumer.accepts(&factory_id) {
                MemoryStrategy::DirectCompatibility
            } else {
                MemoryStrategy::CopyToTarget
            }
        })
        .collect();

    let supports_sub_tensors = registry
        .get_factory(&factory_id)
        .map_or(false, |factory| factory.supports_sub_tensors());
    let sub_tensor_fallback = needs_sub_tensors && !supports_sub_tensors;

    if sub_tensor_fallback {
        result.report(
            DiagnosticKind::CompatibilityWarning,
            layer,
            slot_ref,
            format!(
                "factory '{}' cannot create sub-tensors; falling back to full copies",
                factory_id
            ),
        );
        if options.warnings_as_errors {
            result.has_error = true;
        }
    }

    log::debug!(
        "Layer '{}' output {} uses factory '{}' with strategies {:?}",
        layer.name(),
        slot_ref.slot,
        factory_id,
        strategies
    );

    SlotPlan::Planned {
        factory_id,
        strategies,
        sub_tensor_fallback,
    }
}
