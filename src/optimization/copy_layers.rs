use crate::backend::BackendsMap;
use crate::error::{Error, Result};
use crate::factory::TensorHandleFactoryRegistry;
use crate::graph::{Graph, LayerType, MemoryStrategy, OutputSlotRef, SlotPlan};

impl Graph {
    /// Insert a copy layer on every connection planned as `CopyToTarget`.
    ///
    /// Each copy runs on the consumer's backend and materializes the
    /// consumer's preferred factory, so both new edges are directly
    /// compatible. Returns the number of copy layers added.
    pub fn add_copy_layers(&mut self, backends: &BackendsMap, registry: &TensorHandleFactoryRegistry) -> Result<usize> {
        let pending = self.connections_needing_copies()?;

        for &(from, connection) in &pending {
            let target = self
                .output_slot(from)
                .and_then(|slot| slot.connections().get(connection).copied())
                .ok_or_else(|| {
                    Error::InternalInvariant(format!(
                        "connection {} of layer {} output {} vanished during copy insertion",
                        connection, from.layer, from.slot
                    ))
                })?;

            let producer = self.layer(from.layer).map(|layer| layer.name()).unwrap_or_default();
            let consumer = self.layer(target.layer).ok_or_else(|| {
                Error::InternalInvariant(format!("connection targets missing layer {}", target.layer))
            })?;
            let name = format!("[ {} ({}) -> {} ({}) ]", producer, from.slot, consumer.name(), target.slot);
            let backend_id = consumer.backend_id().clone();

            let factory_id = backends
                .get(&backend_id)
                .map(|backend| backend.handle_factory_preferences())
                .and_then(|preferences| preferences.into_iter().find(|id| registry.contains(id)))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "backend '{}' has no registered factory for copy layer {}",
                        backend_id, name
                    ))
                })?;

            let copy = self.insert_layer_on_connection(from, connection, LayerType::MemCopy, name.clone(), backend_id)?;

            if let SlotPlan::Planned { strategies, .. } = &mut self.output_slot_mut(from)?.plan {
                strategies[connection] = MemoryStrategy::DirectCompatibility;
            }
            self.output_slot_mut(OutputSlotRef::new(copy, 0))?.plan = SlotPlan::Planned {
                factory_id,
                strategies: vec![MemoryStrategy::DirectCompatibility],
                sub_tensor_fallback: false,
            };

            log::debug!("Inserted copy layer {}", name);
        }

        self.topological_sort()?;
        Ok(pending.len())
    }

    /// Collect `(slot, connection index)` pairs flagged for a copy
    fn connections_needing_copies(&self) -> Result<Vec<(OutputSlotRef, usize)>> {
        let mut pending = Vec::new();

        for layer in self.layers() {
            for (index, output) in layer.output_slots().iter().enumerate() {
                let slot = OutputSlotRef::new(layer.id(), index);

                match output.plan() {
                    SlotPlan::Planned { strategies, .. } => {
                        if strategies.len() != output.num_connections() {
                            return Err(Error::InternalInvariant(format!(
                                "layer '{}' output {} has {} strategies for {} connections",
                                layer.name(),
                                index,
                                strategies.len(),
                                output.num_connections()
                            )));
                        }

                        pending.extend(
                            strategies
                                .iter()
                                .enumerate()
                                .filter(|&(_, &strategy)| strategy == MemoryStrategy::CopyToTarget)
                                .map(|(connection, _)| (slot, connection)),
                        );
                    }
                    SlotPlan::Unplanned if output.num_connections() > 0 => {
                        return Err(Error::InternalInvariant(format!(
                            "layer '{}' output {} has no memory strategy",
                            layer.name(),
                            index
                        )));
                    }
                    SlotPlan::Unplanned => {}
                    SlotPlan::Failed => {
                        return Err(Error::Configuration(format!(
                            "layer '{}' output {} has no usable tensor handle factory",
                            layer.name(),
                            index
                        )));
                    }
                }
            }
        }

        Ok(pending)
    }
}
