pub mod layer;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::error::{Error, Result};
use crate::types::{BackendId, TensorInfo};

pub use layer::{
    InputSlot, InputSlotRef, Layer, LayerId, LayerType, MemoryStrategy, OutputSlot, OutputSlotRef, SlotPlan,
};

/// Computation graph of backend-assigned layers.
///
/// Layers live in an arena and are addressed by `LayerId`; connections are
/// stored as slot references on both ends. Layers are never removed.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    layers: Vec<Layer>,
    order: Vec<LayerId>,
    order_valid: bool,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer with the default slot counts for its type
    pub fn add_layer(&mut self, layer_type: LayerType, name: impl Into<String>, backend: impl Into<BackendId>) -> LayerId {
        let (inputs, outputs) = layer_type.default_arity();
        self.add_layer_with_slots(layer_type, name, backend, inputs, outputs)
    }

    /// Add a layer with explicit slot counts
    pub fn add_layer_with_slots(
        &mut self,
        layer_type: LayerType,
        name: impl Into<String>,
        backend: impl Into<BackendId>,
        num_inputs: usize,
        num_outputs: usize,
    ) -> LayerId {
        let id = self.layers.len();
        self.layers.push(Layer::new(id, name.into(), layer_type, backend.into(), num_inputs, num_outputs));
        self.order_valid = false;
        id
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of layers of the given type
    pub fn count_layers(&self, layer_type: LayerType) -> usize {
        self.layers.iter().filter(|l| l.layer_type == layer_type).count()
    }

    /// Find a layer by name
    pub fn find_layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Reassign a layer to another backend
    pub fn set_backend(&mut self, id: LayerId, backend: impl Into<BackendId>) -> Result<()> {
        let layer = self.layer_mut(id)?;
        layer.backend_id = backend.into();
        Ok(())
    }

    /// Attach shape information to an output slot
    pub fn set_tensor_info(&mut self, from: OutputSlotRef, info: TensorInfo) -> Result<()> {
        self.output_slot_mut(from)?.tensor_info = Some(info);
        Ok(())
    }

    pub fn output_slot(&self, slot: OutputSlotRef) -> Option<&OutputSlot> {
        self.layers.get(slot.layer)?.outputs.get(slot.slot)
    }

    pub fn input_slot(&self, slot: InputSlotRef) -> Option<&InputSlot> {
        self.layers.get(slot.layer)?.inputs.get(slot.slot)
    }

    /// Connect an output slot to an input slot. The input must be free.
    pub fn connect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> Result<()> {
        self.output_slot_mut(from)?;
        let input = self.input_slot_mut(to)?;

        if let Some(existing) = input.connection {
            return Err(Error::InvalidGraph(format!(
                "input slot {} of layer {} is already connected to output slot {} of layer {}",
                to.slot, to.layer, existing.slot, existing.layer
            )));
        }
        input.connection = Some(from);

        let output = self.output_slot_mut(from)?;
        output.connections.push(to);
        // Strategies are indexed by connection
        output.plan = SlotPlan::Unplanned;

        self.order_valid = false;
        Ok(())
    }

    /// Remove the connection between an output slot and an input slot
    pub fn disconnect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> Result<()> {
        let output = self.output_slot_mut(from)?;
        let index = output
            .connections
            .iter()
            .position(|&c| c == to)
            .ok_or_else(|| {
                Error::InvalidGraph(format!(
                    "output slot {} of layer {} is not connected to input slot {} of layer {}",
                    from.slot, from.layer, to.slot, to.layer
                ))
            })?;
        output.connections.remove(index);
        output.plan = SlotPlan::Unplanned;

        self.input_slot_mut(to)?.connection = None;
        self.order_valid = false;
        Ok(())
    }

    /// Splice a new single-input, single-output layer into the connection at
    /// `connection` of `from`. The connection index keeps its position and now
    /// targets the new layer; the plan of `from` is left untouched.
    pub(crate) fn insert_layer_on_connection(
        &mut self,
        from: OutputSlotRef,
        connection: usize,
        layer_type: LayerType,
        name: String,
        backend: BackendId,
    ) -> Result<LayerId> {
        let target = *self
            .output_slot(from)
            .and_then(|slot| slot.connections.get(connection))
            .ok_or_else(|| {
                Error::InvalidGraph(format!(
                    "output slot {} of layer {} has no connection {}",
                    from.slot, from.layer, connection
                ))
            })?;
        let tensor_info = self.output_slot(from).and_then(|slot| slot.tensor_info.clone());

        let id = self.add_layer_with_slots(layer_type, name, backend, 1, 1);
        let new_input = InputSlotRef::new(id, 0);
        let new_output = OutputSlotRef::new(id, 0);

        self.output_slot_mut(from)?.connections[connection] = new_input;
        self.input_slot_mut(new_input)?.connection = Some(from);

        let output = self.output_slot_mut(new_output)?;
        output.connections.push(target);
        output.tensor_info = tensor_info;
        self.input_slot_mut(target)?.connection = Some(new_output);

        Ok(id)
    }

    /// Whether the cached topological order reflects the current topology
    pub fn is_sorted(&self) -> bool {
        self.order_valid
    }

    /// Recompute the topological order of the layers
    pub fn topological_sort(&mut self) -> Result<()> {
        let mut dag: DiGraph<LayerId, ()> = DiGraph::with_capacity(self.layers.len(), self.layers.len());
        let nodes: Vec<_> = self.layers.iter().map(|l| dag.add_node(l.id)).collect();

        for layer in &self.layers {
            for output in &layer.outputs {
                for target in &output.connections {
                    dag.add_edge(nodes[layer.id], nodes[target.layer], ());
                }
            }
        }

        let sorted = toposort(&dag, None).map_err(|cycle| {
            let layer = &self.layers[dag[cycle.node_id()]];
            Error::InvalidGraph(format!("Cycle detected in graph at layer '{}'", layer.name))
        })?;

        self.order = sorted.into_iter().map(|node| dag[node]).collect();
        self.order_valid = true;
        Ok(())
    }

    /// Layers in topological order, sorting first if the topology changed
    pub fn topological_order(&mut self) -> Result<Vec<LayerId>> {
        if !self.order_valid {
            self.topological_sort()?;
        }
        Ok(self.order.clone())
    }

    pub(crate) fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers
            .get_mut(id)
            .ok_or_else(|| Error::InvalidGraph(format!("layer {} does not exist", id)))
    }

    pub(crate) fn output_slot_mut(&mut self, slot: OutputSlotRef) -> Result<&mut OutputSlot> {
        self.layer_mut(slot.layer)?
            .outputs
            .get_mut(slot.slot)
            .ok_or_else(|| Error::InvalidGraph(format!("layer {} has no output slot {}", slot.layer, slot.slot)))
    }

    pub(crate) fn input_slot_mut(&mut self, slot: InputSlotRef) -> Result<&mut InputSlot> {
        self.layer_mut(slot.layer)?
            .inputs
            .get_mut(slot.slot)
            .ok_or_else(|| Error::InvalidGraph(format!("layer {} has no input slot {}", slot.layer, slot.slot)))
    }
}
