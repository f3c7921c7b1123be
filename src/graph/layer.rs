use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::types::{BackendId, FactoryId, TensorInfo};

/// Unique identifier for a layer in the graph
pub type LayerId = usize;

/// Reference to an output slot of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputSlotRef {
    pub layer: LayerId,
    pub slot: usize,
}

impl OutputSlotRef {
    pub fn new(layer: LayerId, slot: usize) -> Self {
        Self { layer, slot }
    }
}

/// Reference to an input slot of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputSlotRef {
    pub layer: LayerId,
    pub slot: usize,
}

impl InputSlotRef {
    pub fn new(layer: LayerId, slot: usize) -> Self {
        Self { layer, slot }
    }
}

/// Kinds of layers the planner distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum LayerType {
    Input,
    Output,
    Activation,
    Softmax,
    Addition,
    Concat,
    Splitter,
    /// Cross-representation copy inserted by the planner
    MemCopy,
}

impl LayerType {
    /// Default number of (input, output) slots
    pub fn default_arity(&self) -> (usize, usize) {
        match self {
            LayerType::Input => (0, 1),
            LayerType::Output => (1, 0),
            LayerType::Addition | LayerType::Concat => (2, 1),
            LayerType::Splitter => (1, 2),
            LayerType::Activation | LayerType::Softmax | LayerType::MemCopy => (1, 1),
        }
    }

    /// Input and output layers exchange data with the caller
    pub fn is_boundary(&self) -> bool {
        matches!(self, LayerType::Input | LayerType::Output)
    }

    /// Outputs of this layer are views into its input
    pub fn produces_sub_tensors(&self) -> bool {
        matches!(self, LayerType::Splitter)
    }

    /// Inputs of this layer are written as views into its output
    pub fn consumes_sub_tensors(&self) -> bool {
        matches!(self, LayerType::Concat)
    }
}

/// How a consumer gets at the tensor produced on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum MemoryStrategy {
    /// The consumer reads the producer's handle as is
    DirectCompatibility,
    /// A copy layer must bridge the two representations
    CopyToTarget,
}

/// Planning state of an output slot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotPlan {
    /// Strategy selection has not visited the slot
    #[default]
    Unplanned,
    Planned {
        factory_id: FactoryId,
        /// One entry per connection, in connection order
        strategies: Vec<MemoryStrategy>,
        /// Sub-tensor views were needed but the factory cannot alias, so full copies are used
        sub_tensor_fallback: bool,
    },
    /// Strategy selection could not find a usable factory
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct InputSlot {
    pub(crate) connection: Option<OutputSlotRef>,
}

impl InputSlot {
    /// The output slot feeding this input, if any
    pub fn connection(&self) -> Option<OutputSlotRef> {
        self.connection
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputSlot {
    pub(crate) connections: Vec<InputSlotRef>,
    pub(crate) plan: SlotPlan,
    pub(crate) tensor_info: Option<TensorInfo>,
}

impl OutputSlot {
    /// Connected input slots, in connection order
    pub fn connections(&self) -> &[InputSlotRef] {
        &self.connections
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn plan(&self) -> &SlotPlan {
        &self.plan
    }

    pub fn tensor_info(&self) -> Option<&TensorInfo> {
        self.tensor_info.as_ref()
    }

    /// Factory chosen to materialize this slot's tensor
    pub fn tensor_handle_factory_id(&self) -> Option<&FactoryId> {
        match &self.plan {
            SlotPlan::Planned { factory_id, .. } => Some(factory_id),
            _ => None,
        }
    }

    /// Strategy chosen for the connection at `index`
    pub fn memory_strategy_for_connection(&self, index: usize) -> Option<MemoryStrategy> {
        match &self.plan {
            SlotPlan::Planned { strategies, .. } => strategies.get(index).copied(),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.plan, SlotPlan::Failed)
    }

    /// Whether sub-tensor views on this slot fall back to full copies
    pub fn uses_sub_tensor_fallback(&self) -> bool {
        matches!(self.plan, SlotPlan::Planned { sub_tensor_fallback: true, .. })
    }
}

/// Node of the computation graph
#[derive(Debug, Clone)]
pub struct Layer {
    pub(crate) id: LayerId,
    pub(crate) name: String,
    pub(crate) layer_type: LayerType,
    pub(crate) backend_id: BackendId,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) outputs: Vec<OutputSlot>,
}

impl Layer {
    pub(crate) fn new(
        id: LayerId,
        name: String,
        layer_type: LayerType,
        backend_id: BackendId,
        num_inputs: usize,
        num_outputs: usize,
    ) -> Self {
        Self {
            id,
            name,
            layer_type,
            backend_id,
            inputs: vec![InputSlot::default(); num_inputs],
            outputs: vec![OutputSlot::default(); num_outputs],
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    pub fn backend_id(&self) -> &BackendId {
        &self.backend_id
    }

    pub fn input_slots(&self) -> &[InputSlot] {
        &self.inputs
    }

    pub fn output_slots(&self) -> &[OutputSlot] {
        &self.outputs
    }

    pub fn input_slot(&self, index: usize) -> Option<&InputSlot> {
        self.inputs.get(index)
    }

    pub fn output_slot(&self, index: usize) -> Option<&OutputSlot> {
        self.outputs.get(index)
    }
}
