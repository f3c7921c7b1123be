use crate::error::{Error, Result};
use crate::graph::{Graph, InputSlotRef, OutputSlotRef, SlotPlan};

/// Check that every connected output slot carries a factory and one strategy per connection
pub fn validate_strategies(graph: &Graph) -> Result<()> {
    for layer in graph.layers() {
        for (index, output) in layer.output_slots().iter().enumerate() {
            if output.num_connections() == 0 {
                continue;
            }

            match output.plan() {
                SlotPlan::Planned { strategies, .. } if strategies.len() == output.num_connections() => {}
                SlotPlan::Planned { strategies, .. } => {
                    return Err(Error::InternalInvariant(format!(
                        "layer '{}' output {} has {} strategies for {} connections",
                        layer.name(),
                        index,
                        strategies.len(),
                        output.num_connections()
                    )));
                }
                SlotPlan::Unplanned | SlotPlan::Failed => {
                    return Err(Error::InternalInvariant(format!(
                        "layer '{}' output {} was left without a memory strategy",
                        layer.name(),
                        index
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Check that both ends of every connection agree and no edge dangles
pub fn validate_connections(graph: &Graph) -> Result<()> {
    for layer in graph.layers() {
        for (index, output) in layer.output_slots().iter().enumerate() {
            let from = OutputSlotRef::new(layer.id(), index);

            for &target in output.connections() {
                let back = graph.input_slot(target).and_then(|input| input.connection());
                if back != Some(from) {
                    return Err(Error::InternalInvariant(format!(
                        "layer '{}' output {} is connected to input {} of layer {}, which does not point back",
                        layer.name(),
                        index,
                        target.slot,
                        target.layer
                    )));
                }
            }
        }

        for (index, input) in layer.input_slots().iter().enumerate() {
            let to = InputSlotRef::new(layer.id(), index);

            if let Some(source) = input.connection() {
                let listed = graph
                    .output_slot(source)
                    .map_or(false, |output| output.connections().contains(&to));
                if !listed {
                    return Err(Error::InternalInvariant(format!(
                        "layer '{}' input {} refers to a dangling output slot {} of layer {}",
                        layer.name(),
                        index,
                        source.slot,
                        source.layer
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LayerType;

    #[test]
    fn test_unplanned_connection_is_reported() {
        let mut graph = Graph::new();
        let a = graph.add_layer(LayerType::Input, "a", "A");
        let b = graph.add_layer(LayerType::Output, "b", "A");
        graph.connect(OutputSlotRef::new(a, 0), InputSlotRef::new(b, 0)).unwrap();

        assert!(validate_connections(&graph).is_ok());
        assert!(matches!(validate_strategies(&graph), Err(Error::InternalInvariant(_))));
    }

    #[test]
    fn test_dangling_edge_is_reported() {
        let mut graph = Graph::new();
        let a = graph.add_layer(LayerType::Input, "a", "A");
        let b = graph.add_layer(LayerType::Output, "b", "A");
        graph.connect(OutputSlotRef::new(a, 0), InputSlotRef::new(b, 0)).unwrap();

        // Break the back-reference by hand
        graph.input_slot_mut(InputSlotRef::new(b, 0)).unwrap().connection = None;
        assert!(matches!(validate_connections(&graph), Err(Error::InternalInvariant(_))));
    }
}
