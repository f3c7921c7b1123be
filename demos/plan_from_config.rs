use std::env;
use std::path::Path;

use tensor_handle_planner::{
    ConfiguredBackend, Graph, InputSlotRef, LayerType, OutputSlotRef, PlannerConfig, Result, TensorHandlePlanner,
};

const DEFAULT_CONFIG: &str = r#"{
    "backends": [
        {
            "id": "BackendA",
            "preferences": ["TestHandleFactoryA1", "TestHandleFactoryA2", "TestHandleFactoryB1"],
            "factories": [{ "id": "TestHandleFactoryA1" }, { "id": "TestHandleFactoryA2" }]
        },
        {
            "id": "BackendB",
            "preferences": ["TestHandleFactoryB1"],
            "factories": [{ "id": "TestHandleFactoryB1", "supports_sub_tensors": true }]
        },
        {
            "id": "BackendC",
            "preferences": ["TestHandleFactoryC1"],
            "factories": [{ "id": "TestHandleFactoryC1" }]
        }
    ]
}"#;

fn main() -> Result<()> {
    // Use the config file given on the command line, or the built-in three backend setup
    let args: Vec<String> = env::args().collect();
    let config = if args.len() > 1 {
        let path = Path::new(&args[1]);
        println!("Loading planner config from: {}", path.display());
        PlannerConfig::from_json_file(path)?
    } else {
        println!("Using built-in planner config");
        PlannerConfig::from_json_str(DEFAULT_CONFIG)?
    };

    println!("\nBackends:");
    println!("---------");
    for backend_config in &config.backends {
        let backend = ConfiguredBackend::from_config(backend_config);
        let factories: Vec<String> = backend
            .factories()
            .iter()
            .map(|f| format!("{} (sub-tensors: {})", f.id, f.supports_sub_tensors))
            .collect();
        println!("  {} registers [{}]", backend_config.id, factories.join(", "));
    }

    // input(A) -> softmax1(A) -> softmax2(B) -> softmax3(C) -> output(A)
    let mut graph = Graph::new();
    let layers = [
        graph.add_layer(LayerType::Input, "input", "BackendA"),
        graph.add_layer(LayerType::Softmax, "softmax1", "BackendA"),
        graph.add_layer(LayerType::Softmax, "softmax2", "BackendB"),
        graph.add_layer(LayerType::Softmax, "softmax3", "BackendC"),
        graph.add_layer(LayerType::Output, "output", "BackendA"),
    ];
    for pair in layers.windows(2) {
        graph.connect(OutputSlotRef::new(pair[0], 0), InputSlotRef::new(pair[1], 0))?;
    }

    let backends = config.build_backends();
    let mut planner = TensorHandlePlanner::new(config.options.clone());
    let report = planner.plan(&mut graph, &backends)?;

    println!("\nPlanned connections:");
    println!("--------------------");
    for id in graph.topological_order()? {
        let Some(layer) = graph.layer(id) else { continue };
        for output in layer.output_slots() {
            let factory = output
                .tensor_handle_factory_id()
                .map(|f| f.as_str())
                .unwrap_or("-");
            for (index, target) in output.connections().iter().enumerate() {
                let consumer = graph.layer(target.layer).map(|l| l.name()).unwrap_or("?");
                let strategy = output
                    .memory_strategy_for_connection(index)
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                println!("  {} -> {}: {} ({})", layer.name(), consumer, factory, strategy);
            }
        }
    }

    println!("\nCopy layers inserted: {}", report.copy_layers_added);
    for phase in &report.phases {
        println!("  {:<30} {:>4} changes in {:?}", phase.name, phase.changes, phase.duration);
    }

    Ok(())
}
