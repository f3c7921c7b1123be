use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::prelude::*;

use tensor_handle_planner::{
    backend::{accelerator_backend, backends_map, reference_backend, vectorized_backend},
    select_tensor_handle_strategy, Backend, BackendsMap, Graph, InputSlotRef, LayerType, OutputSlotRef,
    PlannerOptions, TensorHandleFactoryRegistry, TensorHandlePlanner,
};

const BACKENDS: [&str; 3] = ["CpuRef", "CpuAcc", "GpuAcc"];

fn preset_backends() -> BackendsMap {
    let backends: Vec<Box<dyn Backend>> = vec![
        Box::new(reference_backend()),
        Box::new(vectorized_backend()),
        Box::new(accelerator_backend()),
    ];
    backends_map(backends)
}

/// Random layered DAG: every layer reads from one layer of the previous tier,
/// backends are assigned at random
fn random_graph(num_tiers: usize, width: usize, seed: u64) -> Graph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = Graph::new();

    let mut previous = vec![graph.add_layer(LayerType::Input, "input", "CpuRef")];
    for tier in 0..num_tiers {
        let mut current = Vec::with_capacity(width);
        for column in 0..width {
            let backend = BACKENDS[rng.gen_range(0..BACKENDS.len())];
            let layer_type = if rng.gen_bool(0.5) {
                LayerType::Activation
            } else {
                LayerType::Softmax
            };
            let layer = graph.add_layer(layer_type, format!("layer_{}_{}", tier, column), backend);

            let source = previous[rng.gen_range(0..previous.len())];
            graph
                .connect(OutputSlotRef::new(source, 0), InputSlotRef::new(layer, 0))
                .unwrap();
            current.push(layer);
        }
        previous = current;
    }

    for (index, &last) in previous.iter().enumerate() {
        let output = graph.add_layer(LayerType::Output, format!("output_{}", index), "CpuRef");
        graph
            .connect(OutputSlotRef::new(last, 0), InputSlotRef::new(output, 0))
            .unwrap();
    }

    graph
}

fn criterion_benchmark(c: &mut Criterion) {
    let backends = preset_backends();
    let mut registry = TensorHandleFactoryRegistry::new();
    for backend in backends.values() {
        backend.register_tensor_handle_factories(&mut registry).unwrap();
    }
    let options = PlannerOptions::default();

    let mut group = c.benchmark_group("tensor_handle_planning");

    for &tiers in &[8usize, 64, 256] {
        let graph = random_graph(tiers, 8, 42);

        group.bench_with_input(BenchmarkId::new("select_strategy", tiers), &graph, |b, graph| {
            b.iter_batched(
                || graph.clone(),
                |mut graph| {
                    let result = select_tensor_handle_strategy(&mut graph, &backends, &registry, &options).unwrap();
                    black_box(result)
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("plan", tiers), &graph, |b, graph| {
            b.iter_batched(
                || (graph.clone(), TensorHandlePlanner::new(options.clone())),
                |(mut graph, mut planner)| {
                    let report = planner.plan(&mut graph, &backends).unwrap();
                    black_box(report.copy_layers_added)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
