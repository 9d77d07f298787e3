//! Benchmarks for context accumulation and report synthesis.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reportflow::context::ContextAccumulator;
use reportflow::core::StageRun;
use reportflow::provider::{AnalysisProvider, ProviderResult};
use reportflow::registry::StageRegistry;
use reportflow::synthesis::SynthesisEngine;
use reportflow::testing::{acme_profile, acme_provider};
use std::time::Duration;

fn acme_runs(registry: &StageRegistry) -> Vec<StageRun> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let provider = acme_provider();
    let profile = acme_profile();
    let mut runs = Vec::new();

    for stage in registry.stages() {
        let payload = ContextAccumulator::build(&profile, stage, &runs);
        let mut run = StageRun::pending(&stage.id);
        run.start().unwrap();
        match runtime.block_on(provider.invoke(stage, &payload, Duration::from_secs(1))) {
            ProviderResult::Success { data } => run.complete(data).unwrap(),
            ProviderResult::Failure { kind, message } => run.fail(kind, message).unwrap(),
        }
        runs.push(run);
    }
    runs
}

fn synthesis_benchmark(c: &mut Criterion) {
    let registry = StageRegistry::standard();
    let engine = SynthesisEngine::new(&registry);
    let profile = acme_profile();
    let runs = acme_runs(&registry);

    c.bench_function("synthesize_acme", |b| {
        b.iter(|| black_box(engine.synthesize(&profile, black_box(&runs))));
    });

    let last = &registry.stages()[registry.len() - 1];
    c.bench_function("accumulate_context", |b| {
        b.iter(|| black_box(ContextAccumulator::build(&profile, last, black_box(&runs)).digest()));
    });
}

criterion_group!(benches, synthesis_benchmark);
criterion_main!(benches);
