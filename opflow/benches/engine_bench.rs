//! Benchmarks for pipeline execution and conflict resolution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opflow::prelude::*;
use opflow::testing::{FlakyStorage, OperationFixture};

fn pipeline_benchmark(c: &mut Criterion) {
    let storage = Arc::new(InMemoryOperationStorage::new());
    let manager = OperationManager::new(storage.clone(), "processing", Component::Engine);
    let mut builder = PipelineBuilder::new("provision");
    for name in ["init", "create_cluster", "wait_ready", "create_runtime", "finish"] {
        builder = match builder.step(Arc::new(NoOpStep::new(name))) {
            Ok(builder) => builder,
            Err(err) => panic!("invalid pipeline: {err}"),
        };
    }
    let pipeline = match builder.build(manager) {
        Ok(pipeline) => pipeline,
        Err(err) => panic!("invalid pipeline: {err}"),
    };

    c.bench_function("five_step_pipeline", |b| {
        b.iter(|| {
            tokio_test::block_on(async {
                let op = match OperationFixture::provision().insert(storage.as_ref()).await {
                    Ok(op) => op,
                    Err(err) => panic!("insert failed: {err}"),
                };
                black_box(pipeline.execute(op).await)
            })
        });
    });
}

fn conflict_benchmark(c: &mut Criterion) {
    let storage = Arc::new(FlakyStorage::new());
    let manager = OperationManager::new(storage.clone(), "processing", Component::Engine);

    c.bench_function("update_with_conflict", |b| {
        b.iter(|| {
            tokio_test::block_on(async {
                let op = match OperationFixture::provision().insert(storage.as_ref()).await {
                    Ok(op) => op,
                    Err(err) => panic!("insert failed: {err}"),
                };
                storage.inject_conflicts(1);
                black_box(
                    manager
                        .update_operation(op, |op| {
                            op.add_finished_stage("init");
                        })
                        .await,
                )
            })
        });
    });
}

criterion_group!(benches, pipeline_benchmark, conflict_benchmark);
criterion_main!(benches);
