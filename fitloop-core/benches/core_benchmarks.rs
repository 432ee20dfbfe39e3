use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fitloop_core::aggregate::EpochTotals;
use fitloop_core::checkpoint::{CheckpointRecord, digest};
use fitloop_core::{
    CheckpointLocation, CheckpointStore, EarlyStopping, MetricPoint, StepOutcome,
    TrainTestHistory,
};
use uuid::Uuid;

fn history(epochs: usize) -> TrainTestHistory {
    let mut history = TrainTestHistory::default();
    for i in 0..epochs {
        let t = i as f64 + 1.0;
        history.train.push(MetricPoint::new(1.0 / t, 1.0 - 1.0 / (t + 1.0)));
        history.test.push(MetricPoint::new(1.2 / t, 1.0 - 1.5 / (t + 2.0)));
    }
    history
}

fn bench_aggregation(c: &mut Criterion) {
    c.bench_function("epoch_totals_1k_batches", |b| {
        b.iter(|| {
            let mut totals = EpochTotals::default();
            for i in 0..1000 {
                totals.add(black_box(StepOutcome {
                    loss: 0.25 * (i % 7) as f64,
                    correct: i % 32,
                    samples: 32,
                }));
            }
            totals.finish(black_box(true))
        })
    });
}

fn bench_early_stopping(c: &mut Criterion) {
    let values: Vec<f64> = (0..500).map(|i| ((i * 37) % 101) as f64 / 100.0).collect();
    c.bench_function("early_stopping_500_updates", |b| {
        b.iter(|| {
            let mut es = EarlyStopping::new(Some(10));
            for &v in &values {
                es.update(black_box(v));
            }
            es.should_stop()
        })
    });
}

fn bench_checkpoint(c: &mut Criterion) {
    let params = vec![7u8; 64 * 1024];
    let history = history(200);

    c.bench_function("model_digest_64k", |b| b.iter(|| digest(black_box(&params))));

    c.bench_function("checkpoint_record_serialize", |b| {
        let record = CheckpointRecord::new(Uuid::new_v4(), &params, &history);
        b.iter(|| serde_json::to_vec(black_box(&record)))
    });

    c.bench_function("checkpoint_save_load", |b| {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CheckpointStore::new(CheckpointLocation::new(dir.path()));
        let run_id = Uuid::new_v4();
        b.iter(|| {
            store.save(run_id, &params, &history).unwrap();
            store.load().unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_aggregation,
    bench_early_stopping,
    bench_checkpoint,
);
criterion_main!(benches);
