use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use redistat::keys::{build_key, field_index};
use redistat::{
    AggregateQuery, EntityId, Event, MemoryStore, MetricConfig, Resolution, StatsClient,
};

fn bench_key_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_building");

    let id = EntityId::from(1042);
    group.bench_function("counter_key", |b| {
        b.iter(|| {
            black_box(build_key(
                black_box(Some("app")),
                black_box("visits"),
                redistat::Variant::Counter,
                Some(black_box(&id)),
                Some(black_box("2026-01-05")),
            ))
        });
    });

    let device = EntityId::from("device-a1");
    group.bench_function("unique_key", |b| {
        b.iter(|| {
            black_box(build_key(
                black_box(Some("app")),
                black_box("active"),
                redistat::Variant::Unique,
                Some(black_box(&device)),
                Some(black_box("2026-W2")),
            ))
        });
    });

    group.bench_function("field_index", |b| {
        b.iter(|| black_box(field_index(black_box(&id))));
    });

    group.finish();
}

fn bench_update_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("update_fan_out");

    for id_count in [1usize, 10, 100].iter() {
        let client = StatsClient::with_namespace(MemoryStore::new(), "app");
        let visits = client.metric(
            MetricConfig::counter("visits")
                .resolution(Resolution::Day)
                .build()
                .unwrap(),
        );
        let ids: Vec<i64> = (0..*id_count as i64).collect();

        group.bench_with_input(BenchmarkId::from_parameter(id_count), id_count, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    visits
                        .increment(Event::ids(ids.iter().copied()).on("2026-01-05"))
                        .await
                        .unwrap()
                })
            });
        });
    }

    group.finish();
}

fn bench_range_aggregation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("range_aggregation");

    for days in [7usize, 30, 365].iter() {
        let client = StatsClient::with_namespace(MemoryStore::new(), "app");
        let visits = client.metric(
            MetricConfig::counter("visits")
                .resolution(Resolution::Day)
                .build()
                .unwrap(),
        );
        rt.block_on(async {
            visits
                .increment(Event::id(1042).on("2026-01-15").by(3))
                .await
                .unwrap();
        });
        let end = match days {
            7 => "2026-01-07",
            30 => "2026-01-30",
            _ => "2026-12-31",
        };

        group.bench_with_input(BenchmarkId::from_parameter(days), days, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(
                        visits
                            .aggregate(AggregateQuery::between("2026-01-01", end).id(1042))
                            .await
                            .unwrap(),
                    )
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_building,
    bench_update_fan_out,
    bench_range_aggregation
);
criterion_main!(benches);
