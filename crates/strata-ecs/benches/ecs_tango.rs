//! ECS benchmarks using tango-bench for paired comparison testing.

use std::{hint::black_box, sync::Arc};

use strata_ecs::{Component, EntityId, EntityStore, Schema, Tag};
use tango_bench::{IntoBenchmarks, benchmark_fn, tango_benchmarks, tango_main};

#[derive(Component, Default, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Component, Default, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Tag)]
struct Frozen;

fn schema() -> Arc<Schema> {
    let mut builder = Schema::builder();
    builder.component::<Position>().unwrap();
    builder.component::<Velocity>().unwrap();
    builder.tag::<Frozen>().unwrap();
    builder.build()
}

fn with_positions(count: usize) -> (EntityStore, Vec<EntityId>) {
    let mut store = EntityStore::new(schema());
    let entities = (0..count)
        .map(|i| {
            let e = store.create_entity();
            store
                .add_component(
                    e,
                    Position {
                        x: i as f32,
                        y: 0.0,
                        z: 0.0,
                    },
                )
                .unwrap();
            e
        })
        .collect();
    (store, entities)
}

fn create_benchmarks() -> impl IntoBenchmarks {
    [
        benchmark_fn("create_empty/1", |b| {
            let schema = schema();
            b.iter(move || {
                let mut store = EntityStore::new(Arc::clone(&schema));
                black_box(store.create_entity());
            })
        }),
        benchmark_fn("create_empty/1000", |b| {
            let schema = schema();
            b.iter(move || {
                let mut store = EntityStore::new(Arc::clone(&schema));
                for _ in 0..1000 {
                    black_box(store.create_entity());
                }
            })
        }),
        benchmark_fn("create_with_component/1000", |b| {
            b.iter(|| black_box(with_positions(1000)))
        }),
    ]
}

fn component_benchmarks() -> impl IntoBenchmarks {
    [
        benchmark_fn("add_component/1000", |b| {
            b.iter(|| {
                let (mut store, entities) = with_positions(1000);
                for entity in entities {
                    store.add_component(entity, Velocity::default()).unwrap();
                }
            })
        }),
        benchmark_fn("add_tag/1000", |b| {
            b.iter(|| {
                let (mut store, entities) = with_positions(1000);
                for entity in entities {
                    store.add_tag::<Frozen>(entity).unwrap();
                }
            })
        }),
        benchmark_fn("get_component/1000", |b| {
            let (store, entities) = with_positions(1000);
            b.iter(move || {
                for &entity in &entities {
                    black_box(store.get_component::<Position>(entity).unwrap());
                }
            })
        }),
        benchmark_fn("get_component_mut/1000", |b| {
            let (mut store, entities) = with_positions(1000);
            b.iter(move || {
                for &entity in &entities {
                    store.get_component_mut::<Position>(entity).unwrap().x += 1.0;
                }
            })
        }),
    ]
}

fn delete_benchmarks() -> impl IntoBenchmarks {
    [benchmark_fn("delete/1000", |b| {
        b.iter(|| {
            let (mut store, entities) = with_positions(1000);
            for entity in entities {
                store.delete_entity(entity).unwrap();
            }
        })
    })]
}

tango_benchmarks!(
    create_benchmarks(),
    component_benchmarks(),
    delete_benchmarks()
);
tango_main!();
