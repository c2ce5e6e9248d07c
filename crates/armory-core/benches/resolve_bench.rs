//! # Resolution Benchmarks
//!
//! Performance benchmarks for armory-core resolution and conversion.
//!
//! Run with: `cargo bench -p armory-core`

use armory_core::{
    EntryType, MemoryStore, RawRecord, RefToken, Registry, ResolutionContext, SharedStore,
    plan_slots, unpack,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn raw(value: Value) -> RawRecord {
    value.as_object().cloned().unwrap_or_default()
}

/// A pilot owning `mechs` mechs, each with four armed slots drawn from a
/// shared pool of weapons, so most references are repeats.
fn create_roster(mechs: usize) -> Registry {
    let store = Arc::new(MemoryStore::new());
    for w in 0..8 {
        store.insert(
            EntryType::Weapon,
            format!("w{w}"),
            raw(json!({"name": format!("Weapon {w}"), "damage": [{"type": "kinetic", "val": w}]})),
        );
    }
    store.insert(EntryType::Frame, "everest", raw(json!({"name": "Everest"})));

    let mut owned = Vec::with_capacity(mechs);
    for m in 0..mechs {
        let slots: Vec<Value> = (0..4)
            .map(|s| json!({"weapon": {"type": "weapon", "id": format!("w{}", (m + s) % 8)}}))
            .collect();
        store.insert(
            EntryType::Mech,
            format!("mk{m}"),
            raw(json!({
                "name": format!("Mech {m}"),
                "frame": {"type": "frame", "id": "everest"},
                "pilot": {"type": "pilot", "id": "p1"},
                "mounts": [{"mount_type": "main", "slots": slots}],
            })),
        );
        owned.push(json!({"type": "mech", "id": format!("mk{m}")}));
    }
    store.insert(EntryType::Pilot, "p1", raw(json!({"name": "Ana", "mechs": owned})));

    Registry::new("bench", store as SharedStore)
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

fn bench_resolve_pilot(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("resolve_pilot");

    for size in [10, 100, 500].iter() {
        let registry = create_roster(*size);
        let token = RefToken::new(EntryType::Pilot, "p1");

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let ctx = ResolutionContext::new();
                let pilot = rt.block_on(registry.resolve(&ctx, &token)).expect("resolve");
                black_box(pilot)
            });
        });
    }

    group.finish();
}

fn bench_resolve_many_warm(c: &mut Criterion) {
    let rt = runtime();
    let registry = create_roster(100);
    let tokens: Vec<RefToken> = (0..100)
        .map(|m| RefToken::new(EntryType::Mech, format!("mk{m}")))
        .collect();
    let ctx = ResolutionContext::new();
    rt.block_on(registry.resolve_many(&ctx, &tokens)).expect("warm");

    c.bench_function("resolve_many_warm_context", |b| {
        b.iter(|| black_box(rt.block_on(registry.resolve_many(&ctx, &tokens))));
    });
}

fn bench_plan_slots(c: &mut Criterion) {
    let old: Vec<Option<String>> = (0..64).map(|i| Some(format!("w{}", i % 8))).collect();
    let new: Vec<Option<String>> = (0..64).map(|i| Some(format!("w{}", i % 9))).collect();
    let old: Vec<Option<&str>> = old.iter().map(Option::as_deref).collect();
    let new: Vec<Option<&str>> = new.iter().map(Option::as_deref).collect();

    c.bench_function("plan_slots_64", |b| {
        b.iter(|| black_box(plan_slots(&old, &new)));
    });
}

fn bench_unpack(c: &mut Criterion) {
    let slots: Vec<Value> = (0..16)
        .map(|s| json!({"size": "main", "weapon": {"id": format!("w{s}"), "uses": "2"}, "mod": "m1"}))
        .collect();
    let packed = raw(json!({
        "id": "mk1",
        "name": "Lodestar",
        "frame": "everest",
        "hp": "12",
        "mounts": [{"mount_type": "flex", "slots": slots}],
        "systems": ["s1", "s2", "s3"],
    }));

    c.bench_function("unpack_mech", |b| {
        b.iter(|| black_box(unpack(EntryType::Mech, &packed)));
    });
}

criterion_group!(
    benches,
    bench_resolve_pilot,
    bench_resolve_many_warm,
    bench_plan_slots,
    bench_unpack,
);

criterion_main!(benches);
