//! Registry and room-code benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use roomcast_core::{RegistryConfig, RoomCode, RoomCodeGenerator, RoomRegistry};
use tokio::runtime::Runtime;

fn bench_codes(c: &mut Criterion) {
    let mut group = c.benchmark_group("room_code");
    let generator = RoomCodeGenerator::default();

    group.bench_function("generate", |b| b.iter(|| generator.generate()));
    group.bench_function("parse", |b| b.iter(|| RoomCode::parse(black_box(" ab12cd "))));

    group.finish();
}

fn bench_registry(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();
    let mut group = c.benchmark_group("registry");

    let registry = RoomRegistry::with_config(RegistryConfig {
        max_rooms: usize::MAX,
        ..RegistryConfig::default()
    });
    let mut i = 0u64;
    group.bench_function("create_delete", |b| {
        b.iter(|| {
            let code = RoomCode::parse(&format!("R{i:08X}")).unwrap();
            i += 1;
            registry.create(code.clone()).unwrap();
            registry.delete(&code)
        });
    });

    for n in 0..1000 {
        registry.create(RoomCode::parse(&format!("L{n:05}")).unwrap()).unwrap();
    }
    let target = RoomCode::parse("L00500").unwrap();
    group.bench_function("lookup_1000", |b| b.iter(|| registry.lookup(black_box(&target))));
    group.bench_function("resolve_1000", |b| b.iter(|| registry.resolve(black_box("l00500"))));

    registry.shutdown();
    group.finish();
}

criterion_group!(benches, bench_codes, bench_registry);
criterion_main!(benches);
