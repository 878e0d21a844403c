//! User-agent lookup benchmark
//!
//! Compares cache-hit lookups against uncached full pipeline runs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use devc_engine::{CacheProvider, Engine};
use std::io::Write;
use tempfile::NamedTempFile;

const UAS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android; Acme A1) AppleWebKit/537.36",
    "Mozilla/5.0 (Linux; Android; Acme A1 Build/Chrome) Safari",
    "Mozilla/5.0 (Linux; Android; Bravo Tab) AppleWebKit/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
    "WeirdBot/0.1",
];

fn fixture() -> String {
    let mut devices = String::from(
        r#"<device_repository version="bench">
  <devices>
    <device id="generic" user_agent="">
      <group id="display">
        <capability name="resolution_width" value="800"/>
        <capability name="resolution_height" value="600"/>
      </group>
    </device>
    <device id="generic_web_browser" user_agent="Mozilla/5.0 (Windows NT 10.0; Win64; x64)" parent="generic"/>
    <device id="generic_android" user_agent="Android" parent="generic"/>
    <device id="acme_a1" user_agent="Android; Acme A1" parent="generic_android"/>
    <device id="acme_a1_chrome" user_agent="Android; Acme A1 Build/Chrome" parent="acme_a1"/>
    <device id="bravo_tab" user_agent="Android; Bravo Tab" parent="generic_android"/>
"#,
    );
    // Pad the pattern space so the automaton has real work to do.
    for i in 0..500 {
        devices.push_str(&format!(
            r#"    <device id="synthetic_{i}" user_agent="SyntheticAgent/{i}.0" parent="generic_android"/>
"#
        ));
    }
    devices.push_str("  </devices>\n</device_repository>\n");
    devices
}

fn engine_with(provider: CacheProvider) -> (Engine, NamedTempFile) {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(fixture().as_bytes()).unwrap();

    let mut engine = Engine::new();
    engine.set_root(file.path()).unwrap();
    engine.set_cache_provider(provider, &[]).unwrap();
    engine.load().unwrap();
    (engine, file)
}

fn lookup_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    let (cached, _f1) = engine_with(CacheProvider::DoubleLru);
    group.bench_function("double_lru_hit", |b| {
        // Warm both stages first.
        for ua in UAS {
            cached.lookup_user_agent(ua).unwrap();
        }
        b.iter(|| {
            for ua in UAS {
                black_box(cached.lookup_user_agent(black_box(ua)).unwrap());
            }
        })
    });

    let (uncached, _f2) = engine_with(CacheProvider::None);
    group.bench_function("uncached", |b| {
        b.iter(|| {
            for ua in UAS {
                black_box(uncached.lookup_user_agent(black_box(ua)).unwrap());
            }
        })
    });

    group.finish();
}

fn resolve_scaling_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("device_id_lookup");
    let (engine, _file) = engine_with(CacheProvider::None);

    for id in ["generic", "acme_a1_chrome", "synthetic_499"] {
        group.bench_with_input(BenchmarkId::from_parameter(id), id, |b, &id| {
            b.iter(|| black_box(engine.lookup_device_id(black_box(id)).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, lookup_benchmark, resolve_scaling_benchmark);
criterion_main!(benches);
