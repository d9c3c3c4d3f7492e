//! Render loop benchmarks.
//!
//! Run with: cargo bench --bench render_bench -p zk-engine

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use zk_engine::{EngineConfig, Synth};

fn bench_mono_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_mono");

    for waveform in [0u8, 3, 7] {
        let mut synth = Synth::without_storage(EngineConfig::default());
        synth.set_waveform(waveform);
        synth.note_on(60, 100);
        let mut buf = vec![0i16; 64 * 2];

        group.bench_with_input(BenchmarkId::from_parameter(waveform), &waveform, |b, _| {
            b.iter(|| {
                synth.render(black_box(&mut buf));
            });
        });
    }

    group.finish();
}

fn bench_poly_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_poly");

    for notes in [1usize, 4] {
        let mut synth = Synth::without_storage(EngineConfig::default());
        synth.set_waveform(9);
        for n in 0..notes {
            synth.note_on(60 + 4 * n as u8, 100);
        }
        let mut buf = vec![0i16; 64 * 2];

        group.bench_with_input(BenchmarkId::from_parameter(notes), &notes, |b, _| {
            b.iter(|| {
                synth.render(black_box(&mut buf));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mono_render, bench_poly_render);
criterion_main!(benches);
