//! Engine throughput benchmarks.
//!
//! One tick must comfortably fit in the 48 kHz sample budget (about 20.8 µs,
//! minus whatever the audio backend burns). These benchmarks time individual
//! units and whole patches, per tick and per rendered second.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rackline::prelude::*;

/// The sequenced bass patch from the examples.
fn sequenced_rack() -> Rack {
    let mut rack = Rack::new();

    let clock = rack.register("clock", Vco::new(1.0));
    let seq = rack.register("seq", Sequencer::new(["C2", "D2", "Bb1", "F1"]).unwrap());
    let vco = rack.register("vco", Vco::new(0.0));
    let vcf = rack.register("vcf", Svf::new(0.0, 3.0));
    let vca = rack.register("vca", Vca::new(2000.0));
    let env = rack.register("env", Envelope::new(0.1, 1.0, 0.1));
    let speaker = rack.register("speaker", Speaker::new(rack.bus()));

    rack.wire(clock.out("square"), seq.in_("clock")).unwrap();
    rack.wire(seq.out("gate"), env.in_("gate")).unwrap();
    rack.wire(seq.out("frequency"), vco.in_("frequency")).unwrap();
    rack.wire(env.out("amplitude"), vca.in_("audio")).unwrap();
    rack.wire(vca.out("audio"), vcf.in_("cutoff")).unwrap();
    rack.wire(vco.out("sawtooth"), vcf.in_("audio")).unwrap();
    rack.wire(vcf.out("lowpass"), speaker.in_("left")).unwrap();
    rack.wire(vcf.out("lowpass"), speaker.in_("right")).unwrap();

    rack
}

fn bench_vco(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/vco");
    group.throughput(Throughput::Elements(1));
    group.bench_function("update", |b| {
        let mut vco = Vco::new(440.0);
        let inputs = [440.0];
        let mut outputs = [0.0; 4];
        b.iter(|| {
            vco.update(black_box(&inputs), &mut outputs);
            outputs[0]
        });
    });
    group.finish();
}

fn bench_svf(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/svf");
    group.throughput(Throughput::Elements(1));
    group.bench_function("update", |b| {
        let mut svf = Svf::new(1000.0, 3.0);
        let inputs = [1.0, 1000.0, 3.0];
        let mut outputs = [0.0; 3];
        b.iter(|| {
            svf.update(black_box(&inputs), &mut outputs);
            outputs[0]
        });
    });
    group.finish();
}

fn bench_rack_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("rack");
    group.throughput(Throughput::Elements(1));
    group.bench_function("step", |b| {
        let mut rack = sequenced_rack();
        b.iter(|| {
            rack.step();
        });
    });
    group.finish();
}

fn bench_rack_second(c: &mut Criterion) {
    let frames = SAMPLE_RATE as usize;
    let mut group = c.benchmark_group("rack");
    group.throughput(Throughput::Elements(frames as u64));
    group.bench_function("one_second", |b| {
        let mut rack = sequenced_rack();
        b.iter(|| {
            for _ in 0..frames {
                black_box(rack.frame());
            }
        });
    });
    group.finish();
}

fn bench_translator_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("midi");
    group.throughput(Throughput::Elements(1));
    group.bench_function("idle_update", |b| {
        let (_tx, rx) = crossbeam_channel::unbounded::<MidiEvent>();
        let mut midi = MidiInput::new(rx);
        let mut outputs = vec![0.0; midi.spec().outputs.len()];
        b.iter(|| {
            midi.update(&[], &mut outputs);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_vco,
    bench_svf,
    bench_rack_step,
    bench_rack_second,
    bench_translator_drain,
);
criterion_main!(benches);
