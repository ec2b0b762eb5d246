//! Benchmarks for the per-frame detection path

use chrono::{Local, TimeDelta, TimeZone};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use noisewatch::{frame_level_db, DisturbanceMachine, LoudnessSample};

fn level_estimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_level_db");

    let frame: Vec<f32> = (0..1024).map(|i| ((i as f32) * 0.05).sin() * 0.3).collect();
    group.bench_function("1024_samples", |b| {
        b.iter(|| frame_level_db(black_box(&frame)).unwrap())
    });

    let long: Vec<f32> = (0..8192).map(|i| ((i as f32) * 0.01).cos() * 0.8).collect();
    group.bench_function("8192_samples", |b| {
        b.iter(|| frame_level_db(black_box(&long)).unwrap())
    });

    group.finish();
}

fn machine_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe");
    let t0 = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    // One simulated hour of 23 ms frames alternating loud bursts and quiet spells
    let samples: Vec<LoudnessSample> = (0..156_000i64)
        .map(|i| {
            let level = if (i / 400) % 3 == 0 { -8.0 } else { -35.0 };
            LoudnessSample::new(level, t0 + TimeDelta::milliseconds(i * 23))
        })
        .collect();

    group.bench_function("one_hour_mixed", |b| {
        b.iter(|| {
            let mut machine = DisturbanceMachine::new(-18.0, TimeDelta::seconds(5), 18);
            let mut events = 0usize;
            for sample in &samples {
                if machine.observe(black_box(*sample)).is_some() {
                    events += 1;
                }
            }
            events
        })
    });

    group.finish();
}

criterion_group!(benches, level_estimation, machine_observe);
criterion_main!(benches);
