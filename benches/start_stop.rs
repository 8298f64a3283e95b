//! Measures the cost of the `start`/`stop` hot path in isolation, in line
//! with the purpose statement's hundreds-of-nanoseconds overhead budget.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use perfregion::Control;

fn flat_start_stop(c: &mut Criterion) {
    let control = Control::new();
    control.initialize().unwrap();

    c.bench_function("start_stop_flat", |b| {
        b.iter(|| {
            control.start(black_box("bench_region")).unwrap();
            control.stop(black_box("bench_region")).unwrap();
        })
    });
}

fn nested_start_stop(c: &mut Criterion) {
    let control = Control::new();
    control.initialize().unwrap();

    c.bench_function("start_stop_nested_3", |b| {
        b.iter(|| {
            control.start("outer").unwrap();
            control.start("middle").unwrap();
            control.start("inner").unwrap();
            control.stop("inner").unwrap();
            control.stop("middle").unwrap();
            control.stop("outer").unwrap();
        })
    });
}

fn handle_start_stop(c: &mut Criterion) {
    let control = Control::new();
    control.initialize().unwrap();
    let handle = perfregion::Handle::new();

    c.bench_function("start_stop_handle", |b| {
        b.iter(|| {
            control.start_handle(black_box("bench_region"), &handle).unwrap();
            control.stop_handle(&handle).unwrap();
        })
    });
}

criterion_group!(benches, flat_start_stop, nested_start_stop, handle_start_stop);
criterion_main!(benches);
