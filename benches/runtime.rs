//! Benchmarks for the cinder runtime
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cinder::{batch, computed, effect, html, render, signal, Value};

// =============================================================================
// SIGNAL BENCHMARKS
// =============================================================================

fn bench_signal_create(c: &mut Criterion) {
    c.bench_function("signal_create", |b| b.iter(|| black_box(signal(0i32))));
}

fn bench_signal_get(c: &mut Criterion) {
    let s = signal(42i32);
    c.bench_function("signal_get", |b| b.iter(|| black_box(s.get())));
}

fn bench_signal_set(c: &mut Criterion) {
    let s = signal(0i32);
    c.bench_function("signal_set", |b| b.iter(|| s.set(black_box(42))));
}

fn bench_signal_set_same_value(c: &mut Criterion) {
    let s = signal(42i32);
    c.bench_function("signal_set_same_value", |b| b.iter(|| s.set(black_box(42))));
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_get_cached(c: &mut Criterion) {
    let s = signal(42i32);
    let s_clone = s.clone();
    let d = computed(move || s_clone.get() * 2);
    let _ = d.get();

    c.bench_function("computed_get_cached", |b| b.iter(|| black_box(d.get())));
}

fn bench_computed_get_dirty(c: &mut Criterion) {
    let s = signal(0i32);
    let s_clone = s.clone();
    let d = computed(move || s_clone.get() * 2);

    let mut i = 0i32;
    c.bench_function("computed_get_dirty", |b| {
        b.iter(|| {
            s.set(i);
            i += 1;
            black_box(d.get())
        })
    });
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1, 5, 10, 20] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let s = signal(1i32);

            let mut current = {
                let s = s.clone();
                computed(move || s.get() + 1)
            };
            for _ in 1..depth {
                let prev = current.clone();
                current = computed(move || prev.get() + 1);
            }

            let mut i = 0i32;
            b.iter(|| {
                s.set(black_box(i));
                i += 1;
                black_box(current.get())
            })
        });
    }

    group.finish();
}

// =============================================================================
// EFFECT BENCHMARKS
// =============================================================================

fn bench_effect_trigger(c: &mut Criterion) {
    let s = signal(0i32);
    let s_clone = s.clone();
    let _e = effect(move || {
        black_box(s_clone.get());
    });

    let mut i = 0i32;
    c.bench_function("effect_trigger", |b| {
        b.iter(|| {
            s.set(i);
            i += 1;
        })
    });
}

fn bench_batch_updates(c: &mut Criterion) {
    let s = signal(0i32);
    let s_clone = s.clone();
    let _e = effect(move || {
        black_box(s_clone.get());
    });

    c.bench_function("batch_10_updates", |b| {
        b.iter(|| {
            batch(|| {
                for i in 0..10 {
                    s.set(black_box(i));
                }
            })
        })
    });
}

fn bench_many_effects(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_effects");

    for count in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("trigger", count), &count, |b, &count| {
            let s = signal(0i32);

            let effects: Vec<_> = (0..count)
                .map(|_| {
                    let s = s.clone();
                    effect(move || {
                        black_box(s.get());
                    })
                })
                .collect();

            let mut i = 0i32;
            b.iter(|| {
                s.set(i);
                i += 1;
            });

            drop(effects);
        });
    }

    group.finish();
}

// =============================================================================
// TEMPLATE BENCHMARKS
// =============================================================================

fn bench_template_cached_build(c: &mut Criterion) {
    c.bench_function("template_cached_build", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            black_box(html!("<div><span>" {i} "</span></div>"))
        })
    });
}

fn bench_template_render(c: &mut Criterion) {
    c.bench_function("template_render", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            let tpl = html!("<div class=\"" {"row"} "\"><span>" {i} "</span></div>");
            black_box(render(&tpl).unwrap())
        })
    });
}

fn bench_reactive_slot_update(c: &mut Criterion) {
    let count = signal(0i64);
    let count_clone = count.clone();
    let tpl = html!("<p>" {Value::getter(move || Value::Int(count_clone.get()))} "</p>");
    let _instance = render(&tpl).unwrap();

    let mut i = 0i64;
    c.bench_function("reactive_slot_update", |b| {
        b.iter(|| {
            count.set(i);
            i += 1;
        })
    });
}

// =============================================================================
// LIST RECONCILIATION BENCHMARKS
// =============================================================================

fn keyed_rows(order: &[usize]) -> Value {
    Value::List(
        order
            .iter()
            .map(|n| {
                Value::Tpl(html!("<li key=\"" {*n} "\">" {*n} "</li>"))
            })
            .collect(),
    )
}

fn bench_list_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_reconcile");

    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("swap_ends", size), &size, |b, &size| {
            let order = signal((0..size).collect::<Vec<_>>());
            let order_clone = order.clone();
            let tpl = html!(
                "<ul>"
                {Value::getter(move || keyed_rows(&order_clone.get()))}
                "</ul>"
            );
            let _instance = render(&tpl).unwrap();

            let mut flipped = false;
            b.iter(|| {
                let mut next: Vec<usize> = (0..size).collect();
                if !flipped {
                    next.swap(0, size - 1);
                }
                flipped = !flipped;
                order.set(next);
            })
        });
    }

    group.finish();
}

// =============================================================================
// CRITERION SETUP
// =============================================================================

criterion_group!(
    signal_benches,
    bench_signal_create,
    bench_signal_get,
    bench_signal_set,
    bench_signal_set_same_value,
);

criterion_group!(
    computed_benches,
    bench_computed_get_cached,
    bench_computed_get_dirty,
    bench_computed_chain,
);

criterion_group!(
    effect_benches,
    bench_effect_trigger,
    bench_batch_updates,
    bench_many_effects,
);

criterion_group!(
    render_benches,
    bench_template_cached_build,
    bench_template_render,
    bench_reactive_slot_update,
    bench_list_swap,
);

criterion_main!(signal_benches, computed_benches, effect_benches, render_benches);
