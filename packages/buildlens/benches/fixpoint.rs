//! Benchmarks for fact generation and fixpoint evaluation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use buildlens::datalog::{generate_facts, parse_program, Engine};
use buildlens::TraceEvent;

fn synthetic_events(n: usize) -> Vec<TraceEvent> {
    (0..n)
        .map(|i| {
            let mut event = TraceEvent {
                name: format!("Action{}", i),
                cat: "action processing".to_string(),
                ts: (i as f64) * 100.0,
                dur: 50.0 + (i % 17) as f64 * 25.0,
                ..Default::default()
            };
            event
                .args
                .insert("target".to_string(), json!(format!("//pkg:{}", i % 50)));
            event
                .args
                .insert("mnemonic".to_string(), json!("CppCompile"));
            event
        })
        .collect()
}

fn bench_generate_facts(c: &mut Criterion) {
    let events = synthetic_events(1000);
    c.bench_function("generate_facts_1000", |b| {
        b.iter(|| black_box(generate_facts(black_box(&events))))
    });
}

fn bench_fixpoint(c: &mut Criterion) {
    let events = synthetic_events(500);
    let program = parse_program(
        "slow_target(?T, ?D, ?P) :- target_time(?T, ?D), total_duration(?Total),
             ?Total > 0, ?P = (?D * 100) / ?Total, ?P >= 1.
         busy(?C) :- aggregate(count, is_actionable(?E), ?C).",
    )
    .unwrap();

    c.bench_function("fixpoint_500_events", |b| {
        b.iter(|| {
            let mut engine = Engine::new();
            engine.register_formatting_builtins();
            engine.add_facts(generate_facts(&events));
            engine.load_program(&program);
            engine.evaluate().unwrap();
            black_box(engine.fact_count())
        })
    });
}

criterion_group!(benches, bench_generate_facts, bench_fixpoint);
criterion_main!(benches);
