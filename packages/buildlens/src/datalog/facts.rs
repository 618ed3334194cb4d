//! Fact extraction from trace events
//!
//! Lifts an ordered sequence of trace events into ground facts: one
//! group of per-event facts keyed by event index, whole-build
//! aggregates, grouped aggregates per category / mnemonic / target,
//! and critical-path facts. Grouped aggregates are emitted in
//! ascending key order so the fact store is deterministic.

use std::collections::BTreeMap;

use crate::trace::TraceEvent;

use super::types::{Fact, Value};

/// Categories that represent user-controlled work.
fn is_actionable_category(cat: &str) -> bool {
    matches!(
        cat,
        "action processing"
            | "complete action execution"
            | "Fetching repository"
            | "package creation"
    )
}

/// Categories that represent build-system infrastructure.
fn is_system_category(cat: &str) -> bool {
    matches!(
        cat,
        "general information"
            | "build phase marker"
            | "gc notification"
            | "skyframe evaluator"
            | "action count (local)"
            | "critical path component"
            | "Conflict checking"
            | "bazel module processing"
    )
}

/// An event is actionable iff it has a target label, or it belongs to
/// an actionable category and carries a mnemonic.
fn is_actionable(event: &TraceEvent) -> bool {
    event.target().is_some()
        || (is_actionable_category(&event.cat) && event.has_mnemonic_arg())
}

/// Generates the full fact set for a sequence of trace events.
pub fn generate_facts(events: &[TraceEvent]) -> Vec<Fact> {
    let mut facts = Vec::with_capacity(events.len() * 4);

    let mut total_duration = 0.0;
    let mut max_end = 0.0f64;
    let mut actionable_time = 0.0;
    let mut actionable_count = 0usize;

    for (i, event) in events.iter().enumerate() {
        facts.push(Fact::new(
            "trace_event",
            vec![
                Value::from(i),
                Value::from(event.name.as_str()),
                Value::from(event.cat.as_str()),
                Value::from(event.ts),
                Value::from(event.dur),
            ],
        ));

        if let Some(tid) = event.tid {
            facts.push(Fact::new(
                "trace_event_tid",
                vec![Value::from(i), Value::from(tid)],
            ));
        }
        if let Some(pid) = event.pid {
            facts.push(Fact::new(
                "trace_event_pid",
                vec![Value::from(i), Value::from(pid)],
            ));
        }

        if let Some(mnemonic) = event.mnemonic() {
            facts.push(Fact::new(
                "trace_event_mnemonic",
                vec![Value::from(i), Value::from(mnemonic)],
            ));
        }

        if let Some(target) = event.target() {
            facts.push(Fact::new(
                "trace_event_target",
                vec![Value::from(i), Value::from(target)],
            ));
            facts.push(Fact::new("has_target", vec![Value::from(i)]));
        }

        if is_actionable(event) {
            facts.push(Fact::new("is_actionable", vec![Value::from(i)]));
            actionable_time += event.dur;
            actionable_count += 1;
        }

        if is_system_category(&event.cat) {
            facts.push(Fact::new("is_system", vec![Value::from(i)]));
        }

        max_end = max_end.max(event.end());
        total_duration += event.dur;
    }

    facts.push(Fact::new("total_duration", vec![Value::from(max_end)]));
    facts.push(Fact::new(
        "total_action_time",
        vec![Value::from(total_duration)],
    ));
    facts.push(Fact::new("total_actions", vec![Value::from(events.len())]));
    facts.push(Fact::new(
        "actionable_time",
        vec![Value::from(actionable_time)],
    ));
    facts.push(Fact::new(
        "actionable_count",
        vec![Value::from(actionable_count)],
    ));

    // Per-category aggregates
    let mut category_time: BTreeMap<&str, f64> = BTreeMap::new();
    let mut category_count: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        *category_time.entry(&event.cat).or_default() += event.dur;
        *category_count.entry(&event.cat).or_default() += 1;
    }
    for (cat, time) in &category_time {
        facts.push(Fact::new(
            "category_time",
            vec![Value::from(*cat), Value::from(*time)],
        ));
    }
    for (cat, count) in &category_count {
        facts.push(Fact::new(
            "category_count",
            vec![Value::from(*cat), Value::from(*count)],
        ));
    }

    // Per-mnemonic aggregates, restricted to events with a target so
    // infrastructure work does not pollute them
    let mut mnemonic_time: BTreeMap<&str, f64> = BTreeMap::new();
    let mut mnemonic_count: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        if let (Some(mnemonic), Some(_)) = (event.mnemonic(), event.target()) {
            *mnemonic_time.entry(mnemonic).or_default() += event.dur;
            *mnemonic_count.entry(mnemonic).or_default() += 1;
        }
    }
    for (mnemonic, time) in &mnemonic_time {
        facts.push(Fact::new(
            "mnemonic_time",
            vec![Value::from(*mnemonic), Value::from(*time)],
        ));
    }
    for (mnemonic, count) in &mnemonic_count {
        facts.push(Fact::new(
            "mnemonic_count",
            vec![Value::from(*mnemonic), Value::from(*count)],
        ));
    }

    // Per-target aggregates
    let mut target_time: BTreeMap<&str, f64> = BTreeMap::new();
    let mut target_count: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        if let Some(target) = event.target() {
            *target_time.entry(target).or_default() += event.dur;
            *target_count.entry(target).or_default() += 1;
        }
    }
    for (target, time) in &target_time {
        facts.push(Fact::new(
            "target_time",
            vec![Value::from(*target), Value::from(*time)],
        ));
    }
    for (target, count) in &target_count {
        facts.push(Fact::new(
            "target_count",
            vec![Value::from(*target), Value::from(*count)],
        ));
    }

    facts.push(Fact::new(
        "max_concurrency",
        vec![Value::from(compute_max_concurrency(events))],
    ));

    facts.extend(critical_path_facts(events));

    facts
}

/// Maximum number of events running at the same instant, computed by
/// a sweep over start/end points. Start points sort strictly before
/// end points at equal time.
fn compute_max_concurrency(events: &[TraceEvent]) -> usize {
    if events.is_empty() {
        return 0;
    }

    let mut points: Vec<(f64, bool)> = Vec::with_capacity(events.len() * 2);
    for event in events {
        points.push((event.ts, true));
        points.push((event.end(), false));
    }
    points.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.cmp(&a.1))
    });

    let mut max_concurrent = 0usize;
    let mut current = 0usize;
    for (_, is_start) in points {
        if is_start {
            current += 1;
            max_concurrent = max_concurrent.max(current);
        } else {
            current = current.saturating_sub(1);
        }
    }

    max_concurrent
}

/// Critical-path facts: the targeted event that finishes last, its
/// share of the wall clock, and the top five targeted events by
/// duration as potential bottlenecks.
fn critical_path_facts(events: &[TraceEvent]) -> Vec<Fact> {
    if events.is_empty() {
        return vec![];
    }

    let mut facts = Vec::new();

    let max_end = events.iter().map(TraceEvent::end).fold(0.0f64, f64::max);

    // Last-finishing event with a target is the critical path endpoint
    let mut endpoint: Option<(usize, &TraceEvent, &str)> = None;
    let mut endpoint_end = 0.0;
    for (i, event) in events.iter().enumerate() {
        if let Some(target) = event.target() {
            if event.end() > endpoint_end {
                endpoint_end = event.end();
                endpoint = Some((i, event, target));
            }
        }
    }

    if let Some((i, event, target)) = endpoint {
        facts.push(Fact::new(
            "critical_path_end",
            vec![
                Value::from(i),
                Value::from(event.name.as_str()),
                Value::from(event.dur),
                Value::from(target),
            ],
        ));
        if max_end > 0.0 {
            facts.push(Fact::new(
                "critical_path_percent",
                vec![Value::from((event.dur / max_end) * 100.0)],
            ));
        }
    }

    // Top five targeted events by duration; ties keep event order
    let mut targeted: Vec<(usize, &TraceEvent, &str)> = events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.target().map(|t| (i, e, t)))
        .collect();
    targeted.sort_by(|a, b| {
        b.1.dur
            .partial_cmp(&a.1.dur)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for (i, event, target) in targeted.into_iter().take(5) {
        let pct = if max_end > 0.0 {
            (event.dur / max_end) * 100.0
        } else {
            0.0
        };
        facts.push(Fact::new(
            "potential_bottleneck",
            vec![
                Value::from(i),
                Value::from(event.name.as_str()),
                Value::from(event.dur),
                Value::from(pct),
                Value::from(target),
            ],
        ));
    }

    facts
}

/// Per-event share of total build time, emitted only when the build
/// has a positive total duration.
pub fn generate_event_percent_facts(events: &[TraceEvent], total_duration: f64) -> Vec<Fact> {
    if total_duration <= 0.0 {
        return vec![];
    }

    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            Fact::new(
                "event_percent",
                vec![
                    Value::from(i),
                    Value::from((event.dur / total_duration) * 100.0),
                ],
            )
        })
        .collect()
}
