//! Suggestion rule evaluation
//!
//! Loads rule files (the embedded built-in set plus an optional
//! external directory), drives fact generation and the fixpoint, then
//! evaluates each suggestion rule's conditions and renders its
//! template once per satisfying binding. Results are ordered by
//! impact and deduplicated by (rule id, target).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::datalog::{
    format_duration, generate_event_percent_facts, generate_facts, parse_program, Bindings,
    Engine, MetricValue, Program, SuggestionRule, Value,
};
use crate::error::{Error, Result};
use crate::trace::TraceEvent;

/// Rule files compiled into the binary. Order matters: derivation
/// rules load in file order, and negation sees only facts already
/// derived.
pub(crate) const BUILTIN_RULES: &[(&str, &str)] = &[
    (
        "builtin/overview.dl",
        include_str!("../../rules/builtin/overview.dl"),
    ),
    (
        "builtin/slow_targets.dl",
        include_str!("../../rules/builtin/slow_targets.dl"),
    ),
    (
        "builtin/slow_mnemonics.dl",
        include_str!("../../rules/builtin/slow_mnemonics.dl"),
    ),
    (
        "builtin/critical_path.dl",
        include_str!("../../rules/builtin/critical_path.dl"),
    ),
    (
        "builtin/concurrency.dl",
        include_str!("../../rules/builtin/concurrency.dl"),
    ),
    (
        "builtin/bottlenecks.dl",
        include_str!("../../rules/builtin/bottlenecks.dl"),
    ),
];

/// A rendered piece of optimisation advice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub rule_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub impact: String,
    pub title: String,
    pub body: String,
    pub target: String,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub label: String,
    pub value: String,
}

/// Ordered suggestions plus evaluation diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsResult {
    pub suggestions: Vec<Suggestion>,
    pub rules_evaluated: usize,
    pub facts_generated: usize,
    pub evaluation_time_ms: u64,
}

pub struct SuggestionEvaluator {
    engine: Engine,
    program: Program,
    rules_dir: Option<PathBuf>,
}

impl SuggestionEvaluator {
    /// Creates an evaluator. `rules_dir` optionally points at a
    /// directory of additional `*.dl` files loaded after the embedded
    /// set.
    pub fn new(rules_dir: Option<PathBuf>) -> Self {
        let mut engine = Engine::new();
        engine.register_formatting_builtins();
        SuggestionEvaluator {
            engine,
            program: Program::default(),
            rules_dir,
        }
    }

    /// Read-only view of the engine's fact store, for callers that
    /// want to inspect or query facts after an evaluation.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Loads embedded and external rule files. A file that fails to
    /// lex or parse is reported as a warning and skipped; the
    /// remaining files still load.
    pub fn load_rules(&mut self) -> Result<()> {
        for (name, source) in BUILTIN_RULES {
            match parse_program(source) {
                Ok(program) => self.program.extend(program),
                Err(e) => tracing::warn!("skipping embedded rule file {name}: {e}"),
            }
        }

        if let Some(dir) = self.rules_dir.clone() {
            self.load_external_rules(&dir)?;
        }

        self.engine.load_program(&self.program);
        Ok(())
    }

    /// Loads `*.dl` files from an external directory in name order.
    /// Per-file I/O or parse failures warn and continue; an unreadable
    /// directory is an error.
    fn load_external_rules(&mut self, dir: &Path) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| Error::RuleLoad {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "dl"))
            .collect();
        paths.sort();

        for path in paths {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    let err = Error::RuleLoad {
                        path: path.clone(),
                        message: e.to_string(),
                    };
                    tracing::warn!("{err}");
                    continue;
                }
            };
            match parse_program(&text) {
                Ok(program) => self.program.extend(program),
                Err(e) => {
                    let err = Error::RuleLoad {
                        path: path.clone(),
                        message: e.to_string(),
                    };
                    tracing::warn!("{err}");
                }
            }
        }

        Ok(())
    }

    /// Evaluates all loaded rules against a sequence of trace events.
    ///
    /// Division by zero in a derivation rule is fatal; a suggestion
    /// rule that raises any error is skipped and contributes nothing.
    pub fn evaluate(&mut self, events: &[TraceEvent]) -> Result<SuggestionsResult> {
        let start = Instant::now();

        let facts = generate_facts(events);
        let total_duration = facts
            .iter()
            .find(|f| f.predicate == "total_duration")
            .and_then(|f| f.args.first())
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        self.engine.add_facts(facts);
        self.engine
            .add_facts(generate_event_percent_facts(events, total_duration));

        self.engine.evaluate()?;

        let mut suggestions = Vec::new();
        let mut seq = 0usize;
        for rule in &self.program.suggestion_rules {
            let bindings = match self.engine.evaluate_suggestion_rule(rule) {
                Ok(bindings) => bindings,
                Err(e) => {
                    tracing::warn!("suggestion rule {} failed: {e}", rule.id);
                    continue;
                }
            };
            for b in &bindings {
                seq += 1;
                suggestions.push(render_suggestion(rule, b, seq));
            }
        }

        // Stable sort keeps source order within an impact group
        suggestions.sort_by_key(|s| impact_order(&s.impact));
        let suggestions = deduplicate(suggestions);

        Ok(SuggestionsResult {
            suggestions,
            rules_evaluated: self.program.suggestion_rules.len(),
            facts_generated: self.engine.fact_count(),
            evaluation_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn render_suggestion(rule: &SuggestionRule, bindings: &Bindings, seq: usize) -> Suggestion {
    let template = &rule.template;
    Suggestion {
        id: format!("{}-{}", rule.id, seq),
        rule_id: rule.id.clone(),
        kind: template.kind.clone(),
        impact: template.impact.clone(),
        title: render_template(&template.title, bindings),
        body: render_template(&template.body, bindings),
        target: render_template(&template.target, bindings),
        metrics: template
            .metrics
            .iter()
            .map(|m| Metric {
                label: render_template(&m.label, bindings),
                value: render_metric_value(m.value.as_str(), bindings),
            })
            .collect(),
    }
}

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\??\w+)\}").unwrap());
static BARE_VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\?\w+$").unwrap());
static FORMAT_TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"format_time\((\?\w+)\)").unwrap());

/// Replaces `{Name}` / `{?Name}` placeholders with bound values.
/// Unbound placeholders stay verbatim. A template that is exactly a
/// bare `?Name` renders as the bound value.
fn render_template(template: &str, bindings: &Bindings) -> String {
    let replaced = PLACEHOLDER_RE.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        let key = if name.starts_with('?') {
            name.to_string()
        } else {
            format!("?{name}")
        };
        match bindings.get(&key) {
            Some(value) => format_value(value),
            None => caps[0].to_string(),
        }
    });

    let result = replaced.into_owned();
    if BARE_VAR_RE.is_match(&result) {
        if let Some(value) = bindings.get(&result) {
            return format_value(value);
        }
    }
    result
}

/// Metric values support `format_time(?Var)` on a bound numeric value
/// and bare `?Var` references; everything else renders as a template.
fn render_metric_value(value: &str, bindings: &Bindings) -> String {
    if value.starts_with("format_time(") {
        if let Some(caps) = FORMAT_TIME_RE.captures(value) {
            if let Some(us) = bindings.get(&caps[1]).and_then(Value::as_f64) {
                return format_duration(us);
            }
        }
    }

    if value.starts_with('?') {
        if let Some(bound) = bindings.get(value) {
            return format_value(bound);
        }
    }

    render_template(value, bindings)
}

/// Floats with a zero fractional part display as integers, other
/// floats to one decimal; everything else prints naturally.
fn format_value(value: &Value) -> String {
    match value {
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
        Value::Float(f) => format!("{f:.1}"),
        other => other.canonical(),
    }
}

fn impact_order(impact: &str) -> u8 {
    match impact {
        "high" => 0,
        "medium" => 1,
        "low" => 2,
        _ => 3,
    }
}

/// Keeps the first suggestion for each (rule id, target) pair.
fn deduplicate(suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    suggestions
        .into_iter()
        .filter(|s| seen.insert((s.rule_id.clone(), s.target.clone())))
        .collect()
}
