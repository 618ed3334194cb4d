//! Trace event input record
//!
//! The analysis core consumes complete duration events that a trace
//! decoder has already filtered (Chrome Trace Event format, `ph: "X"`
//! records with a strictly positive `dur`). Field names follow the
//! trace format so decoded events deserialize directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single complete duration event from a build profile.
///
/// `ts` and `dur` are microseconds. `args` carries the orchestrator's
/// per-event metadata; the fact builder looks for `target` (a build
/// label) and `mnemonic` (the action type) in it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    #[serde(default)]
    pub cat: String,
    pub ts: f64,
    #[serde(default)]
    pub dur: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<i64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub args: HashMap<String, serde_json::Value>,
}

impl TraceEvent {
    /// End time of the event (`ts + dur`).
    pub fn end(&self) -> f64 {
        self.ts + self.dur
    }

    /// The build label this event works on, if present and non-empty.
    pub fn target(&self) -> Option<&str> {
        match self.args.get("target").and_then(|v| v.as_str()) {
            Some("") | None => None,
            Some(t) => Some(t),
        }
    }

    /// The action mnemonic, if present as a string.
    pub fn mnemonic(&self) -> Option<&str> {
        self.args.get("mnemonic").and_then(|v| v.as_str())
    }

    /// Whether the event carries any `mnemonic` argument at all.
    ///
    /// Actionability only requires the key to be present; the value
    /// does not have to be a string.
    pub fn has_mnemonic_arg(&self) -> bool {
        self.args.get("mnemonic").is_some_and(|v| !v.is_null())
    }
}
