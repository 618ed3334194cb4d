//! buildlens: rule-driven analysis of build profile traces
//!
//! The crate consumes complete duration events from a build profile
//! (Chrome Trace Event format, decoded by a collaborator) and emits
//! targeted optimisation advice. Analysis is expressed in a small
//! Datalog-like rule language: a fact builder lifts events into
//! relational facts, a bottom-up engine evaluates derivation rules to
//! fixpoint, and suggestion rules bind query results to human-facing
//! templates.
//!
//! ```no_run
//! use buildlens::{SuggestionEvaluator, TraceEvent};
//!
//! # fn main() -> buildlens::Result<()> {
//! let events: Vec<TraceEvent> = serde_json::from_str("[]")?;
//! let mut evaluator = SuggestionEvaluator::new(None);
//! evaluator.load_rules()?;
//! let result = evaluator.evaluate(&events)?;
//! for s in &result.suggestions {
//!     println!("[{}] {}", s.impact, s.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod datalog;
pub mod error;
pub mod suggestions;
pub mod trace;

pub use datalog::{parse_atom, parse_program, Engine, Fact, Program, Value};
pub use error::{Error, EvalError, Result};
pub use suggestions::{Metric, Suggestion, SuggestionEvaluator, SuggestionsResult};
pub use trace::TraceEvent;
