//! Suggestion generation on top of the rule engine

pub mod evaluator;

pub use evaluator::{Metric, Suggestion, SuggestionEvaluator, SuggestionsResult};
