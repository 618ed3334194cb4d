//! Error types for rule loading and evaluation

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("lex error at {line}:{col}: {message}")]
    Lex {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("parse error at {line}:{col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("failed to load rules from {path}: {message}")]
    RuleLoad { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while evaluating rule bodies and expressions.
///
/// Only `DivisionByZero` is fatal to a fixpoint run; every other
/// variant drops the current candidate binding and evaluation
/// continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("unbound variable: {0}")]
    UnboundVariable(String),

    #[error("cannot convert {0} to a number")]
    NotNumeric(String),

    #[error("cannot resolve wildcard")]
    Wildcard,
}

impl EvalError {
    /// Whether this error aborts the whole evaluation instead of
    /// dropping the current candidate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::DivisionByZero)
    }
}
