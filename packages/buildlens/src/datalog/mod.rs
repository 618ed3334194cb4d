//! Rule language and evaluation
//!
//! The pipeline: `lexer` and `parser` turn rule text into a
//! `Program`; `facts` lifts trace events into ground facts; `engine`
//! evaluates derivation rules to fixpoint and answers queries;
//! `builtins` provides the functions callable from rule expressions.

pub mod builtins;
pub mod engine;
pub mod facts;
pub mod lexer;
pub mod parser;
pub mod types;


pub use builtins::{format_duration, format_with_commas};
pub use engine::Engine;
pub use facts::{generate_event_percent_facts, generate_facts};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse_atom, parse_program};
pub use types::{
    AggOp, ArithOp, Atom, Bindings, Clause, CmpOp, Expr, Fact, MetricTemplate, MetricValue,
    Program, Rule, SuggestionRule, SuggestionTemplate, Term, Value,
};
