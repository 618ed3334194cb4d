//! Core types for the rule language
//!
//! Terms, atoms, clauses, expressions, rules, facts, and bindings.
//! Every type implements `Display` with a canonical form that the
//! parser accepts back, so a parse → print → parse round trip yields
//! a structurally equal program.

use std::collections::HashMap;
use std::fmt;

/// A ground value carried by facts, constants, and bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Canonical printed form, used for fallback equality, string
    /// comparisons, and duplicate-detection keys.
    pub fn canonical(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
        }
    }

    /// Equality as the engine sees it: numeric when both sides
    /// convert to a number, otherwise canonical string equality.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        self.canonical() == other.canonical()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Writes a value as source text: strings quoted and escaped, floats
/// with a forced decimal point so they re-parse as floats.
fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Str(s) => {
            f.write_str("\"")?;
            for ch in s.chars() {
                match ch {
                    '\\' => f.write_str("\\\\")?,
                    '"' => f.write_str("\\\"")?,
                    '\n' => f.write_str("\\n")?,
                    '\t' => f.write_str("\\t")?,
                    '\r' => f.write_str("\\r")?,
                    _ => write!(f, "{}", ch)?,
                }
            }
            f.write_str("\"")
        }
        Value::Int(i) => write!(f, "{}", i),
        Value::Float(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                write!(f, "{:.1}", v)
            } else {
                write!(f, "{}", v)
            }
        }
        Value::Bool(b) => write!(f, "{}", b),
    }
}

/// A term in a rule: variable (`?Name`), constant, or wildcard (`_`).
///
/// Variable names keep their leading `?`; bindings are keyed by the
/// same spelling.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Var(String),
    Const(Value),
    Wildcard,
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Term::Const(value.into())
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Term::Const(_))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Term::Wildcard)
    }

    pub fn var_name(&self) -> Option<&str> {
        match self {
            Term::Var(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name) => f.write_str(name),
            Term::Const(value) => write_literal(f, value),
            Term::Wildcard => f.write_str("_"),
        }
    }
}

/// A predicate applied to an ordered list of terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    predicate: String,
    args: Vec<Term>,
}

impl Atom {
    pub fn new(predicate: impl Into<String>, args: Vec<Term>) -> Self {
        Atom {
            predicate: predicate.into(),
            args,
        }
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    pub fn args(&self) -> &[Term] {
        &self.args
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Names of all variables appearing in the arguments.
    pub fn variables(&self) -> Vec<String> {
        self.args
            .iter()
            .filter_map(|t| t.var_name().map(str::to_string))
            .collect()
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|t| t.is_const())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "=",
            CmpOp::Neq => "!=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Count,
    Sum,
    Max,
    Min,
    Avg,
}

impl fmt::Display for AggOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggOp::Count => "count",
            AggOp::Sum => "sum",
            AggOp::Max => "max",
            AggOp::Min => "min",
            AggOp::Avg => "avg",
        })
    }
}

/// An arithmetic expression on the right-hand side of an assignment
/// or inside a function call.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Term(Term),
    Binary {
        left: Box<Expr>,
        op: ArithOp,
        right: Box<Expr>,
    },
    Call { name: String, args: Vec<Expr> },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Term(t) => write!(f, "{}", t),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A clause in a rule body.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Match facts for a predicate.
    Atom(Atom),
    /// Compare two resolved terms.
    Comparison { left: Term, op: CmpOp, right: Term },
    /// Bind a variable to the result of an expression.
    Assign { var: String, expr: Expr },
    /// Aggregate over a nested body. `var` is `None` for `count`.
    Aggregate {
        op: AggOp,
        var: Option<String>,
        body: Vec<Clause>,
        into: String,
    },
    /// Negation as failure.
    Not(Atom),
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Clause]) -> fmt::Result {
    for (i, clause) in body.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", clause)?;
    }
    Ok(())
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Atom(atom) => write!(f, "{}", atom),
            Clause::Comparison { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Clause::Assign { var, expr } => write!(f, "{} = {}", var, expr),
            Clause::Aggregate {
                op,
                var,
                body,
                into,
            } => {
                match var {
                    Some(v) => write!(f, "aggregate({}({}), ", op, v)?,
                    None => write!(f, "aggregate({}, ", op)?,
                }
                write_body(f, body)?;
                write!(f, ", {})", into)
            }
            Clause::Not(atom) => write!(f, "not {}", atom),
        }
    }
}

/// A derivation rule: `head :- body.` A rule with an empty body is a
/// fact.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    head: Atom,
    body: Vec<Clause>,
}

impl Rule {
    pub fn new(head: Atom, body: Vec<Clause>) -> Self {
        Rule { head, body }
    }

    pub fn fact(head: Atom) -> Self {
        Rule { head, body: vec![] }
    }

    pub fn head(&self) -> &Atom {
        &self.head
    }

    pub fn body(&self) -> &[Clause] {
        &self.body
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            f.write_str(" :- ")?;
            write_body(f, &self.body)?;
        }
        f.write_str(".")
    }
}

/// A ground fact: predicate plus argument values.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub predicate: String,
    pub args: Vec<Value>,
}

impl Fact {
    pub fn new(predicate: impl Into<String>, args: Vec<Value>) -> Self {
        Fact {
            predicate: predicate.into(),
            args,
        }
    }

    /// Canonical argument-tuple key for duplicate detection. Values
    /// that compare loosely equal produce the same key.
    pub fn key(&self) -> String {
        let mut key = String::new();
        for arg in &self.args {
            // Numbers canonicalize through f64 so 1 and 1.0 collide.
            match arg.as_f64() {
                Some(n) => key.push_str(&n.to_string()),
                None => key.push_str(&arg.canonical()),
            }
            key.push('\u{1}');
        }
        key
    }

    pub fn loose_eq(&self, other: &Fact) -> bool {
        self.predicate == other.predicate
            && self.args.len() == other.args.len()
            && self
                .args
                .iter()
                .zip(&other.args)
                .all(|(a, b)| a.loose_eq(b))
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_literal(f, arg)?;
        }
        f.write_str(")")
    }
}

/// Variable bindings accumulated while satisfying a rule body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    map: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, var: &str) -> Option<&Value> {
        self.map.get(var)
    }

    pub fn set(&mut self, var: impl Into<String>, value: Value) {
        self.map.insert(var.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }
}

/// Template value of a metric: either a literal string (may contain
/// `{Var}` placeholders) or the printed form of an expression such as
/// `format_time(?Dur)`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Text(String),
    Expr(String),
}

impl MetricValue {
    pub fn as_str(&self) -> &str {
        match self {
            MetricValue::Text(s) | MetricValue::Expr(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricTemplate {
    pub label: String,
    pub value: MetricValue,
}

/// Output template of a suggestion rule. `kind` and `impact` are bare
/// identifiers in rule source; the string fields may contain `{Var}`
/// placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionTemplate {
    pub kind: String,
    pub impact: String,
    pub title: String,
    pub body: String,
    pub target: String,
    pub metrics: Vec<MetricTemplate>,
}

/// A rule whose "head" is a rendered suggestion instead of a fact.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRule {
    pub id: String,
    pub conditions: Vec<Clause>,
    pub template: SuggestionTemplate,
}

impl fmt::Display for SuggestionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rule {} {{", self.id)?;
        f.write_str("    when: ")?;
        write_body(f, &self.conditions)?;
        writeln!(f, ".")?;
        write!(
            f,
            "    then: suggestion({}, {}, ",
            self.template.kind, self.template.impact
        )?;
        write_literal(f, &Value::Str(self.template.title.clone()))?;
        f.write_str(", ")?;
        write_literal(f, &Value::Str(self.template.body.clone()))?;
        if !self.template.target.is_empty() || !self.template.metrics.is_empty() {
            f.write_str(", ")?;
            if self.template.target.starts_with('?') {
                f.write_str(&self.template.target)?;
            } else {
                write_literal(f, &Value::Str(self.template.target.clone()))?;
            }
        }
        if !self.template.metrics.is_empty() {
            f.write_str(", [")?;
            for (i, m) in self.template.metrics.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str("[")?;
                write_literal(f, &Value::Str(m.label.clone()))?;
                f.write_str(", ")?;
                match &m.value {
                    MetricValue::Text(s) => write_literal(f, &Value::Str(s.clone()))?,
                    MetricValue::Expr(s) => f.write_str(s)?,
                }
                f.write_str("]")?;
            }
            f.write_str("]")?;
        }
        writeln!(f, ").")?;
        f.write_str("}")
    }
}

/// A parsed rule file: derivation rules plus suggestion rules, in
/// source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub rules: Vec<Rule>,
    pub suggestion_rules: Vec<SuggestionRule>,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.suggestion_rules.is_empty()
    }

    /// Appends another program's rules, preserving order.
    pub fn extend(&mut self, other: Program) {
        self.rules.extend(other.rules);
        self.suggestion_rules.extend(other.suggestion_rules);
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        for rule in &self.suggestion_rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}
