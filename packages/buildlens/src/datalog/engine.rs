//! Bottom-up evaluator
//!
//! Stores facts indexed by predicate and derivation rules in source
//! order, then iterates all rules to fixpoint. Body clauses thread a
//! list of candidate bindings left to right; each clause expands each
//! candidate into zero or more extended candidates.
//!
//! Negation as failure sees only facts derived so far, so rule order
//! matters: rule authors must place producers before consumers
//! (stratified negation by convention, not by analysis).

use std::collections::{HashMap, HashSet};

use crate::error::EvalError;

use super::builtins::BuiltinFn;
use super::types::{
    AggOp, ArithOp, Atom, Bindings, Clause, CmpOp, Expr, Fact, Program, Rule, SuggestionRule,
    Term, Value,
};

pub struct Engine {
    /// predicate → facts, in insertion order
    facts: HashMap<String, Vec<Fact>>,
    /// predicate → canonical argument-tuple keys, for O(1) duplicate
    /// detection during derivation
    seen: HashMap<String, HashSet<String>>,
    rules: Vec<Rule>,
    builtins: HashMap<String, BuiltinFn>,
}

impl Engine {
    pub fn new() -> Self {
        let mut engine = Engine {
            facts: HashMap::new(),
            seen: HashMap::new(),
            rules: Vec::new(),
            builtins: HashMap::new(),
        };
        engine.register_default_builtins();
        engine
    }

    pub fn register_builtin<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.builtins.insert(name.to_string(), Box::new(f));
    }

    /// Appends a fact. Direct insertion does not filter duplicates;
    /// only derivation does.
    pub fn add_fact(&mut self, fact: Fact) {
        self.seen
            .entry(fact.predicate.clone())
            .or_default()
            .insert(fact.key());
        self.facts
            .entry(fact.predicate.clone())
            .or_default()
            .push(fact);
    }

    pub fn add_facts(&mut self, facts: Vec<Fact>) {
        for fact in facts {
            self.add_fact(fact);
        }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn add_rules(&mut self, rules: Vec<Rule>) {
        self.rules.extend(rules);
    }

    /// Loads the derivation rules of a parsed program.
    pub fn load_program(&mut self, program: &Program) {
        self.add_rules(program.rules.clone());
    }

    pub fn get_facts(&self, predicate: &str) -> &[Fact] {
        self.facts.get(predicate).map_or(&[], Vec::as_slice)
    }

    pub fn fact_count(&self) -> usize {
        self.facts.values().map(Vec::len).sum()
    }

    pub fn predicate_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.facts.keys().cloned().collect();
        names.sort();
        names
    }

    fn fact_exists(&self, fact: &Fact) -> bool {
        self.seen
            .get(&fact.predicate)
            .is_some_and(|keys| keys.contains(&fact.key()))
    }

    /// Runs all derivation rules to fixpoint. The fact store only
    /// grows; each distinct tuple is added at most once, so the loop
    /// terminates on range-restricted rule sets.
    pub fn evaluate(&mut self) -> Result<(), EvalError> {
        loop {
            let mut new_facts = 0;

            for i in 0..self.rules.len() {
                let rule = self.rules[i].clone();
                let derived = self.evaluate_rule(&rule)?;
                for fact in derived {
                    if !self.fact_exists(&fact) {
                        self.add_fact(fact);
                        new_facts += 1;
                    }
                }
            }

            if new_facts == 0 {
                return Ok(());
            }
        }
    }

    fn evaluate_rule(&self, rule: &Rule) -> Result<Vec<Fact>, EvalError> {
        let bindings = self.evaluate_body(rule.body(), vec![Bindings::new()])?;

        let mut facts = Vec::new();
        for b in &bindings {
            // A head with unresolved variables silently drops the fact
            if let Ok(fact) = self.instantiate_atom(rule.head(), b) {
                facts.push(fact);
            }
        }
        Ok(facts)
    }

    /// Evaluates a suggestion rule's conditions against the current
    /// fact store and returns every satisfying binding set.
    pub fn evaluate_suggestion_rule(
        &self,
        rule: &SuggestionRule,
    ) -> Result<Vec<Bindings>, EvalError> {
        self.evaluate_body(&rule.conditions, vec![Bindings::new()])
    }

    /// All binding sets satisfying an atom against the fact store.
    pub fn query(&self, atom: &Atom) -> Vec<Bindings> {
        self.evaluate_atom(atom, &Bindings::new())
    }

    /// First binding set satisfying an atom, if any.
    pub fn query_one(&self, atom: &Atom) -> Option<Bindings> {
        self.query(atom).into_iter().next()
    }

    fn evaluate_body(
        &self,
        clauses: &[Clause],
        seeds: Vec<Bindings>,
    ) -> Result<Vec<Bindings>, EvalError> {
        let mut current = seeds;

        for clause in clauses {
            let mut next = Vec::new();
            for bindings in &current {
                next.extend(self.evaluate_clause(clause, bindings)?);
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }

        Ok(current)
    }

    fn evaluate_clause(
        &self,
        clause: &Clause,
        bindings: &Bindings,
    ) -> Result<Vec<Bindings>, EvalError> {
        match clause {
            Clause::Atom(atom) => Ok(self.evaluate_atom(atom, bindings)),
            Clause::Comparison { left, op, right } => {
                // Unresolvable terms mean no match, not an error
                let (left, right) = match (
                    self.resolve_term(left, bindings),
                    self.resolve_term(right, bindings),
                ) {
                    (Ok(l), Ok(r)) => (l, r),
                    _ => return Ok(vec![]),
                };
                if compare_values(&left, &right, *op) {
                    Ok(vec![bindings.clone()])
                } else {
                    Ok(vec![])
                }
            }
            Clause::Assign { var, expr } => match self.evaluate_expr(expr, bindings) {
                Ok(value) => {
                    let mut extended = bindings.clone();
                    extended.set(var.clone(), value);
                    Ok(vec![extended])
                }
                Err(e) if e.is_fatal() => Err(e),
                Err(_) => Ok(vec![]),
            },
            Clause::Aggregate {
                op,
                var,
                body,
                into,
            } => self.evaluate_aggregation(*op, var.as_deref(), body, into, bindings),
            Clause::Not(atom) => {
                if self.evaluate_atom(atom, bindings).is_empty() {
                    Ok(vec![bindings.clone()])
                } else {
                    Ok(vec![])
                }
            }
        }
    }

    fn evaluate_atom(&self, atom: &Atom, bindings: &Bindings) -> Vec<Bindings> {
        let facts = match self.facts.get(atom.predicate()) {
            Some(facts) => facts,
            None => return vec![],
        };

        let mut result = Vec::new();
        'facts: for fact in facts {
            if fact.args.len() != atom.arity() {
                continue;
            }

            let mut extended = bindings.clone();
            for (term, value) in atom.args().iter().zip(&fact.args) {
                match term {
                    Term::Var(name) => match extended.get(name) {
                        Some(bound) => {
                            if !bound.loose_eq(value) {
                                continue 'facts;
                            }
                        }
                        None => extended.set(name.clone(), value.clone()),
                    },
                    Term::Const(constant) => {
                        if !constant.loose_eq(value) {
                            continue 'facts;
                        }
                    }
                    Term::Wildcard => {}
                }
            }
            result.push(extended);
        }

        result
    }

    fn evaluate_aggregation(
        &self,
        op: AggOp,
        var: Option<&str>,
        body: &[Clause],
        into: &str,
        bindings: &Bindings,
    ) -> Result<Vec<Bindings>, EvalError> {
        let rows = self.evaluate_body(body, vec![bindings.clone()])?;

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            if op == AggOp::Count {
                values.push(1.0);
                continue;
            }
            // Rows where the variable is unbound or non-numeric are skipped
            let value = match var.and_then(|v| row.get(v)) {
                Some(value) => value,
                None => continue,
            };
            match value.as_f64() {
                Some(n) => values.push(n),
                None => continue,
            }
        }

        let result = match op {
            AggOp::Count => values.len() as f64,
            AggOp::Sum => values.iter().sum(),
            AggOp::Max => match values.iter().copied().reduce(f64::max) {
                Some(max) => max,
                None => return Ok(vec![]),
            },
            AggOp::Min => match values.iter().copied().reduce(f64::min) {
                Some(min) => min,
                None => return Ok(vec![]),
            },
            AggOp::Avg => {
                if values.is_empty() {
                    return Ok(vec![]);
                }
                values.iter().sum::<f64>() / values.len() as f64
            }
        };

        let mut extended = bindings.clone();
        extended.set(into.to_string(), Value::Float(result));
        Ok(vec![extended])
    }

    fn evaluate_expr(&self, expr: &Expr, bindings: &Bindings) -> Result<Value, EvalError> {
        match expr {
            Expr::Term(term) => self.resolve_term(term, bindings),
            Expr::Binary { left, op, right } => {
                let left = self.evaluate_expr(left, bindings)?;
                let right = self.evaluate_expr(right, bindings)?;
                let left = left
                    .as_f64()
                    .ok_or_else(|| EvalError::NotNumeric(left.canonical()))?;
                let right = right
                    .as_f64()
                    .ok_or_else(|| EvalError::NotNumeric(right.canonical()))?;
                let result = match op {
                    ArithOp::Add => left + right,
                    ArithOp::Sub => left - right,
                    ArithOp::Mul => left * right,
                    ArithOp::Div => {
                        if right == 0.0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        left / right
                    }
                    ArithOp::Mod => left % right,
                };
                Ok(Value::Float(result))
            }
            Expr::Call { name, args } => {
                let f = self
                    .builtins
                    .get(name)
                    .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate_expr(arg, bindings)?);
                }
                f(&values)
            }
        }
    }

    fn resolve_term(&self, term: &Term, bindings: &Bindings) -> Result<Value, EvalError> {
        match term {
            Term::Var(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Term::Const(value) => Ok(value.clone()),
            Term::Wildcard => Err(EvalError::Wildcard),
        }
    }

    fn instantiate_atom(&self, atom: &Atom, bindings: &Bindings) -> Result<Fact, EvalError> {
        let mut args = Vec::with_capacity(atom.arity());
        for term in atom.args() {
            args.push(self.resolve_term(term, bindings)?);
        }
        Ok(Fact::new(atom.predicate(), args))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

/// Numeric comparison when both sides convert, lexicographic string
/// comparison otherwise.
pub(crate) fn compare_values(left: &Value, right: &Value, op: CmpOp) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            CmpOp::Eq => l == r,
            CmpOp::Neq => l != r,
            CmpOp::Lt => l < r,
            CmpOp::Lte => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Gte => l >= r,
        };
    }

    let l = left.canonical();
    let r = right.canonical();
    match op {
        CmpOp::Eq => l == r,
        CmpOp::Neq => l != r,
        CmpOp::Lt => l < r,
        CmpOp::Lte => l <= r,
        CmpOp::Gt => l > r,
        CmpOp::Gte => l >= r,
    }
}
