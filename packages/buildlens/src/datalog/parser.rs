//! Recursive-descent parser for rule files
//!
//! Each production consumes exactly the tokens it needs and reports
//! `expected X, got Y` with the position of the offending token.

use crate::error::Error;

use super::lexer::{tokenize, Token, TokenKind};
use super::types::{
    AggOp, ArithOp, Atom, Clause, CmpOp, Expr, MetricTemplate, MetricValue, Program, Rule,
    SuggestionRule, SuggestionTemplate, Term, Value,
};

/// Parses a complete rule file into a program.
pub fn parse_program(input: &str) -> Result<Program, Error> {
    let tokens = tokenize(input)?;
    Parser::new(tokens).parse_program()
}

/// Parses a single atom, e.g. `target_time(?T, ?D)`. Convenient for
/// building engine queries from text.
pub fn parse_atom(input: &str) -> Result<Atom, Error> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    let atom = parser.parse_atom()?;
    let tok = parser.peek();
    if tok.kind != TokenKind::Eof {
        return Err(parser.error_at(tok, "unexpected input after atom"));
    }
    Ok(atom)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_n(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> Error {
        Error::Parse {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, Error> {
        let token = self.peek();
        if token.kind != kind {
            return Err(self.error_at(
                token,
                format!("expected {}, got {}", kind, token.kind),
            ));
        }
        Ok(self.advance())
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            return true;
        }
        false
    }

    fn parse_program(&mut self) -> Result<Program, Error> {
        let mut program = Program::default();

        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Rule => program.suggestion_rules.push(self.parse_suggestion_rule()?),
                TokenKind::Ident => program.rules.push(self.parse_rule()?),
                _ => {
                    let tok = self.peek();
                    return Err(
                        self.error_at(tok, format!("unexpected token {}", tok.kind))
                    );
                }
            }
        }

        Ok(program)
    }

    fn parse_rule(&mut self) -> Result<Rule, Error> {
        let head = self.parse_atom()?;

        let body = if self.match_kind(TokenKind::Implies) {
            self.parse_body()?
        } else {
            vec![]
        };

        self.expect(TokenKind::Dot)?;
        Ok(Rule::new(head, body))
    }

    /// `rule name { when: body. then: suggestion(...). }`
    fn parse_suggestion_rule(&mut self) -> Result<SuggestionRule, Error> {
        self.expect(TokenKind::Rule)?;
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::LBrace)?;

        self.expect(TokenKind::When)?;
        self.expect(TokenKind::Colon)?;
        let conditions = self.parse_body()?;
        self.expect(TokenKind::Dot)?;

        self.expect(TokenKind::Then)?;
        self.expect(TokenKind::Colon)?;
        let template = self.parse_suggestion_template()?;
        self.expect(TokenKind::Dot)?;

        self.expect(TokenKind::RBrace)?;

        Ok(SuggestionRule {
            id: name.text,
            conditions,
            template,
        })
    }

    /// `suggestion(type, impact, title, body[, target[, metrics]])`
    fn parse_suggestion_template(&mut self) -> Result<SuggestionTemplate, Error> {
        self.expect(TokenKind::Suggestion)?;
        self.expect(TokenKind::LParen)?;

        let kind = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::Comma)?;
        let impact = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::Comma)?;
        let title = self.expect(TokenKind::Str)?;
        self.expect(TokenKind::Comma)?;
        let body = self.expect(TokenKind::Str)?;

        let mut template = SuggestionTemplate {
            kind: kind.text,
            impact: impact.text,
            title: title.text,
            body: body.text,
            target: String::new(),
            metrics: vec![],
        };

        if self.match_kind(TokenKind::Comma) {
            match self.peek().kind {
                TokenKind::Str | TokenKind::Variable => {
                    template.target = self.advance().text;
                }
                _ => {}
            }

            if self.match_kind(TokenKind::Comma) {
                template.metrics = self.parse_metrics_array()?;
            }
        }

        self.expect(TokenKind::RParen)?;
        Ok(template)
    }

    /// `[[label, value], ...]`. Each value is a string literal or an
    /// expression kept in its printed form.
    fn parse_metrics_array(&mut self) -> Result<Vec<MetricTemplate>, Error> {
        self.expect(TokenKind::LBracket)?;

        let mut metrics = Vec::new();
        while self.peek().kind != TokenKind::RBracket {
            self.expect(TokenKind::LBracket)?;

            let label = self.expect(TokenKind::Str)?;
            self.expect(TokenKind::Comma)?;

            let value = if self.peek().kind == TokenKind::Str {
                MetricValue::Text(self.advance().text)
            } else {
                MetricValue::Expr(self.parse_expression()?.to_string())
            };

            self.expect(TokenKind::RBracket)?;
            metrics.push(MetricTemplate {
                label: label.text,
                value,
            });

            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RBracket)?;
        Ok(metrics)
    }

    fn parse_body(&mut self) -> Result<Vec<Clause>, Error> {
        let mut clauses = Vec::new();
        loop {
            clauses.push(self.parse_clause()?);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        Ok(clauses)
    }

    fn parse_clause(&mut self) -> Result<Clause, Error> {
        if self.match_kind(TokenKind::Not) {
            return Ok(Clause::Not(self.parse_atom()?));
        }

        if self.peek().kind == TokenKind::Aggregate {
            return self.parse_aggregation();
        }

        if self.peek().kind == TokenKind::Variable {
            if self.peek_n(1).kind == TokenKind::Eq {
                return self.parse_assignment_or_comparison();
            }
            if comparison_op(self.peek_n(1).kind).is_some() {
                return self.parse_comparison();
            }
        }

        Ok(Clause::Atom(self.parse_atom()?))
    }

    /// `?V = rhs` is a comparison when the right-hand side is a bare
    /// term and an assignment when it is a compound expression.
    fn parse_assignment_or_comparison(&mut self) -> Result<Clause, Error> {
        let var = self.advance().text;
        self.advance(); // '='

        let expr = self.parse_expression()?;
        if let Expr::Term(term) = expr {
            return Ok(Clause::Comparison {
                left: Term::Var(var),
                op: CmpOp::Eq,
                right: term,
            });
        }

        Ok(Clause::Assign { var, expr })
    }

    fn parse_comparison(&mut self) -> Result<Clause, Error> {
        let left = self.parse_term()?;
        let op_token = self.advance();
        let op = match comparison_op(op_token.kind) {
            Some(op) => op,
            None => {
                return Err(self.error_at(
                    &op_token,
                    format!("expected comparison operator, got {}", op_token.kind),
                ))
            }
        };
        let right = self.parse_term()?;
        Ok(Clause::Comparison { left, op, right })
    }

    /// `aggregate(op(?V), body, ?Into)`. The `(?V)` part is optional
    /// for `count`.
    fn parse_aggregation(&mut self) -> Result<Clause, Error> {
        self.expect(TokenKind::Aggregate)?;
        self.expect(TokenKind::LParen)?;

        let op_token = self.advance();
        let op = match aggregate_op(&op_token) {
            Some(op) => op,
            None => {
                return Err(self.error_at(
                    &op_token,
                    format!("unknown aggregate operation: {}", op_token.text),
                ))
            }
        };

        let mut var = None;
        if op != AggOp::Count || self.peek().kind == TokenKind::LParen {
            self.expect(TokenKind::LParen)?;
            let var_token = self.expect(TokenKind::Variable)?;
            var = Some(var_token.text);
            self.expect(TokenKind::RParen)?;
        }

        self.expect(TokenKind::Comma)?;
        let body = self.parse_body()?;
        self.expect(TokenKind::Comma)?;

        let into = self.expect(TokenKind::Variable)?;
        self.expect(TokenKind::RParen)?;

        Ok(Clause::Aggregate {
            op,
            var: if op == AggOp::Count { None } else { var },
            body,
            into: into.text,
        })
    }

    fn parse_atom(&mut self) -> Result<Atom, Error> {
        let predicate = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::LParen)?;

        let mut args = Vec::new();
        while self.peek().kind != TokenKind::RParen {
            args.push(self.parse_term()?);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen)?;
        Ok(Atom::new(predicate.text, args))
    }

    fn parse_term(&mut self) -> Result<Term, Error> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Variable => {
                self.advance();
                Ok(Term::Var(token.text))
            }
            TokenKind::Wildcard => {
                self.advance();
                Ok(Term::Wildcard)
            }
            TokenKind::Str => {
                self.advance();
                Ok(Term::Const(Value::Str(token.text)))
            }
            TokenKind::Number => {
                self.advance();
                if let Ok(i) = token.text.parse::<i64>() {
                    return Ok(Term::Const(Value::Int(i)));
                }
                match token.text.parse::<f64>() {
                    Ok(f) => Ok(Term::Const(Value::Float(f))),
                    Err(_) => {
                        Err(self.error_at(&token, format!("invalid number: {}", token.text)))
                    }
                }
            }
            TokenKind::True => {
                self.advance();
                Ok(Term::Const(Value::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Term::Const(Value::Bool(false)))
            }
            // Bare identifiers are string constants
            TokenKind::Ident => {
                self.advance();
                Ok(Term::Const(Value::Str(token.text)))
            }
            _ => Err(self.error_at(
                &token,
                format!("expected term, got {}", token.kind),
            )),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, Error> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                TokenKind::Percent => ArithOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_primary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        if self.match_kind(TokenKind::LParen) {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::RParen)?;
            return Ok(expr);
        }

        // Function call. Aggregate keywords double as function names
        // here so `min(?A, ?B)` parses even though the lexer
        // keyword-izes `min`.
        if is_function_name(self.peek().kind) && self.peek_n(1).kind == TokenKind::LParen {
            return self.parse_function_call();
        }

        Ok(Expr::Term(self.parse_term()?))
    }

    fn parse_function_call(&mut self) -> Result<Expr, Error> {
        let name = self.advance();
        self.expect(TokenKind::LParen)?;

        let mut args = Vec::new();
        while self.peek().kind != TokenKind::RParen {
            args.push(self.parse_expression()?);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen)?;
        Ok(Expr::Call {
            name: name.text,
            args,
        })
    }
}

fn comparison_op(kind: TokenKind) -> Option<CmpOp> {
    Some(match kind {
        TokenKind::Eq => CmpOp::Eq,
        TokenKind::Neq => CmpOp::Neq,
        TokenKind::Lt => CmpOp::Lt,
        TokenKind::Lte => CmpOp::Lte,
        TokenKind::Gt => CmpOp::Gt,
        TokenKind::Gte => CmpOp::Gte,
        _ => return None,
    })
}

fn aggregate_op(token: &Token) -> Option<AggOp> {
    match token.kind {
        TokenKind::Count => Some(AggOp::Count),
        TokenKind::Sum => Some(AggOp::Sum),
        TokenKind::Max => Some(AggOp::Max),
        TokenKind::Min => Some(AggOp::Min),
        TokenKind::Avg => Some(AggOp::Avg),
        _ => None,
    }
}

fn is_function_name(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident
            | TokenKind::Count
            | TokenKind::Sum
            | TokenKind::Max
            | TokenKind::Min
            | TokenKind::Avg
    )
}
