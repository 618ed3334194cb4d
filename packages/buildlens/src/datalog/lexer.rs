//! Single-pass scanner for rule source text

use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,

    // Literals
    Ident,
    Variable,
    Str,
    Number,
    Wildcard,

    // Keywords
    Rule,
    When,
    Then,
    Suggestion,
    Aggregate,
    Not,
    Count,
    Sum,
    Max,
    Min,
    Avg,
    True,
    False,

    // Operators and punctuation
    Implies,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenKind::Eof => "EOF",
            TokenKind::Ident => "identifier",
            TokenKind::Variable => "variable",
            TokenKind::Str => "string",
            TokenKind::Number => "number",
            TokenKind::Wildcard => "_",
            TokenKind::Rule => "rule",
            TokenKind::When => "when",
            TokenKind::Then => "then",
            TokenKind::Suggestion => "suggestion",
            TokenKind::Aggregate => "aggregate",
            TokenKind::Not => "not",
            TokenKind::Count => "count",
            TokenKind::Sum => "sum",
            TokenKind::Max => "max",
            TokenKind::Min => "min",
            TokenKind::Avg => "avg",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Implies => ":-",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Colon => ":",
            TokenKind::Eq => "=",
            TokenKind::Neq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Lte => "<=",
            TokenKind::Gt => ">",
            TokenKind::Gte => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
        })
    }
}

fn keyword(text: &str) -> Option<TokenKind> {
    Some(match text {
        "rule" => TokenKind::Rule,
        "when" => TokenKind::When,
        "then" => TokenKind::Then,
        "suggestion" => TokenKind::Suggestion,
        "aggregate" => TokenKind::Aggregate,
        "not" => TokenKind::Not,
        "count" => TokenKind::Count,
        "sum" => TokenKind::Sum,
        "max" => TokenKind::Max,
        "min" => TokenKind::Min,
        "avg" => TokenKind::Avg,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    })
}

/// A lexical token with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub col: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

/// Tokenizes rule source text. Fails fast on the first unexpected
/// character or unterminated string, with its position.
pub fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut lexer = Lexer {
        chars: input.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_n(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '%' {
                // Line comment to end of line
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn error(&self, line: usize, col: usize, message: impl Into<String>) -> Error {
        Error::Lex {
            line,
            col,
            message: message.into(),
        }
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        self.skip_whitespace();

        let line = self.line;
        let col = self.col;
        let token = |kind, text: &str| Token {
            kind,
            text: text.to_string(),
            line,
            col,
        };

        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(token(TokenKind::Eof, "")),
        };

        match ch {
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '.' | '+' | '*' | '/' | '%' => {
                self.advance();
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    ',' => TokenKind::Comma,
                    '.' => TokenKind::Dot,
                    '+' => TokenKind::Plus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    _ => TokenKind::Percent,
                };
                return Ok(token(kind, &ch.to_string()));
            }
            ':' => {
                self.advance();
                if self.peek() == Some('-') {
                    self.advance();
                    return Ok(token(TokenKind::Implies, ":-"));
                }
                return Ok(token(TokenKind::Colon, ":"));
            }
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    return Ok(token(TokenKind::Neq, "!="));
                }
                return Err(self.error(line, col, "unexpected '!'"));
            }
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    return Ok(token(TokenKind::Lte, "<="));
                }
                return Ok(token(TokenKind::Lt, "<"));
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    return Ok(token(TokenKind::Gte, ">="));
                }
                return Ok(token(TokenKind::Gt, ">"));
            }
            '=' => {
                self.advance();
                return Ok(token(TokenKind::Eq, "="));
            }
            '-' => {
                self.advance();
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    return self.scan_number(line, col, "-");
                }
                return Ok(token(TokenKind::Minus, "-"));
            }
            _ => {}
        }

        // Wildcard: a lone '_' not followed by an identifier character
        if ch == '_' && !self.peek_n(1).is_some_and(is_ident_char) {
            self.advance();
            return Ok(token(TokenKind::Wildcard, "_"));
        }

        if ch == '?' {
            self.advance();
            let mut text = String::from("?");
            while let Some(next) = self.peek() {
                if !is_ident_char(next) {
                    break;
                }
                self.advance();
                text.push(next);
            }
            return Ok(Token {
                kind: TokenKind::Variable,
                text,
                line,
                col,
            });
        }

        if ch == '"' {
            return self.scan_string(line, col);
        }

        if ch.is_ascii_digit() {
            return self.scan_number(line, col, "");
        }

        if is_ident_start(ch) {
            let mut text = String::new();
            while let Some(next) = self.peek() {
                if !is_ident_char(next) {
                    break;
                }
                self.advance();
                text.push(next);
            }
            let kind = keyword(&text).unwrap_or(TokenKind::Ident);
            return Ok(Token {
                kind,
                text,
                line,
                col,
            });
        }

        Err(self.error(line, col, format!("unexpected character '{}'", ch)))
    }

    fn scan_string(&mut self, line: usize, col: usize) -> Result<Token, Error> {
        self.advance(); // opening quote

        let mut text = String::new();
        loop {
            let ch = match self.advance() {
                Some(ch) => ch,
                None => return Err(self.error(line, col, "unterminated string")),
            };
            if ch == '"' {
                break;
            }
            if ch == '\\' {
                let escaped = match self.advance() {
                    Some(ch) => ch,
                    None => return Err(self.error(line, col, "unterminated string")),
                };
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '"' => text.push('"'),
                    '\\' => text.push('\\'),
                    // Unknown escape keeps the character literally
                    other => text.push(other),
                }
            } else {
                text.push(ch);
            }
        }

        Ok(Token {
            kind: TokenKind::Str,
            text,
            line,
            col,
        })
    }

    fn scan_number(&mut self, line: usize, col: usize, prefix: &str) -> Result<Token, Error> {
        let mut text = String::from(prefix);
        while let Some(next) = self.peek() {
            if !next.is_ascii_digit() {
                break;
            }
            self.advance();
            text.push(next);
        }
        if self.peek() == Some('.') && self.peek_n(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            text.push('.');
            while let Some(next) = self.peek() {
                if !next.is_ascii_digit() {
                    break;
                }
                self.advance();
                text.push(next);
            }
        }
        Ok(Token {
            kind: TokenKind::Number,
            text,
            line,
            col,
        })
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
