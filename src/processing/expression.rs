// src/processing/expression.rs
//! Free-form index expressions
//!
//! Parses arithmetic over named variables, e.g. `"(NIR - RED) / (NIR + RED)"`
//! or `"2.5 * (NIR - RED) / (NIR + 6 * RED - 7.5 * BLUE + 1)"`, and binds the
//! variables to bands through any [`BandAlgebra`].
//!
//! Grammar:
//! ```text
//! expr   = term (('+' | '-') term)*
//! term   = factor (('*' | '/') factor)*
//! factor = number | variable | '(' expr ')' | ('-' | '+') factor
//! ```
//!
//! Parentheses and signs may nest at most [`MAX_DEPTH`] levels, and the
//! parsed tree is at most [`MAX_DEPTH`] nodes tall.

use std::collections::BTreeSet;

use super::algebra::BandAlgebra;

/// Deepest nesting and tallest expression tree accepted.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    BinOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(chars[i]));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // optional exponent: 1e-4, 2.5E3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => return Err(format!("unexpected character '{c}' at position {i}")),
        }
    }

    Ok(tokens)
}

/// A parsed subtree and its height.
type Node = (Expr, usize);

fn too_deep() -> String {
    format!("expression nests deeper than {MAX_DEPTH} levels")
}

fn taller(height: usize) -> Result<usize, String> {
    if height >= MAX_DEPTH {
        return Err(too_deep());
    }
    Ok(height + 1)
}

fn binary(op: char, (left, l): Node, (right, r): Node) -> Result<Node, String> {
    let height = taller(l.max(r))?;
    Ok((
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        height,
    ))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn enter(&mut self) -> Result<(), String> {
        if self.nesting >= MAX_DEPTH {
            return Err(too_deep());
        }
        self.nesting += 1;
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Node, String> {
        let mut left = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Node, String> {
        let mut left = self.parse_factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_factor()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Node, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok((Expr::Num(n), 1)),
            Some(Token::Ident(name)) => Ok((Expr::Var(name), 1)),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_expr()?;
                self.nesting -= 1;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected closing parenthesis".into()),
                }
            }
            Some(Token::Op('-')) => {
                self.enter()?;
                let (inner, height) = self.parse_factor()?;
                self.nesting -= 1;
                Ok((Expr::Neg(Box::new(inner)), taller(height)?))
            }
            Some(Token::Op('+')) => {
                self.enter()?;
                let inner = self.parse_factor()?;
                self.nesting -= 1;
                Ok(inner)
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}

impl Expr {
    pub fn parse(text: &str) -> Result<Expr, String> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err("expression is empty".into());
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            nesting: 0,
        };
        let (expr, _) = parser.parse_expr()?;
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected trailing token {token:?}"));
        }
        Ok(expr)
    }

    /// Every variable name the expression reads.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                out.insert(name.as_str());
            }
            Expr::BinOp { left, right, .. } => {
                left.collect_vars(out);
                right.collect_vars(out);
            }
            Expr::Neg(inner) => inner.collect_vars(out),
        }
    }

    /// Build the expression over `algebra`, resolving each variable with
    /// `resolve`. Fails with the first variable `resolve` cannot bind.
    pub fn build<A, F>(&self, algebra: &A, resolve: &F) -> Result<A::Band, String>
    where
        A: BandAlgebra,
        F: Fn(&str) -> Option<A::Band>,
    {
        match self {
            Expr::Num(n) => Ok(algebra.constant(*n)),
            Expr::Var(name) => resolve(name).ok_or_else(|| name.clone()),
            Expr::BinOp { op, left, right } => {
                let l = left.build(algebra, resolve)?;
                let r = right.build(algebra, resolve)?;
                Ok(match op {
                    '+' => algebra.add(&l, &r),
                    '-' => algebra.subtract(&l, &r),
                    '*' => algebra.multiply(&l, &r),
                    _ => algebra.divide(&l, &r),
                })
            }
            Expr::Neg(inner) => Ok(algebra.negate(&inner.build(algebra, resolve)?)),
        }
    }
}
