//! Sandboxed expression evaluator used by Lane 1 enforcement
//! (`Rule.enforcement_expression`) and deterministic scenario transition
//! conditions (`StepTransition.condition`).
//!
//! A small parser produces an [`Expr`] tree restricted to an explicit
//! allow-list of node kinds (boolean logic, comparisons, membership,
//! arithmetic, and the four whitelisted functions `len`/`abs`/`min`/`max`
//! plus `lower` for case-insensitive string comparison). There is no
//! attribute access, no lambdas, no function definitions, and no
//! host-language `eval` anywhere in the implementation.

use crate::variable::{VarMap, VarValue};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    Parse(String),
    UnknownIdentifier(String),
    TypeError(String),
    UnknownFunction(String),
    Arity(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Parse(s) => write!(f, "parse error: {s}"),
            EvalError::UnknownIdentifier(s) => write!(f, "unknown identifier: {s}"),
            EvalError::TypeError(s) => write!(f, "type error: {s}"),
            EvalError::UnknownFunction(s) => write!(f, "unknown function: {s}"),
            EvalError::Arity(s) => write!(f, "wrong number of arguments: {s}"),
        }
    }
}

impl std::error::Error for EvalError {}

/// A value produced during evaluation. Distinct from [`VarValue`] because
/// the evaluator also needs list literals for `in` membership tests.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::List(l) => !l.is_empty(),
        }
    }

    fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(*n),
            _ => Err(EvalError::TypeError(format!("expected number, got {self:?}"))),
        }
    }
}

impl From<&VarValue> for Value {
    fn from(v: &VarValue) -> Self {
        match v {
            VarValue::String(s) => Value::String(s.clone()),
            VarValue::Number(n) => Value::Number(*n),
            VarValue::Bool(b) => Value::Bool(*b),
            VarValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            VarValue::Blob(b) => Value::Number(b.len() as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// The allow-listed expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Num(f64),
    Str(String),
    Bool(bool),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    /// Parse source text into an expression tree.
    pub fn parse(src: &str) -> Result<Expr, EvalError> {
        let tokens = lex(src)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(EvalError::Parse(format!(
                "unexpected trailing tokens at {}",
                parser.pos
            )));
        }
        Ok(expr)
    }

    /// Evaluate against a variable environment. Evaluation is pure: it
    /// reads `env` and never mutates anything, so repeated evaluation
    /// against the same environment is guaranteed to be stable.
    pub fn eval(&self, env: &VarMap) -> Result<Value, EvalError> {
        match self {
            Expr::Ident(name) => env
                .get(name)
                .map(Value::from)
                .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),
            Expr::Num(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::List(items) => {
                let values = items.iter().map(|e| e.eval(env)).collect::<Result<_, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(env)?.truthy())),
            Expr::And(l, r) => {
                let left = l.eval(env)?;
                if !left.truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(r.eval(env)?.truthy()))
            }
            Expr::Or(l, r) => {
                let left = l.eval(env)?;
                if left.truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(r.eval(env)?.truthy()))
            }
            Expr::Cmp(op, l, r) => {
                let left = l.eval(env)?;
                let right = r.eval(env)?;
                Ok(Value::Bool(compare(*op, &left, &right)?))
            }
            Expr::Arith(op, l, r) => {
                let left = l.eval(env)?.as_number()?;
                let right = r.eval(env)?.as_number()?;
                let result = match op {
                    ArithOp::Add => left + right,
                    ArithOp::Sub => left - right,
                    ArithOp::Mul => left * right,
                    ArithOp::Div => left / right,
                };
                Ok(Value::Number(result))
            }
            Expr::In(needle, haystack) => {
                let needle = needle.eval(env)?;
                let haystack = haystack.eval(env)?;
                match haystack {
                    Value::List(items) => Ok(Value::Bool(items.contains(&needle))),
                    Value::String(s) => match needle {
                        Value::String(n) => Ok(Value::Bool(s.contains(&n))),
                        _ => Err(EvalError::TypeError("`in` on string requires string needle".into())),
                    },
                    _ => Err(EvalError::TypeError("`in` requires a list or string".into())),
                }
            }
            Expr::Call(name, args) => call_function(name, args, env),
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    use std::cmp::Ordering;
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => {
            return match op {
                CmpOp::Eq => Ok(left == right),
                CmpOp::Ne => Ok(left != right),
                _ => Err(EvalError::TypeError(format!(
                    "cannot order-compare {left:?} and {right:?}"
                ))),
            }
        }
    };
    let ordering = ordering.ok_or_else(|| EvalError::TypeError("incomparable values".into()))?;
    Ok(match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    })
}

fn call_function(name: &str, args: &[Expr], env: &VarMap) -> Result<Value, EvalError> {
    match name {
        "len" => {
            let [arg] = args else {
                return Err(EvalError::Arity("len takes exactly 1 argument".into()));
            };
            match arg.eval(env)? {
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::List(l) => Ok(Value::Number(l.len() as f64)),
                other => Err(EvalError::TypeError(format!("len() unsupported for {other:?}"))),
            }
        }
        "abs" => {
            let [arg] = args else {
                return Err(EvalError::Arity("abs takes exactly 1 argument".into()));
            };
            Ok(Value::Number(arg.eval(env)?.as_number()?.abs()))
        }
        "min" => {
            if args.is_empty() {
                return Err(EvalError::Arity("min requires at least 1 argument".into()));
            }
            let mut best = f64::INFINITY;
            for a in args {
                best = best.min(a.eval(env)?.as_number()?);
            }
            Ok(Value::Number(best))
        }
        "max" => {
            if args.is_empty() {
                return Err(EvalError::Arity("max requires at least 1 argument".into()));
            }
            let mut best = f64::NEG_INFINITY;
            for a in args {
                best = best.max(a.eval(env)?.as_number()?);
            }
            Ok(Value::Number(best))
        }
        "lower" => {
            let [arg] = args else {
                return Err(EvalError::Arity("lower takes exactly 1 argument".into()));
            };
            match arg.eval(env)? {
                Value::String(s) => Ok(Value::String(s.to_lowercase())),
                other => Err(EvalError::TypeError(format!("lower() unsupported for {other:?}"))),
            }
        }
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

// --- lexer -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    Not,
    In,
    True,
    False,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
}

fn lex(src: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(EvalError::Parse("unterminated string literal".into()));
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::Parse(format!("invalid number: {text}")))?;
                tokens.push(Token::Num(n));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(EvalError::Parse(format!("unexpected character: {other}")));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, tok: &Token) -> Result<(), EvalError> {
        match self.advance() {
            Some(ref t) if t == tok => Ok(()),
            other => Err(EvalError::Parse(format!("expected {tok:?}, got {other:?}"))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(CmpOp::Eq),
            Some(Token::Ne) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Ge) => Some(CmpOp::Ge),
            Some(Token::In) => None,
            _ => return Ok(left),
        };
        if matches!(self.peek(), Some(Token::In)) {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::In(Box::new(left), Box::new(right)));
        }
        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::Cmp(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_primary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Minus) => {
                let inner = self.parse_primary()?;
                Ok(Expr::Arith(ArithOp::Sub, Box::new(Expr::Num(0.0)), Box::new(inner)))
            }
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Token::RBracket)) {
                    loop {
                        items.push(self.parse_or()?);
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.parse_or()?);
                            if matches!(self.peek(), Some(Token::Comma)) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            other => Err(EvalError::Parse(format!("unexpected token: {other:?}"))),
        }
    }
}

/// Convenience used by enforcement: parse and evaluate in one call,
/// returning a boolean. Non-boolean results are coerced via truthiness.
pub fn eval_bool(src: &str, env: &VarMap) -> Result<bool, EvalError> {
    Ok(Expr::parse(src)?.eval(env)?.truthy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, VarValue)]) -> VarMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn refund_cap_by_tier() {
        let e = env(&[
            ("amount", VarValue::Number(75.0)),
            ("user_tier", VarValue::String("standard".into())),
        ]);
        assert!(!eval_bool("amount <= 50 or user_tier == 'VIP'", &e).unwrap());

        let e2 = env(&[
            ("amount", VarValue::Number(50.0)),
            ("user_tier", VarValue::String("standard".into())),
        ]);
        assert!(eval_bool("amount <= 50 or user_tier == 'VIP'", &e2).unwrap());
    }

    #[test]
    fn negated_flag() {
        let e = env(&[("contains_competitor_mention", VarValue::Bool(true))]);
        assert!(!eval_bool("not contains_competitor_mention", &e).unwrap());
    }

    #[test]
    fn membership_and_functions() {
        let e = env(&[("tier", VarValue::String("gold".into()))]);
        assert!(eval_bool("lower(tier) in ['gold', 'vip']", &e).unwrap());
        assert!(eval_bool("len(tier) == 4", &e).unwrap());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let e = env(&[("amount", VarValue::Number(10.0))]);
        let expr = Expr::parse("amount > 5 and amount < 20").unwrap();
        let first = expr.eval(&e).unwrap();
        let second = expr.eval(&e).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_identifier_is_an_error_not_a_panic() {
        let e = VarMap::new();
        assert!(matches!(
            Expr::parse("missing == 1").unwrap().eval(&e),
            Err(EvalError::UnknownIdentifier(_))
        ));
    }
}
