//! Sandboxed arithmetic for computed parameters.
//!
//! Grammar:
//!
//! ```text
//! expr    = term (('+' | '-') term)*
//! term    = unary (('*' | '/') unary)*
//! unary   = ('+' | '-') unary | primary
//! primary = number | ident | ident '(' args ')' | '(' expr ')'
//! ```
//!
//! Identifiers name sibling parameters. Functions may carry a `Math.` prefix.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{0}' takes {1} argument(s), got {2}")]
    Arity(String, usize, usize),
    #[error("result is not a finite number")]
    NotFinite,
}

const FUNCTIONS: &[&str] = &[
    "abs", "round", "floor", "ceil", "min", "max", "log", "pow", "sqrt",
];

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
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
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::UnexpectedChar(c, start))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(FormulaError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    vars: &'a HashMap<String, f64>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(FormulaError::UnexpectedToken(format!("{t:?}"))),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<f64, FormulaError> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    acc += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    acc -= self.term()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn term(&mut self) -> Result<f64, FormulaError> {
        let mut acc = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    acc *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    acc /= self.unary()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, FormulaError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let v = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(v)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.args()?;
                    call(&name, &args)
                } else {
                    self.variable(&name)
                }
            }
            Some(t) => Err(FormulaError::UnexpectedToken(format!("{t:?}"))),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn args(&mut self) -> Result<Vec<f64>, FormulaError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(t) => return Err(FormulaError::UnexpectedToken(format!("{t:?}"))),
                None => return Err(FormulaError::UnexpectedEnd),
            }
        }
    }

    fn variable(&self, name: &str) -> Result<f64, FormulaError> {
        match name {
            "Math.PI" => Ok(std::f64::consts::PI),
            "Math.E" => Ok(std::f64::consts::E),
            _ => self
                .vars
                .get(name)
                .copied()
                .ok_or_else(|| FormulaError::UnknownVariable(name.to_string())),
        }
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, FormulaError> {
    let bare = name.strip_prefix("Math.").unwrap_or(name);
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(FormulaError::Arity(bare.to_string(), n, args.len()))
        }
    };
    match bare {
        "abs" => arity(1).map(|_| args[0].abs()),
        // Half-up: -2.5 rounds to -2.
        "round" => arity(1).map(|_| (args[0] + 0.5).floor()),
        "floor" => arity(1).map(|_| args[0].floor()),
        "ceil" => arity(1).map(|_| args[0].ceil()),
        "log" => arity(1).map(|_| args[0].ln()),
        "sqrt" => arity(1).map(|_| args[0].sqrt()),
        "pow" => arity(2).map(|_| args[0].powf(args[1])),
        "min" if !args.is_empty() => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" if !args.is_empty() => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        "min" | "max" => Err(FormulaError::Arity(bare.to_string(), 1, 0)),
        _ => Err(FormulaError::UnknownFunction(name.to_string())),
    }
}

/// Evaluates `expr` with `vars` bound to sibling parameter values.
pub fn evaluate(expr: &str, vars: &HashMap<String, f64>) -> Result<f64, FormulaError> {
    let mut parser = Parser {
        tokens: tokenize(expr)?,
        pos: 0,
        vars,
    };
    let value = parser.expr()?;
    if let Some(t) = parser.peek() {
        return Err(FormulaError::UnexpectedToken(format!("{t:?}")));
    }
    if !value.is_finite() {
        return Err(FormulaError::NotFinite);
    }
    Ok(value)
}

/// Parameter names a formula refers to, in first-use order.
pub fn dependencies(expr: &str) -> Vec<String> {
    let Ok(tokens) = tokenize(expr) else {
        return Vec::new();
    };
    let mut deps: Vec<String> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let Token::Ident(name) = token else {
            continue;
        };
        let is_call = tokens.get(i + 1) == Some(&Token::LParen);
        let bare = name.strip_prefix("Math.").unwrap_or(name);
        if name == "Math" || name.starts_with("Math.") || (is_call && FUNCTIONS.contains(&bare)) {
            continue;
        }
        if !deps.contains(name) {
            deps.push(name.clone());
        }
    }
    deps
}
