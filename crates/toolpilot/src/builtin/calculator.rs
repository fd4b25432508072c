//! A restricted arithmetic evaluator.
//!
//! Supports integer and float literals, `+ - * / // % **`, unary signs and
//! parentheses. Numbers follow Python rules: `/` always yields a float, `//`
//! floors, `%` takes the sign of the divisor and `**` binds tighter than a
//! leading minus.

use serde_json::Value;
use thiserror::Error;

const MAX_DEPTH: usize = 100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("malformed number '{0}'")]
    BadNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token at position {0}")]
    UnexpectedToken(usize),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("result is not a finite number")]
    NotFinite,
    #[error("expression nested too deeply")]
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn to_json(self) -> Result<Value, CalcError> {
        match self {
            Number::Int(i) => Ok(Value::from(i)),
            Number::Float(f) if f.is_finite() => Ok(Value::from(f)),
            Number::Float(_) => Err(CalcError::NotFinite),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    i += 1;
                    if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&literal)?));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::StarStar
            }
            '*' => Token::Star,
            '/' if chars.get(i + 1) == Some(&'/') => {
                i += 1;
                Token::SlashSlash
            }
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => return Err(CalcError::UnexpectedChar(other, i)),
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<Number, CalcError> {
    let is_float = literal.contains(['.', 'e', 'E']);
    if is_float {
        // "." alone or "1e" are not numbers; f64::from_str rejects both
        literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| CalcError::BadNumber(literal.to_string()))
    } else {
        if literal.len() > 1 && literal.starts_with('0') && literal.chars().any(|c| c != '0') {
            // leading zeros are a syntax error for Python integers
            return Err(CalcError::BadNumber(literal.to_string()));
        }
        literal.parse::<i64>().map(Number::Int).map_err(|_| CalcError::Overflow)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn descend(&mut self) -> Result<(), CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        Ok(())
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = binary(op, value, rhs)?;
        }
        Ok(value)
    }

    // term := factor (('*' | '/' | '//' | '%') factor)*
    fn term(&mut self) -> Result<Number, CalcError> {
        let mut value = self.factor()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::SlashSlash | Token::Percent)) =
            self.peek()
        {
            self.pos += 1;
            let rhs = self.factor()?;
            value = binary(op, value, rhs)?;
        }
        Ok(value)
    }

    // factor := ('+' | '-') factor | power
    fn factor(&mut self) -> Result<Number, CalcError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.descend()?;
                let value = self.factor();
                self.depth -= 1;
                value
            }
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let value = self.factor()?;
                self.depth -= 1;
                negate(value)
            }
            _ => self.power(),
        }
    }

    // power := atom ('**' factor)?
    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.atom()?;
        if self.peek() == Some(Token::StarStar) {
            self.pos += 1;
            self.descend()?;
            let exponent = self.factor()?;
            self.depth -= 1;
            return pow(base, exponent);
        }
        Ok(base)
    }

    // atom := number | '(' expr ')'
    fn atom(&mut self) -> Result<Number, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                self.descend()?;
                let value = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    Some(_) => Err(CalcError::UnexpectedToken(self.pos - 1)),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(_) => Err(CalcError::UnexpectedToken(self.pos - 1)),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

fn negate(value: Number) -> Result<Number, CalcError> {
    match value {
        Number::Int(i) => i.checked_neg().map(Number::Int).ok_or(CalcError::Overflow),
        Number::Float(f) => Ok(Number::Float(-f)),
    }
}

fn binary(op: Token, lhs: Number, rhs: Number) -> Result<Number, CalcError> {
    if matches!(op, Token::Slash | Token::SlashSlash | Token::Percent) && rhs.is_zero() {
        return Err(CalcError::DivisionByZero);
    }

    let result = match (lhs, rhs) {
        (Number::Int(a), Number::Int(b)) => match op {
            Token::Plus => Number::Int(a.checked_add(b).ok_or(CalcError::Overflow)?),
            Token::Minus => Number::Int(a.checked_sub(b).ok_or(CalcError::Overflow)?),
            Token::Star => Number::Int(a.checked_mul(b).ok_or(CalcError::Overflow)?),
            Token::Slash => Number::Float(a as f64 / b as f64),
            Token::SlashSlash => Number::Int(floor_div(a, b)?),
            Token::Percent => Number::Int(floor_mod(a, b)?),
            _ => return Err(CalcError::UnexpectedToken(0)),
        },
        _ => {
            let (a, b) = (lhs.as_f64(), rhs.as_f64());
            match op {
                Token::Plus => Number::Float(a + b),
                Token::Minus => Number::Float(a - b),
                Token::Star => Number::Float(a * b),
                Token::Slash => Number::Float(a / b),
                Token::SlashSlash => Number::Float((a / b).floor()),
                Token::Percent => {
                    let r = a % b;
                    if r != 0.0 && (r < 0.0) != (b < 0.0) {
                        Number::Float(r + b)
                    } else {
                        Number::Float(r)
                    }
                }
                _ => return Err(CalcError::UnexpectedToken(0)),
            }
        }
    };
    Ok(result)
}

fn floor_div(a: i64, b: i64) -> Result<i64, CalcError> {
    let q = a.checked_div(b).ok_or(CalcError::Overflow)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Result<i64, CalcError> {
    let r = a.checked_rem(b).ok_or(CalcError::Overflow)?;
    if r != 0 && (r < 0) != (b < 0) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn pow(base: Number, exponent: Number) -> Result<Number, CalcError> {
    match (base, exponent) {
        (Number::Int(b), Number::Int(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| CalcError::Overflow)?;
            b.checked_pow(e).map(Number::Int).ok_or(CalcError::Overflow)
        }
        _ => {
            if base.is_zero() && exponent.as_f64() < 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            let value = base.as_f64().powf(exponent.as_f64());
            if value.is_nan() {
                // negative base with fractional exponent is complex in Python
                return Err(CalcError::NotFinite);
            }
            Ok(Number::Float(value))
        }
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(input: &str) -> Result<Number, CalcError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(CalcError::UnexpectedToken(parser.pos));
    }
    Ok(value)
}
