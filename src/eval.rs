//! Expression evaluation for `EVAL(...)` macros.
//!
//! The macro engine treats evaluation as an injected capability: anything that
//! implements [`Evaluator`] can be plugged in, including plain closures. The
//! crate ships [`Arithmetic`], a small evaluator for numeric expressions, as
//! the default.

use serde_json::{Number, Value};
use thiserror::Error;

/// Failure reported by an [`Evaluator`].
///
/// The engine logs these and substitutes `null`; they never abort expansion.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct EvalError {
    message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Evaluates the text captured between `EVAL(` and its matching `)`.
///
/// `Ok(None)` means the expression produced no value; it is rendered as `null`.
pub trait Evaluator {
    fn evaluate(&self, expr: &str) -> Result<Option<Value>, EvalError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str) -> Result<Option<Value>, EvalError>,
{
    fn evaluate(&self, expr: &str) -> Result<Option<Value>, EvalError> {
        self(expr)
    }
}

/// Evaluates arithmetic over decimal numbers.
///
/// Supports `+ - * / %`, unary `+`/`-`, parentheses, and literals such as
/// `3`, `0.5`, `.5` or `1e3`. Integral results are returned as JSON integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Arithmetic;

impl Evaluator for Arithmetic {
    fn evaluate(&self, expr: &str) -> Result<Option<Value>, EvalError> {
        let mut parser = Parser {
            src: expr.as_bytes(),
            pos: 0,
            depth: 0,
        };
        let result = parser.expr()?;
        parser.skip_ws();
        if parser.pos < parser.src.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        to_json_number(result).map(Some)
    }
}

// Each level costs a few stack frames; stay far below the default thread stack.
const MAX_DEPTH: usize = 256;

// Integers beyond 2^53 lose precision in f64, so keep them as floats.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

fn to_json_number(value: f64) -> Result<Value, EvalError> {
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INT {
        return Ok(Value::Number(Number::from(value as i64)));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| EvalError::new(format!("result {value} is not a finite number")))
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    acc += self.term()?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    acc -= self.term()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, EvalError> {
        let mut acc = self.unary()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    acc *= self.unary()?;
                }
                Some(op @ (b'/' | b'%')) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(self.error("division by zero"));
                    }
                    acc = if op == b'/' { acc / rhs } else { acc % rhs };
                }
                _ => return Ok(acc),
            }
        }
    }

    // Every sign and every parenthesized group passes through here.
    fn unary(&mut self) -> Result<f64, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = self.signed();
        self.depth -= 1;
        result
    }

    fn signed(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(b'+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let inner = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        self.eat_digits();
        if self.src.get(self.pos) == Some(&b'.') {
            self.pos += 1;
            self.eat_digits();
        }
        if matches!(self.src.get(self.pos), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.src.get(self.pos), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            self.eat_digits();
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|text| text.parse::<f64>().ok())
            .ok_or_else(|| EvalError::new(format!("invalid number at offset {start}")))
    }

    fn eat_digits(&mut self) {
        while self.src.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
    }

    /// Next non-whitespace byte, without consuming it.
    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.src.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &str) -> EvalError {
        EvalError::new(format!("{what} at offset {}", self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &str) -> Result<Option<Value>, EvalError> {
        Arithmetic.evaluate(expr)
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(eval("1+(2*3)").unwrap(), Some(json!(7)));
        assert_eq!(eval("10 - 4 - 3").unwrap(), Some(json!(3)));
        assert_eq!(eval("7 % 4").unwrap(), Some(json!(3)));
    }

    #[test]
    fn precedence_and_unary() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), Some(json!(14)));
        assert_eq!(eval("-(2 + 3) * 2").unwrap(), Some(json!(-10)));
        assert_eq!(eval("--4").unwrap(), Some(json!(4)));
    }

    #[test]
    fn fractional_results_stay_floats() {
        assert_eq!(eval("7 / 2").unwrap(), Some(json!(3.5)));
        assert_eq!(eval(".5 + 1e1").unwrap(), Some(json!(10.5)));
    }

    #[test]
    fn division_by_zero_fails() {
        assert!(eval("1 / 0").is_err());
        assert!(eval("1 % 0").is_err());
    }

    #[test]
    fn malformed_input_fails() {
        assert!(eval("").is_err());
        assert!(eval("1 +").is_err());
        assert!(eval("(1 + 2").is_err());
        assert!(eval("1 2").is_err());
        assert!(eval("abc").is_err());
    }

    #[test]
    fn error_mentions_offset() {
        let err = eval("1 + x").unwrap_err();
        assert!(err.to_string().contains("offset 4"), "{err}");
    }

    #[test]
    fn deep_nesting_fails_instead_of_overflowing() {
        let parens = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
        let err = eval(&parens).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "{err}");

        let signs = format!("{}1", "-".repeat(200_000));
        assert!(eval(&signs).is_err());
    }

    #[test]
    fn moderate_nesting_is_fine() {
        let expr = format!("{}2{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&expr).unwrap(), Some(json!(2)));
        assert_eq!(eval("--3").unwrap(), Some(json!(3)));
    }

    #[test]
    fn closures_are_evaluators() {
        let upper = |expr: &str| -> Result<Option<Value>, EvalError> {
            Ok(Some(Value::String(expr.to_uppercase())))
        };
        assert_eq!(upper.evaluate("abc").unwrap(), Some(json!("ABC")));
    }
}
