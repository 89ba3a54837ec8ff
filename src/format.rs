//! Number formatting for `FORMAT(...)` macros.
//!
//! Patterns follow the familiar decimal-format shape:
//!
//! ```text
//! [prefix] #,##0.00## [suffix]
//!          ^^^^^^        integer part: `0` = required digit, `#` = optional,
//!                        `,` = grouping separator (group size = digits after it)
//!                ^^^^    fraction: `0` = required digit, `#` = optional
//! ```
//!
//! | Pattern    | Value      | Output         |
//! |------------|------------|----------------|
//! | `#.##`     | `2.0`      | `2`            |
//! | `#.##`     | `0.5`      | `.5`           |
//! | `0.00`     | `2.0`      | `2.00`         |
//! | `#,##0.0`  | `12345.67` | `12,345.7`     |
//! | `$#.00`    | `3.5`      | `$3.50`        |
//!
//! Exponents, percent/per-mille, quoting and negative subpatterns are not
//! supported and are rejected when the pattern is parsed.

use crate::error::JsonfigError;

/// The pattern applied by `FORMAT(value)` when no pattern is given:
/// at most two fraction digits, trailing zeros suppressed.
pub const DEFAULT_PATTERN: &str = "#.##";

/// Formats the numeric value of a `FORMAT(...)` call.
pub trait NumberFormatter {
    fn format(&self, value: f64, pattern: &str) -> Result<String, JsonfigError>;
}

impl<F> NumberFormatter for F
where
    F: Fn(f64, &str) -> Result<String, JsonfigError>,
{
    fn format(&self, value: f64, pattern: &str) -> Result<String, JsonfigError> {
        self(value, pattern)
    }
}

/// The default formatter: parses the pattern as a [`DecimalPattern`] on each call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalFormat;

impl NumberFormatter for DecimalFormat {
    fn format(&self, value: f64, pattern: &str) -> Result<String, JsonfigError> {
        Ok(DecimalPattern::parse(pattern)?.format(value))
    }
}

/// A parsed decimal-format pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalPattern {
    prefix: String,
    suffix: String,
    min_int: usize,
    grouping: Option<usize>,
    min_frac: usize,
    max_frac: usize,
}

impl DecimalPattern {
    pub fn parse(pattern: &str) -> Result<Self, JsonfigError> {
        let invalid = |reason: &str| JsonfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if let Some(c) = pattern
            .chars()
            .find(|c| matches!(c, 'E' | '%' | '\u{2030}' | '\'' | ';'))
        {
            return Err(invalid(&format!("'{c}' is not supported")));
        }

        let is_body = |c: &char| matches!(c, '#' | '0' | ',' | '.');
        let chars: Vec<char> = pattern.chars().collect();
        let start = chars
            .iter()
            .position(is_body)
            .ok_or_else(|| invalid("pattern has no digits"))?;
        let end = start + chars[start..].iter().take_while(|c| is_body(c)).count();

        let mut int_digits = 0;
        let mut min_int = 0;
        let mut since_separator: Option<usize> = None;
        let mut in_fraction = false;
        let mut min_frac = 0;
        let mut max_frac = 0;

        for &c in &chars[start..end] {
            match (c, in_fraction) {
                ('.', false) => in_fraction = true,
                ('.', true) => return Err(invalid("multiple decimal separators")),
                (',', false) => since_separator = Some(0),
                (',', true) => return Err(invalid("grouping separator in fraction")),
                ('#', false) => {
                    if min_int > 0 {
                        return Err(invalid("'#' after '0' in integer part"));
                    }
                    int_digits += 1;
                    since_separator = since_separator.map(|n| n + 1);
                }
                ('0', false) => {
                    min_int += 1;
                    int_digits += 1;
                    since_separator = since_separator.map(|n| n + 1);
                }
                ('0', true) => {
                    if max_frac > min_frac {
                        return Err(invalid("'0' after '#' in fraction"));
                    }
                    min_frac += 1;
                    max_frac += 1;
                }
                (_, true) => max_frac += 1,
                (_, false) => unreachable!("pattern body holds only '#', '0', ',' and '.'"),
            }
        }

        if int_digits + max_frac == 0 {
            return Err(invalid("pattern has no digits"));
        }
        let grouping = match since_separator {
            Some(0) => return Err(invalid("grouping separator without digits")),
            other => other,
        };

        Ok(Self {
            prefix: chars[..start].iter().collect(),
            suffix: chars[end..].iter().collect(),
            min_int,
            grouping,
            min_frac,
            max_frac,
        })
    }

    pub fn format(&self, value: f64) -> String {
        if value.is_nan() {
            return "NaN".to_string();
        }

        let (digits, is_zero) = if value.is_infinite() {
            ("\u{221E}".to_string(), false)
        } else {
            self.digits(value.abs())
        };

        let mut out = String::new();
        if value.is_sign_negative() && !is_zero {
            out.push('-');
        }
        out.push_str(&self.prefix);
        out.push_str(&digits);
        out.push_str(&self.suffix);
        out
    }

    /// Render a finite, non-negative value. Also reports whether every printed
    /// digit is zero, so callers can drop the sign of a value that rounded to 0.
    fn digits(&self, value: f64) -> (String, bool) {
        let fixed = format!("{:.*}", self.max_frac, value);
        let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

        let mut frac = frac_part.to_string();
        while frac.len() > self.min_frac && frac.ends_with('0') {
            frac.pop();
        }

        let significant = int_part.trim_start_matches('0');
        let mut int = format!("{significant:0>width$}", width = self.min_int);
        if int.is_empty() && frac.is_empty() {
            int.push('0');
        }

        let is_zero = int.chars().chain(frac.chars()).all(|c| c == '0');

        if let Some(size) = self.grouping {
            int = group(&int, size);
        }
        if !frac.is_empty() {
            int.push('.');
            int.push_str(&frac);
        }
        (int, is_zero)
    }
}

fn group(digits: &str, size: usize) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / size);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % size == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
