//! Built-in column transformers.
//!
//! String positions are counted in characters, not bytes.

use super::{TransformOutcome, Transformer, TransformerError};
use crate::element::{Column, Record};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type TransformResult = Result<TransformOutcome, TransformerError>;

fn expect_params(name: &str, params: &[String], expected: usize) -> Result<(), TransformerError> {
    if params.len() != expected {
        return Err(TransformerError::IllegalParameter(format!(
            "{name} expects {expected} paras, got {}",
            params.len()
        )));
    }
    Ok(())
}

fn parse_usize(name: &str, label: &str, raw: &str) -> Result<usize, TransformerError> {
    raw.trim().parse().map_err(|_| {
        TransformerError::IllegalParameter(format!("{name} {label} must be a non-negative integer, got '{raw}'"))
    })
}

fn column_text(record: &Record, column_index: usize) -> Option<String> {
    record.get_column(column_index).and_then(Column::as_string)
}

fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// `dx_substr(start, length)`: keep `length` characters from `start`
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstrTransformer;

impl Transformer for SubstrTransformer {
    fn name(&self) -> &str {
        "dx_substr"
    }

    fn evaluate(&self, record: &mut Record, column_index: usize, params: &[String]) -> TransformResult {
        expect_params(self.name(), params, 2)?;
        let start = parse_usize(self.name(), "start", &params[0])?;
        let length = parse_usize(self.name(), "length", &params[1])?;

        let Some(original) = column_text(record, column_index) else {
            return Ok(TransformOutcome::Kept);
        };
        let char_count = original.chars().count();
        if start > char_count {
            return Err(TransformerError::Runtime(format!(
                "dx_substr start {start} is beyond value length {char_count}"
            )));
        }

        let end = start.saturating_add(length).min(char_count);
        record.set_column(column_index, Column::String(char_slice(&original, start, end)));
        Ok(TransformOutcome::Kept)
    }
}

/// `dx_pad(l|r, length, padString)`: pad or truncate to exactly `length` characters
#[derive(Debug, Default, Clone, Copy)]
pub struct PadTransformer;

impl Transformer for PadTransformer {
    fn name(&self) -> &str {
        "dx_pad"
    }

    fn evaluate(&self, record: &mut Record, column_index: usize, params: &[String]) -> TransformResult {
        expect_params(self.name(), params, 3)?;
        let left = match params[0].trim() {
            "l" | "L" => true,
            "r" | "R" => false,
            other => {
                return Err(TransformerError::IllegalParameter(format!(
                    "dx_pad direction must be 'l' or 'r', got '{other}'"
                )))
            }
        };
        let length = parse_usize(self.name(), "length", &params[1])?;
        let pad = &params[2];
        if pad.is_empty() {
            return Err(TransformerError::IllegalParameter(
                "dx_pad padString must not be empty".to_string(),
            ));
        }

        let original = column_text(record, column_index).unwrap_or_default();
        let char_count = original.chars().count();

        let padded = if length <= char_count {
            char_slice(&original, 0, length)
        } else {
            let filler: String = pad.chars().cycle().take(length - char_count).collect();
            if left {
                format!("{filler}{original}")
            } else {
                format!("{original}{filler}")
            }
        };

        record.set_column(column_index, Column::String(padded));
        Ok(TransformOutcome::Kept)
    }
}

/// `dx_replace(start, length, replacement)`: replace a character range
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaceTransformer;

impl Transformer for ReplaceTransformer {
    fn name(&self) -> &str {
        "dx_replace"
    }

    fn evaluate(&self, record: &mut Record, column_index: usize, params: &[String]) -> TransformResult {
        expect_params(self.name(), params, 3)?;
        let start = parse_usize(self.name(), "start", &params[0])?;
        let length = parse_usize(self.name(), "length", &params[1])?;
        let replacement = &params[2];

        let Some(original) = column_text(record, column_index) else {
            return Ok(TransformOutcome::Kept);
        };
        let char_count = original.chars().count();
        if start > char_count {
            return Err(TransformerError::Runtime(format!(
                "dx_replace start {start} is beyond value length {char_count}"
            )));
        }

        let end = start.saturating_add(length).min(char_count);
        let replaced = format!(
            "{}{}{}",
            char_slice(&original, 0, start),
            replacement,
            char_slice(&original, end, char_count)
        );
        record.set_column(column_index, Column::String(replaced));
        Ok(TransformOutcome::Kept)
    }
}

/// Exact decimal: `mantissa / 10^scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Plain or exponent notation, e.g. `-12.50` or `1.2e3`
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (number, exponent) = match text.find(|c: char| c == 'e' || c == 'E') {
            Some(pos) => (&text[..pos], text[pos + 1..].parse::<i32>().ok()?),
            None => (text, 0),
        };
        let (negative, digits) = match number.as_bytes().first()? {
            b'-' => (true, &number[1..]),
            b'+' => (false, &number[1..]),
            _ => (false, number),
        };
        let (integer, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if integer.is_empty() && fraction.is_empty() {
            return None;
        }

        let mut mantissa: i128 = 0;
        for ch in integer.chars().chain(fraction.chars()) {
            let digit = ch.to_digit(10)?;
            mantissa = mantissa.checked_mul(10)?.checked_add(i128::from(digit))?;
        }
        if negative {
            mantissa = -mantissa;
        }

        let scale = i64::try_from(fraction.len()).ok()? - i64::from(exponent);
        if scale >= 0 {
            Some(Self {
                mantissa,
                scale: u32::try_from(scale).ok()?,
            })
        } else {
            let shift = u32::try_from(-scale).ok()?;
            Some(Self {
                mantissa: mantissa.checked_mul(10i128.checked_pow(shift)?)?,
                scale: 0,
            })
        }
    }

    fn rescale(self, scale: u32) -> Option<i128> {
        self.mantissa.checked_mul(10i128.checked_pow(scale.checked_sub(self.scale)?)?)
    }

    fn aligned(self, other: Self) -> Option<(i128, i128, u32)> {
        let scale = self.scale.max(other.scale);
        Some((self.rescale(scale)?, other.rescale(scale)?, scale))
    }

    fn checked_add(self, other: Self) -> Option<Self> {
        let (a, b, scale) = self.aligned(other)?;
        Some(Self { mantissa: a.checked_add(b)?, scale })
    }

    fn checked_sub(self, other: Self) -> Option<Self> {
        let (a, b, scale) = self.aligned(other)?;
        Some(Self { mantissa: a.checked_sub(b)?, scale })
    }

    fn checked_mul(self, other: Self) -> Option<Self> {
        Some(Self {
            mantissa: self.mantissa.checked_mul(other.mantissa)?,
            scale: self.scale.checked_add(other.scale)?,
        })
    }

    /// Quotient at `scale` fraction digits, rounding half away from zero
    fn checked_div(self, other: Self, scale: u32) -> Option<Self> {
        let numerator = self
            .mantissa
            .checked_mul(10i128.checked_pow(scale.checked_add(other.scale)?)?)?;
        let denominator = other.mantissa.checked_mul(10i128.checked_pow(self.scale)?)?;
        let quotient = numerator / denominator;
        let remainder = numerator % denominator;
        let round_up = remainder.unsigned_abs().checked_mul(2)? >= denominator.unsigned_abs();
        let mantissa = if round_up {
            quotient.checked_add(numerator.signum() * denominator.signum())?
        } else {
            quotient
        };
        Some(Self { mantissa, scale })
    }

    /// Remainder carrying the sign of the dividend
    fn checked_rem(self, other: Self) -> Option<Self> {
        let (a, b, scale) = self.aligned(other)?;
        Some(Self { mantissa: a.checked_rem(b)?, scale })
    }

    fn checked_pow(self, exponent: u32) -> Option<Self> {
        Some(Self {
            mantissa: self.mantissa.checked_pow(exponent)?,
            scale: self.scale.checked_mul(exponent)?,
        })
    }

    fn is_zero(self) -> bool {
        self.mantissa == 0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let digits = format!("{digits:0>width$}", width = scale + 1);
        let (integer, fraction) = digits.split_at(digits.len() - scale);
        write!(f, "{sign}{integer}.{fraction}")
    }
}

/// `dx_map(op, value)`: exact arithmetic on a numeric column
///
/// `op` is one of `+ - * / % ^`. Division keeps as many fraction digits as
/// the column value has (two when it has none) and rounds half up; `^` takes
/// an integer exponent. The result is written back as a string column.
/// A null column is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapTransformer;

impl MapTransformer {
    const OPERATORS: [&'static str; 6] = ["+", "-", "*", "/", "%", "^"];
    const DEFAULT_DIVIDE_SCALE: u32 = 2;

    fn is_operator(op: &str) -> bool {
        Self::OPERATORS.iter().any(|candidate| *candidate == op)
    }

    fn number(label: &str, raw: &str) -> Result<Decimal, TransformerError> {
        Decimal::parse(raw)
            .ok_or_else(|| TransformerError::IllegalParameter(format!("dx_map {label} '{raw}' is not a number")))
    }

    fn divide_scale(text: &str) -> u32 {
        text.trim()
            .split_once('.')
            .map(|(_, fraction)| fraction.len())
            .filter(|digits| *digits > 0)
            .and_then(|digits| u32::try_from(digits).ok())
            .unwrap_or(Self::DEFAULT_DIVIDE_SCALE)
    }

    fn apply(op: &str, text: &str, left: Decimal, operand: &str) -> Result<Decimal, TransformerError> {
        let overflow = || TransformerError::Runtime(format!("dx_map {text} {op} {operand} overflows"));
        if op == "^" {
            let exponent: u32 = operand.trim().parse().map_err(|_| {
                TransformerError::Runtime(format!("dx_map exponent must be a non-negative integer, got '{operand}'"))
            })?;
            return left.checked_pow(exponent).ok_or_else(overflow);
        }

        let right = Self::number("value", operand)?;
        if matches!(op, "/" | "%") && right.is_zero() {
            return Err(TransformerError::Runtime("dx_map divisor cannot be zero".to_string()));
        }
        let result = match op {
            "+" => left.checked_add(right),
            "-" => left.checked_sub(right),
            "*" => left.checked_mul(right),
            "/" => left.checked_div(right, Self::divide_scale(text)),
            _ => left.checked_rem(right),
        };
        result.ok_or_else(overflow)
    }
}

impl Transformer for MapTransformer {
    fn name(&self) -> &str {
        "dx_map"
    }

    fn specialize(&self, params: &[String]) -> Result<Option<Arc<dyn Transformer>>, TransformerError> {
        expect_params(self.name(), params, 2)?;
        if !Self::is_operator(params[0].trim()) {
            return Err(TransformerError::IllegalParameter(format!(
                "dx_map does not support operator '{}'",
                params[0]
            )));
        }
        Self::number("value", &params[1])?;
        Ok(None)
    }

    fn evaluate(&self, record: &mut Record, column_index: usize, params: &[String]) -> TransformResult {
        expect_params(self.name(), params, 2)?;
        let op = params[0].trim();
        if !Self::is_operator(op) {
            return Err(TransformerError::IllegalParameter(format!(
                "dx_map does not support operator '{op}'"
            )));
        }

        let Some(text) = column_text(record, column_index) else {
            return Ok(TransformOutcome::Kept);
        };
        let left = Self::number("column value", &text)?;
        let result = Self::apply(op, &text, left, &params[1])?;

        record.set_column(column_index, Column::String(result.to_string()));
        Ok(TransformOutcome::Kept)
    }
}

/// `dx_filter(op, value)`: drop records whose column satisfies the condition
///
/// `like` / `not like` take a regular expression that must match the whole
/// value. Numeric columns compare numerically, everything else compares as
/// text. A null column equals only the literal `null`.
#[derive(Debug, Default, Clone)]
pub struct FilterTransformer {
    /// Anchored `like` pattern compiled by [`Transformer::specialize`]
    pattern: Option<Regex>,
}

impl FilterTransformer {
    fn compile(operand: &str) -> Result<Regex, TransformerError> {
        Regex::new(&format!("^(?:{operand})$")).map_err(|e| {
            TransformerError::IllegalParameter(format!("dx_filter pattern '{operand}' is invalid: {e}"))
        })
    }

    fn is_like(op: &str) -> bool {
        matches!(op, "like" | "not like")
    }

    fn matches(&self, op: &str, column: &Column, operand: &str) -> Result<bool, TransformerError> {
        match op {
            "like" | "not like" => {
                let hit = match &self.pattern {
                    Some(pattern) => column.as_string().is_some_and(|text| pattern.is_match(&text)),
                    None => {
                        let pattern = Self::compile(operand)?;
                        column.as_string().is_some_and(|text| pattern.is_match(&text))
                    }
                };
                Ok(if op == "like" { hit } else { !hit })
            }
            "=" | "==" | "!=" | ">" | "<" | ">=" | "<=" => {
                let Some(ordering) = Self::compare(column, operand)? else {
                    // null only takes part in equality against the literal null
                    let is_null_literal = operand.trim().eq_ignore_ascii_case("null");
                    return Ok(match op {
                        "=" | "==" => is_null_literal,
                        "!=" => !is_null_literal,
                        _ => false,
                    });
                };
                Ok(match op {
                    "=" | "==" => ordering == Ordering::Equal,
                    "!=" => ordering != Ordering::Equal,
                    ">" => ordering == Ordering::Greater,
                    "<" => ordering == Ordering::Less,
                    ">=" => ordering != Ordering::Less,
                    _ => ordering != Ordering::Greater,
                })
            }
            other => Err(TransformerError::IllegalParameter(format!(
                "dx_filter does not support operator '{other}'"
            ))),
        }
    }

    fn compare(column: &Column, operand: &str) -> Result<Option<Ordering>, TransformerError> {
        match column {
            Column::Null => Ok(None),
            Column::Long(_) | Column::Double(_) => {
                let value = column
                    .as_double()
                    .map_err(|e| TransformerError::Runtime(e.to_string()))?
                    .unwrap_or_default();
                let target: f64 = operand.trim().parse().map_err(|_| {
                    TransformerError::Runtime(format!("dx_filter cannot compare a number with '{operand}'"))
                })?;
                Ok(value.partial_cmp(&target))
            }
            other => Ok(other.as_string().map(|text| text.as_str().cmp(operand))),
        }
    }
}

impl Transformer for FilterTransformer {
    fn name(&self) -> &str {
        "dx_filter"
    }

    fn specialize(&self, params: &[String]) -> Result<Option<Arc<dyn Transformer>>, TransformerError> {
        expect_params(self.name(), params, 2)?;
        if !Self::is_like(&params[0].trim().to_ascii_lowercase()) {
            return Ok(None);
        }
        Ok(Some(Arc::new(Self {
            pattern: Some(Self::compile(&params[1])?),
        })))
    }

    fn evaluate(&self, record: &mut Record, column_index: usize, params: &[String]) -> TransformResult {
        expect_params(self.name(), params, 2)?;
        let op = params[0].trim().to_ascii_lowercase();
        let column = record.get_column(column_index).cloned().unwrap_or(Column::Null);

        if self.matches(&op, &column, &params[1])? {
            Ok(TransformOutcome::Filtered)
        } else {
            Ok(TransformOutcome::Kept)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn run(transformer: &dyn Transformer, value: Column, paras: &[&str]) -> Result<(TransformOutcome, Column), TransformerError> {
        let mut record = Record::from_columns([value]);
        let outcome = transformer.evaluate(&mut record, 0, &params(paras))?;
        Ok((outcome, record.get_column(0).cloned().unwrap_or(Column::Null)))
    }

    #[test]
    fn test_substr() {
        let (_, out) = run(&SubstrTransformer, Column::from("abcdef"), &["1", "3"]).unwrap();
        assert_eq!(out, Column::from("bcd"));

        let (_, tail) = run(&SubstrTransformer, Column::from("abcdef"), &["4", "10"]).unwrap();
        assert_eq!(tail, Column::from("ef"));

        assert!(matches!(
            run(&SubstrTransformer, Column::from("ab"), &["5", "1"]),
            Err(TransformerError::Runtime(_))
        ));
        assert!(matches!(
            run(&SubstrTransformer, Column::from("ab"), &["x", "1"]),
            Err(TransformerError::IllegalParameter(_))
        ));
    }

    #[test]
    fn test_pad() {
        let (_, left) = run(&PadTransformer, Column::from("7"), &["l", "4", "0"]).unwrap();
        assert_eq!(left, Column::from("0007"));

        let (_, right) = run(&PadTransformer, Column::from("ab"), &["r", "5", "xy"]).unwrap();
        assert_eq!(right, Column::from("abxyx"));

        let (_, truncated) = run(&PadTransformer, Column::from("abcdef"), &["l", "3", "0"]).unwrap();
        assert_eq!(truncated, Column::from("abc"));
    }

    #[test]
    fn test_replace() {
        let (_, masked) = run(&ReplaceTransformer, Column::from("13812345678"), &["3", "4", "****"]).unwrap();
        assert_eq!(masked, Column::from("138****5678"));

        let (_, tail) = run(&ReplaceTransformer, Column::from("abc"), &["1", "10", "Z"]).unwrap();
        assert_eq!(tail, Column::from("aZ"));
    }

    #[test]
    fn test_filter_numeric_and_text() {
        let (outcome, _) = run(&FilterTransformer::default(), Column::Long(150), &[">", "100"]).unwrap();
        assert_eq!(outcome, TransformOutcome::Filtered);
        let (outcome, _) = run(&FilterTransformer::default(), Column::Long(150), &["<=", "100"]).unwrap();
        assert_eq!(outcome, TransformOutcome::Kept);

        let (outcome, _) = run(&FilterTransformer::default(), Column::from("error-42"), &["like", "error-.*"]).unwrap();
        assert_eq!(outcome, TransformOutcome::Filtered);
        let (outcome, _) = run(&FilterTransformer::default(), Column::from("ok"), &["not like", "error-.*"]).unwrap();
        assert_eq!(outcome, TransformOutcome::Filtered);
    }

    #[test]
    fn test_filter_null_and_bad_operator() {
        let (outcome, _) = run(&FilterTransformer::default(), Column::Null, &["=", "null"]).unwrap();
        assert_eq!(outcome, TransformOutcome::Filtered);
        let (outcome, _) = run(&FilterTransformer::default(), Column::Null, &[">", "1"]).unwrap();
        assert_eq!(outcome, TransformOutcome::Kept);

        assert!(matches!(
            run(&FilterTransformer::default(), Column::Null, &["~", "1"]),
            Err(TransformerError::IllegalParameter(_))
        ));
        assert!(matches!(
            run(&FilterTransformer::default(), Column::Long(1), &[">", "abc"]),
            Err(TransformerError::Runtime(_))
        ));
    }

    fn map(value: Column, op: &str, operand: &str) -> Result<Column, TransformerError> {
        run(&MapTransformer, value, &[op, operand]).map(|(_, column)| column)
    }

    #[test]
    fn test_map_arithmetic() {
        assert_eq!(map(Column::Long(10), "+", "2.5").unwrap(), Column::from("12.5"));
        assert_eq!(map(Column::from("1.10"), "-", "0.2").unwrap(), Column::from("0.90"));
        assert_eq!(map(Column::from("1.5"), "*", "2").unwrap(), Column::from("3.0"));
        assert_eq!(map(Column::Long(-7), "%", "3").unwrap(), Column::from("-1"));
        assert_eq!(map(Column::from("1.5"), "^", "2").unwrap(), Column::from("2.25"));
    }

    #[test]
    fn test_map_divide_uses_column_scale() {
        // no fraction digits: two, rounded half up
        assert_eq!(map(Column::Long(10), "/", "3").unwrap(), Column::from("3.33"));
        assert_eq!(map(Column::Long(2), "/", "3").unwrap(), Column::from("0.67"));
        assert_eq!(map(Column::from("10.0"), "/", "4").unwrap(), Column::from("2.5"));
        assert_eq!(map(Column::from("-1.000"), "/", "8").unwrap(), Column::from("-0.125"));
        assert_eq!(map(Column::from("-1.0"), "/", "4").unwrap(), Column::from("-0.3"));
    }

    #[test]
    fn test_map_null_is_kept_and_errors_are_classified() {
        assert_eq!(map(Column::Null, "+", "1").unwrap(), Column::Null);

        assert!(matches!(map(Column::from("abc"), "+", "1"), Err(TransformerError::IllegalParameter(_))));
        assert!(matches!(map(Column::Long(1), "+", "x"), Err(TransformerError::IllegalParameter(_))));
        assert!(matches!(map(Column::Long(1), "&", "1"), Err(TransformerError::IllegalParameter(_))));
        assert!(matches!(map(Column::Long(1), "/", "0"), Err(TransformerError::Runtime(_))));
        assert!(matches!(map(Column::Long(2), "^", "-1"), Err(TransformerError::Runtime(_))));
        assert!(matches!(map(Column::Long(10), "^", "500"), Err(TransformerError::Runtime(_))));
    }

    #[test]
    fn test_map_specialize_validates_paras() {
        assert!(MapTransformer.specialize(&params(&["*", "3"])).unwrap().is_none());
        assert!(MapTransformer.specialize(&params(&["?", "3"])).is_err());
        assert!(MapTransformer.specialize(&params(&["*", "three"])).is_err());
        assert!(MapTransformer.specialize(&params(&["*"])).is_err());
    }

    #[test]
    fn test_filter_specialize_precompiles_like_pattern() {
        let bound = FilterTransformer::default()
            .specialize(&params(&["like", "a+b"]))
            .unwrap()
            .unwrap();
        let mut record = Record::from_columns([Column::from("aaab")]);
        assert_eq!(
            bound.evaluate(&mut record, 0, &params(&["like", "a+b"])).unwrap(),
            TransformOutcome::Filtered
        );

        assert!(FilterTransformer::default().specialize(&params(&[">", "1"])).unwrap().is_none());
        assert!(matches!(
            FilterTransformer::default().specialize(&params(&["like", "("])),
            Err(TransformerError::IllegalParameter(_))
        ));
    }

    #[test]
    fn test_decimal_parse_and_display() {
        assert_eq!(Decimal::parse("-0.05").unwrap().to_string(), "-0.05");
        assert_eq!(Decimal::parse("1.2e3").unwrap().to_string(), "1200");
        assert_eq!(Decimal::parse("15e-1").unwrap().to_string(), "1.5");
        assert_eq!(Decimal::parse(".5").unwrap().to_string(), "0.5");
        assert!(Decimal::parse("").is_none());
        assert!(Decimal::parse("-").is_none());
        assert!(Decimal::parse("1.2.3").is_none());
    }
}
