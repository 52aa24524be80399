//! Dynamically typed values stored in variables.
//!
//! Values are produced from the interpolated right-hand side of an
//! assignment by [`parse_value`] and rendered back to text whenever they are
//! interpolated.

use super::error::{MewoError, MewoResult};
use super::scan::split_top_level;
use super::vars::VariableStore;
use crate::constants::{BOOL_FALSE, BOOL_TRUE};
use std::fmt;

/// A variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    /// Ordered, possibly heterogeneous. Elements are owned copies.
    Array(Vec<Value>),
}

impl Value {
    /// Length as reported by `#len`: element count for arrays, character
    /// count for strings, 1 for any scalar.
    pub fn len(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            Value::String(s) => s.chars().count(),
            Value::Number(_) | Value::Bool(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` of an array, or character `index` of a string, as
    /// text. Scalars render as a whole. Out of range yields an empty string.
    pub fn index_text(&self, index: usize) -> String {
        match self {
            Value::Array(items) => items.get(index).map(|v| v.to_string()).unwrap_or_default(),
            Value::String(s) => s.chars().nth(index).map(String::from).unwrap_or_default(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Bool(true) => f.write_str(BOOL_TRUE),
            Value::Bool(false) => f.write_str(BOOL_FALSE),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

/// Renders a number: integral values below 1e15 print without a fraction,
/// everything else uses the C `%g` layout.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format_general(n)
    }
}

/// `%g` with six significant digits.
fn format_general(n: f64) -> String {
    const PRECISION: i32 = 6;

    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.abs()
        )
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Parses the interpolated text of an assignment into a typed value.
///
/// Recognised forms, tried in order:
/// - empty text (empty string)
/// - a top-level comma list (implicit array)
/// - a quoted string
/// - `true` / `false`
/// - a bracketed array literal, possibly nested
/// - a number
/// - a bare identifier, copied from the named variable
///
/// # Arguments
///
/// * `text` - The already interpolated value text
/// * `vars` - Variables consulted for identifier references
/// * `line` - Source line used in errors
///
/// # Returns
///
/// Returns the parsed value, a Syntax error for malformed literals, or a
/// Runtime error for a reference to an undefined variable.
pub fn parse_value(text: &str, vars: &VariableStore, line: usize) -> MewoResult<Value> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::String(String::new()));
    }

    let parts = split_top_level(text, ',');
    if parts.len() > 1 {
        return parse_elements(&parts, vars, line);
    }

    if let Some(quote) = text.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let body = &text[1..];
        return match body.find(quote) {
            Some(end) => Ok(Value::String(body[..end].to_string())),
            None => Err(MewoError::syntax("Unterminated string literal", line)),
        };
    }

    if text == BOOL_TRUE {
        return Ok(Value::Bool(true));
    }
    if text == BOOL_FALSE {
        return Ok(Value::Bool(false));
    }

    if let Some(inner) = text.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| MewoError::syntax("Unterminated array literal", line))?;
        return parse_elements(&split_top_level(inner, ','), vars, line);
    }

    if is_number_literal(text) {
        let number = text
            .parse::<f64>()
            .map_err(|_| MewoError::syntax("Invalid value", line))?;
        return Ok(Value::Number(number));
    }

    if super::scan::is_identifier(text) {
        return vars
            .get(text)
            .cloned()
            .ok_or_else(|| MewoError::runtime(format!("Undefined variable: '{}'", text), line));
    }

    Err(MewoError::syntax("Invalid value", line))
}

/// Empty elements are dropped, so `[1, , 2]` has two elements.
fn parse_elements(parts: &[&str], vars: &VariableStore, line: usize) -> MewoResult<Value> {
    let items = parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| parse_value(part, vars, line))
        .collect::<MewoResult<Vec<_>>>()?;
    Ok(Value::Array(items))
}

/// `[+-]digits[.digits]`, with at least one digit.
fn is_number_literal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let mut seen_dot = false;
    let mut seen_digit = false;

    for ch in unsigned.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }

    seen_digit
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse(text: &str) -> MewoResult<Value> {
        parse_value(text, &VariableStore::new(), 1)
    }

    #[rstest]
    #[case(5.0, "5")]
    #[case(-3.0, "-3")]
    #[case(2.5, "2.5")]
    #[case(0.1, "0.1")]
    #[case(1.0 / 3.0, "0.333333")]
    #[case(123456789.5, "1.23457e+08")]
    #[case(0.00001, "1e-05")]
    #[case(1e15, "1e+15")]
    #[case(100000.25, "100000")]
    fn test_format_number(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(format_number(n), expected);
    }

    #[test]
    fn test_display_array_is_comma_joined() {
        let value = Value::Array(vec![
            Value::Number(1.0),
            Value::String("two".to_string()),
            Value::Bool(true),
        ]);
        assert_eq!(value.to_string(), "1,two,true");
    }

    #[rstest]
    #[case("", Value::String(String::new()))]
    #[case("\"hi there\"", Value::String("hi there".to_string()))]
    #[case("'single'", Value::String("single".to_string()))]
    #[case("true", Value::Bool(true))]
    #[case("false", Value::Bool(false))]
    #[case("42", Value::Number(42.0))]
    #[case("-1.5", Value::Number(-1.5))]
    #[case("+7", Value::Number(7.0))]
    fn test_parse_scalars(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(parse(text).unwrap(), expected);
    }

    #[test]
    fn test_parse_arrays() {
        let explicit = parse("[1, \"a,b\", [true, 2]]").unwrap();
        assert_eq!(
            explicit,
            Value::Array(vec![
                Value::Number(1.0),
                Value::String("a,b".to_string()),
                Value::Array(vec![Value::Bool(true), Value::Number(2.0)]),
            ])
        );

        let implicit = parse("a_src, 'b', 3").unwrap_err();
        assert_eq!(implicit.message, "Undefined variable: 'a_src'");

        let implicit = parse("'a', 'b', 3").unwrap();
        assert_eq!(implicit.len(), 3);

        assert_eq!(parse("[]").unwrap(), Value::Array(Vec::new()));
        assert_eq!(parse("[1, , 2]").unwrap().len(), 2);
    }

    #[test]
    fn test_parse_identifier_copies_value() {
        let mut vars = VariableStore::new();
        vars.set("src", Value::Array(vec![Value::Number(1.0)]));
        let copy = parse_value("src", &vars, 1).unwrap();
        assert_eq!(copy, Value::Array(vec![Value::Number(1.0)]));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("\"open").unwrap_err().message, "Unterminated string literal");
        assert_eq!(parse("[1, 2").unwrap_err().message, "Unterminated array literal");
        assert_eq!(parse("hello world").unwrap_err().message, "Invalid value");
        assert_eq!(parse("1.2.3").unwrap_err().message, "Invalid value");
    }

    #[test]
    fn test_len_and_index() {
        let s = Value::String("héllo".to_string());
        assert_eq!(s.len(), 5);
        assert_eq!(s.index_text(1), "é");
        assert_eq!(s.index_text(10), "");
        assert_eq!(Value::Number(9.0).len(), 1);
        assert_eq!(Value::Number(9.0).index_text(3), "9");
    }
}
