//! Condition evaluation for `#if`, `#assert` and conditional attributes.
//!
//! A condition is checked in this order:
//! 1. the built-ins `#defined(x)`, `#feature(x)`, `#len(x)`
//! 2. a conditional attribute such as `#linux` or `#env(CI)`
//! 3. `lhs == rhs` / `lhs != rhs`, compared as interpolated text
//! 4. truthiness of the interpolated text

use super::ast::{AttrKind, Attribute};
use super::error::{MewoError, MewoResult};
use super::platform::OsFamily;
use super::scan::{extract_balanced, split_top_level, unquote};
use super::template::TemplateProcessor;
use super::value::Value;
use crate::constants::{BOOL_FALSE, BOOL_TRUE};

/// Evaluates a condition expression.
///
/// # Arguments
///
/// * `condition` - The raw condition text (inside `#if(...)` or `#assert(...)`)
/// * `templates` - Interpolation context, which also carries the run state
/// * `line` - Source line used in errors
///
/// # Returns
///
/// Returns `Ok(true)` if the condition holds, `Ok(false)` if not, or the
/// error raised while interpolating it.
pub fn evaluate_condition(
    condition: &str,
    templates: &TemplateProcessor,
    line: usize,
) -> MewoResult<bool> {
    let condition = condition.trim();
    let state = templates.state();

    if let Some(name) = call_arg(condition, "#defined") {
        return Ok(state.vars.contains(name.trim()));
    }
    if let Some(name) = call_arg(condition, "#feature") {
        return Ok(state.features.is_enabled(name));
    }
    if let Some(name) = call_arg(condition, "#len") {
        return Ok(templates.length_of(name.trim()) > 0);
    }

    if let Some(attr) = attribute_form(condition, line)? {
        return check_conditional_attr(&attr, templates, line);
    }

    if let Some((pos, equal)) = find_comparison(condition) {
        let lhs = templates.process(&condition[..pos], line)?;
        let rhs = templates.process(&condition[pos + 2..], line)?;
        let same = unquote(&lhs).trim() == unquote(&rhs).trim();
        return Ok(same == equal);
    }

    let text = templates.process(condition, line)?;
    Ok(is_truthy(&text))
}

/// Truthiness of interpolated text: `false`, empty text and numeric zero
/// are false, everything else is true.
pub fn is_truthy(text: &str) -> bool {
    let text = text.trim();
    match text {
        BOOL_TRUE => true,
        BOOL_FALSE | "" => false,
        _ => text.parse::<f64>().map(|n| n != 0.0).unwrap_or(true),
    }
}

/// Checks whether a conditional attribute holds on this platform.
/// Non-conditional attributes always hold.
pub fn check_conditional_attr(
    attr: &Attribute,
    templates: &TemplateProcessor,
    line: usize,
) -> MewoResult<bool> {
    let platform = templates.platform();
    let os = platform.os();

    let holds = match attr.kind {
        AttrKind::Windows => os == OsFamily::Windows,
        AttrKind::Linux => os == OsFamily::Linux,
        AttrKind::MacOs => os == OsFamily::MacOs,
        AttrKind::Unix => os.is_unix(),
        AttrKind::Arch => match param_text(attr, 0, templates, line)? {
            Some(expected) => expected == platform.arch(),
            None => false,
        },
        AttrKind::Distro => match param_text(attr, 0, templates, line)? {
            Some(expected) => expected == platform.distro(),
            None => false,
        },
        AttrKind::Feature => match param_text(attr, 0, templates, line)? {
            Some(name) => templates.state().features.is_enabled(&name),
            None => false,
        },
        AttrKind::Env => match param_text(attr, 0, templates, line)? {
            Some(name) => match platform.env_var(&name) {
                Some(actual) => match param_text(attr, 1, templates, line)? {
                    Some(expected) => actual == expected,
                    None => true,
                },
                None => false,
            },
            None => false,
        },
        AttrKind::Exists => match attr.param(0) {
            Some(raw) => platform.path_exists(&exists_path(raw, templates, line)?),
            None => false,
        },
        _ => true,
    };

    Ok(holds)
}

/// Interpolated, unquoted parameter `index`.
fn param_text(
    attr: &Attribute,
    index: usize,
    templates: &TemplateProcessor,
    line: usize,
) -> MewoResult<Option<String>> {
    match attr.param(index) {
        Some(raw) => {
            let text = templates.process(raw, line)?;
            Ok(Some(unquote(&text).to_string()))
        }
        None => Ok(None),
    }
}

/// `#exists` takes a quoted literal, the value of a string variable named
/// by the parameter, or otherwise the interpolated parameter.
fn exists_path(raw: &str, templates: &TemplateProcessor, line: usize) -> MewoResult<String> {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Ok(raw[1..raw.len() - 1].to_string());
    }
    if let Some(Value::String(path)) = templates.state().vars.get(raw) {
        return Ok(path.clone());
    }
    let text = templates.process(raw, line)?;
    Ok(unquote(&text).to_string())
}

/// Argument of `name(...)` when the whole condition is that call.
fn call_arg<'c>(condition: &'c str, name: &str) -> Option<&'c str> {
    let inner = condition.strip_prefix(name)?.strip_prefix('(')?;
    let (arg, rest) = extract_balanced(inner, '(', ')')?;
    rest.trim().is_empty().then_some(arg)
}

/// Parses a condition written exactly as `#name` or `#name(params)`.
/// Returns `None` for anything else, such as `#len(x) == 3`.
fn attribute_form(condition: &str, line: usize) -> MewoResult<Option<Attribute>> {
    let body = match condition.strip_prefix('#') {
        Some(body) => body,
        None => return Ok(None),
    };

    let name_end = body.find('(').unwrap_or(body.len());
    let name = &body[..name_end];
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Ok(None);
    }

    let params = if name_end < body.len() {
        match extract_balanced(&body[name_end + 1..], '(', ')') {
            Some((inner, rest)) if rest.trim().is_empty() => split_top_level(inner, ',')
                .into_iter()
                .map(str::to_string)
                .collect(),
            _ => return Ok(None),
        }
    } else {
        Vec::new()
    };

    match AttrKind::from_name(name) {
        Some(kind) if kind.is_conditional() => Ok(Some(Attribute {
            name: name.to_string(),
            kind,
            params,
        })),
        _ => Err(MewoError::syntax(
            format!("Unknown condition '#{}'", name),
            line,
        )),
    }
}

/// Position of the first `==` or `!=` outside quotes and brackets, and
/// whether it is `==`.
fn find_comparison(condition: &str) -> Option<(usize, bool)> {
    let bytes = condition.as_bytes();
    let mut quote: Option<u8> = None;
    let mut depth = 0i32;

    for i in 0..bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'(' | b'{' | b'[' => depth += 1,
            b')' | b'}' | b']' => depth -= 1,
            b'=' | b'!' if depth == 0 && bytes.get(i + 1) == Some(&b'=') => {
                return Some((i, b == b'='));
            }
            _ => {}
        }
    }

    None
}
