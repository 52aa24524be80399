//! Interpolation of `${...}` expressions.
//!
//! Supported forms:
//! - `${name}`, `${name[i]}` - variables and elements
//! - `${argv}`, `${N}`, `$N` - positional arguments
//! - `$?` - exit code of the last command
//! - `${#len(x)}`, `${#env(NAME, default)}`, `${#exec("cmd", shell)}` - built-ins
//! - `$${...}`, `$$N` - literal escapes
//!
//! The text inside `${...}` is interpolated before it is evaluated, so
//! `${${name}}` looks up the variable whose name is stored in `name`.

use super::error::{MewoError, MewoResult};
use super::executor::ProcessRunner;
use super::platform::Platform;
use super::scan::{extract_balanced, is_identifier};
use super::vars::RuntimeState;
use crate::constants::{ARGV_NAME, EXEC_CAPTURE_LIMIT};
use tracing::debug;

/// Expands interpolation forms against the current run state.
pub struct TemplateProcessor<'a> {
    state: &'a RuntimeState,
    platform: &'a dyn Platform,
    runner: &'a dyn ProcessRunner,
    dry_run: bool,
}

impl<'a> TemplateProcessor<'a> {
    /// Creates a processor.
    ///
    /// # Arguments
    ///
    /// * `state` - Variables, positional arguments and the last exit code
    /// * `platform` - Environment lookups for `#env`
    /// * `runner` - Subprocess runner for `#exec`
    /// * `dry_run` - When set, `#exec` expands to nothing and spawns nothing
    pub fn new(
        state: &'a RuntimeState,
        platform: &'a dyn Platform,
        runner: &'a dyn ProcessRunner,
        dry_run: bool,
    ) -> Self {
        Self {
            state,
            platform,
            runner,
            dry_run,
        }
    }

    pub fn state(&self) -> &'a RuntimeState {
        self.state
    }

    pub fn platform(&self) -> &'a dyn Platform {
        self.platform
    }

    /// Expands every interpolation form in `text`.
    ///
    /// # Arguments
    ///
    /// * `text` - Raw text from the Mewofile
    /// * `line` - Source line used in errors
    ///
    /// # Returns
    ///
    /// Returns the expanded text, or the first error raised by any nested
    /// expression: Syntax for malformed expressions, Runtime for undefined
    /// variables or failed `#exec` commands.
    pub fn process(&self, text: &str, line: usize) -> MewoResult<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            rest = self.expand_dollar(&rest[pos..], &mut out, line)?;
        }
        out.push_str(rest);

        Ok(out)
    }

    /// Handles one form starting at a `$` and returns the text after it.
    fn expand_dollar<'t>(&self, text: &'t str, out: &mut String, line: usize) -> MewoResult<&'t str> {
        let after = &text[1..];

        if let Some(escaped) = after.strip_prefix("${") {
            let (content, rest) = extract_balanced(escaped, '{', '}')
                .ok_or_else(|| MewoError::syntax("Unterminated $${} escape", line))?;
            out.push_str("${");
            out.push_str(content);
            out.push('}');
            return Ok(rest);
        }

        if let Some(escaped) = after.strip_prefix('$') {
            if let Some(digit) = escaped.chars().next().filter(char::is_ascii_digit) {
                out.push('$');
                out.push(digit);
                return Ok(&escaped[1..]);
            }
        }

        if after.starts_with(|c: char| c.is_ascii_digit()) {
            let end = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            out.push_str(self.positional(&after[..end]));
            return Ok(&after[end..]);
        }

        if let Some(rest) = after.strip_prefix('?') {
            out.push_str(&self.state.last_exit_code.to_string());
            return Ok(rest);
        }

        if let Some(braced) = after.strip_prefix('{') {
            let (content, rest) = extract_balanced(braced, '{', '}')
                .ok_or_else(|| MewoError::syntax("Unterminated ${} expression", line))?;
            let expr = self.process(content, line)?;
            out.push_str(&self.evaluate(&expr, line)?);
            return Ok(rest);
        }

        out.push('$');
        Ok(after)
    }

    /// Evaluates the (already interpolated) text of a `${...}` expression.
    fn evaluate(&self, expr: &str, line: usize) -> MewoResult<String> {
        if !expr.is_empty() && expr.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(self.positional(expr).to_string());
        }

        if expr == ARGV_NAME {
            return Ok(self.state.argv.join(" "));
        }

        if let Some(arg) = builtin_arg(expr, "#len(") {
            return Ok(self.length_of(arg.trim()).to_string());
        }

        if let Some(arg) = builtin_arg(expr, "#env(") {
            return Ok(self.env_lookup(arg));
        }

        if let Some(arg) = builtin_arg(expr, "#exec(") {
            return self.exec(arg, line);
        }

        if let Some(open) = expr.find('[') {
            if let Some(index) = expr[open + 1..].strip_suffix(']') {
                return self.index(&expr[..open], index, line);
            }
        }

        if !is_identifier(expr) {
            return Err(MewoError::syntax(
                format!("Invalid variable name: '{}'", expr),
                line,
            ));
        }

        self.state
            .vars
            .get(expr)
            .map(|value| value.to_string())
            .ok_or_else(|| MewoError::runtime(format!("Undefined variable: '{}'", expr), line))
    }

    /// Positional argument by decimal index; empty when out of range.
    fn positional(&self, digits: &str) -> &str {
        digits
            .parse::<usize>()
            .ok()
            .and_then(|i| self.state.argv.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// `#len(x)`: argument count for `argv`, else the variable's length,
    /// 0 when undefined.
    pub fn length_of(&self, name: &str) -> usize {
        if name == ARGV_NAME {
            return self.state.argv.len();
        }
        self.state.vars.get(name).map(|v| v.len()).unwrap_or(0)
    }

    /// `#env(NAME)` or `#env(NAME, default)`.
    fn env_lookup(&self, arg: &str) -> String {
        let (name, default) = match arg.split_once(',') {
            Some((name, default)) => (name.trim(), default.trim()),
            None => (arg.trim(), ""),
        };
        self.platform
            .env_var(name)
            .unwrap_or_else(|| default.to_string())
    }

    /// `#exec("cmd")` or `#exec("cmd", shell)`.
    fn exec(&self, arg: &str, line: usize) -> MewoResult<String> {
        let body = arg
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(|| MewoError::syntax("Expected quoted command in #exec()", line))?;

        let mut command = String::new();
        let mut chars = body.char_indices();
        let mut closing = None;
        while let Some((i, ch)) = chars.next() {
            match ch {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        command.push(escaped);
                    }
                }
                '"' => {
                    closing = Some(i);
                    break;
                }
                _ => command.push(ch),
            }
        }
        let closing = closing
            .ok_or_else(|| MewoError::syntax("Unterminated quoted command in #exec()", line))?;

        let tail = body[closing + 1..].trim();
        let shell = tail
            .strip_prefix(',')
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if self.dry_run {
            debug!(command = %command, "dry-run: not running #exec");
            return Ok(String::new());
        }

        let mut output = self
            .runner
            .capture(&command, shell, EXEC_CAPTURE_LIMIT)
            .map_err(|e| MewoError::runtime(format!("Failed to execute command: {}", e), line))?;

        if output.ends_with('\n') {
            output.pop();
            if output.ends_with('\r') {
                output.pop();
            }
        }
        Ok(output)
    }

    /// `name[index]`.
    fn index(&self, name: &str, index: &str, line: usize) -> MewoResult<String> {
        if !is_identifier(name) {
            return Err(MewoError::syntax(
                format!("Invalid variable name: '{}'", name),
                line,
            ));
        }
        let index: usize = index
            .trim()
            .parse()
            .map_err(|_| MewoError::syntax(format!("Invalid index '{}'", index.trim()), line))?;

        let value = self
            .state
            .vars
            .get(name)
            .ok_or_else(|| MewoError::runtime(format!("Undefined variable: '{}'", name), line))?;
        Ok(value.index_text(index))
    }
}

/// Returns the argument text of `prefix...)`.
fn builtin_arg<'e>(expr: &'e str, prefix: &str) -> Option<&'e str> {
    expr.strip_prefix(prefix)?.strip_suffix(')')
}
