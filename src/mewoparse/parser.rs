//! Parser for Mewofiles.
//!
//! Each physical line (or run of continuation lines) becomes zero or more
//! statements in a flat list. Leading attributes are peeled off into their
//! own statements sharing the line's indentation, and the remaining text is
//! classified as a conditional marker, label, assignment, jump or command.

use super::ast::{Ast, AttrKind, Attribute, Stmt, StmtKind};
use super::error::{MewoError, MewoResult};
use super::scan::{
    count_indent, ends_with_continuation, extract_balanced, find_unquoted, is_empty_or_comment,
    is_identifier, split_top_level, strip_comment,
};
use crate::constants::MAX_ATTR_PARAMS;
use tracing::debug;

/// Parser state for processing Mewofile content.
pub struct Parser {
    /// All lines of the file
    lines: Vec<String>,
    /// Current position in the file (line index)
    current_index: usize,
    /// Statements produced so far
    stmts: Vec<Stmt>,
}

impl Parser {
    /// Creates a new parser from file content.
    ///
    /// # Arguments
    ///
    /// * `content` - The entire content of the Mewofile
    ///
    /// # Returns
    ///
    /// Returns a new `Parser` instance ready to parse the content.
    pub fn new(content: &str) -> Self {
        Self::from_lines(content.lines().map(|s| s.to_string()).collect())
    }

    /// Creates a parser over lines already split by the caller.
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            current_index: 0,
            stmts: Vec::new(),
        }
    }

    /// Gets the current line number (1-based).
    fn current_line_number(&self) -> usize {
        self.current_index + 1
    }

    /// Parses every line into the statement list.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Ast)` with the statements in source order, or the first
    /// syntax error encountered. Parsing stops at that error.
    pub fn parse(&mut self) -> MewoResult<Ast> {
        while self.current_index < self.lines.len() {
            self.parse_line()?;
            self.current_index += 1;
        }

        debug!(statements = self.stmts.len(), "parsed Mewofile");
        Ok(Ast {
            stmts: std::mem::take(&mut self.stmts),
        })
    }

    fn push(&mut self, kind: StmtKind, indent: usize, line: usize) {
        self.stmts.push(Stmt::new(kind, indent, line));
    }

    fn parse_line(&mut self) -> MewoResult<()> {
        let raw = self.lines[self.current_index].clone();
        if is_empty_or_comment(&raw) {
            return Ok(());
        }

        let line = self.current_line_number();
        let stripped = strip_comment(&raw);
        let indent = count_indent(stripped);
        let mut rest = stripped.trim();

        while let Some(after_hash) = rest.strip_prefix('#') {
            let (name, after_name) = split_attr_name(after_hash);
            match name {
                "" => {
                    return Err(MewoError::syntax(
                        "Expected attribute name after '#'",
                        line,
                    ))
                }
                "if" => {
                    let condition = parse_if_condition(after_name, line)?;
                    self.push(StmtKind::If { condition }, indent, line);
                    return Ok(());
                }
                "else" => {
                    self.push(StmtKind::Else, indent, line);
                    return Ok(());
                }
                "endif" => {
                    self.push(StmtKind::Endif, indent, line);
                    return Ok(());
                }
                _ => {
                    let (attr, remaining) = parse_attribute(name, after_name, line)?;
                    self.push(StmtKind::Attribute(attr), indent, line);
                    rest = remaining;
                }
            }
        }

        if rest.is_empty() {
            return Ok(());
        }

        if indent == 0 {
            if let Some(kind) = parse_label(rest, line)? {
                self.push(kind, indent, line);
                return Ok(());
            }
        }

        if let Some(kind) = parse_assignment(rest) {
            self.push(kind, indent, line);
            return Ok(());
        }

        if let Some(kind) = parse_jump(rest, line)? {
            self.push(kind, indent, line);
            return Ok(());
        }

        let raw = self.collect_continuation(rest);
        self.push(StmtKind::Command { raw }, indent, line);
        Ok(())
    }

    /// Joins lines ending in a single backslash with the lines after them.
    /// Each continuation line is comment-stripped and trimmed.
    fn collect_continuation(&mut self, first: &str) -> String {
        let mut acc = first.to_string();

        while ends_with_continuation(&acc) && self.current_index + 1 < self.lines.len() {
            acc.pop();
            acc.truncate(acc.trim_end().len());

            self.current_index += 1;
            let next = strip_comment(&self.lines[self.current_index]).trim();
            if !next.is_empty() {
                acc.push(' ');
                acc.push_str(next);
            }
        }

        acc
    }
}

/// Parses a whole Mewofile.
pub fn parse_source(content: &str) -> MewoResult<Ast> {
    Parser::new(content).parse()
}

/// Splits `name(rest` / `name rest` / `name: rest` after a `#`.
fn split_attr_name(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| c == '(' || c == ':' || c.is_whitespace())
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

fn parse_if_condition(after_if: &str, line: usize) -> MewoResult<String> {
    let inner = after_if
        .trim_start()
        .strip_prefix('(')
        .ok_or_else(|| MewoError::syntax("Expected '(' after '#if'", line))?;

    let (condition, tail) = extract_balanced(inner, '(', ')')
        .ok_or_else(|| MewoError::syntax("Unterminated #if condition", line))?;

    let tail = tail.trim();
    let tail = tail.strip_prefix(':').unwrap_or(tail).trim();
    if !tail.is_empty() {
        return Err(MewoError::syntax(
            format!("Unexpected text after #if condition: '{}'", tail),
            line,
        ));
    }

    Ok(condition.trim().to_string())
}

/// Parses one attribute and returns it with the text that follows it.
fn parse_attribute<'a>(
    name: &str,
    after_name: &'a str,
    line: usize,
) -> MewoResult<(Attribute, &'a str)> {
    let kind = AttrKind::from_name(name)
        .ok_or_else(|| MewoError::syntax(format!("Unknown directive '#{}'", name), line))?;

    let (params, tail) = match after_name.strip_prefix('(') {
        Some(inner) => {
            let (content, tail) = extract_balanced(inner, '(', ')').ok_or_else(|| {
                MewoError::syntax(format!("Unterminated parameter list for '#{}'", name), line)
            })?;

            let params: Vec<String> = if kind == AttrKind::Features {
                let content = content.trim();
                if content.is_empty() {
                    Vec::new()
                } else {
                    vec![content.to_string()]
                }
            } else {
                split_top_level(content, ',')
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            };

            if params.len() > MAX_ATTR_PARAMS {
                return Err(MewoError::syntax(
                    format!(
                        "Too many parameters for '#{}' (at most {})",
                        name, MAX_ATTR_PARAMS
                    ),
                    line,
                ));
            }
            (params, tail)
        }
        None => (Vec::new(), after_name),
    };

    let tail = tail.strip_prefix(':').unwrap_or(tail).trim_start();
    let attr = Attribute {
        name: name.to_string(),
        kind,
        params,
    };
    Ok((attr, tail))
}

/// Recognises `name:`, `name: targets...` and the anonymous `:`.
///
/// Text whose part before the colon contains whitespace or `=` is not a
/// label and is left for the other classifiers.
fn parse_label(rest: &str, line: usize) -> MewoResult<Option<StmtKind>> {
    let colon = match find_unquoted(rest, ':') {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let name = rest[..colon].trim();
    let after = rest[colon + 1..].trim();

    if name.is_empty() {
        if after.is_empty() {
            return Ok(Some(StmtKind::Label {
                name: String::new(),
            }));
        }
        return Err(MewoError::syntax("missing label name", line));
    }

    if name.contains(|c: char| c.is_whitespace() || c == '=') {
        return Ok(None);
    }

    if after.is_empty() {
        return Ok(Some(StmtKind::Label {
            name: name.to_string(),
        }));
    }

    let targets = after
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Some(StmtKind::LabelAlias {
        name: name.to_string(),
        targets,
    }))
}

/// Recognises `name = value` and `name[index] = value`.
///
/// `==` comparisons and the shell prefix form `NAME=value cmd args` are not
/// assignments.
fn parse_assignment(rest: &str) -> Option<StmtKind> {
    let eq = find_unquoted(rest, '=')?;
    let lhs_raw = &rest[..eq];
    let rhs_raw = &rest[eq + 1..];

    if rhs_raw.starts_with('=') {
        return None;
    }

    let value = rhs_raw.trim();
    let tight = !lhs_raw.ends_with(char::is_whitespace) && !rhs_raw.starts_with(char::is_whitespace);
    let spaced = find_unquoted(value, ' ').is_some() || find_unquoted(value, '\t').is_some();
    // Arrays and comma lists may hold spaces and still be values.
    let list = value.starts_with('[') || find_unquoted(value, ',').is_some();
    if tight && spaced && !list {
        return None;
    }

    let lhs = lhs_raw.trim();
    if let Some(open) = lhs.find('[') {
        let name = &lhs[..open];
        let index = lhs[open + 1..].strip_suffix(']')?;
        if !is_identifier(name) {
            return None;
        }
        return Some(StmtKind::IndexAssign {
            name: name.to_string(),
            index: index.trim().to_string(),
            value: value.to_string(),
        });
    }

    if !is_identifier(lhs) {
        return None;
    }

    Some(StmtKind::VarAssign {
        name: lhs.to_string(),
        value: value.to_string(),
    })
}

/// Recognises `goto <label>` and `call <label>`. A target that is not a
/// bare identifier leaves the line as an ordinary command.
fn parse_jump(rest: &str, line: usize) -> MewoResult<Option<StmtKind>> {
    let (word, target) = match rest.split_once(char::is_whitespace) {
        Some((word, target)) => (word, target.trim()),
        None => (rest, ""),
    };

    if word != "goto" && word != "call" {
        return Ok(None);
    }

    if target.is_empty() {
        return Err(MewoError::syntax(
            format!("Expected label name after '{}'", word),
            line,
        ));
    }

    if !is_identifier(target) {
        return Ok(None);
    }

    let target = target.to_string();
    Ok(Some(if word == "goto" {
        StmtKind::Goto { target }
    } else {
        StmtKind::Call { target }
    }))
}
