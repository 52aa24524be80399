//! Statement list produced by the parser.
//!
//! The list is flat. Label bodies and `#if` ranges are not nested nodes;
//! they are recovered at execution time from each statement's indentation
//! and from the conditional markers.

use std::fmt;

/// Known attribute names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    /// Shell override for the next command, or for all with `global`
    Shell,
    /// Working directory for the next command
    Cwd,
    /// A failing exit code counts as success
    IgnoreFail,
    /// Success means this exact exit code
    Expect,
    /// Kill the next command after this many milliseconds
    Timeout,
    /// Run the next command at most once per run
    Once,
    /// Capture a stream of the next command into a variable
    Save,
    /// Fail unless the condition holds
    Assert,
    /// Enable a comma-separated list of features
    Features,
    /// Gate: a feature is enabled
    Feature,
    /// Gate: an environment variable is set (optionally to a value)
    Env,
    /// Gate: CPU architecture
    Arch,
    /// Gate: Linux distribution id
    Distro,
    /// Gate: a path exists
    Exists,
    /// Gate: Windows (`windows`, `win32`)
    Windows,
    /// Gate: Linux
    Linux,
    /// Gate: macOS (`macos`, `darwin`)
    MacOs,
    /// Gate: Linux or macOS
    Unix,
}

impl AttrKind {
    /// Looks up an attribute by the name written after `#`.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "shell" => AttrKind::Shell,
            "cwd" => AttrKind::Cwd,
            "ignorefail" => AttrKind::IgnoreFail,
            "expect" => AttrKind::Expect,
            "timeout" => AttrKind::Timeout,
            "once" => AttrKind::Once,
            "save" => AttrKind::Save,
            "assert" => AttrKind::Assert,
            "features" => AttrKind::Features,
            "feature" => AttrKind::Feature,
            "env" => AttrKind::Env,
            "arch" => AttrKind::Arch,
            "distro" => AttrKind::Distro,
            "exists" => AttrKind::Exists,
            "windows" | "win32" => AttrKind::Windows,
            "linux" => AttrKind::Linux,
            "macos" | "darwin" => AttrKind::MacOs,
            "unix" => AttrKind::Unix,
            _ => return None,
        };
        Some(kind)
    }

    /// True for attributes that gate the next statement instead of
    /// modifying a command.
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            AttrKind::Feature
                | AttrKind::Env
                | AttrKind::Arch
                | AttrKind::Distro
                | AttrKind::Exists
                | AttrKind::Windows
                | AttrKind::Linux
                | AttrKind::MacOs
                | AttrKind::Unix
        )
    }
}

/// An `#name` or `#name(params)` annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// The name as written (`win32` and `windows` both map to one kind)
    pub name: String,
    pub kind: AttrKind,
    /// Trimmed raw parameters, at most three. `features` keeps its whole
    /// parenthesised text as a single parameter.
    pub params: Vec<String>,
}

impl Attribute {
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.name)?;
        if !self.params.is_empty() {
            write!(f, "({})", self.params.join(", "))?;
        }
        Ok(())
    }
}

/// What a statement does.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Attribute(Attribute),
    /// `name = value`, value kept raw until execution
    VarAssign { name: String, value: String },
    /// `name[index] = value`
    IndexAssign {
        name: String,
        index: String,
        value: String,
    },
    /// `name:`; an empty name is the anonymous top-level block
    Label { name: String },
    /// `name: a b c`; invoking it invokes each target in order
    LabelAlias { name: String, targets: Vec<String> },
    /// A shell command, continuation lines already joined
    Command { raw: String },
    If { condition: String },
    Else,
    Endif,
    Goto { target: String },
    Call { target: String },
}

/// One parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    /// Block nesting level, one level per four columns
    pub indent: usize,
    /// 1-based source line
    pub line: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, indent: usize, line: usize) -> Self {
        Self { kind, indent, line }
    }

    /// Name of a label or alias declaration.
    pub fn label_name(&self) -> Option<&str> {
        match &self.kind {
            StmtKind::Label { name } | StmtKind::LabelAlias { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&Attribute> {
        match &self.kind {
            StmtKind::Attribute(attr) => Some(attr),
            _ => None,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            StmtKind::Attribute(attr) => write!(f, "{}", attr),
            StmtKind::VarAssign { name, value } => write!(f, "{} = {}", name, value),
            StmtKind::IndexAssign { name, index, value } => {
                write!(f, "{}[{}] = {}", name, index, value)
            }
            StmtKind::Label { name } if name.is_empty() => write!(f, ":"),
            StmtKind::Label { name } => write!(f, "{}:", name),
            StmtKind::LabelAlias { name, targets } => {
                write!(f, "{}: {}", name, targets.join(" "))
            }
            StmtKind::Command { raw } => write!(f, "{}", raw),
            StmtKind::If { condition } => write!(f, "#if({})", condition),
            StmtKind::Else => write!(f, "#else"),
            StmtKind::Endif => write!(f, "#endif"),
            StmtKind::Goto { target } => write!(f, "goto {}", target),
            StmtKind::Call { target } => write!(f, "call {}", target),
        }
    }
}

/// The parsed file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ast {
    pub stmts: Vec<Stmt>,
}

impl Ast {
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Index of the first statement after the block opened at `start`: the
    /// first later statement whose indentation is not deeper than `start`'s.
    pub fn block_end(&self, start: usize) -> usize {
        let indent = self.stmts.get(start).map(|s| s.indent).unwrap_or(0);
        self.stmts
            .iter()
            .enumerate()
            .skip(start + 1)
            .find(|(_, stmt)| stmt.indent <= indent)
            .map(|(i, _)| i)
            .unwrap_or(self.stmts.len())
    }

    /// Indices of column-0 label and alias declarations, in file order.
    pub fn top_level_labels(&self) -> impl Iterator<Item = (usize, &Stmt)> {
        self.stmts
            .iter()
            .enumerate()
            .filter(|(_, stmt)| stmt.indent == 0 && stmt.label_name().is_some())
    }
}
