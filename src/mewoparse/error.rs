//! Error types shared by the parser, the interpolation engine and the runtime.
//!
//! Every failure carries its kind, a message and the 1-based source line it
//! was detected on. Parsing and execution stop at the first error.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Category of a script error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed source construct.
    Syntax,
    /// Semantically invalid at execution time.
    Runtime,
    /// A growth operation could not allocate.
    Memory,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Syntax => write!(f, "Syntax Error"),
            ErrorKind::Runtime => write!(f, "Runtime Error"),
            ErrorKind::Memory => write!(f, "Memory Error"),
        }
    }
}

/// An error raised while parsing or executing a Mewofile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct MewoError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: usize,
}

impl MewoError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Syntax, message, line)
    }

    pub fn runtime(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Runtime, message, line)
    }

    pub fn memory(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Memory, message, line)
    }
}

pub type MewoResult<T> = Result<T, MewoError>;

/// Errors surfaced by the host program around the core.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No Mewofile found in current directory")]
    NotFound,

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{}: {}", file.display(), error.line, error)]
    Script { file: PathBuf, error: MewoError },

    #[error("Failed to serialize statements: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn script(file: impl Into<PathBuf>, error: MewoError) -> Self {
        AppError::Script {
            file: file.into(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_kind() {
        let err = MewoError::runtime("Undefined variable: 'x'", 3);
        assert_eq!(err.to_string(), "Runtime Error: Undefined variable: 'x'");
    }

    #[test]
    fn test_script_error_formats_file_and_line() {
        let err = AppError::script("Mewofile", MewoError::syntax("missing label name", 7));
        assert_eq!(
            err.to_string(),
            "Mewofile:7: Syntax Error: missing label name"
        );
    }
}
