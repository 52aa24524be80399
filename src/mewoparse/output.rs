//! Error and status output for the command-line program.
//!
//! Script errors print as `<file>:<line>: <Kind>: <message>`. Colors are
//! used only when stderr is a terminal.

use super::error::{AppError, MewoError};
use std::io::{self, IsTerminal};
use std::path::Path;

/// ANSI color codes
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const RED: &str = "\x1b[31m";
    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Formats messages for stderr.
pub struct OutputFormatter {
    color: bool,
}

impl OutputFormatter {
    /// Colors follow whether stderr is a terminal.
    pub fn for_stderr() -> Self {
        Self {
            color: io::stderr().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{}{}{}", color, text, colors::RESET)
        } else {
            text.to_string()
        }
    }

    /// `<file>:<line>: <Kind>: <message>`
    pub fn script_error(&self, file: &Path, error: &MewoError) -> String {
        format!(
            "{}: {}: {}",
            self.paint(colors::GRAY, &format!("{}:{}", file.display(), error.line)),
            self.paint(colors::BRIGHT_RED, &error.kind.to_string()),
            error.message
        )
    }

    pub fn app_error(&self, error: &AppError) -> String {
        match error {
            AppError::Script { file, error } => self.script_error(file, error),
            other => format!("{}: {}", self.paint(colors::RED, "error"), other),
        }
    }

    /// Prints an error to stderr.
    pub fn error(&self, error: &AppError) {
        eprintln!("{}", self.app_error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mewoparse::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_script_error_format() {
        let error = MewoError::new(ErrorKind::Runtime, "Command failed with exit code 2", 7);
        let text = OutputFormatter::plain().script_error(Path::new("Mewofile"), &error);
        assert_eq!(text, "Mewofile:7: Runtime Error: Command failed with exit code 2");
    }

    #[test]
    fn test_app_error_format() {
        let formatter = OutputFormatter::plain();
        assert_eq!(
            formatter.app_error(&AppError::NotFound),
            "error: No Mewofile found in current directory"
        );
        let script = AppError::script(
            PathBuf::from("dir/Mewofile"),
            MewoError::syntax("Unknown directive '#nope'", 2),
        );
        assert_eq!(
            formatter.app_error(&script),
            "dir/Mewofile:2: Syntax Error: Unknown directive '#nope'"
        );
        // Display of the error itself matches the plain rendering.
        assert_eq!(script.to_string(), formatter.app_error(&script));
    }

    #[test]
    fn test_colors_wrap_parts() {
        let formatter = OutputFormatter { color: true };
        let text = formatter.script_error(Path::new("f"), &MewoError::memory("x", 1));
        assert!(text.starts_with(colors::GRAY));
        assert!(text.contains(&format!("{}Memory Error{}", colors::BRIGHT_RED, colors::RESET)));
    }
}
