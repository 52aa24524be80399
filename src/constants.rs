pub const APP_NAME: &str = "mewo";

pub const CONFIG_NAMES: [&str; 2] = ["Mewofile", "mewofile"];

pub const INDENT_SIZE: usize = 4;

/// Columns a literal tab contributes to the indentation count.
pub const TAB_WIDTH: usize = 4;

pub const MAX_ATTR_PARAMS: usize = 3;

pub const MAX_CALL_DEPTH: usize = 256;

/// Upper bound on bytes captured by `${#exec(...)}`.
pub const EXEC_CAPTURE_LIMIT: usize = 64 * 1024;

/// Exit code recorded when a command is killed by `#timeout`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

pub const DRY_RUN_PREFIX: &str = "[dry-run]";

pub const BOOL_TRUE: &str = "true";
pub const BOOL_FALSE: &str = "false";

pub const SHELL_DEFAULT: &str = "default";
pub const SHELL_GLOBAL: &str = "global";

#[cfg(windows)]
pub const PLATFORM_SHELL: &str = "cmd.exe";
#[cfg(not(windows))]
pub const PLATFORM_SHELL: &str = "/bin/sh";

pub const STREAM_STDOUT: &str = "stdout";
pub const STREAM_STDERR: &str = "stderr";

pub const ARGV_NAME: &str = "argv";

pub const FLAG_MEWOFILE: &str = "mewofile";
pub const FLAG_DEFINE: &str = "define";
pub const FLAG_ENABLE_FEATURE: &str = "enable-feature";
pub const FLAG_DISABLE_FEATURE: &str = "disable-feature";
pub const FLAG_SHELL: &str = "shell";
pub const FLAG_DEBUG: &str = "debug";
pub const FLAG_DRY_RUN: &str = "dry-run";
pub const FLAG_AST_JSON: &str = "ast-json";
pub const FLAG_COMPLETIONS: &str = "completions";
pub const ARG_LABEL: &str = "label";
pub const ARG_REST: &str = "args";
