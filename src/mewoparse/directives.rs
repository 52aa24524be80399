//! Resolution of pending attributes into settings for one command.
//!
//! Attributes written before a command (`#cwd`, `#timeout`, `#save`, ...)
//! accumulate until the command runs. When several attributes of the same
//! name are pending, the first one wins.

use super::ast::{AttrKind, Attribute};
use super::error::{MewoError, MewoResult};
use super::executor::Stream;
use super::scan::{is_identifier, unquote};
use super::template::TemplateProcessor;
use crate::constants::{PLATFORM_SHELL, SHELL_DEFAULT, SHELL_GLOBAL};
use std::time::Duration;

/// Which shell a command runs through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ShellChoice {
    /// Use the global shell if one is set, else the platform primitive.
    #[default]
    Inherit,
    /// Force the platform primitive (`#shell(default)`).
    System,
    /// An explicit shell string for this command.
    Named(String),
}

impl ShellChoice {
    /// The shell string to use, given the current global shell.
    pub fn resolve(&self, global: Option<&str>) -> Option<String> {
        match self {
            ShellChoice::Inherit => global.map(str::to_string),
            ShellChoice::System => None,
            ShellChoice::Named(shell) => Some(shell.clone()),
        }
    }
}

/// A change to the global shell requested by `#shell(name, global)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalShellChange {
    Set(String),
    Clear,
}

/// Returns the global shell change an attribute requests, if any.
pub fn global_shell_change(
    attr: &Attribute,
    templates: &TemplateProcessor,
    line: usize,
) -> MewoResult<Option<GlobalShellChange>> {
    if attr.kind != AttrKind::Shell {
        return Ok(None);
    }
    let mode = match attr.param(1) {
        Some(raw) => param(raw, templates, line)?,
        None => return Ok(None),
    };
    if mode != SHELL_GLOBAL {
        return Ok(None);
    }
    let name = match attr.param(0) {
        Some(raw) => param(raw, templates, line)?,
        None => return Ok(None),
    };
    Ok(Some(if name == SHELL_DEFAULT {
        GlobalShellChange::Clear
    } else {
        GlobalShellChange::Set(name)
    }))
}

/// Per-command modifiers collected from pending attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSettings {
    /// A failing exit code counts as success
    pub ignore_fail: bool,
    /// Success means exactly this exit code
    pub expect: Option<i32>,
    /// Working directory of the child process
    pub cwd: Option<String>,
    pub shell: ShellChoice,
    pub timeout: Option<Duration>,
    /// Skip the command if this statement already ran once
    pub once: bool,
    /// Stream to capture and the variable that receives it
    pub save: Option<(Stream, String)>,
}

impl CommandSettings {
    /// Builds settings from the attributes pending before a command.
    /// Conditional attributes and `#assert`/`#features` are ignored here.
    ///
    /// # Arguments
    ///
    /// * `attrs` - Pending attributes in source order
    /// * `templates` - Interpolation context for parameters
    /// * `line` - Line of the command, used in errors
    ///
    /// # Errors
    ///
    /// Returns a Syntax error for a malformed parameter (non-numeric exit
    /// code or timeout, unknown stream, missing `#save` arguments).
    pub fn from_attrs(
        attrs: &[&Attribute],
        templates: &TemplateProcessor,
        line: usize,
    ) -> MewoResult<Self> {
        let mut settings = CommandSettings::default();
        let mut seen_shell = false;

        for attr in attrs {
            match attr.kind {
                AttrKind::IgnoreFail => settings.ignore_fail = true,
                AttrKind::Once => settings.once = true,
                AttrKind::Expect if settings.expect.is_none() => {
                    let raw = required(attr, 0, line)?;
                    let text = param(raw, templates, line)?;
                    let code = text.parse::<i32>().map_err(|_| {
                        MewoError::syntax(format!("Invalid exit code '{}' in #expect", text), line)
                    })?;
                    settings.expect = Some(code);
                }
                AttrKind::Cwd if settings.cwd.is_none() => {
                    let raw = required(attr, 0, line)?;
                    settings.cwd = Some(param(raw, templates, line)?);
                }
                AttrKind::Timeout if settings.timeout.is_none() => {
                    let raw = required(attr, 0, line)?;
                    let text = param(raw, templates, line)?;
                    let ms = text.parse::<u64>().map_err(|_| {
                        MewoError::syntax(format!("Invalid timeout '{}' in #timeout", text), line)
                    })?;
                    settings.timeout = Some(Duration::from_millis(ms));
                }
                AttrKind::Save if settings.save.is_none() => {
                    settings.save = Some(parse_save(attr, templates, line)?);
                }
                AttrKind::Shell if !seen_shell => {
                    seen_shell = true;
                    settings.shell = shell_choice(attr, templates, line)?;
                }
                _ => {}
            }
        }

        Ok(settings)
    }
}

fn shell_choice(attr: &Attribute, templates: &TemplateProcessor, line: usize) -> MewoResult<ShellChoice> {
    let name = match attr.param(0) {
        Some(raw) => param(raw, templates, line)?,
        None => return Ok(ShellChoice::Named(PLATFORM_SHELL.to_string())),
    };

    if name == SHELL_DEFAULT {
        return Ok(ShellChoice::System);
    }

    let is_global = match attr.param(1) {
        Some(raw) => param(raw, templates, line)? == SHELL_GLOBAL,
        None => false,
    };
    if is_global {
        // Already applied to the global shell when the attribute was read.
        Ok(ShellChoice::Inherit)
    } else {
        Ok(ShellChoice::Named(name))
    }
}

fn parse_save(
    attr: &Attribute,
    templates: &TemplateProcessor,
    line: usize,
) -> MewoResult<(Stream, String)> {
    let (stream, var) = match (attr.param(0), attr.param(1)) {
        (Some(stream), Some(var)) => (stream, var),
        _ => {
            return Err(MewoError::syntax(
                "#save requires a stream and a variable name",
                line,
            ))
        }
    };

    let stream_name = param(stream, templates, line)?;
    let stream = Stream::from_name(&stream_name).ok_or_else(|| {
        MewoError::syntax(
            format!("Invalid stream '{}' in #save (expected stdout or stderr)", stream_name),
            line,
        )
    })?;

    let var = param(var, templates, line)?;
    if !is_identifier(&var) {
        return Err(MewoError::syntax(
            format!("Invalid variable name: '{}'", var),
            line,
        ));
    }

    Ok((stream, var))
}

fn required<'p>(attr: &'p Attribute, index: usize, line: usize) -> MewoResult<&'p str> {
    attr.param(index).ok_or_else(|| {
        MewoError::syntax(format!("#{} requires a parameter", attr.name), line)
    })
}

/// Interpolated parameter with surrounding quotes removed.
fn param(raw: &str, templates: &TemplateProcessor, line: usize) -> MewoResult<String> {
    let text = templates.process(raw, line)?;
    Ok(unquote(&text).to_string())
}
