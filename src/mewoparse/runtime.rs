//! Execution engine.
//!
//! Walks the flat statement list produced by the parser:
//! - top-level mode runs every column-0 statement that is not inside a
//!   named label block
//! - label mode replays the top level once (without calls and gotos) and
//!   then runs the selected label's body
//!
//! Attributes accumulate as pending until the next statement, which they
//! either gate (conditional attributes) or modify (command attributes).

use super::ast::{AttrKind, Attribute, Ast, StmtKind};
use super::condition::{check_conditional_attr, evaluate_condition};
use super::directives::{global_shell_change, CommandSettings, GlobalShellChange};
use super::error::{MewoError, MewoResult};
use super::executor::{shell_invocation, Invocation, ProcessRequest, ProcessRunner, SystemRunner};
use super::platform::{HostPlatform, Platform};
use super::template::TemplateProcessor;
use super::value::{parse_value, Value};
use super::vars::RuntimeState;
use crate::constants::{DRY_RUN_PREFIX, MAX_CALL_DEPTH};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, trace, warn};

/// Options fixed for a whole run, usually taken from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Print commands instead of running them
    pub dry_run: bool,
    /// Initial global shell
    pub shell: Option<String>,
    pub enable_features: Vec<String>,
    /// Features that stay off whatever the file declares
    pub disable_features: Vec<String>,
    /// `-D name=value` pairs; they win over assignments in the file
    pub overrides: Vec<(String, String)>,
    /// Positional arguments (`$0`, `$1`, ...)
    pub args: Vec<String>,
}

/// Outcome of running a statement or a range of statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    /// A `goto` is unwinding towards the driver; holds the target's index
    Jump(usize),
}

/// How a range of statements is scanned.
#[derive(Debug, Clone, Copy)]
struct RangeMode {
    /// Only column-0 statements run; deeper ones belong to some block
    outer: bool,
    /// Replaying the top level before a label: calls and gotos are skipped
    prologue: bool,
}

impl RangeMode {
    const TOP_LEVEL: RangeMode = RangeMode {
        outer: true,
        prologue: false,
    };
    const PROLOGUE: RangeMode = RangeMode {
        outer: true,
        prologue: true,
    };
    const BLOCK: RangeMode = RangeMode {
        outer: false,
        prologue: false,
    };

    fn nested(self) -> Self {
        RangeMode {
            outer: false,
            ..self
        }
    }
}

/// Runs a parsed Mewofile.
pub struct Runtime<'a> {
    ast: &'a Ast,
    options: ExecOptions,
    state: RuntimeState,
    platform: Box<dyn Platform + 'a>,
    runner: Box<dyn ProcessRunner + 'a>,
    out: Box<dyn Write + 'a>,
    labels: HashMap<String, usize>,
    call_stack: Vec<usize>,
    current_label: Option<usize>,
    pending: Vec<&'a Attribute>,
    once_done: HashSet<usize>,
    prologue_done: bool,
    block_ends: HashMap<usize, usize>,
    if_markers: HashMap<usize, Option<(Option<usize>, usize)>>,
}

impl<'a> Runtime<'a> {
    /// Creates a runtime that runs commands on this machine and prints
    /// dry-run lines to stdout.
    pub fn new(ast: &'a Ast, options: ExecOptions) -> Self {
        Self {
            ast,
            options,
            state: RuntimeState::new(),
            platform: Box::new(HostPlatform),
            runner: Box::new(SystemRunner),
            out: Box::new(io::stdout()),
            labels: HashMap::new(),
            call_stack: Vec::new(),
            current_label: None,
            pending: Vec::new(),
            once_done: HashSet::new(),
            prologue_done: false,
            block_ends: HashMap::new(),
            if_markers: HashMap::new(),
        }
    }

    pub fn with_platform(mut self, platform: impl Platform + 'a) -> Self {
        self.platform = Box::new(platform);
        self
    }

    pub fn with_runner(mut self, runner: impl ProcessRunner + 'a) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// Redirects dry-run output.
    pub fn with_output(mut self, out: impl Write + 'a) -> Self {
        self.out = Box::new(out);
        self
    }

    /// State left behind by the last run.
    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// Runs the file.
    ///
    /// # Arguments
    ///
    /// * `label` - Label to run, or `None` to run the top level
    ///
    /// # Errors
    ///
    /// Returns the first error raised. Execution stops there; commands
    /// that already ran are not undone.
    pub fn execute(&mut self, label: Option<&str>) -> MewoResult<()> {
        self.reset(label.is_none());
        self.register_labels()?;

        match label {
            None => self.run_top_level(),
            Some(name) => {
                let flow = self.invoke_label(name, 0)?;
                self.follow_jumps(flow)?;
                Ok(())
            }
        }
    }

    fn reset(&mut self, top_level: bool) {
        self.state.reset();
        self.labels.clear();
        self.call_stack.clear();
        self.current_label = None;
        self.pending.clear();
        self.once_done.clear();
        self.prologue_done = top_level;

        self.state.argv = self.options.args.clone();
        self.state.global_shell = self.options.shell.clone();
        for name in &self.options.disable_features {
            self.state.features.force_off(name);
        }
        for name in &self.options.enable_features {
            if !self.state.features.enable(name) {
                debug!(feature = %name, "feature is disabled on the command line");
            }
        }
        for (name, value) in &self.options.overrides {
            self.state.pin(name, Value::String(value.clone()));
        }
    }

    fn templates(&self) -> TemplateProcessor<'_> {
        TemplateProcessor::new(
            &self.state,
            self.platform.as_ref(),
            self.runner.as_ref(),
            self.options.dry_run,
        )
    }

    /// Registers column-0 labels, skipping those whose preceding
    /// conditional attributes do not hold.
    fn register_labels(&mut self) -> MewoResult<()> {
        let ast = self.ast;
        for (index, stmt) in ast.top_level_labels() {
            let name = match stmt.label_name() {
                Some(name) if !name.is_empty() => name,
                _ => continue,
            };
            if !self.label_enabled(index)? {
                debug!(label = name, line = stmt.line, "label disabled on this host");
                continue;
            }
            if self.labels.insert(name.to_string(), index).is_some() {
                return Err(MewoError::runtime(
                    format!("Duplicate label '{}'", name),
                    stmt.line,
                ));
            }
        }
        debug!(labels = self.labels.len(), "registered labels");
        Ok(())
    }

    fn label_enabled(&self, index: usize) -> MewoResult<bool> {
        let templates = self.templates();
        for stmt in self.ast.stmts[..index].iter().rev() {
            let attr = match stmt.as_attribute() {
                Some(attr) => attr,
                None => break,
            };
            if attr.kind.is_conditional() && !check_conditional_attr(attr, &templates, stmt.line)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run_top_level(&mut self) -> MewoResult<()> {
        let mut start = 0;
        loop {
            match self.exec_range(start, self.ast.len(), RangeMode::TOP_LEVEL)? {
                Flow::Next => return Ok(()),
                Flow::Jump(target) => {
                    let last = self.follow_jumps(Flow::Jump(target))?;
                    start = self.block_end(last);
                }
            }
        }
    }

    /// Runs goto targets until one finishes without jumping again.
    /// Returns the index of the last target run.
    fn follow_jumps(&mut self, mut flow: Flow) -> MewoResult<usize> {
        let mut last = 0;
        while let Flow::Jump(target) = flow {
            last = target;
            let line = self.ast.stmts[target].line;
            flow = self.enter_label(target, line)?;
        }
        Ok(last)
    }

    fn lookup_label(&self, name: &str, line: usize) -> MewoResult<usize> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| MewoError::runtime(format!("Unknown label '{}'", name), line))
    }

    /// Calls a label by name, replaying the top level first if this run has
    /// not done so yet.
    fn invoke_label(&mut self, name: &str, line: usize) -> MewoResult<Flow> {
        let index = self.lookup_label(name, line)?;

        if !self.prologue_done {
            self.prologue_done = true;
            debug!("replaying top level before first label");
            if let Flow::Jump(target) = self.exec_range(0, self.ast.len(), RangeMode::PROLOGUE)? {
                return Ok(Flow::Jump(target));
            }
        }

        self.enter_label(index, line)
    }

    fn enter_label(&mut self, index: usize, line: usize) -> MewoResult<Flow> {
        let ast = self.ast;
        let stmt = &ast.stmts[index];
        let name = stmt.label_name().unwrap_or_default();
        if self.call_stack.len() >= MAX_CALL_DEPTH {
            return Err(MewoError::runtime(
                format!("Maximum call depth exceeded calling '{}'", name),
                line,
            ));
        }

        debug!(label = name, depth = self.call_stack.len(), "entering label");
        self.call_stack.push(index);
        let caller = self.current_label.replace(index);
        self.pending.clear();

        let result = match &stmt.kind {
            StmtKind::LabelAlias { targets, .. } => self.run_alias(targets, stmt.line),
            _ => {
                let end = self.block_end(index);
                self.exec_range(index + 1, end, RangeMode::BLOCK)
            }
        };

        self.current_label = caller;
        self.call_stack.pop();
        trace!(label = name, "leaving label");
        result
    }

    fn run_alias(&mut self, targets: &[String], line: usize) -> MewoResult<Flow> {
        for target in targets {
            if let Flow::Jump(index) = self.invoke_label(target, line)? {
                return Ok(Flow::Jump(index));
            }
        }
        Ok(Flow::Next)
    }

    fn block_end(&mut self, index: usize) -> usize {
        let ast = self.ast;
        *self
            .block_ends
            .entry(index)
            .or_insert_with(|| ast.block_end(index))
    }

    fn exec_range(&mut self, start: usize, end: usize, mode: RangeMode) -> MewoResult<Flow> {
        let ast = self.ast;
        let mut i = start;

        while i < end {
            let stmt = &ast.stmts[i];

            if stmt.indent == 0 {
                if let Some(name) = stmt.label_name() {
                    let block_end = self.block_end(i).min(end);
                    let anonymous = name.is_empty() && matches!(stmt.kind, StmtKind::Label { .. });
                    if anonymous && self.pending_allows(stmt.line)? {
                        self.pending.clear();
                        if let Flow::Jump(target) = self.exec_range(i + 1, block_end, mode.nested())? {
                            return Ok(Flow::Jump(target));
                        }
                    }
                    self.pending.clear();
                    i = block_end;
                    continue;
                }
            }

            if mode.outer && stmt.indent > 0 {
                i += 1;
                continue;
            }

            match &stmt.kind {
                StmtKind::If { condition } => {
                    let (flow, next) = self.exec_if(i, condition, end, mode)?;
                    if let Flow::Jump(target) = flow {
                        return Ok(Flow::Jump(target));
                    }
                    i = next;
                    continue;
                }
                StmtKind::Else | StmtKind::Endif => {
                    i += 1;
                    continue;
                }
                StmtKind::Goto { .. } | StmtKind::Call { .. } if mode.prologue => {
                    self.pending.clear();
                    i += 1;
                    continue;
                }
                _ => {}
            }

            if let Flow::Jump(target) = self.exec_stmt(i)? {
                return Ok(Flow::Jump(target));
            }
            i += 1;
        }

        Ok(Flow::Next)
    }

    /// Runs the taken branch of the `#if` at `index`. Returns the flow and
    /// the index just past the matching `#endif`.
    fn exec_if(
        &mut self,
        index: usize,
        condition: &str,
        end: usize,
        mode: RangeMode,
    ) -> MewoResult<(Flow, usize)> {
        let line = self.ast.stmts[index].line;
        let (else_index, endif_index) = match self.find_if_markers(index) {
            Some((else_index, endif_index)) if endif_index < end => (else_index, endif_index),
            _ => return Err(MewoError::syntax("Missing #endif for #if", line)),
        };

        if !self.pending_allows(line)? {
            debug!(line, "skipping #if block gated by attribute");
            self.pending.clear();
            return Ok((Flow::Next, endif_index + 1));
        }
        self.pending.clear();

        let holds = evaluate_condition(condition, &self.templates(), line)?;
        trace!(line, condition, holds, "evaluated #if");

        let branch = if holds {
            Some((index + 1, else_index.unwrap_or(endif_index)))
        } else {
            else_index.map(|e| (e + 1, endif_index))
        };
        let flow = match branch {
            Some((start, stop)) => self.exec_range(start, stop, mode.nested())?,
            None => Flow::Next,
        };
        Ok((flow, endif_index + 1))
    }

    fn find_if_markers(&mut self, index: usize) -> Option<(Option<usize>, usize)> {
        let ast = self.ast;
        *self
            .if_markers
            .entry(index)
            .or_insert_with(|| match_if_markers(ast, index))
    }

    /// Checks the conditional attributes among the pending ones.
    fn pending_allows(&self, line: usize) -> MewoResult<bool> {
        if self.pending.is_empty() {
            return Ok(true);
        }
        let templates = self.templates();
        for attr in &self.pending {
            if attr.kind.is_conditional() && !check_conditional_attr(attr, &templates, line)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn exec_stmt(&mut self, index: usize) -> MewoResult<Flow> {
        let ast = self.ast;
        let stmt = &ast.stmts[index];
        let line = stmt.line;

        if let StmtKind::Attribute(attr) = &stmt.kind {
            self.exec_attribute(attr, line)?;
            return Ok(Flow::Next);
        }

        if !self.pending_allows(line)? {
            debug!(line, "skipping statement gated by attribute");
            self.pending.clear();
            return Ok(Flow::Next);
        }

        match &stmt.kind {
            StmtKind::VarAssign { name, value } => {
                self.pending.clear();
                self.assign_var(name, value, line)?;
                Ok(Flow::Next)
            }
            StmtKind::IndexAssign { name, index, value } => {
                self.pending.clear();
                self.assign_index(name, index, value, line)?;
                Ok(Flow::Next)
            }
            StmtKind::Command { raw } => {
                let name = raw.trim();
                if self.current_label.is_some() && self.labels.contains_key(name) {
                    self.pending.clear();
                    return self.invoke_label(name, line);
                }
                self.exec_command(index, raw, line)?;
                Ok(Flow::Next)
            }
            StmtKind::Goto { target } => {
                self.pending.clear();
                let target_index = self.lookup_label(target, line)?;
                debug!(label = %target, line, "goto");
                Ok(Flow::Jump(target_index))
            }
            StmtKind::Call { target } => {
                self.pending.clear();
                self.invoke_label(target, line)
            }
            _ => {
                self.pending.clear();
                Ok(Flow::Next)
            }
        }
    }

    fn exec_attribute(&mut self, attr: &'a Attribute, line: usize) -> MewoResult<()> {
        match attr.kind {
            AttrKind::Assert => {
                if !self.pending_allows(line)? {
                    return Ok(());
                }
                if attr.params.is_empty() {
                    return Err(MewoError::syntax("#assert requires a condition", line));
                }
                let condition = attr.params.join(", ");
                if !evaluate_condition(&condition, &self.templates(), line)? {
                    return Err(MewoError::runtime(
                        format!("Assertion failed: {}", condition),
                        line,
                    ));
                }
            }
            AttrKind::Features => {
                if !self.pending_allows(line)? {
                    return Ok(());
                }
                if let Some(list) = attr.param(0) {
                    self.state.features.enable_list(list);
                }
            }
            AttrKind::Shell => {
                let change = if self.pending_allows(line)? {
                    global_shell_change(attr, &self.templates(), line)?
                } else {
                    None
                };
                match change {
                    Some(GlobalShellChange::Set(shell)) => {
                        debug!(shell = %shell, "global shell set");
                        self.state.global_shell = Some(shell);
                    }
                    Some(GlobalShellChange::Clear) => {
                        debug!("global shell cleared");
                        self.state.global_shell = None;
                    }
                    None => {}
                }
                self.pending.push(attr);
            }
            _ => self.pending.push(attr),
        }
        Ok(())
    }

    fn assign_var(&mut self, name: &str, raw: &str, line: usize) -> MewoResult<()> {
        if self.state.pinned.contains(name) {
            debug!(name, "keeping command-line value");
            return Ok(());
        }
        let text = self.templates().process(raw, line)?;
        let value = parse_value(&text, &self.state.vars, line)?;
        self.state.assign(name, value);
        Ok(())
    }

    fn assign_index(&mut self, name: &str, index: &str, raw: &str, line: usize) -> MewoResult<()> {
        let (index_text, value_text) = {
            let templates = self.templates();
            (templates.process(index, line)?, templates.process(raw, line)?)
        };
        let position = index_text
            .trim()
            .parse::<usize>()
            .map_err(|_| MewoError::syntax(format!("Invalid index '{}'", index_text.trim()), line))?;

        if !self.state.vars.contains(name) {
            return Err(MewoError::runtime(
                format!("Undefined variable: '{}'", name),
                line,
            ));
        }
        let value = parse_value(&value_text, &self.state.vars, line)?;

        match self.state.vars.get_mut(name) {
            Some(Value::Array(items)) => {
                if position >= items.len() {
                    let extra = position + 1 - items.len();
                    items.try_reserve(extra).map_err(|_| {
                        MewoError::memory(format!("Cannot grow array '{}'", name), line)
                    })?;
                    items.resize(position + 1, Value::String(String::new()));
                }
                items[position] = value;
                Ok(())
            }
            _ => Err(MewoError::runtime(
                format!("Cannot index assign to non-array variable '{}'", name),
                line,
            )),
        }
    }

    fn exec_command(&mut self, index: usize, raw: &str, line: usize) -> MewoResult<()> {
        let settings = CommandSettings::from_attrs(&self.pending, &self.templates(), line)?;
        self.pending.clear();

        if settings.once && !self.once_done.insert(index) {
            debug!(line, "#once command already ran");
            return Ok(());
        }

        let command = self.templates().process(raw, line)?;

        if self.options.dry_run {
            return writeln!(self.out, "{} {}", DRY_RUN_PREFIX, command).map_err(|e| {
                MewoError::runtime(format!("Failed to write output: {}", e), line)
            });
        }

        let invocation = match settings.shell.resolve(self.state.global_shell.as_deref()) {
            Some(shell) => shell_invocation(&shell, &command),
            None => Invocation::System(command),
        };
        let request = ProcessRequest {
            invocation,
            cwd: settings.cwd.as_ref().map(PathBuf::from),
            timeout: settings.timeout,
            capture: settings.save.as_ref().map(|(stream, _)| *stream),
        };

        debug!(line, command = %request.invocation, "running command");
        let outcome = self
            .runner
            .run(&request)
            .map_err(|e| MewoError::runtime(format!("Failed to execute command: {}", e), line))?;
        self.state.last_exit_code = outcome.exit_code;

        if let Some((_, var)) = &settings.save {
            let captured = outcome.captured.unwrap_or_default();
            if !self.state.assign(var, Value::String(captured)) {
                debug!(name = %var, "keeping command-line value");
            }
        }

        if outcome.timed_out {
            let ms = settings.timeout.map(|t| t.as_millis()).unwrap_or_default();
            if settings.ignore_fail {
                warn!(line, "command timed out after {} ms, ignored", ms);
                return Ok(());
            }
            return Err(MewoError::runtime(
                format!("Command timed out after {} ms", ms),
                line,
            ));
        }

        let code = outcome.exit_code;
        match settings.expect {
            Some(expected) if code != expected && !settings.ignore_fail => Err(MewoError::runtime(
                format!("Expected exit code {} but got {}", expected, code),
                line,
            )),
            None if code != 0 && !settings.ignore_fail => Err(MewoError::runtime(
                format!("Command failed with exit code {}", code),
                line,
            )),
            _ => Ok(()),
        }
    }
}

/// Finds the `#else` and `#endif` belonging to the `#if` at `index`: the
/// first ones at the same indentation once nested `#if`s are balanced.
fn match_if_markers(ast: &Ast, index: usize) -> Option<(Option<usize>, usize)> {
    let indent = ast.stmts[index].indent;
    let mut depth = 1usize;
    let mut else_index = None;

    for (i, stmt) in ast.stmts.iter().enumerate().skip(index + 1) {
        if stmt.indent != indent {
            continue;
        }
        match stmt.kind {
            StmtKind::If { .. } => depth += 1,
            StmtKind::Else if depth == 1 && else_index.is_none() => else_index = Some(i),
            StmtKind::Endif => {
                depth -= 1;
                if depth == 0 {
                    return Some((else_index, i));
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mewoparse::ast::Stmt;
    use crate::mewoparse::error::ErrorKind;
    use crate::mewoparse::executor::{ProcessOutcome, Stream};
    use crate::mewoparse::parser::parse_source;
    use crate::mewoparse::platform::OsFamily;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct DummyPlatform {
        os: OsFamily,
        env: HashMap<String, String>,
    }

    impl Platform for DummyPlatform {
        fn os(&self) -> OsFamily {
            self.os
        }
        fn arch(&self) -> String {
            "x86_64".to_string()
        }
        fn distro(&self) -> String {
            "debian".to_string()
        }
        fn env_var(&self, name: &str) -> Option<String> {
            self.env.get(name).cloned()
        }
        fn path_exists(&self, _path: &str) -> bool {
            false
        }
    }

    /// Records every request; exit codes come from a `exit N` suffix.
    #[derive(Default)]
    struct RecordingRunner {
        requests: RefCell<Vec<ProcessRequest>>,
    }

    impl RecordingRunner {
        fn commands(&self) -> Vec<String> {
            self.requests
                .borrow()
                .iter()
                .map(|r| match &r.invocation {
                    Invocation::System(command) => command.clone(),
                    Invocation::Argv(argv) => argv.join(" "),
                })
                .collect()
        }
    }

    impl ProcessRunner for RecordingRunner {
        fn run(&self, request: &ProcessRequest) -> io::Result<ProcessOutcome> {
            let text = request.invocation.to_string();
            let exit_code = text
                .rsplit_once("exit ")
                .and_then(|(_, code)| code.trim().parse().ok())
                .unwrap_or(0);
            let captured = request.capture.map(|stream| match stream {
                Stream::Stdout => "captured out".to_string(),
                Stream::Stderr => "captured err".to_string(),
            });
            self.requests.borrow_mut().push(request.clone());
            Ok(ProcessOutcome {
                exit_code,
                timed_out: text.contains("sleep"),
                captured,
            })
        }

        fn capture(&self, command: &str, _shell: Option<&str>, _limit: usize) -> io::Result<String> {
            Ok(format!("{}\n", command))
        }
    }

    fn create_dummy_platform() -> DummyPlatform {
        DummyPlatform {
            os: OsFamily::Linux,
            env: HashMap::new(),
        }
    }

    fn run_with(
        source: &str,
        label: Option<&str>,
        options: ExecOptions,
    ) -> (MewoResult<()>, Vec<String>, RuntimeState) {
        let ast = parse_source(source).unwrap();
        let runner = RecordingRunner::default();
        let (result, state) = {
            let mut runtime = Runtime::new(&ast, options)
                .with_platform(create_dummy_platform())
                .with_runner(&runner);
            let result = runtime.execute(label);
            (result, runtime.state().clone())
        };
        (result, runner.commands(), state)
    }

    fn run(source: &str, label: Option<&str>) -> (MewoResult<()>, Vec<String>) {
        let (result, commands, _) = run_with(source, label, ExecOptions::default());
        (result, commands)
    }

    #[test]
    fn test_top_level_skips_named_labels() {
        let source = "echo start\nbuild:\n    echo building\n:\n    echo anon\necho end\n";
        let (result, commands) = run(source, None);
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo start", "echo anon", "echo end"]);
    }

    #[test]
    fn test_label_runs_prologue_once() {
        let source = "\
name = \"world\"
echo setup
call other
greet:
    echo hello ${name}
    other
other:
    echo other
";
        let (result, commands) = run(source, Some("greet"));
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo setup", "echo hello world", "echo other"]);
    }

    #[test]
    fn test_alias_invokes_targets_in_order() {
        let source = "all: b a\na:\n    echo a\nb:\n    echo b\n";
        let (result, commands) = run(source, Some("all"));
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo b", "echo a"]);
    }

    #[test]
    fn test_if_else_branches() {
        let source = "\
x = 2
#if(${x} == 2)
    echo two
#else
    echo other
#endif
#if(${x} == 3)
    echo three
#else
    #if(true)
        echo nested
    #endif
#endif
";
        let (result, commands) = run(source, None);
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo two", "echo nested"]);
    }

    #[test]
    fn test_missing_endif() {
        let (result, _) = run("#if(true)\n    echo x\n", None);
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.message, "Missing #endif for #if");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_goto_abandons_caller() {
        let source = "\
start:
    echo one
    goto finish
    echo never
finish:
    echo two
";
        let (result, commands) = run(source, Some("start"));
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo one", "echo two"]);
    }

    #[test]
    fn test_top_level_goto_resumes_after_target() {
        let source = "\
echo a
goto jump
echo skipped
jump:
    echo in jump
echo after
";
        let (result, commands) = run(source, None);
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo a", "echo in jump", "echo after"]);
    }

    #[test]
    fn test_call_returns_to_caller() {
        let source = "\
call helper
echo back
helper:
    echo helping
";
        let (result, commands) = run(source, None);
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo helping", "echo back"]);
    }

    #[test]
    fn test_label_errors() {
        // Deep recursion needs more than the default test thread stack.
        let worker = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(check_label_errors)
            .unwrap();
        worker.join().unwrap();
    }

    fn check_label_errors() {
        let (result, _) = run("call nowhere\n", None);
        assert_eq!(result.unwrap_err().message, "Unknown label 'nowhere'");

        let (result, _) = run("a:\n    echo 1\na:\n    echo 2\n", None);
        let err = result.unwrap_err();
        assert_eq!(err.message, "Duplicate label 'a'");
        assert_eq!(err.line, 3);

        let (result, _) = run("loop:\n    loop\n", Some("loop"));
        assert_eq!(
            result.unwrap_err().message,
            "Maximum call depth exceeded calling 'loop'"
        );
    }

    #[test]
    fn test_gated_labels_are_not_registered() {
        let source = "#windows\nsetup:\n    echo win\n#linux\nsetup:\n    echo linux\n";
        let (result, commands) = run(source, Some("setup"));
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo linux"]);
    }

    #[test]
    fn test_attribute_gates_one_statement() {
        let source = "#windows\necho win\necho always\n#linux x = 1\necho ${x}\n";
        let (result, commands) = run(source, None);
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo always", "echo 1"]);
    }

    #[test]
    fn test_exit_codes() {
        let (result, commands) = run("exit 3\necho after\n", None);
        let err = result.unwrap_err();
        assert_eq!(err.message, "Command failed with exit code 3");
        assert_eq!(commands, vec!["exit 3"]);

        let (result, commands) = run("#ignorefail\nexit 3\necho $?\n", None);
        assert!(result.is_ok());
        assert_eq!(commands, vec!["exit 3", "echo 3"]);

        let (result, _) = run("#expect(2) exit 3\n", None);
        assert_eq!(result.unwrap_err().message, "Expected exit code 2 but got 3");

        let (result, _) = run("#expect(3) exit 3\n", None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_timeout_reports_error() {
        let (result, _) = run("#timeout(50) sleep 5\n", None);
        assert_eq!(result.unwrap_err().message, "Command timed out after 50 ms");

        let (result, _) = run("#timeout(50) #ignorefail sleep 5\n", None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_once_runs_a_statement_once() {
        let source = "twice:\n    #once echo init\n    echo body\nall: twice twice\n";
        let (result, commands) = run(source, Some("all"));
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo init", "echo body", "echo body"]);
    }

    #[test]
    fn test_shell_selection() {
        let ast = parse_source(
            "echo plain\n#shell(bash) echo one\n#shell(zsh, global)\necho two\n#shell(default) echo three\n",
        )
        .unwrap();
        let runner = RecordingRunner::default();
        let mut runtime = Runtime::new(&ast, ExecOptions::default())
            .with_platform(create_dummy_platform())
            .with_runner(&runner);
        runtime.execute(None).unwrap();

        let invocations: Vec<Invocation> = runner
            .requests
            .borrow()
            .iter()
            .map(|r| r.invocation.clone())
            .collect();
        assert_eq!(
            invocations,
            vec![
                Invocation::System("echo plain".to_string()),
                Invocation::Argv(vec!["bash".into(), "-c".into(), "echo one".into()]),
                Invocation::Argv(vec!["zsh".into(), "-c".into(), "echo two".into()]),
                Invocation::System("echo three".to_string()),
            ]
        );
    }

    #[test]
    fn test_gated_global_shell_is_ignored() {
        let source = "#windows #shell(cmd.exe, global)\necho skipped\necho after\n";
        let (result, commands, state) = run_with(source, None, ExecOptions::default());
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo after"]);
        assert_eq!(state.global_shell, None);

        let source = "#linux #shell(bash, global)\necho now\n";
        let (result, commands, state) = run_with(source, None, ExecOptions::default());
        assert!(result.is_ok());
        assert_eq!(commands, vec!["bash -c echo now"]);
        assert_eq!(state.global_shell.as_deref(), Some("bash"));
    }

    #[test]
    fn test_save_and_cwd() {
        let source = "#save(stdout, out) #cwd(\"build\") make\necho ${out}\n";
        let ast = parse_source(source).unwrap();
        let runner = RecordingRunner::default();
        let mut runtime = Runtime::new(&ast, ExecOptions::default())
            .with_platform(create_dummy_platform())
            .with_runner(&runner);
        runtime.execute(None).unwrap();

        let requests = runner.requests.borrow();
        assert_eq!(requests[0].cwd, Some(PathBuf::from("build")));
        assert_eq!(requests[0].capture, Some(Stream::Stdout));
        assert_eq!(
            requests[1].invocation,
            Invocation::System("echo captured out".to_string())
        );
    }

    #[test]
    fn test_index_assign() {
        let (result, _, state) = run_with(
            "items = [\"a\", \"b\"]\nitems[3] = \"c\"\n",
            None,
            ExecOptions::default(),
        );
        assert!(result.is_ok());
        assert_eq!(
            state.vars.get("items"),
            Some(&Value::Array(vec![
                Value::String("a".into()),
                Value::String("b".into()),
                Value::String(String::new()),
                Value::String("c".into()),
            ]))
        );

        let (result, _) = run("name = \"x\"\nname[0] = \"y\"\n", None);
        assert_eq!(
            result.unwrap_err().message,
            "Cannot index assign to non-array variable 'name'"
        );

        let (result, _) = run("missing[0] = \"y\"\n", None);
        assert_eq!(result.unwrap_err().message, "Undefined variable: 'missing'");
    }

    #[test]
    fn test_assert_and_features() {
        let (result, _) = run("#features(fast)\n#assert(#feature(fast))\n", None);
        assert!(result.is_ok());

        let (result, _) = run("x = 1\n#assert(${x} == 2)\n", None);
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert_eq!(err.message, "Assertion failed: ${x} == 2");
    }

    #[test]
    fn test_command_line_options() {
        let options = ExecOptions {
            overrides: vec![("mode".to_string(), "debug".to_string())],
            disable_features: vec!["fast".to_string()],
            args: vec!["first".to_string(), "second".to_string()],
            ..ExecOptions::default()
        };
        let source = "\
mode = release
#features(fast)
#if(#feature(fast))
    echo fast
#endif
echo ${mode} $1 ${argv}
";
        let (result, commands, _) = run_with(source, None, options);
        assert!(result.is_ok());
        assert_eq!(commands, vec!["echo debug second first second"]);
    }

    #[test]
    fn test_dry_run_prints_and_never_spawns() {
        let ast = parse_source("greeting = \"Hello\"\necho ${greeting} World\n").unwrap();
        let runner = RecordingRunner::default();
        let mut out = Vec::new();
        {
            let options = ExecOptions {
                dry_run: true,
                ..ExecOptions::default()
            };
            let mut runtime = Runtime::new(&ast, options)
                .with_platform(create_dummy_platform())
                .with_runner(&runner)
                .with_output(&mut out);
            runtime.execute(None).unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "[dry-run] echo Hello World\n");
        assert!(runner.requests.borrow().is_empty());
    }

    #[test]
    fn test_runs_are_independent() {
        let ast = parse_source("#ignorefail exit 4\ncount = 1\n").unwrap();
        let runner = RecordingRunner::default();
        let mut runtime = Runtime::new(&ast, ExecOptions::default())
            .with_platform(create_dummy_platform())
            .with_runner(&runner);
        runtime.execute(None).unwrap();
        assert_eq!(runtime.state().last_exit_code, 4);
        runtime.execute(None).unwrap();
        assert_eq!(runtime.state().last_exit_code, 4);
        assert_eq!(runner.requests.borrow().len(), 2);
    }

    #[test]
    fn test_match_if_markers() {
        let ast = Ast {
            stmts: vec![
                Stmt::new(StmtKind::If { condition: "a".into() }, 0, 1),
                Stmt::new(StmtKind::If { condition: "b".into() }, 1, 2),
                Stmt::new(StmtKind::Else, 1, 3),
                Stmt::new(StmtKind::Endif, 1, 4),
                Stmt::new(StmtKind::Else, 0, 5),
                Stmt::new(StmtKind::Endif, 0, 6),
            ],
        };
        assert_eq!(match_if_markers(&ast, 0), Some((Some(4), 5)));
        assert_eq!(match_if_markers(&ast, 1), Some((Some(2), 3)));
    }
}
