//! Subprocess execution.
//!
//! The engine never touches `std::process` directly. It describes each
//! command as a [`ProcessRequest`] and hands it to a [`ProcessRunner`];
//! [`SystemRunner`] is the real implementation.

use crate::constants::{STREAM_STDERR, STREAM_STDOUT, TIMEOUT_EXIT_CODE};
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command as ProcessCommand, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for captured output once a timed out command is killed.
const READER_GRACE: Duration = Duration::from_millis(200);

/// An output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            STREAM_STDOUT => Some(Stream::Stdout),
            STREAM_STDERR => Some(Stream::Stderr),
            _ => None,
        }
    }
}

/// How a command line reaches the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Program and arguments, produced from an explicit shell.
    Argv(Vec<String>),
    /// The platform's ad-hoc command primitive (`sh -c` / `cmd /C`).
    System(String),
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Invocation::Argv(argv) => write!(f, "{}", argv.join(" ")),
            Invocation::System(line) => write!(f, "{}", line),
        }
    }
}

/// Builds the argv for running `command` through `shell`.
///
/// The shell string is split on whitespace. A word containing `%s` receives
/// the command; otherwise `-c` (`/c` for `cmd`) and the command are appended.
pub fn shell_invocation(shell: &str, command: &str) -> Invocation {
    let mut argv: Vec<String> = shell.split_whitespace().map(str::to_string).collect();

    if argv.iter().any(|word| word.contains("%s")) {
        for word in argv.iter_mut() {
            if word.contains("%s") {
                *word = word.replace("%s", command);
            }
        }
    } else {
        let flag = if argv.first().is_some_and(|program| is_cmd(program)) {
            "/c"
        } else {
            "-c"
        };
        argv.push(flag.to_string());
        argv.push(command.to_string());
    }

    Invocation::Argv(argv)
}

fn is_cmd(program: &str) -> bool {
    let name = program
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(program)
        .to_ascii_lowercase();
    name == "cmd" || name == "cmd.exe"
}

/// A command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub invocation: Invocation,
    /// Working directory of the child; the parent's is never changed.
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Stream to collect instead of passing through.
    pub capture: Option<Stream>,
}

impl ProcessRequest {
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            cwd: None,
            timeout: None,
            capture: None,
        }
    }
}

/// Result of a finished (or killed) command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; -1 when killed by a signal, 124 after a timeout.
    pub exit_code: i32,
    pub timed_out: bool,
    pub captured: Option<String>,
}

/// Runs subprocesses on behalf of the engine.
pub trait ProcessRunner {
    /// Runs a command to completion.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the process cannot be spawned or waited on.
    /// A non-zero exit is not an error.
    fn run(&self, request: &ProcessRequest) -> io::Result<ProcessOutcome>;

    /// Runs a command and returns up to `limit` bytes of its stdout, used by
    /// `${#exec(...)}`. With `shell` the command runs as `shell -c command`.
    fn capture(&self, command: &str, shell: Option<&str>, limit: usize) -> io::Result<String>;
}

impl<T: ProcessRunner + ?Sized> ProcessRunner for &T {
    fn run(&self, request: &ProcessRequest) -> io::Result<ProcessOutcome> {
        (**self).run(request)
    }

    fn capture(&self, command: &str, shell: Option<&str>, limit: usize) -> io::Result<String> {
        (**self).capture(command, shell, limit)
    }
}

/// Spawns real processes with `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn build(invocation: &Invocation) -> io::Result<ProcessCommand> {
        match invocation {
            Invocation::Argv(argv) => {
                let (program, args) = argv.split_first().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "empty shell command")
                })?;
                let mut cmd = ProcessCommand::new(program);
                cmd.args(args);
                Ok(cmd)
            }
            Invocation::System(line) => Ok(system_command(line)),
        }
    }
}

#[cfg(windows)]
fn system_command(line: &str) -> ProcessCommand {
    let mut cmd = ProcessCommand::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

#[cfg(not(windows))]
fn system_command(line: &str) -> ProcessCommand {
    let mut cmd = ProcessCommand::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

impl ProcessRunner for SystemRunner {
    fn run(&self, request: &ProcessRequest) -> io::Result<ProcessOutcome> {
        let mut cmd = Self::build(&request.invocation)?;

        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        match request.capture {
            Some(Stream::Stdout) => {
                cmd.stdout(Stdio::piped());
            }
            Some(Stream::Stderr) => {
                cmd.stderr(Stdio::piped());
            }
            None => {}
        }
        if request.timeout.is_some() {
            own_process_group(&mut cmd);
        }

        debug!(command = %request.invocation, cwd = ?request.cwd, "spawning");
        let mut child = cmd.spawn()?;

        // Drain the captured pipe on a separate thread so a chatty child
        // cannot block on a full pipe while we poll for its exit.
        let reader = match request.capture {
            Some(Stream::Stdout) => child.stdout.take().map(spawn_reader),
            Some(Stream::Stderr) => child.stderr.take().map(spawn_reader),
            None => None,
        };

        let status = wait_with_timeout(&mut child, request.timeout)?;

        let captured = match reader {
            Some(rx) => {
                let bytes = if status.is_some() {
                    rx.recv()
                        .map_err(|_| io::Error::other("output reader stopped"))??
                } else {
                    // Something outside the killed group may still hold the pipe.
                    match rx.recv_timeout(READER_GRACE) {
                        Ok(result) => result?,
                        Err(_) => {
                            warn!("captured output still open after kill, dropping it");
                            Vec::new()
                        }
                    }
                };
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            None => None,
        };

        let outcome = match status {
            Some(status) => ProcessOutcome {
                exit_code: exit_code(status),
                timed_out: false,
                captured,
            },
            None => ProcessOutcome {
                exit_code: TIMEOUT_EXIT_CODE,
                timed_out: true,
                captured,
            },
        };
        debug!(exit_code = outcome.exit_code, timed_out = outcome.timed_out, "process finished");
        Ok(outcome)
    }

    fn capture(&self, command: &str, shell: Option<&str>, limit: usize) -> io::Result<String> {
        let invocation = match shell {
            Some(shell) => shell_invocation(shell, command),
            None => Invocation::System(command.to_string()),
        };
        let mut cmd = Self::build(&invocation)?;
        cmd.stdout(Stdio::piped());

        debug!(command = %invocation, "capturing output");
        let mut child = cmd.spawn()?;

        let mut bytes = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            stdout.take(limit as u64).read_to_end(&mut bytes)?;
        }
        let status = child.wait()?;
        if !status.success() {
            debug!(exit_code = exit_code(status), "captured command exited non-zero");
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> Receiver<io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let result = pipe.read_to_end(&mut bytes).map(|_| bytes);
        let _ = tx.send(result);
    });
    rx
}

/// Puts the child at the head of its own process group so a timeout can
/// kill everything it started.
#[cfg(unix)]
fn own_process_group(cmd: &mut ProcessCommand) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut ProcessCommand) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        debug!(error = %e, "killpg failed, killing the child alone");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Waits for the child, killing it once `timeout` elapses.
/// Returns `None` when the child was killed.
fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let limit = match timeout {
        Some(limit) => limit,
        None => return child.wait().map(Some),
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= limit {
            warn!(timeout_ms = limit.as_millis() as u64, "killing timed out command");
            kill_tree(child);
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
