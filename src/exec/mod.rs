//! Execution of external programs.
//!
//! Every program is described by a [CommandSpec] and run to completion by
//! [run] or, connected through a pipe, by [run_piped]. Standard output and
//! standard error are captured into one combined buffer.

mod context;
mod pipe;

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use derive_more::{Display, Error};
use regex::Regex;

pub use context::Context;
pub use pipe::{run_piped, run_piped_with_timeout, PipePids};

/// Upper bound for dump tools and restic operating on large data sets.
pub const LONG_RUNNING_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output of a killed program is still read. Grandchildren holding
/// the pipes open are left behind after that.
const KILLED_OUTPUT_GRACE: Duration = Duration::from_millis(200);

static SECRET_FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(--?[a-z_-]*pass(?:word|phrase)?[a-z_-]*)=").expect("pattern should be valid")
});

static URI_CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(://[^:/@\s]+):[^@/\s]*@").expect("pattern should be valid")
});

/// Errors on execution of an external program.
#[derive(Debug, Display, Error)]
pub enum ExecError {
    /// The program couldn't be started.
    #[display("Starting `{command}` failed: {source}")]
    Spawn { command: String, source: io::Error },
    /// The file redirected into stdin couldn't be opened.
    #[display("Opening {} as stdin of `{command}` failed: {source}", path.display())]
    Stdin {
        command: String,
        path: PathBuf,
        source: io::Error,
    },
    /// Waiting for the program failed.
    #[display("Waiting for `{command}` failed: {source}")]
    Wait { command: String, source: io::Error },
    /// The program exited unsuccessfully.
    #[display("`{command}` failed with {status}: {}", output.trim_end())]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },
    /// One or both programs of a pipe failed.
    #[display("{}", errors.join("\n"))]
    Pipe { errors: Vec<String>, output: String },
    /// The context was done before the program finished.
    #[display("`{command}` timed out or was cancelled")]
    Timeout { command: String, output: String },
}

impl ExecError {
    /// Exit code of a program that exited unsuccessfully.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::Failed { status, .. } => status.code(),
            _ => None,
        }
    }

    /// Combined output captured before the failure.
    pub fn output(&self) -> &str {
        match self {
            ExecError::Failed { output, .. }
            | ExecError::Pipe { output, .. }
            | ExecError::Timeout { output, .. } => output,
            _ => "",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }
}

/// Description of a single program invocation.
///
/// Built once, consumed by [run] or [run_piped].
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    binary: String,
    subcommand: Option<String>,
    args: Vec<String>,
    nice: Option<i32>,
    ionice: Option<u8>,
    env: Vec<(String, String)>,
    stdin: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    pub fn subcommand(mut self, subcommand: impl Into<String>) -> Self {
        self.subcommand = Some(subcommand.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program through `nice -n<level>`.
    pub fn nice(mut self, level: Option<i32>) -> Self {
        self.nice = level;
        self
    }

    /// Run the program through `ionice -c<class>`.
    pub fn ionice(mut self, class: Option<u8>) -> Self {
        self.ionice = class;
        self
    }

    /// Set `key` in the environment of the program unless the operator
    /// already set it.
    pub fn env_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Redirect the content of `path` into the standard input.
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Complete argument vector including the niceness wrappers.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 6);
        if let Some(class) = self.ionice {
            argv.push("ionice".to_string());
            argv.push(format!("-c{class}"));
        }
        if let Some(level) = self.nice {
            argv.push("nice".to_string());
            argv.push(format!("-n{level}"));
        }
        argv.push(self.binary.clone());
        argv.extend(self.subcommand.iter().cloned());
        argv.extend(self.args.iter().cloned());
        argv
    }

    fn command(&self) -> Result<Command, ExecError> {
        let argv = self.argv();
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);

        for (key, value) in &self.env {
            if std::env::var_os(key).is_none() {
                command.env(key, value);
            } else {
                log::trace!(target: "exec", "Keeping {key} from the environment");
            }
        }

        match &self.stdin {
            Some(path) => {
                let file = File::open(path).map_err(|source| ExecError::Stdin {
                    command: self.to_string(),
                    path: path.clone(),
                    source,
                })?;
                command.stdin(file);
            }
            None => {
                command.stdin(Stdio::null());
            }
        }

        Ok(command)
    }
}

/// Mask the value of password flags and the password of URIs.
fn redact(arg: &str) -> Cow<'_, str> {
    if let Some(flag) = SECRET_FLAG.captures(arg).and_then(|c| c.get(1)) {
        if !flag.as_str().ends_with("-file") {
            return Cow::Owned(format!("{}=***", flag.as_str()));
        }
    }
    URI_CREDENTIALS.replace_all(arg, "$1:***@")
}

/// The command line as logged and reported in errors, secrets masked.
/// [CommandSpec::argv] keeps the real values.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.argv().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&redact(arg))?;
        }
        Ok(())
    }
}

/// Run `spec` to completion and return its combined output.
///
/// The program is killed once `ctx` is done, which is reported as
/// [ExecError::Timeout] instead of the raw failure.
pub fn run(ctx: &Context, spec: CommandSpec) -> Result<String, ExecError> {
    let command_line = spec.to_string();
    if ctx.is_done() {
        return Err(ExecError::Timeout {
            command: command_line,
            output: String::new(),
        });
    }
    log::debug!(target: "exec", "Running: {command_line}");

    let mut command = spec.command()?;
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    let output = CombinedOutput::default();
    let readers = output.drain_child(&mut child);
    let status = wait_all(ctx, &mut [&mut child])
        .pop()
        .unwrap_or(Ok(None));
    let output = output.collect(readers, ctx.is_done());

    match status {
        Ok(Some(status)) if status.success() => Ok(output),
        Ok(None) => Err(ExecError::Timeout {
            command: command_line,
            output,
        }),
        _ if ctx.is_done() => Err(ExecError::Timeout {
            command: command_line,
            output,
        }),
        Ok(Some(status)) => Err(ExecError::Failed {
            command: command_line,
            status,
            output,
        }),
        Err(source) => Err(ExecError::Wait {
            command: command_line,
            source,
        }),
    }
}

/// [run] with a deadline of `timeout` derived from `ctx`.
pub fn run_with_timeout(
    ctx: &Context,
    spec: CommandSpec,
    timeout: Duration,
) -> Result<String, ExecError> {
    run(&ctx.with_timeout(timeout), spec)
}

/// Shared buffer receiving standard output and standard error.
#[derive(Debug, Clone, Default)]
struct CombinedOutput(Arc<Mutex<Vec<u8>>>);

impl CombinedOutput {
    fn drain(&self, mut reader: impl Read + Send + 'static) -> JoinHandle<()> {
        let buffer = self.clone();
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => buffer
                        .0
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::debug!(target: "exec", "Reading child output failed: {e}");
                        break;
                    }
                }
            }
        })
    }

    fn drain_child(&self, child: &mut Child) -> Vec<JoinHandle<()>> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.drain(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.drain(stderr));
        }
        readers
    }

    /// Wait for the readers and return everything read.
    ///
    /// After a kill the readers are only awaited for [KILLED_OUTPUT_GRACE],
    /// the remaining ones are detached.
    fn collect(self, readers: Vec<JoinHandle<()>>, killed: bool) -> String {
        let grace_end = Instant::now() + KILLED_OUTPUT_GRACE;
        for reader in readers {
            if killed {
                while !reader.is_finished() && Instant::now() < grace_end {
                    thread::sleep(Duration::from_millis(10));
                }
                if !reader.is_finished() {
                    log::debug!(target: "exec", "Output still held open by a descendant, not waiting for it");
                    continue;
                }
            }
            let _ = reader.join();
        }
        let buffer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Wait for all `children`, killing the remaining ones once `ctx` is done.
///
/// A child killed because of `ctx` yields `Ok(None)`.
fn wait_all(ctx: &Context, children: &mut [&mut Child]) -> Vec<io::Result<Option<ExitStatus>>> {
    let mut results: Vec<Option<io::Result<Option<ExitStatus>>>> =
        children.iter().map(|_| None).collect();
    // try_wait keeps the children killable, short programs are picked up early
    let mut interval = Duration::from_millis(1);

    loop {
        for (child, result) in children.iter_mut().zip(results.iter_mut()) {
            if result.is_none() {
                match child.try_wait() {
                    Ok(Some(status)) => *result = Some(Ok(Some(status))),
                    Ok(None) => {}
                    Err(e) => *result = Some(Err(e)),
                }
            }
        }

        if results.iter().all(Option::is_some) {
            break;
        }

        if ctx.is_done() {
            for (child, result) in children.iter_mut().zip(results.iter_mut()) {
                if result.is_none() {
                    log::debug!(target: "exec", "Killing process {}: context done", child.id());
                    if let Err(e) = child.kill() {
                        log::warn!(target: "exec", "Killing process {} failed: {e}", child.id());
                    }
                    let _ = child.wait();
                    *result = Some(Ok(None));
                }
            }
            break;
        }

        thread::sleep(interval);
        interval = (interval * 2).min(POLL_INTERVAL);
    }

    results
        .into_iter()
        .map(|result| result.unwrap_or(Ok(None)))
        .collect()
}
