use std::io;
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::time::Duration;

use super::{wait_all, CombinedOutput, CommandSpec, Context, ExecError};

/// Process IDs of both programs of a pipe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipePids {
    pub upstream: Option<u32>,
    pub downstream: Option<u32>,
}

/// Run `upstream | downstream` and return the combined output of both.
///
/// The downstream program is started first. Failures of both programs are
/// collected into [ExecError::Pipe], upstream first. `tar` exiting with `1`
/// as upstream (files changed while being archived) isn't a failure.
pub fn run_piped(
    ctx: &Context,
    upstream: CommandSpec,
    downstream: CommandSpec,
    pids: Option<&mut PipePids>,
) -> Result<String, ExecError> {
    let upstream_line = upstream.to_string();
    let downstream_line = downstream.to_string();
    let pipe_line = format!("{upstream_line} | {downstream_line}");
    if ctx.is_done() {
        return Err(ExecError::Timeout {
            command: pipe_line,
            output: String::new(),
        });
    }
    log::debug!(target: "exec", "Running: {pipe_line}");

    let output = CombinedOutput::default();
    let mut errors = Vec::new();

    let mut downstream_child = downstream
        .command()
        .and_then(|mut command| {
            command
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            command.spawn().map_err(|source| ExecError::Spawn {
                command: downstream_line.clone(),
                source,
            })
        })
        .map_err(|e| ExecError::Pipe {
            errors: vec![e.to_string()],
            output: String::new(),
        })?;
    let mut readers = output.drain_child(&mut downstream_child);

    // the spawned command is dropped right away, closing our copy of the
    // pipe so downstream sees EOF once upstream exits
    let pipe_in = downstream_child.stdin.take();
    let upstream_child = upstream.command().and_then(|mut command| {
        command
            .stdout(pipe_in.map_or_else(Stdio::null, Stdio::from))
            .stderr(Stdio::piped());
        command.spawn().map_err(|source| ExecError::Spawn {
            command: upstream_line.clone(),
            source,
        })
    });
    let mut upstream_child = match upstream_child {
        Ok(mut child) => {
            readers.extend(output.drain_child(&mut child));
            Some(child)
        }
        Err(e) => {
            errors.push(e.to_string());
            None
        }
    };

    if let Some(pids) = pids {
        pids.upstream = upstream_child.as_ref().map(Child::id);
        pids.downstream = Some(downstream_child.id());
    }

    let (upstream_status, downstream_status) = match upstream_child.as_mut() {
        Some(child) => {
            let mut statuses = wait_all(ctx, &mut [child, &mut downstream_child]).into_iter();
            (statuses.next(), statuses.next())
        }
        None => (
            None,
            wait_all(ctx, &mut [&mut downstream_child]).into_iter().next(),
        ),
    };

    if let Some(status) = upstream_status {
        let tolerate_tar = is_tar(upstream.binary());
        record_failure(&mut errors, &upstream_line, status, tolerate_tar);
    }
    if let Some(status) = downstream_status {
        record_failure(&mut errors, &downstream_line, status, false);
    }

    let output = output.collect(readers, ctx.is_done());
    if errors.is_empty() {
        Ok(output)
    } else if ctx.is_done() {
        Err(ExecError::Timeout {
            command: pipe_line,
            output,
        })
    } else {
        Err(ExecError::Pipe { errors, output })
    }
}

/// [run_piped] with a deadline of `timeout` derived from `ctx`.
pub fn run_piped_with_timeout(
    ctx: &Context,
    upstream: CommandSpec,
    downstream: CommandSpec,
    pids: Option<&mut PipePids>,
    timeout: Duration,
) -> Result<String, ExecError> {
    run_piped(&ctx.with_timeout(timeout), upstream, downstream, pids)
}

fn is_tar(binary: &str) -> bool {
    Path::new(binary)
        .file_name()
        .is_some_and(|name| name == "tar")
}

fn record_failure(
    errors: &mut Vec<String>,
    command: &str,
    status: io::Result<Option<ExitStatus>>,
    tolerate_tar: bool,
) {
    match status {
        Ok(Some(status)) if status.success() => {}
        Ok(Some(status)) if tolerate_tar && status.code() == Some(1) => {
            log::warn!(target: "exec", "`{command}`: some files changed while being archived");
        }
        Ok(Some(status)) => errors.push(format!("`{command}` failed with {status}")),
        Ok(None) => errors.push(format!("`{command}` was killed")),
        Err(e) => errors.push(format!("Waiting for `{command}` failed: {e}")),
    }
}
