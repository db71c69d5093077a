//! Client of the [restic](https://restic.net) backup program.
//!
//! Every subcommand is invoked as `restic <subcommand> [--json] <global
//! options> <options>` and its output decoded into typed results.

mod error;
mod options;
mod output;
mod stream;
#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

pub use error::{ResticError, ResticExitCode};
pub use options::*;
pub use output::{
    parse_backup, parse_forget, parse_ls, parse_tag, BackupResult, FindMatch, FindResult,
    ForgetResult, LsEntry, LsResult, Snapshot, Stats, TagChange,
};
pub use stream::TarStream;

use crate::args::to_args;
use crate::config::{ProcessConfig, ResticConfig};
use crate::exec::{self, CommandSpec, Context};
use output::parse_document;

static ALREADY_INITIALIZED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)config file already exists|already initialized")
        .expect("pattern should be valid")
});

/// Restic invocations sharing one repository.
#[derive(Debug, Clone)]
pub struct Restic {
    binary: String,
    env: Vec<(&'static str, String)>,
    global: GlobalOptions,
    nice: Option<i32>,
    ionice: Option<u8>,
    timeout: Duration,
}

impl Restic {
    pub fn new(config: &ResticConfig, process: &ProcessConfig) -> Self {
        let password_file = config
            .password_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        let env = [
            ("RESTIC_REPOSITORY", config.repository.clone()),
            ("RESTIC_PASSWORD", config.password.clone()),
            ("RESTIC_PASSWORD_FILE", password_file),
            ("RESTIC_HOST", config.host.clone()),
            ("AWS_ACCESS_KEY_ID", config.aws_access_key_id.clone()),
            ("AWS_SECRET_ACCESS_KEY", config.aws_secret_access_key.clone()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect();

        Self {
            binary: config.binary.clone(),
            env,
            global: config.global.clone(),
            nice: process.nice,
            ionice: process.ionice,
            timeout: process.timeout(),
        }
    }

    /// `restic <subcommand> [--json] <global options> <args>`
    pub fn command(&self, subcommand: &str, json: bool, args: Vec<String>) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.binary).subcommand(subcommand);
        if json {
            spec = spec.arg("--json");
        }
        spec = spec
            .args(to_args(&self.global))
            .args(args)
            .nice(self.nice)
            .ionice(self.ionice);
        for (key, value) in &self.env {
            spec = spec.env_default(*key, value.as_str());
        }
        spec
    }

    fn execute(&self, ctx: &Context, spec: CommandSpec) -> Result<String, ResticError> {
        Ok(exec::run_with_timeout(ctx, spec, self.timeout)?)
    }

    /// Create the repository.
    ///
    /// Fails with [ResticError::AlreadyInitialized] if it exists already.
    pub fn init(&self, ctx: &Context, options: &InitOptions) -> Result<(), ResticError> {
        log::info!(target: "restic", "Initializing repository");
        match self.execute(ctx, self.command("init", false, to_args(options))) {
            Ok(_) => Ok(()),
            Err(e) if ALREADY_INITIALIZED.is_match(e.output()) => {
                Err(ResticError::AlreadyInitialized)
            }
            Err(e) => Err(e),
        }
    }

    /// Create the repository unless it exists already.
    pub fn ensure_initialized(&self, ctx: &Context) -> Result<(), ResticError> {
        match self.init(ctx, &InitOptions::default()) {
            Ok(()) => Ok(()),
            Err(ResticError::AlreadyInitialized) => {
                log::debug!(target: "restic", "Repository is already initialized");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Back up `options.paths`, removing stale locks first if `unlock` is set.
    ///
    /// Files that couldn't be read (exit code 3) still produce a snapshot and
    /// only raise a warning.
    pub fn backup(
        &self,
        ctx: &Context,
        options: &BackupOptions,
        unlock: bool,
    ) -> Result<BackupResult, ResticError> {
        if unlock {
            self.unlock(ctx, &UnlockOptions::default())?;
        }
        log::info!(target: "restic", "Backing up {}", options.paths.join(" "));
        let output = match self.execute(ctx, self.command("backup", true, to_args(options))) {
            Ok(output) => output,
            Err(ResticError::Exit {
                code: ResticExitCode::Incomplete,
                source,
            }) => {
                log::warn!(target: "restic", "Snapshot is incomplete, some files couldn't be read");
                source.output().to_string()
            }
            Err(e) => return Err(e),
        };

        let result = parse_backup(&output)?;
        log::info!(target: "restic", "Created snapshot {}", result.snapshot_id);
        Ok(result)
    }

    /// The two ends of [Self::backup_tar_stream]: `tar` and `restic backup --stdin`.
    pub fn tar_stream_backup_commands(
        &self,
        stream: &TarStream,
        mut options: BackupOptions,
    ) -> (CommandSpec, CommandSpec) {
        // restic reads a single file, the filters belong to tar
        let mut stream = stream.clone();
        stream.exclude.append(&mut options.exclude);
        stream.one_file_system |= options.one_file_system;
        options.one_file_system = false;
        options.stdin = true;
        options.stdin_filename = stream.stdin_filename.clone();
        options.paths.clear();

        let upstream = stream
            .create_command(Path::new("-"))
            .nice(self.nice)
            .ionice(self.ionice);
        let downstream = self.command("backup", true, to_args(&options));
        (upstream, downstream)
    }

    /// Back up the archive of `stream` without writing it to disk:
    /// `tar --create --file=- | restic backup --stdin`.
    pub fn backup_tar_stream(
        &self,
        ctx: &Context,
        stream: &TarStream,
        options: BackupOptions,
        unlock: bool,
    ) -> Result<BackupResult, ResticError> {
        if unlock {
            self.unlock(ctx, &UnlockOptions::default())?;
        }
        log::info!(target: "restic", "Streaming archive {} into restic", stream.stdin_filename);
        let (upstream, downstream) = self.tar_stream_backup_commands(stream, options);
        let output = exec::run_piped_with_timeout(ctx, upstream, downstream, None, self.timeout)?;

        let result = parse_backup(&output)?;
        log::info!(target: "restic", "Created snapshot {}", result.snapshot_id);
        Ok(result)
    }

    /// The two ends of [Self::restore_tar_stream]: `restic dump` and `tar`.
    pub fn tar_stream_restore_commands(
        &self,
        stream: &TarStream,
        snapshot_id: &str,
        filter: &SnapshotFilter,
        target: &Path,
    ) -> (CommandSpec, CommandSpec) {
        let dump = DumpOptions {
            filter: filter.clone(),
            snapshot_id: snapshot_id.to_string(),
            file: stream.snapshot_path(),
            ..Default::default()
        };
        let upstream = self.command("dump", false, to_args(&dump));
        let downstream = stream
            .extract_command(Path::new("-"), target)
            .nice(self.nice)
            .ionice(self.ionice);
        (upstream, downstream)
    }

    /// Extract the streamed archive of `snapshot_id` into `target`:
    /// `restic dump | tar --extract --file=-`.
    ///
    /// `filter` narrows down which snapshot `latest` refers to.
    pub fn restore_tar_stream(
        &self,
        ctx: &Context,
        stream: &TarStream,
        snapshot_id: &str,
        filter: &SnapshotFilter,
        target: &Path,
        unlock: bool,
    ) -> Result<String, ResticError> {
        if unlock {
            self.unlock(ctx, &UnlockOptions::default())?;
        }
        log::info!(target: "restic", "Extracting {} of snapshot {snapshot_id} into {}", stream.stdin_filename, target.display());
        let (upstream, downstream) = self.tar_stream_restore_commands(stream, snapshot_id, filter, target);
        Ok(exec::run_piped_with_timeout(
            ctx,
            upstream,
            downstream,
            None,
            self.timeout,
        )?)
    }

    pub fn ls(&self, ctx: &Context, options: &LsOptions) -> Result<Vec<LsResult>, ResticError> {
        let output = self.execute(ctx, self.command("ls", true, to_args(options)))?;
        parse_ls(&output, options.long)
    }

    pub fn find(
        &self,
        ctx: &Context,
        options: &FindOptions,
    ) -> Result<Vec<FindResult>, ResticError> {
        let output = self.execute(ctx, self.command("find", true, to_args(options)))?;
        parse_document(&output)
    }

    pub fn check(&self, ctx: &Context, options: &CheckOptions) -> Result<String, ResticError> {
        log::info!(target: "restic", "Checking repository");
        self.execute(ctx, self.command("check", false, to_args(options)))
    }

    /// Remove the snapshots not selected by the `--keep-*` rules of `options`.
    ///
    /// Refuses to run without any rule, which would remove every snapshot.
    pub fn forget(
        &self,
        ctx: &Context,
        mut options: ForgetOptions,
    ) -> Result<ForgetResult, ResticError> {
        if !options.has_policy() {
            return Err(ResticError::EmptyRetentionPolicy);
        }
        options.compact = true;

        let output = self.execute(ctx, self.command("forget", true, to_args(&options)))?;
        let result = parse_forget(&output)?;
        log::info!(target: "restic", "Forgot {} snapshot(s)", result.removed.len());
        Ok(result)
    }

    pub fn prune(&self, ctx: &Context, options: &PruneOptions) -> Result<String, ResticError> {
        log::info!(target: "restic", "Pruning repository");
        self.execute(ctx, self.command("prune", false, to_args(options)))
    }

    pub fn rebuild_index(
        &self,
        ctx: &Context,
        options: &RebuildIndexOptions,
    ) -> Result<String, ResticError> {
        self.execute(ctx, self.command("rebuild-index", false, to_args(options)))
    }

    /// Restore a snapshot, removing stale locks first if `unlock` is set.
    pub fn restore(
        &self,
        ctx: &Context,
        options: &RestoreOptions,
        unlock: bool,
    ) -> Result<String, ResticError> {
        if unlock {
            self.unlock(ctx, &UnlockOptions::default())?;
        }
        log::info!(target: "restic", "Restoring snapshot {} into {}", options.snapshot_id, options.target.display());
        self.execute(ctx, self.command("restore", false, to_args(options)))
    }

    pub fn unlock(&self, ctx: &Context, options: &UnlockOptions) -> Result<String, ResticError> {
        log::debug!(target: "restic", "Removing stale locks");
        self.execute(ctx, self.command("unlock", false, to_args(options)))
    }

    pub fn tag(&self, ctx: &Context, options: &TagOptions) -> Result<Vec<TagChange>, ResticError> {
        let output = self.execute(ctx, self.command("tag", true, to_args(options)))?;
        parse_tag(&output)
    }

    pub fn snapshots(
        &self,
        ctx: &Context,
        options: &SnapshotsOptions,
    ) -> Result<Vec<Snapshot>, ResticError> {
        let output = self.execute(ctx, self.command("snapshots", true, to_args(options)))?;
        // `--group-by` nests the snapshots, which isn't supported here
        let snapshots: Option<Vec<Snapshot>> = parse_document(&output)?;
        Ok(snapshots.unwrap_or_default())
    }

    pub fn stats(&self, ctx: &Context, options: &StatsOptions) -> Result<Stats, ResticError> {
        let output = self.execute(ctx, self.command("stats", true, to_args(options)))?;
        parse_document(&output)
    }

    /// Content of a single file of a snapshot.
    pub fn dump(&self, ctx: &Context, options: &DumpOptions) -> Result<String, ResticError> {
        self.execute(ctx, self.command("dump", false, to_args(options)))
    }

    /// Restore size of `snapshot_id`, `0` if it can't be determined.
    pub fn snapshot_size(&self, ctx: &Context, snapshot_id: &str) -> u64 {
        match self.stats(ctx, &Self::restore_size_of(snapshot_id)) {
            Ok(stats) => stats.total_size,
            Err(e) => {
                log::warn!(target: "restic", "Size of snapshot {snapshot_id} unknown: {e}");
                0
            }
        }
    }

    /// Number of files in `snapshot_id`, `0` if it can't be determined.
    pub fn snapshot_file_count(&self, ctx: &Context, snapshot_id: &str) -> u64 {
        match self.stats(ctx, &Self::restore_size_of(snapshot_id)) {
            Ok(stats) => stats.total_file_count,
            Err(e) => {
                log::warn!(target: "restic", "File count of snapshot {snapshot_id} unknown: {e}");
                0
            }
        }
    }

    fn restore_size_of(snapshot_id: &str) -> StatsOptions {
        StatsOptions {
            mode: Some(StatsMode::RestoreSize),
            snapshot_ids: vec![snapshot_id.to_string()],
            ..Default::default()
        }
    }
}
