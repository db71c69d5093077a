//! Runs a backend and restic for a single kind.

use derive_more::{Display, Error, From};

use crate::backends::{self, BackendError, Kind, Target, UnknownKind};
use crate::config::Config;
use crate::exec::Context;
use crate::restic::{
    BackupOptions, BackupResult, ForgetOptions, ResticError, RestoreOptions, Restic,
    SnapshotFilter,
};

#[derive(Debug, Display, Error, From)]
/// Errors of a backup or restore run.
pub enum RunError {
    #[display("{_0}")]
    UnknownKind(UnknownKind),
    #[display("{_0}")]
    Backend(BackendError),
    #[display("{_0}")]
    Restic(ResticError),
}

/// What to do besides running the backend.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Store the backup in restic, or fetch it from restic before restoring.
    pub restic: bool,
    /// Remove local artifacts afterwards, even if the run fails.
    pub clean_up: bool,
    /// Apply the retention policy after the backup.
    pub forget: bool,
    /// Remove stale restic locks first.
    pub unlock: bool,
    /// Tags added to the snapshot.
    pub tags: Vec<String>,
    /// Snapshot to restore, `latest` if unset.
    pub snapshot: Option<String>,
}

/// Calls [Target::clean_up] when dropped.
struct CleanUp<'a, T: Target + ?Sized> {
    kind: Kind,
    target: &'a T,
}

impl<T: Target + ?Sized> Drop for CleanUp<'_, T> {
    fn drop(&mut self) {
        log::debug!(target: "orchestrator", "Cleaning up after {}", self.kind);
        if let Err(e) = self.target.clean_up() {
            log::warn!(target: "orchestrator", "Clean up of {} failed: {e}", self.kind);
        }
    }
}

/// Back up the data source of `kind`.
///
/// Returns the created snapshot if restic is requested.
pub fn do_backup_for_kind(
    ctx: &Context,
    kind: &str,
    config: &Config,
    options: &RunOptions,
) -> Result<Option<BackupResult>, RunError> {
    let kind: Kind = kind.parse()?;
    let adapter = backends::backup_adapter(kind, config)?;
    let _clean_up = options.clean_up.then(|| CleanUp {
        kind,
        target: &*adapter,
    });

    if !options.restic {
        log::info!(target: "orchestrator", "Creating {kind} backup");
        adapter.create_backup(ctx)?;
        return Ok(None);
    }

    let restic = Restic::new(&config.restic, &config.process);
    let host = snapshot_host(config, &*adapter);
    let mut backup = BackupOptions {
        host: host.clone(),
        tags: snapshot_tags(kind, config, options),
        ..Default::default()
    };
    adapter.tune_restic(&mut backup);

    let result = match adapter.tar_stream() {
        Some(stream) => {
            log::info!(target: "orchestrator", "Streaming {kind} backup into restic");
            restic.ensure_initialized(ctx)?;
            restic.backup_tar_stream(ctx, &stream, backup, options.unlock)?
        }
        None => {
            log::info!(target: "orchestrator", "Creating {kind} backup");
            adapter.create_backup(ctx)?;
            restic.ensure_initialized(ctx)?;
            backup.paths = vec![adapter.backup_path().display().to_string()];
            restic.backup(ctx, &backup, options.unlock)?
        }
    };

    if options.forget {
        let mut forget = ForgetOptions::from(&config.restic.retention);
        forget.filter = kind_filter(kind, &host);
        restic.forget(ctx, forget)?;
    }

    Ok(Some(result))
}

/// Restore the data source of `kind`, fetching the backup from restic first
/// if requested.
pub fn do_restore_for_kind(
    ctx: &Context,
    kind: &str,
    config: &Config,
    options: &RunOptions,
) -> Result<(), RunError> {
    let kind: Kind = kind.parse()?;
    let adapter = backends::restore_adapter(kind, config)?;
    let _clean_up = options.clean_up.then(|| CleanUp {
        kind,
        target: &*adapter,
    });

    if options.restic {
        let restic = Restic::new(&config.restic, &config.process);
        let snapshot = options.snapshot.as_deref().unwrap_or("latest");
        let filter = kind_filter(kind, &snapshot_host(config, &*adapter));

        if let Some(stream) = adapter.tar_stream() {
            // extracting the stream is the restore
            log::info!(target: "orchestrator", "Restoring {kind} from snapshot {snapshot}");
            restic.restore_tar_stream(
                ctx,
                &stream,
                snapshot,
                &filter,
                stream.extract_target(),
                options.unlock,
            )?;
            return Ok(());
        }

        log::info!(target: "orchestrator", "Fetching {kind} backup from snapshot {snapshot}");
        let restore = RestoreOptions {
            target: "/".into(),
            include: vec![adapter.backup_path().display().to_string()],
            filter,
            snapshot_id: snapshot.to_string(),
            ..Default::default()
        };
        restic.restore(ctx, &restore, options.unlock)?;
    }

    log::info!(target: "orchestrator", "Restoring {kind} backup");
    adapter.restore_backup(ctx)?;
    Ok(())
}

fn snapshot_host<T: Target + ?Sized>(config: &Config, target: &T) -> String {
    if config.restic.host.is_empty() {
        target.hostname()
    } else {
        config.restic.host.clone()
    }
}

fn snapshot_tags(kind: Kind, config: &Config, options: &RunOptions) -> Vec<String> {
    let mut tags = vec![kind.to_string()];
    for tag in config.restic.tags.iter().chain(&options.tags) {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// Snapshots of `kind` created on `host`.
fn kind_filter(kind: Kind, host: &str) -> SnapshotFilter {
    SnapshotFilter {
        hosts: vec![host.to_string()],
        tags: vec![kind.to_string()],
        ..Default::default()
    }
}
