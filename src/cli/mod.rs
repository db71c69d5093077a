use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::restic::StatsMode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long, global = true)]
    pub verbose: Option<LevelFilter>,

    /// Configuration file.
    #[arg(long, short = 'c', env = "BACKUP_RUNNER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Back up a data source.
    Backup(BackupArgs),
    /// Restore a data source.
    Restore(RestoreArgs),
    /// Create the restic repository unless it exists.
    Init,
    /// List the snapshots of the repository.
    Snapshots(SnapshotsArgs),
    /// List the files of a snapshot.
    Ls(LsArgs),
    /// Apply the retention policy of the config.
    Forget(ForgetArgs),
    /// Remove unreferenced data from the repository.
    Prune(PruneArgs),
    /// Check the repository for errors.
    Check(CheckArgs),
    /// Remove stale locks.
    Unlock(UnlockArgs),
    /// Show repository or snapshot statistics.
    Stats(StatsArgs),
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Kind of the data source, the name of its config section.
    pub kind: String,

    /// Store the backup in restic.
    #[arg(long)]
    pub restic: bool,

    /// Remove local dump files afterwards.
    #[arg(long)]
    pub clean_up: bool,

    /// Apply the retention policy after the backup.
    #[arg(long, requires = "restic")]
    pub forget: bool,

    /// Don't remove stale restic locks first.
    #[arg(long = "no-unlock", action = ArgAction::SetFalse)]
    pub unlock: bool,

    /// Additional snapshot tags.
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Kind of the data source, the name of its config section.
    pub kind: String,

    /// Fetch the backup from restic first.
    #[arg(long)]
    pub restic: bool,

    /// Remove local dump files afterwards.
    #[arg(long)]
    pub clean_up: bool,

    /// Snapshot to restore, `latest` if unset.
    #[arg(long, requires = "restic")]
    pub snapshot: Option<String>,

    /// Don't remove stale restic locks first.
    #[arg(long = "no-unlock", action = ArgAction::SetFalse)]
    pub unlock: bool,
}

#[derive(Args, Debug)]
pub struct SnapshotsArgs {
    /// Only snapshots of this host.
    #[arg(long)]
    pub host: Vec<String>,

    /// Only snapshots with this tag.
    #[arg(long)]
    pub tag: Vec<String>,

    /// Only the latest n snapshots of every host and path.
    #[arg(long)]
    pub latest: Option<u32>,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Snapshot ID or `latest`.
    pub snapshot: String,

    /// Include permissions, ownership, size and modification time.
    #[arg(long, short = 'l')]
    pub long: bool,
}

#[derive(Args, Debug)]
pub struct ForgetArgs {
    /// Prune the repository afterwards.
    #[arg(long)]
    pub prune: bool,

    /// Only show what would be removed.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Tolerated unused space, e.g. `5%`.
    #[arg(long)]
    pub max_unused: Option<String>,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Verify the content of all data blobs.
    #[arg(long)]
    pub read_data: bool,

    /// Verify a subset of the data blobs, e.g. `10%`.
    #[arg(long)]
    pub read_data_subset: Option<String>,
}

#[derive(Args, Debug)]
pub struct UnlockArgs {
    /// Remove all locks, even ones of running restic processes.
    #[arg(long)]
    pub remove_all: bool,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Snapshot ID or `latest`, the whole repository if unset.
    pub snapshot: Option<String>,

    #[arg(long, value_enum)]
    pub mode: Option<StatsMode>,
}
