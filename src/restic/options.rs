//! Typed options of the restic subcommands.
//!
//! Every struct is turned into arguments by [`crate::args::to_args`]; the
//! serialized field names are restic's flag names.

use std::path::PathBuf;

/// Options understood by every restic subcommand.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalOptions {
    /// Directory of the local cache.
    #[serde(rename(serialize = "--cache-dir="))]
    pub cache_dir: Option<PathBuf>,

    /// Don't use a local cache.
    #[serde(rename(serialize = "--no-cache"))]
    pub no_cache: bool,

    /// Additional root certificates to trust.
    #[serde(rename(serialize = "--cacert="))]
    pub cacert: Vec<PathBuf>,

    /// Upload limit in KiB/s.
    #[serde(rename(serialize = "--limit-upload="))]
    pub limit_upload: u32,

    /// Download limit in KiB/s.
    #[serde(rename(serialize = "--limit-download="))]
    pub limit_download: u32,

    #[serde(rename(serialize = "--compression="))]
    pub compression: Option<Compression>,

    #[serde(rename(serialize = "--pack-size="))]
    pub pack_size: u32,

    /// Extended options (`key=value`), e.g. `s3.storage-class=STANDARD_IA`.
    #[serde(rename(serialize = "--option="))]
    pub options: Vec<String>,

    #[serde(rename(serialize = "--insecure-tls"))]
    pub insecure_tls: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Auto,
    Off,
    Max,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct InitOptions {
    #[serde(rename = "--from-repo=")]
    pub from_repo: String,

    #[serde(rename = "--copy-chunker-params")]
    pub copy_chunker_params: bool,

    #[serde(rename = "--repository-version=")]
    pub repository_version: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BackupOptions {
    #[serde(rename = "--host=")]
    pub host: String,

    #[serde(rename = "--tag=")]
    pub tags: Vec<String>,

    #[serde(rename = "--exclude=")]
    pub exclude: Vec<String>,

    #[serde(rename = "--iexclude=")]
    pub iexclude: Vec<String>,

    #[serde(rename = "--exclude-file=")]
    pub exclude_file: Vec<PathBuf>,

    #[serde(rename = "--exclude-if-present=")]
    pub exclude_if_present: Vec<String>,

    #[serde(rename = "--exclude-caches")]
    pub exclude_caches: bool,

    #[serde(rename = "--one-file-system")]
    pub one_file_system: bool,

    /// Snapshot to compare against instead of the latest one.
    #[serde(rename = "--parent=")]
    pub parent: String,

    /// Reread all files even if unchanged.
    #[serde(rename = "--force")]
    pub force: bool,

    #[serde(rename = "--read-concurrency=")]
    pub read_concurrency: u32,

    #[serde(rename = "--time=")]
    pub time: String,

    #[serde(rename = "--with-atime")]
    pub with_atime: bool,

    #[serde(rename = "--dry-run")]
    pub dry_run: bool,

    /// Read the data to back up from standard input.
    #[serde(rename = "--stdin")]
    pub stdin: bool,

    #[serde(rename = "--stdin-filename=")]
    pub stdin_filename: String,

    pub paths: Vec<String>,
}

/// Snapshot filter shared by most subcommands.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SnapshotFilter {
    #[serde(rename = "--host=")]
    pub hosts: Vec<String>,

    #[serde(rename = "--tag=")]
    pub tags: Vec<String>,

    #[serde(rename = "--path=")]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ForgetOptions {
    #[serde(rename = "--keep-last=")]
    pub keep_last: u32,

    #[serde(rename = "--keep-hourly=")]
    pub keep_hourly: u32,

    #[serde(rename = "--keep-daily=")]
    pub keep_daily: u32,

    #[serde(rename = "--keep-weekly=")]
    pub keep_weekly: u32,

    #[serde(rename = "--keep-monthly=")]
    pub keep_monthly: u32,

    #[serde(rename = "--keep-yearly=")]
    pub keep_yearly: u32,

    #[serde(rename = "--keep-within=")]
    pub keep_within: String,

    #[serde(rename = "--keep-tag=")]
    pub keep_tags: Vec<String>,

    pub filter: SnapshotFilter,

    #[serde(rename = "--group-by=")]
    pub group_by: String,

    /// Always set before invoking restic, the JSON output isn't parseable
    /// otherwise.
    #[serde(rename = "--compact")]
    pub compact: bool,

    #[serde(rename = "--prune")]
    pub prune: bool,

    #[serde(rename = "--dry-run")]
    pub dry_run: bool,

    pub snapshot_ids: Vec<String>,
}

impl ForgetOptions {
    /// Whether any `--keep-*` rule or explicit snapshot is given.
    pub fn has_policy(&self) -> bool {
        self.keep_last > 0
            || self.keep_hourly > 0
            || self.keep_daily > 0
            || self.keep_weekly > 0
            || self.keep_monthly > 0
            || self.keep_yearly > 0
            || !self.keep_within.is_empty()
            || !self.keep_tags.is_empty()
            || !self.snapshot_ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PruneOptions {
    /// Tolerated unused space, e.g. `5%` or `unlimited`.
    #[serde(rename = "--max-unused=")]
    pub max_unused: String,

    #[serde(rename = "--max-repack-size=")]
    pub max_repack_size: String,

    #[serde(rename = "--repack-cacheable-only")]
    pub repack_cacheable_only: bool,

    #[serde(rename = "--dry-run")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CheckOptions {
    #[serde(rename = "--read-data")]
    pub read_data: bool,

    /// Subset of the data to read, e.g. `1/5` or `10%`.
    #[serde(rename = "--read-data-subset=")]
    pub read_data_subset: String,

    #[serde(rename = "--with-cache")]
    pub with_cache: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RebuildIndexOptions {
    #[serde(rename = "--read-all-packs")]
    pub read_all_packs: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RestoreOptions {
    #[serde(rename = "--target=")]
    pub target: PathBuf,

    #[serde(rename = "--include=")]
    pub include: Vec<String>,

    #[serde(rename = "--exclude=")]
    pub exclude: Vec<String>,

    pub filter: SnapshotFilter,

    #[serde(rename = "--verify")]
    pub verify: bool,

    /// Snapshot ID or `latest`.
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UnlockOptions {
    /// Remove all locks, even exclusive ones held by running processes.
    #[serde(rename = "--remove-all")]
    pub remove_all: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TagOptions {
    #[serde(rename = "--add=")]
    pub add: Vec<String>,

    #[serde(rename = "--remove=")]
    pub remove: Vec<String>,

    #[serde(rename = "--set=")]
    pub set: Vec<String>,

    pub filter: SnapshotFilter,

    pub snapshot_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FindOptions {
    pub filter: SnapshotFilter,

    /// Only search in these snapshots.
    #[serde(rename = "--snapshot=")]
    pub snapshots: Vec<String>,

    #[serde(rename = "--ignore-case")]
    pub ignore_case: bool,

    #[serde(rename = "--newest=")]
    pub newest: String,

    #[serde(rename = "--oldest=")]
    pub oldest: String,

    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SnapshotsOptions {
    pub filter: SnapshotFilter,

    /// Only the latest `n` snapshots of every path and host.
    #[serde(rename = "--latest=")]
    pub latest: u32,

    #[serde(rename = "--group-by=")]
    pub group_by: String,

    pub snapshot_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StatsMode {
    RestoreSize,
    FilesByContents,
    RawData,
    BlobsPerFile,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatsOptions {
    pub filter: SnapshotFilter,

    #[serde(rename = "--mode=")]
    pub mode: Option<StatsMode>,

    pub snapshot_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LsOptions {
    pub filter: SnapshotFilter,

    /// Keep permissions, ownership, size and modification time of files.
    #[serde(rename = "--long")]
    pub long: bool,

    #[serde(rename = "--recursive")]
    pub recursive: bool,

    /// Snapshot ID or `latest`.
    pub snapshot_id: String,

    /// Only list these directories.
    pub dirs: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DumpOptions {
    pub filter: SnapshotFilter,

    /// Archive format for directories, `tar` or `zip`.
    #[serde(rename = "--archive=")]
    pub archive: String,

    /// Snapshot ID or `latest`.
    pub snapshot_id: String,

    /// File inside the snapshot to write to standard output.
    pub file: String,
}
