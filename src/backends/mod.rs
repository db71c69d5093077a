//! Backend modules, one per kind of data source.
//!
//! Currently the following backends are implemented:
//!
//! - [Directory]: A directory backed up in place by restic.
//! - [Filesystem]: A mounted filesystem backed up in place by restic.
//! - [MongoDump]: `mongodump` / `mongorestore`.
//! - [MysqlDump]: `mysqldump` / `mysql`.
//! - [PgDump]: `pg_dump` / `psql`.
//! - [Redis]: `redis-cli --rdb`, backup only.
//! - [XfsDump]: `xfsdump` / `xfsrestore`.
//! - [Tar]: `tar` archives, optionally streamed into restic.

pub mod directory;
pub mod filesystem;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod redis;
pub mod tar;
pub mod xfs;

pub use directory::Directory;
pub use filesystem::Filesystem;
pub use mongodb::MongoDump;
pub use mysql::MysqlDump;
pub use postgres::PgDump;
pub use redis::Redis;
pub use tar::Tar;
pub use xfs::XfsDump;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use derive_more::{Display, Error, From};

use crate::config::{Config, ConfigError, ProcessConfig};
use crate::exec::{CommandSpec, ExecError};
use crate::restic::{BackupOptions, TarStream};

#[derive(Debug, Display, Error, From)]
/// Errors of the backend adapters.
pub enum BackendError {
    #[display("{_0}")]
    Config(ConfigError),
    #[display("{_0}")]
    Exec(ExecError),
    /// Preparing or removing a local artifact failed.
    #[display("{} failed: {source}", path.display())]
    #[from(ignore)]
    Io { path: PathBuf, source: io::Error },
    /// The data to back up or restore doesn't exist.
    #[display("{} does not exist", _0.display())]
    #[from(ignore)]
    MissingPath(#[error(ignore)] PathBuf),
    /// The kind can't restore its backups.
    #[display("Backends of kind '{_0}' can't restore backups")]
    #[from(ignore)]
    UnsupportedRestore(#[error(ignore)] Kind),
}

impl BackendError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Kind name nobody registered.
#[derive(Debug, Display, Error)]
#[display("Unknown backend kind '{_0}', expected one of: {}", Kind::ALL.map(Kind::as_str).join(", "))]
pub struct UnknownKind(#[error(ignore)] pub String);

/// Kind of a backend, the key of its config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Directory,
    Filesystem,
    MongoDump,
    MysqlDump,
    PgDump,
    Redis,
    XfsDump,
    Tar,
}

impl Kind {
    pub const ALL: [Kind; 8] = [
        Kind::Directory,
        Kind::Filesystem,
        Kind::MongoDump,
        Kind::MysqlDump,
        Kind::PgDump,
        Kind::Redis,
        Kind::XfsDump,
        Kind::Tar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Directory => "directory",
            Kind::Filesystem => "filesystem",
            Kind::MongoDump => "mongodump",
            Kind::MysqlDump => "mysqldump",
            Kind::PgDump => "pgdump",
            Kind::Redis => "redis",
            Kind::XfsDump => "xfsdump",
            Kind::Tar => "tar",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Location and identity of the data a backend manages.
pub trait Target {
    /// Path restic backs up, and restores before [Restore::restore_backup].
    fn backup_path(&self) -> PathBuf;

    /// Host the snapshots are recorded under.
    fn hostname(&self) -> String;

    /// Remove local artifacts of a backup or restore.
    fn clean_up(&self) -> Result<(), BackendError>;

    /// Archive streamed into restic instead of writing [Self::backup_path].
    fn tar_stream(&self) -> Option<TarStream> {
        None
    }
}

/// Backend able to create backups.
pub trait Backup: Target {
    /// Write the backup to [Target::backup_path].
    fn create_backup(&self, ctx: &crate::exec::Context) -> Result<(), BackendError>;

    /// Adjust the options of `restic backup` to this backend.
    fn tune_restic(&self, _options: &mut BackupOptions) {}
}

/// Backend able to restore backups.
pub trait Restore: Target {
    /// Load the backup found at [Target::backup_path].
    fn restore_backup(&self, ctx: &crate::exec::Context) -> Result<(), BackendError>;
}

/// Create the backup adapter of `kind` from its config section.
pub fn backup_adapter(kind: Kind, config: &Config) -> Result<Box<dyn Backup>, BackendError> {
    let process = &config.process;
    let section = kind.as_str();
    let adapter: Box<dyn Backup> = match kind {
        Kind::Directory => Box::new(Directory::new(Config::section(&config.directory, section)?)?),
        Kind::Filesystem => Box::new(Filesystem::new(Config::section(
            &config.filesystem,
            section,
        )?)?),
        Kind::MongoDump => Box::new(MongoDump::new(
            Config::section(&config.mongodump, section)?,
            process,
        )?),
        Kind::MysqlDump => Box::new(MysqlDump::new(
            Config::section(&config.mysqldump, section)?,
            process,
        )?),
        Kind::PgDump => Box::new(PgDump::new(Config::section(&config.pgdump, section)?, process)?),
        Kind::Redis => Box::new(Redis::new(Config::section(&config.redis, section)?, process)?),
        Kind::XfsDump => Box::new(XfsDump::new(
            Config::section(&config.xfsdump, section)?,
            process,
        )?),
        Kind::Tar => Box::new(Tar::new(Config::section(&config.tar, section)?, process)?),
    };
    Ok(adapter)
}

/// Create the restore adapter of `kind` from its config section.
pub fn restore_adapter(kind: Kind, config: &Config) -> Result<Box<dyn Restore>, BackendError> {
    let process = &config.process;
    let section = kind.as_str();
    let adapter: Box<dyn Restore> = match kind {
        Kind::Directory => Box::new(Directory::new(Config::section(&config.directory, section)?)?),
        Kind::Filesystem => Box::new(Filesystem::new(Config::section(
            &config.filesystem,
            section,
        )?)?),
        Kind::MongoDump => Box::new(MongoDump::new(
            Config::section(&config.mongodump, section)?,
            process,
        )?),
        Kind::MysqlDump => Box::new(MysqlDump::new(
            Config::section(&config.mysqldump, section)?,
            process,
        )?),
        Kind::PgDump => Box::new(PgDump::new(Config::section(&config.pgdump, section)?, process)?),
        Kind::Redis => return Err(BackendError::UnsupportedRestore(kind)),
        Kind::XfsDump => Box::new(XfsDump::new(
            Config::section(&config.xfsdump, section)?,
            process,
        )?),
        Kind::Tar => Box::new(Tar::new(Config::section(&config.tar, section)?, process)?),
    };
    Ok(adapter)
}

/// Apply the scheduling of `process` to `spec`.
pub(crate) fn schedule(spec: CommandSpec, process: &ProcessConfig) -> CommandSpec {
    spec.nice(process.nice).ionice(process.ionice)
}

/// Directory dump files are written to, created if missing.
pub(crate) fn ensure_dir(path: &Path) -> Result<(), BackendError> {
    std::fs::create_dir_all(path).map_err(BackendError::io(path))
}

/// Remove `path` if it exists.
pub(crate) fn remove_path(path: &Path) -> Result<(), BackendError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackendError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Fail with [BackendError::MissingPath] unless `path` is an existing directory.
pub(crate) fn require_dir(path: &Path) -> Result<(), BackendError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(BackendError::MissingPath(path.to_path_buf()))
    }
}
