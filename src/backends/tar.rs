//! Implements backup of arbitrary paths as a `tar` archive.
//!
//! The archive is either written to disk and backed up like every other dump,
//! or streamed straight into restic when `stream` is set.

use std::path::{Path, PathBuf};

use super::{ensure_dir, remove_path, schedule, BackendError, Backup, Restore, Target};
use crate::config::{ConfigError, ProcessConfig};
use crate::exec::{self, Context};
use crate::restic::TarStream;
use crate::util;

const DEFAULT_ARCHIVE_DIR: &str = "/var/backups/tar";
const DEFAULT_ARCHIVE_NAME: &str = "archive.tar";

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TarConfig {
    /// Paths to archive, relative to `directory` if set.
    pub paths: Vec<PathBuf>,

    /// Patterns excluded from the archive.
    pub exclude: Vec<String>,

    /// Directory to archive from and extract into, `/` on extraction if unset.
    pub directory: Option<PathBuf>,

    /// Directory the archive is written to.
    pub archive_dir: PathBuf,

    /// File name of the archive, also used inside restic snapshots.
    pub archive_name: String,

    /// Stream the archive into restic without writing it to disk.
    pub stream: bool,

    pub one_file_system: bool,
}

impl Default for TarConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            exclude: Vec::new(),
            directory: None,
            archive_dir: DEFAULT_ARCHIVE_DIR.into(),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            stream: false,
            one_file_system: false,
        }
    }
}

#[derive(Debug)]
pub struct Tar {
    config: TarConfig,
    process: ProcessConfig,
}

impl Tar {
    pub fn new(config: &TarConfig, process: &ProcessConfig) -> Result<Self, BackendError> {
        if config.paths.is_empty() {
            return Err(ConfigError::MissingField {
                section: "tar",
                field: "paths",
            }
            .into());
        }
        if config.archive_name.is_empty() || config.archive_name.contains('/') {
            return Err(ConfigError::InvalidValue {
                section: "tar",
                field: "archive_name",
                reason: format!("'{}' is not a file name", config.archive_name),
            }
            .into());
        }
        Ok(Self {
            config: config.clone(),
            process: process.clone(),
        })
    }

    fn stream(&self) -> TarStream {
        TarStream {
            paths: self.config.paths.clone(),
            exclude: self.config.exclude.clone(),
            directory: self.config.directory.clone(),
            stdin_filename: self.config.archive_name.clone(),
            one_file_system: self.config.one_file_system,
            ..Default::default()
        }
    }

    fn archive(&self) -> PathBuf {
        self.config.archive_dir.join(&self.config.archive_name)
    }
}

impl Target for Tar {
    fn backup_path(&self) -> PathBuf {
        self.config.archive_dir.clone()
    }

    fn hostname(&self) -> String {
        util::hostname()
    }

    fn clean_up(&self) -> Result<(), BackendError> {
        remove_path(&self.archive())
    }

    fn tar_stream(&self) -> Option<TarStream> {
        self.config.stream.then(|| self.stream())
    }
}

impl Backup for Tar {
    fn create_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        let archive = self.archive();
        log::info!(target: "backend::tar", "Archiving into {}", archive.display());
        ensure_dir(&self.config.archive_dir)?;

        let spec = schedule(self.stream().create_command(&archive), &self.process);
        exec::run_with_timeout(ctx, spec, self.process.timeout())?;
        Ok(())
    }
}

impl Restore for Tar {
    fn restore_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        let archive = self.archive();
        if !archive.is_file() {
            return Err(BackendError::MissingPath(archive));
        }
        let stream = self.stream();
        let target: &Path = stream.extract_target();
        log::info!(target: "backend::tar", "Extracting {} into {}", archive.display(), target.display());

        let spec = schedule(stream.extract_command(&archive, target), &self.process);
        exec::run_with_timeout(ctx, spec, self.process.timeout())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_required() {
        assert!(Tar::new(&TarConfig::default(), &ProcessConfig::default()).is_err());
    }

    #[test]
    fn archive_name_must_be_a_file_name() {
        let config = TarConfig {
            paths: vec!["etc".into()],
            archive_name: "../etc.tar".into(),
            ..Default::default()
        };
        assert!(Tar::new(&config, &ProcessConfig::default()).is_err());
    }

    #[test]
    fn stream_only_when_configured() {
        let mut config = TarConfig {
            paths: vec!["etc".into()],
            archive_name: "etc.tar".into(),
            ..Default::default()
        };
        assert_eq!(
            Tar::new(&config, &ProcessConfig::default())
                .unwrap()
                .tar_stream(),
            None
        );

        config.stream = true;
        let stream = Tar::new(&config, &ProcessConfig::default())
            .unwrap()
            .tar_stream()
            .unwrap();
        assert_eq!(stream.stdin_filename, "etc.tar");
        assert_eq!(stream.paths, [PathBuf::from("etc")]);
    }

    #[test]
    fn archive_and_extract_round_trip() {
        let source = tempfile::tempdir().unwrap();
        let archive_dir = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        std::fs::create_dir(source.path().join("www")).unwrap();
        std::fs::write(source.path().join("www/index.html"), "<h1>hi</h1>").unwrap();

        let mut config = TarConfig {
            paths: vec!["www".into()],
            directory: Some(source.path().to_path_buf()),
            archive_dir: archive_dir.path().to_path_buf(),
            ..Default::default()
        };
        let ctx = Context::background();
        let tar = Tar::new(&config, &ProcessConfig::default()).unwrap();
        tar.create_backup(&ctx).unwrap();
        assert!(archive_dir.path().join("archive.tar").is_file());

        config.directory = Some(target.path().to_path_buf());
        let tar = Tar::new(&config, &ProcessConfig::default()).unwrap();
        tar.restore_backup(&ctx).unwrap();
        assert_eq!(
            std::fs::read_to_string(target.path().join("www/index.html")).unwrap(),
            "<h1>hi</h1>"
        );

        tar.clean_up().unwrap();
        assert!(!archive_dir.path().join("archive.tar").exists());
    }
}
