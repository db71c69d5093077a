//! Backup of a plain directory, read by restic in place.

use std::path::PathBuf;

use super::{require_dir, BackendError, Backup, Restore, Target};
use crate::config::ConfigError;
use crate::exec::Context;
use crate::restic::BackupOptions;
use crate::util;

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Directory to back up.
    pub path: PathBuf,

    /// Patterns excluded from the snapshot.
    pub exclude: Vec<String>,

    /// Skip directories containing a `CACHEDIR.TAG`.
    pub exclude_caches: bool,
}

/// The [Directory] backend hands a directory to restic unchanged.
#[derive(Debug)]
pub struct Directory {
    config: DirectoryConfig,
}

impl Directory {
    pub fn new(config: &DirectoryConfig) -> Result<Self, BackendError> {
        if config.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                section: "directory",
                field: "path",
            }
            .into());
        }
        if config.path.is_relative() {
            log::warn!(target: "backend::directory", "path is relative: {}", config.path.display());
        }
        Ok(Self {
            config: config.clone(),
        })
    }
}

impl Target for Directory {
    fn backup_path(&self) -> PathBuf {
        self.config.path.clone()
    }

    fn hostname(&self) -> String {
        util::hostname()
    }

    fn clean_up(&self) -> Result<(), BackendError> {
        // the data is never copied
        Ok(())
    }
}

impl Backup for Directory {
    fn create_backup(&self, _ctx: &Context) -> Result<(), BackendError> {
        require_dir(&self.config.path)?;
        log::info!(target: "backend::directory", "Backing up {} in place", self.config.path.display());
        Ok(())
    }

    fn tune_restic(&self, options: &mut BackupOptions) {
        options.exclude.extend(self.config.exclude.iter().cloned());
        options.exclude_caches |= self.config.exclude_caches;
    }
}

impl Restore for Directory {
    fn restore_backup(&self, _ctx: &Context) -> Result<(), BackendError> {
        // restic restores the files in place
        require_dir(&self.config.path)?;
        log::info!(target: "backend::directory", "Restored {}", self.config.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_required() {
        let err = Directory::new(&DirectoryConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Config(ConfigError::MissingField { field: "path", .. })
        ));
    }

    #[test]
    fn missing_directory_fails_backup() {
        let dir = tempfile::tempdir().unwrap();
        let config = DirectoryConfig {
            path: dir.path().join("missing"),
            ..Default::default()
        };
        let directory = Directory::new(&config).unwrap();

        let err = directory.create_backup(&Context::background()).unwrap_err();
        assert!(matches!(err, BackendError::MissingPath(_)));
    }

    #[test]
    fn excludes_are_passed_to_restic() {
        let dir = tempfile::tempdir().unwrap();
        let config = DirectoryConfig {
            path: dir.path().to_path_buf(),
            exclude: vec!["*.cache".into()],
            exclude_caches: true,
        };
        let directory = Directory::new(&config).unwrap();
        directory.create_backup(&Context::background()).unwrap();

        let mut options = BackupOptions::default();
        directory.tune_restic(&mut options);
        assert_eq!(options.exclude, ["*.cache"]);
        assert!(options.exclude_caches);
        assert_eq!(directory.backup_path(), dir.path());
    }
}
