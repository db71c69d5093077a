//! Backup of a mounted filesystem, read by restic without crossing into
//! other filesystems.

use std::path::PathBuf;

use super::{require_dir, BackendError, Backup, Restore, Target};
use crate::config::ConfigError;
use crate::exec::Context;
use crate::restic::BackupOptions;
use crate::util;

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesystemConfig {
    /// Mount point of the filesystem.
    pub mount_point: PathBuf,

    /// Patterns excluded from the snapshot.
    pub exclude: Vec<String>,
}

#[derive(Debug)]
pub struct Filesystem {
    config: FilesystemConfig,
}

impl Filesystem {
    pub fn new(config: &FilesystemConfig) -> Result<Self, BackendError> {
        if config.mount_point.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                section: "filesystem",
                field: "mount_point",
            }
            .into());
        }
        Ok(Self {
            config: config.clone(),
        })
    }
}

impl Target for Filesystem {
    fn backup_path(&self) -> PathBuf {
        self.config.mount_point.clone()
    }

    fn hostname(&self) -> String {
        util::hostname()
    }

    fn clean_up(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

impl Backup for Filesystem {
    fn create_backup(&self, _ctx: &Context) -> Result<(), BackendError> {
        require_dir(&self.config.mount_point)?;
        log::info!(target: "backend::filesystem", "Backing up filesystem mounted at {}", self.config.mount_point.display());
        Ok(())
    }

    fn tune_restic(&self, options: &mut BackupOptions) {
        options.one_file_system = true;
        options.exclude.extend(self.config.exclude.iter().cloned());
    }
}

impl Restore for Filesystem {
    fn restore_backup(&self, _ctx: &Context) -> Result<(), BackendError> {
        require_dir(&self.config.mount_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restic_stays_on_one_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let filesystem = Filesystem::new(&FilesystemConfig {
            mount_point: dir.path().to_path_buf(),
            exclude: vec!["lost+found".into()],
        })
        .unwrap();
        filesystem.create_backup(&Context::background()).unwrap();

        let mut options = BackupOptions::default();
        filesystem.tune_restic(&mut options);
        assert!(options.one_file_system);
        assert_eq!(options.exclude, ["lost+found"]);
    }

    #[test]
    fn mount_point_is_required() {
        assert!(Filesystem::new(&FilesystemConfig::default()).is_err());
    }
}
