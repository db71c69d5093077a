//! Implements backup of XFS filesystems using `xfsdump` / `xfsrestore`.

use std::path::PathBuf;

use super::{ensure_dir, remove_path, schedule, BackendError, Backup, Restore, Target};
use crate::args::to_args;
use crate::config::{ConfigError, ProcessConfig};
use crate::exec::{self, CommandSpec, Context};
use crate::util;

const DEFAULT_DUMP_DIR: &str = "/var/backups/xfsdump";
const DEFAULT_LABEL: &str = "backup_runner";

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XfsDumpConfig {
    /// Mount point of the filesystem to dump and to restore into.
    #[serde(skip_serializing)]
    pub mount_point: PathBuf,

    /// Directory the dump is written to.
    #[serde(skip_serializing)]
    pub dump_dir: PathBuf,

    /// Dump level, `0` is a full dump.
    #[serde(rename(serialize = "-l"))]
    pub level: u8,

    /// Session label, prompted for if missing.
    #[serde(rename(serialize = "-L"))]
    pub session_label: String,

    /// Media label, prompted for if missing.
    #[serde(rename(serialize = "-M"))]
    pub media_label: String,

    /// Paths below the mount point limiting the dump.
    #[serde(rename(serialize = "-s"))]
    pub subtrees: Vec<String>,
}

impl Default for XfsDumpConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::new(),
            dump_dir: DEFAULT_DUMP_DIR.into(),
            level: 0,
            session_label: DEFAULT_LABEL.to_string(),
            media_label: DEFAULT_LABEL.to_string(),
            subtrees: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct XfsDump {
    config: XfsDumpConfig,
    process: ProcessConfig,
}

impl XfsDump {
    pub fn new(config: &XfsDumpConfig, process: &ProcessConfig) -> Result<Self, BackendError> {
        if config.mount_point.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                section: "xfsdump",
                field: "mount_point",
            }
            .into());
        }
        if config.level > 9 {
            return Err(ConfigError::InvalidValue {
                section: "xfsdump",
                field: "level",
                reason: format!("{} is not within 0..=9", config.level),
            }
            .into());
        }
        Ok(Self {
            config: config.clone(),
            process: process.clone(),
        })
    }

    fn dump_file(&self) -> PathBuf {
        self.config
            .dump_dir
            .join(format!("level{}.xfsdump", self.config.level))
    }

    fn dump_command(&self) -> CommandSpec {
        let spec = CommandSpec::new("xfsdump")
            .args(to_args(&self.config))
            .arg("-f")
            .arg(self.dump_file().display().to_string())
            .arg(self.config.mount_point.display().to_string());
        schedule(spec, &self.process)
    }

    fn restore_command(&self) -> CommandSpec {
        let spec = CommandSpec::new("xfsrestore")
            .arg("-f")
            .arg(self.dump_file().display().to_string())
            .arg(self.config.mount_point.display().to_string());
        schedule(spec, &self.process)
    }
}

impl Target for XfsDump {
    fn backup_path(&self) -> PathBuf {
        self.config.dump_dir.clone()
    }

    fn hostname(&self) -> String {
        util::hostname()
    }

    fn clean_up(&self) -> Result<(), BackendError> {
        remove_path(&self.dump_file())
    }
}

impl Backup for XfsDump {
    fn create_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        log::info!(target: "backend::xfsdump", "Level {} dump of {}", self.config.level, self.config.mount_point.display());
        ensure_dir(&self.config.dump_dir)?;
        // xfsdump refuses to overwrite an existing dump file
        remove_path(&self.dump_file())?;
        exec::run_with_timeout(ctx, self.dump_command(), self.process.timeout())?;
        Ok(())
    }
}

impl Restore for XfsDump {
    fn restore_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        let dump_file = self.dump_file();
        if !dump_file.is_file() {
            return Err(BackendError::MissingPath(dump_file));
        }
        log::info!(target: "backend::xfsdump", "Restoring {} into {}", dump_file.display(), self.config.mount_point.display());
        exec::run_with_timeout(ctx, self.restore_command(), self.process.timeout())?;
        Ok(())
    }
}
