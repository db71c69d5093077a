//! Configuration file of the backup runner.
//!
//! ```toml
//! [process]
//! nice = 10
//! ionice = 3
//!
//! [restic]
//! repository = "s3:https://s3.example.com/backups"
//! password_file = "/etc/backup_runner/restic.key"
//!
//! [restic.global]
//! no_cache = true
//!
//! [restic.retention]
//! daily = 7
//! weekly = 4
//!
//! [mysqldump]
//! dump_dir = "/var/backups/mysql"
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_more::{Display, Error, From};

use crate::backends::{
    directory::DirectoryConfig, filesystem::FilesystemConfig, mongodb::MongoDumpConfig,
    mysql::MysqlDumpConfig, postgres::PgDumpConfig, redis::RedisConfig, tar::TarConfig,
    xfs::XfsDumpConfig,
};
use crate::exec::LONG_RUNNING_TIMEOUT;
use crate::restic::GlobalOptions;
use crate::util::retention::RetentionConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/backup_runner/config.toml";

#[derive(Debug, Display, Error, From)]
/// Errors on loading or interpreting the configuration.
pub enum ConfigError {
    /// The configuration file can't be read.
    #[display("Reading config file {} failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// The configuration file isn't valid TOML or doesn't match the schema.
    #[display("Parsing config failed: {_0}")]
    #[from]
    Parse(toml::de::Error),
    /// A section required by the requested operation is absent.
    #[display("Config section [{_0}] is missing")]
    MissingSection(#[error(ignore)] &'static str),
    /// A required field of a section is unset.
    #[display("Config field '{field}' of section [{section}] is required")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    /// A field holds a value outside of its domain.
    #[display("Config field '{field}' of section [{section}] is invalid: {reason}")]
    InvalidValue {
        section: &'static str,
        field: &'static str,
        reason: String,
    },
}

/// Complete configuration, passed explicitly to every component.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub process: ProcessConfig,
    pub restic: ResticConfig,

    pub directory: Option<DirectoryConfig>,
    pub filesystem: Option<FilesystemConfig>,
    pub mongodump: Option<MongoDumpConfig>,
    pub mysqldump: Option<MysqlDumpConfig>,
    pub pgdump: Option<PgDumpConfig>,
    pub redis: Option<RedisConfig>,
    pub xfsdump: Option<XfsDumpConfig>,
    pub tar: Option<TarConfig>,
}

impl Config {
    /// Read and validate the configuration file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        log::debug!(target: "config", "Reading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.process.validate()?;
        if self.restic.binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                section: "restic",
                field: "binary",
                reason: "must not be empty".to_string(),
            });
        }
        if self.restic.repository.is_empty() && std::env::var_os("RESTIC_REPOSITORY").is_none() {
            log::debug!(target: "config", "No restic repository configured, restic subcommands will fail");
        }
        Ok(())
    }

    /// Section of `kind`, an error if it is absent.
    pub fn section<'a, T>(
        section: &'a Option<T>,
        name: &'static str,
    ) -> Result<&'a T, ConfigError> {
        section.as_ref().ok_or(ConfigError::MissingSection(name))
    }
}

/// Scheduling of every spawned program.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessConfig {
    /// CPU niceness (`nice -n`), from `-20` to `19`.
    pub nice: Option<i32>,

    /// IO scheduling class (`ionice -c`): 1 realtime, 2 best-effort, 3 idle.
    pub ionice: Option<u8>,

    /// Upper bound of a single invocation in seconds.
    pub timeout_secs: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            nice: None,
            ionice: None,
            timeout_secs: LONG_RUNNING_TIMEOUT.as_secs(),
        }
    }
}

impl ProcessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(nice) = self.nice.filter(|nice| !(-20..=19).contains(nice)) {
            return Err(ConfigError::InvalidValue {
                section: "process",
                field: "nice",
                reason: format!("{nice} is not within -20..=19"),
            });
        }
        if let Some(class) = self.ionice.filter(|class| !(1..=3).contains(class)) {
            return Err(ConfigError::InvalidValue {
                section: "process",
                field: "ionice",
                reason: format!("{class} is not a scheduling class (1, 2 or 3)"),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                section: "process",
                field: "timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Repository access and defaults of every restic invocation.
///
/// Secrets are handed to restic through its environment variables and never
/// override variables already set by the operator.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResticConfig {
    /// Path or name of the restic binary.
    pub binary: String,

    /// `RESTIC_REPOSITORY`
    pub repository: String,

    /// `RESTIC_PASSWORD`
    pub password: String,

    /// `RESTIC_PASSWORD_FILE`
    pub password_file: Option<PathBuf>,

    /// `RESTIC_HOST`, snapshots are recorded under the backend's host if unset.
    pub host: String,

    /// `AWS_ACCESS_KEY_ID` of S3 repositories.
    pub aws_access_key_id: String,

    /// `AWS_SECRET_ACCESS_KEY` of S3 repositories.
    pub aws_secret_access_key: String,

    /// Remove stale locks before backup and restore.
    pub unlock: bool,

    /// Tags added to every snapshot.
    pub tags: Vec<String>,

    /// Snapshots to keep on `forget`.
    pub retention: RetentionConfig,

    /// Options passed to every subcommand.
    pub global: GlobalOptions,
}

impl Default for ResticConfig {
    fn default() -> Self {
        Self {
            binary: "restic".to_string(),
            repository: String::new(),
            password: String::new(),
            password_file: None,
            host: String::new(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            unlock: true,
            tags: Vec::new(),
            retention: RetentionConfig::default(),
            global: GlobalOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.restic.binary, "restic");
        assert!(config.restic.unlock);
        assert_eq!(config.process.timeout(), LONG_RUNNING_TIMEOUT);
        assert!(config.mysqldump.is_none());
    }

    #[test]
    fn restic_section_with_global_options() {
        let config = Config::from_toml_str(
            r#"
            [restic]
            repository = "/srv/restic"
            password_file = "/etc/backup_runner/restic.key"
            unlock = false
            tags = ["nightly"]

            [restic.global]
            no_cache = true
            options = ["s3.storage-class=STANDARD_IA"]

            [restic.retention]
            daily = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.restic.repository, "/srv/restic");
        assert!(!config.restic.unlock);
        assert!(config.restic.global.no_cache);
        assert_eq!(config.restic.global.options, ["s3.storage-class=STANDARD_IA"]);
        assert_eq!(config.restic.retention.daily, Some(7));
    }

    #[test]
    fn misspelled_restic_field_is_rejected() {
        let err = Config::from_toml_str("[restic]\npasswrd = \"secret\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        // global options belong to their own table
        assert!(Config::from_toml_str("[restic]\nno_cache = true").is_err());
        assert!(Config::from_toml_str("[restic.retention]\ndialy = 7").is_err());
    }

    #[test]
    fn invalid_ionice_class_is_rejected() {
        let err = Config::from_toml_str("[process]\nionice = 4").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "ionice",
                ..
            }
        ));
    }

    #[test]
    fn invalid_nice_level_is_rejected() {
        assert!(Config::from_toml_str("[process]\nnice = 40").is_err());
        assert!(Config::from_toml_str("[process]\nnice = -5").is_ok());
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = Config::from_toml_str("[borg]\nrepo = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_path(&dir.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn missing_section() {
        let config = Config::default();
        let err = Config::section(&config.redis, "redis").unwrap_err();
        assert_eq!(err.to_string(), "Config section [redis] is missing");
    }
}
