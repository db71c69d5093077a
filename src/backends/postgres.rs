//! Implements backup of a PostgreSQL database using [PgDump].

use std::path::{Path, PathBuf};

use super::{ensure_dir, remove_path, schedule, BackendError, Backup, Restore, Target};
use crate::args::to_args;
use crate::config::{ConfigError, ProcessConfig};
use crate::exec::{self, CommandSpec, Context};
use crate::util;

const DEFAULT_DUMP_DIR: &str = "/var/backups/pgdump";

/// Connection flags shared by `pg_dump` and `psql`.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PgConnection {
    /// Host name or socket directory.
    #[serde(rename(serialize = "--host="))]
    pub host: String,

    #[serde(rename(serialize = "--port="))]
    pub port: u16,

    #[serde(rename(serialize = "--username="))]
    pub username: String,

    /// Passed as `PGPASSWORD`.
    #[serde(skip_serializing)]
    pub password: String,

    /// Fail instead of prompting for a password.
    #[serde(rename(serialize = "--no-password"))]
    pub no_password: bool,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PgDumpConfig {
    /// Directory the dump is written to.
    #[serde(skip_serializing)]
    pub dump_dir: PathBuf,

    /// Database to dump.
    #[serde(skip_serializing)]
    pub database: String,

    pub connection: PgConnection,

    /// Emit `DROP` statements before recreating the objects.
    #[serde(rename(serialize = "--clean"))]
    pub clean: bool,

    #[serde(rename(serialize = "--if-exists"))]
    pub if_exists: bool,

    /// Don't restore the ownership of objects.
    #[serde(rename(serialize = "--no-owner"))]
    pub no_owner: bool,

    #[serde(rename(serialize = "--schema="))]
    pub schemas: Vec<String>,

    #[serde(rename(serialize = "--exclude-table="))]
    pub exclude_tables: Vec<String>,
}

impl Default for PgDumpConfig {
    fn default() -> Self {
        Self {
            dump_dir: DEFAULT_DUMP_DIR.into(),
            database: String::new(),
            connection: PgConnection::default(),
            clean: true,
            if_exists: true,
            no_owner: false,
            schemas: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

/// Plain SQL dump of one database, loaded back with `psql`.
#[derive(Debug)]
pub struct PgDump {
    config: PgDumpConfig,
    process: ProcessConfig,
}

impl PgDump {
    pub fn new(config: &PgDumpConfig, process: &ProcessConfig) -> Result<Self, BackendError> {
        if config.database.is_empty() {
            return Err(ConfigError::MissingField {
                section: "pgdump",
                field: "database",
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
            .join(format!("{}.sql", self.config.database))
    }

    fn with_password(&self, spec: CommandSpec) -> CommandSpec {
        let password = &self.config.connection.password;
        if password.is_empty() {
            spec
        } else {
            spec.env_default("PGPASSWORD", password.as_str())
        }
    }

    fn dump_command(&self, dump_file: &Path) -> CommandSpec {
        let spec = CommandSpec::new("pg_dump")
            .args(to_args(&self.config))
            .arg(format!("--file={}", dump_file.display()))
            .arg(self.config.database.as_str());
        schedule(self.with_password(spec), &self.process)
    }

    fn restore_command(&self, dump_file: &Path) -> CommandSpec {
        let spec = CommandSpec::new("psql")
            .args(to_args(&self.config.connection))
            .arg("--set=ON_ERROR_STOP=1")
            .arg(format!("--dbname={}", self.config.database))
            .arg(format!("--file={}", dump_file.display()));
        schedule(self.with_password(spec), &self.process)
    }
}

impl Target for PgDump {
    fn backup_path(&self) -> PathBuf {
        self.config.dump_dir.clone()
    }

    fn hostname(&self) -> String {
        util::snapshot_host(&self.config.connection.host)
    }

    fn clean_up(&self) -> Result<(), BackendError> {
        remove_path(&self.dump_file())
    }
}

impl Backup for PgDump {
    fn create_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        log::info!(target: "backend::pgdump", "Create database dump of: {}", self.config.database);
        ensure_dir(&self.config.dump_dir)?;
        let dump_file = self.dump_file();
        log::debug!(target: "backend::pgdump", "Save database dump at: {}", dump_file.display());

        exec::run_with_timeout(ctx, self.dump_command(&dump_file), self.process.timeout())?;
        Ok(())
    }
}

impl Restore for PgDump {
    fn restore_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        let dump_file = self.dump_file();
        if !dump_file.is_file() {
            return Err(BackendError::MissingPath(dump_file));
        }
        log::info!(target: "backend::pgdump", "Loading {} into {}", dump_file.display(), self.config.database);

        exec::run_with_timeout(ctx, self.restore_command(&dump_file), self.process.timeout())?;
        Ok(())
    }
}
