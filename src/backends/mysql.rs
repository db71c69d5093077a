//! Implements backup of MySQL and MariaDB databases using [MysqlDump].

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{ensure_dir, remove_path, schedule, BackendError, Backup, Restore, Target};
use crate::args::to_args;
use crate::config::ProcessConfig;
use crate::exec::{self, CommandSpec, Context};
use crate::util;

const DEFAULT_DUMP_DIR: &str = "/var/backups/mysqldump";

/// Connection flags shared by `mysqldump` and `mysql`.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MysqlConnection {
    /// Option file read in addition to the default ones, e.g. holding the
    /// credentials. Has to be the first flag.
    #[serde(rename(serialize = "--defaults-extra-file="))]
    pub defaults_file: Option<PathBuf>,

    #[serde(rename(serialize = "--host="))]
    pub host: String,

    #[serde(rename(serialize = "--port="))]
    pub port: u16,

    #[serde(rename(serialize = "--socket="))]
    pub socket: Option<PathBuf>,

    #[serde(rename(serialize = "--user="))]
    pub user: String,

    /// Passed as `MYSQL_PWD`.
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MysqlDumpConfig {
    /// Directory the dump is written to.
    #[serde(skip_serializing)]
    pub dump_dir: PathBuf,

    pub connection: MysqlConnection,

    /// Consistent dump of InnoDB tables without locking them.
    #[serde(rename(serialize = "--single-transaction"))]
    pub single_transaction: bool,

    /// Include stored procedures and functions.
    #[serde(rename(serialize = "--routines"))]
    pub routines: bool,

    #[serde(rename(serialize = "--events"))]
    pub events: bool,

    /// Tables to skip, as `database.table`.
    #[serde(rename(serialize = "--ignore-table="))]
    pub ignore_tables: Vec<String>,

    /// Databases to dump, all of them if empty.
    #[serde(skip_serializing)]
    pub databases: Vec<String>,
}

impl Default for MysqlDumpConfig {
    fn default() -> Self {
        Self {
            dump_dir: DEFAULT_DUMP_DIR.into(),
            connection: MysqlConnection::default(),
            single_transaction: true,
            routines: false,
            events: false,
            ignore_tables: Vec::new(),
            databases: Vec::new(),
        }
    }
}

/// Dump of MySQL databases into a single SQL file, loaded back with `mysql`.
#[derive(Debug)]
pub struct MysqlDump {
    config: MysqlDumpConfig,
    process: ProcessConfig,
}

impl MysqlDump {
    pub fn new(config: &MysqlDumpConfig, process: &ProcessConfig) -> Result<Self, BackendError> {
        if config.dump_dir.is_relative() {
            log::warn!(target: "backend::mysqldump", "dump_dir is relative: {}", config.dump_dir.display());
        }
        Ok(Self {
            config: config.clone(),
            process: process.clone(),
        })
    }

    fn dump_file(&self) -> PathBuf {
        let name = match self.config.databases.as_slice() {
            [] => "all-databases".to_string(),
            databases => databases.join("+"),
        };
        self.config.dump_dir.join(format!("{name}.sql"))
    }

    fn with_password(&self, spec: CommandSpec) -> CommandSpec {
        let password = &self.config.connection.password;
        if password.is_empty() {
            spec
        } else {
            spec.env_default("MYSQL_PWD", password.as_str())
        }
    }

    fn dump_command(&self, dump_file: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new("mysqldump")
            .args(to_args(&self.config))
            .arg(format!("--result-file={}", dump_file.display()));
        spec = match self.config.databases.as_slice() {
            [] => spec.arg("--all-databases"),
            databases => spec.arg("--databases").args(databases.iter().cloned()),
        };
        schedule(self.with_password(spec), &self.process)
    }

    fn restore_command(&self, dump_file: &Path) -> CommandSpec {
        let spec = CommandSpec::new("mysql")
            .args(to_args(&self.config.connection))
            .stdin_file(dump_file);
        schedule(self.with_password(spec), &self.process)
    }

    fn timeout(&self) -> Duration {
        self.process.timeout()
    }
}

impl Target for MysqlDump {
    fn backup_path(&self) -> PathBuf {
        self.config.dump_dir.clone()
    }

    fn hostname(&self) -> String {
        util::snapshot_host(&self.config.connection.host)
    }

    fn clean_up(&self) -> Result<(), BackendError> {
        let dump_file = self.dump_file();
        log::debug!(target: "backend::mysqldump", "Removing {}", dump_file.display());
        remove_path(&dump_file)
    }
}

impl Backup for MysqlDump {
    fn create_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        log::info!(target: "backend::mysqldump", "Create database dump of: {}", match self.config.databases.as_slice() {
            [] => "all databases".to_string(),
            databases => databases.join(", "),
        });
        log::trace!(target: "backend::mysqldump", "Using user '{}' for backup", self.config.connection.user);

        ensure_dir(&self.config.dump_dir)?;
        let dump_file = self.dump_file();
        log::debug!(target: "backend::mysqldump", "Save database dump at: {}", dump_file.display());

        exec::run_with_timeout(ctx, self.dump_command(&dump_file), self.timeout())?;
        log::info!(target: "backend::mysqldump", "Finished database dump.");
        Ok(())
    }
}

impl Restore for MysqlDump {
    fn restore_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        let dump_file = self.dump_file();
        if !dump_file.is_file() {
            return Err(BackendError::MissingPath(dump_file));
        }
        log::info!(target: "backend::mysqldump", "Loading database dump {}", dump_file.display());

        exec::run_with_timeout(ctx, self.restore_command(&dump_file), self.timeout())?;
        log::info!(target: "backend::mysqldump", "Finished loading database dump.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MysqlDumpConfig {
        MysqlDumpConfig {
            dump_dir: "/var/backups/mysql".into(),
            connection: MysqlConnection {
                host: "db01.example.com".into(),
                user: "backup".into(),
                password: "secret".into(),
                ..Default::default()
            },
            databases: vec!["nextcloud".into(), "wiki".into()],
            ..Default::default()
        }
    }

    #[test]
    fn dump_arguments() {
        let mysql = MysqlDump::new(&config(), &ProcessConfig::default()).unwrap();
        let dump_file = mysql.dump_file();

        assert_eq!(dump_file, Path::new("/var/backups/mysql/nextcloud+wiki.sql"));
        assert_eq!(
            mysql.dump_command(&dump_file).argv(),
            [
                "mysqldump",
                "--host=db01.example.com",
                "--user=backup",
                "--single-transaction",
                "--result-file=/var/backups/mysql/nextcloud+wiki.sql",
                "--databases",
                "nextcloud",
                "wiki"
            ]
        );
    }

    #[test]
    fn password_is_never_an_argument() {
        let mysql = MysqlDump::new(&config(), &ProcessConfig::default()).unwrap();
        let argv = mysql.restore_command(&mysql.dump_file()).argv();

        assert_eq!(argv, ["mysql", "--host=db01.example.com", "--user=backup"]);
        assert!(!argv.iter().any(|arg| arg.contains("secret")));
    }

    #[test]
    fn all_databases_by_default() {
        let config = MysqlDumpConfig {
            dump_dir: "/tmp/dump".into(),
            ..Default::default()
        };
        let process = ProcessConfig {
            ionice: Some(3),
            ..Default::default()
        };
        let mysql = MysqlDump::new(&config, &process).unwrap();

        assert_eq!(
            mysql.dump_command(&mysql.dump_file()).argv(),
            [
                "ionice",
                "-c3",
                "mysqldump",
                "--single-transaction",
                "--result-file=/tmp/dump/all-databases.sql",
                "--all-databases"
            ]
        );
    }

    #[test]
    fn remote_host_names_snapshots() {
        let mysql = MysqlDump::new(&config(), &ProcessConfig::default()).unwrap();
        assert_eq!(mysql.hostname(), "db01.example.com");

        let local = MysqlDump::new(&MysqlDumpConfig::default(), &ProcessConfig::default()).unwrap();
        assert_eq!(local.hostname(), util::hostname());
    }

    #[test]
    fn restore_requires_dump() {
        let dir = tempfile::tempdir().unwrap();
        let config = MysqlDumpConfig {
            dump_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mysql = MysqlDump::new(&config, &ProcessConfig::default()).unwrap();

        let err = mysql.restore_backup(&Context::background()).unwrap_err();
        assert!(matches!(err, BackendError::MissingPath(_)));
    }

    #[test]
    fn clean_up_removes_dump() {
        let dir = tempfile::tempdir().unwrap();
        let config = MysqlDumpConfig {
            dump_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mysql = MysqlDump::new(&config, &ProcessConfig::default()).unwrap();
        std::fs::write(mysql.dump_file(), "-- dump").unwrap();

        mysql.clean_up().unwrap();
        assert!(!mysql.dump_file().exists());
        // nothing left to remove
        mysql.clean_up().unwrap();
    }

    #[test]
    fn nested_connection_section() {
        let config: MysqlDumpConfig = toml::from_str(
            r#"
            dump_dir = "/srv/dump"
            databases = ["shop"]

            [connection]
            user = "backup"
            port = 3307
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.port, 3307);
        assert!(config.single_transaction);
    }
}
