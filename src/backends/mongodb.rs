//! Implements backup of MongoDB using `mongodump` / `mongorestore`.

use std::path::PathBuf;

use super::{ensure_dir, remove_path, schedule, BackendError, Backup, Restore, Target};
use crate::args::to_args;
use crate::config::ProcessConfig;
use crate::exec::{self, CommandSpec, Context};
use crate::util;

const DEFAULT_DUMP_DIR: &str = "/var/backups/mongodump";

/// Connection flags shared by `mongodump` and `mongorestore`.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MongoConnection {
    /// Connection string, replaces the other connection fields.
    #[serde(rename(serialize = "--uri="))]
    pub uri: String,

    #[serde(rename(serialize = "--host="))]
    pub host: String,

    #[serde(rename(serialize = "--port="))]
    pub port: u16,

    #[serde(rename(serialize = "--username="))]
    pub username: String,

    #[serde(rename(serialize = "--password="))]
    pub password: String,

    #[serde(rename(serialize = "--authenticationDatabase="))]
    pub authentication_database: String,

    #[serde(rename(serialize = "--ssl"))]
    pub ssl: bool,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MongoDumpConfig {
    /// Directory the dump is written to.
    #[serde(skip_serializing)]
    pub dump_dir: PathBuf,

    pub connection: MongoConnection,

    /// Only dump this database.
    #[serde(rename(serialize = "--db="))]
    pub database: String,

    #[serde(rename(serialize = "--gzip"))]
    pub gzip: bool,

    /// Point in time snapshot of a replica set.
    #[serde(rename(serialize = "--oplog"))]
    pub oplog: bool,

    /// Drop every collection before restoring it.
    #[serde(skip_serializing)]
    pub drop: bool,
}

impl Default for MongoDumpConfig {
    fn default() -> Self {
        Self {
            dump_dir: DEFAULT_DUMP_DIR.into(),
            connection: MongoConnection::default(),
            database: String::new(),
            gzip: true,
            oplog: false,
            drop: true,
        }
    }
}

#[derive(Debug)]
pub struct MongoDump {
    config: MongoDumpConfig,
    process: ProcessConfig,
}

impl MongoDump {
    pub fn new(config: &MongoDumpConfig, process: &ProcessConfig) -> Result<Self, BackendError> {
        if config.dump_dir.is_relative() {
            log::warn!(target: "backend::mongodump", "dump_dir is relative: {}", config.dump_dir.display());
        }
        Ok(Self {
            config: config.clone(),
            process: process.clone(),
        })
    }

    fn out_dir(&self) -> PathBuf {
        self.config.dump_dir.join("dump")
    }

    fn dump_command(&self) -> CommandSpec {
        let spec = CommandSpec::new("mongodump")
            .args(to_args(&self.config))
            .arg(format!("--out={}", self.out_dir().display()));
        schedule(spec, &self.process)
    }

    fn restore_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("mongorestore").args(to_args(&self.config.connection));
        if self.config.gzip {
            spec = spec.arg("--gzip");
        }
        if self.config.drop {
            spec = spec.arg("--drop");
        }
        let spec = spec.arg(format!("--dir={}", self.out_dir().display()));
        schedule(spec, &self.process)
    }
}

impl Target for MongoDump {
    fn backup_path(&self) -> PathBuf {
        self.config.dump_dir.clone()
    }

    fn hostname(&self) -> String {
        util::snapshot_host(&self.config.connection.host)
    }

    fn clean_up(&self) -> Result<(), BackendError> {
        remove_path(&self.out_dir())
    }
}

impl Backup for MongoDump {
    fn create_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        log::info!(target: "backend::mongodump", "Dumping MongoDB into {}", self.out_dir().display());
        ensure_dir(&self.config.dump_dir)?;
        exec::run_with_timeout(ctx, self.dump_command(), self.process.timeout())?;
        Ok(())
    }
}

impl Restore for MongoDump {
    fn restore_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        let out_dir = self.out_dir();
        if !out_dir.is_dir() {
            return Err(BackendError::MissingPath(out_dir));
        }
        log::info!(target: "backend::mongodump", "Restoring MongoDB from {}", out_dir.display());
        exec::run_with_timeout(ctx, self.restore_command(), self.process.timeout())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mongo_dump() -> MongoDump {
        let config = MongoDumpConfig {
            dump_dir: "/srv/mongo".into(),
            connection: MongoConnection {
                host: "mongo01".into(),
                port: 27018,
                username: "backup".into(),
                authentication_database: "admin".into(),
                ..Default::default()
            },
            database: "app".into(),
            ..Default::default()
        };
        MongoDump::new(&config, &ProcessConfig::default()).unwrap()
    }

    #[test]
    fn dump_arguments() {
        assert_eq!(
            mongo_dump().dump_command().argv(),
            [
                "mongodump",
                "--host=mongo01",
                "--port=27018",
                "--username=backup",
                "--authenticationDatabase=admin",
                "--db=app",
                "--gzip",
                "--out=/srv/mongo/dump"
            ]
        );
    }

    #[test]
    fn restore_arguments() {
        assert_eq!(
            mongo_dump().restore_command().argv(),
            [
                "mongorestore",
                "--host=mongo01",
                "--port=27018",
                "--username=backup",
                "--authenticationDatabase=admin",
                "--gzip",
                "--drop",
                "--dir=/srv/mongo/dump"
            ]
        );
    }

    #[test]
    fn password_is_only_passed_to_the_program() {
        let mut mongo = mongo_dump();
        mongo.config.connection.password = "s3cr3t-pw".into();
        let spec = mongo.dump_command();

        assert!(spec.argv().contains(&"--password=s3cr3t-pw".to_string()));
        assert!(!spec.to_string().contains("s3cr3t-pw"));
        assert!(spec.to_string().contains("--password=***"));
    }

    #[test]
    fn clean_up_removes_dump_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = MongoDumpConfig {
            dump_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mongo = MongoDump::new(&config, &ProcessConfig::default()).unwrap();
        std::fs::create_dir_all(mongo.out_dir().join("app")).unwrap();

        mongo.clean_up().unwrap();
        assert!(!mongo.out_dir().exists());
        assert!(dir.path().exists());
    }
}
