//! Implements backup of a Redis server using `redis-cli --rdb`.
//!
//! Restoring an RDB file requires replacing the server's data file while it
//! is stopped, so this backend only creates backups.

use std::path::PathBuf;

use super::{ensure_dir, remove_path, schedule, BackendError, Backup, Target};
use crate::args::to_args;
use crate::config::ProcessConfig;
use crate::exec::{self, CommandSpec, Context};
use crate::util;

const DEFAULT_DUMP_DIR: &str = "/var/backups/redis";

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    /// Directory the RDB file is written to.
    #[serde(skip_serializing)]
    pub dump_dir: PathBuf,

    #[serde(rename(serialize = "-h"))]
    pub host: String,

    #[serde(rename(serialize = "-p"))]
    pub port: u16,

    /// Unix socket, replaces host and port.
    #[serde(rename(serialize = "-s"))]
    pub socket: Option<PathBuf>,

    #[serde(rename(serialize = "--user"))]
    pub user: String,

    /// Passed as `REDISCLI_AUTH`.
    #[serde(skip_serializing)]
    pub password: String,

    #[serde(rename(serialize = "--tls"))]
    pub tls: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            dump_dir: DEFAULT_DUMP_DIR.into(),
            host: String::new(),
            port: 0,
            socket: None,
            user: String::new(),
            password: String::new(),
            tls: false,
        }
    }
}

#[derive(Debug)]
pub struct Redis {
    config: RedisConfig,
    process: ProcessConfig,
}

impl Redis {
    pub fn new(config: &RedisConfig, process: &ProcessConfig) -> Result<Self, BackendError> {
        Ok(Self {
            config: config.clone(),
            process: process.clone(),
        })
    }

    fn dump_file(&self) -> PathBuf {
        self.config.dump_dir.join("dump.rdb")
    }

    fn dump_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("redis-cli")
            .args(to_args(&self.config))
            .arg("--rdb")
            .arg(self.dump_file().display().to_string());
        if !self.config.password.is_empty() {
            spec = spec.env_default("REDISCLI_AUTH", self.config.password.as_str());
        }
        schedule(spec, &self.process)
    }
}

impl Target for Redis {
    fn backup_path(&self) -> PathBuf {
        self.config.dump_dir.clone()
    }

    fn hostname(&self) -> String {
        util::snapshot_host(&self.config.host)
    }

    fn clean_up(&self) -> Result<(), BackendError> {
        remove_path(&self.dump_file())
    }
}

impl Backup for Redis {
    fn create_backup(&self, ctx: &Context) -> Result<(), BackendError> {
        log::info!(target: "backend::redis", "Fetching RDB snapshot into {}", self.dump_file().display());
        ensure_dir(&self.config.dump_dir)?;
        exec::run_with_timeout(ctx, self.dump_command(), self.process.timeout())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_flags_take_separate_values() {
        let config = RedisConfig {
            dump_dir: "/srv/redis".into(),
            host: "cache01".into(),
            port: 6380,
            password: "secret".into(),
            ..Default::default()
        };
        let redis = Redis::new(&config, &ProcessConfig::default()).unwrap();

        assert_eq!(
            redis.dump_command().argv(),
            [
                "redis-cli",
                "-h",
                "cache01",
                "-p",
                "6380",
                "--rdb",
                "/srv/redis/dump.rdb"
            ]
        );
        assert_eq!(redis.hostname(), "cache01");
    }

    #[test]
    fn defaults_target_local_server() {
        let redis = Redis::new(&RedisConfig::default(), &ProcessConfig::default()).unwrap();
        assert_eq!(
            redis.dump_command().argv(),
            ["redis-cli", "--rdb", "/var/backups/redis/dump.rdb"]
        );
        assert_eq!(redis.backup_path(), PathBuf::from("/var/backups/redis"));
    }
}
