//! Library to back up directories, filesystems and databases.
//!
//! Every data source is dumped by its native tool (`mysqldump`, `pg_dump`,
//! `tar`, ...) and optionally stored in a [restic] repository. The backends
//! are located in the [`backends`] module, [`orchestrator`] ties them to
//! [`restic`].
//!
//! [restic]: https://restic.net

#![forbid(unsafe_code)]

pub mod args;
pub mod backends;
pub mod cli;
pub mod config;
pub mod exec;
pub mod orchestrator;
pub mod restic;
pub mod util;
