//! Helpers shared by the backends and the orchestrator.

pub mod retention;

use std::fs;

use crate::exec::{self, CommandSpec, Context};

const KERNEL_HOSTNAME: &str = "/proc/sys/kernel/hostname";

/// Name of the local host.
///
/// Read from the kernel, falling back to the `hostname` binary and finally to
/// `localhost`.
pub fn hostname() -> String {
    match fs::read_to_string(KERNEL_HOSTNAME) {
        Ok(name) if !name.trim().is_empty() => return name.trim().to_string(),
        Ok(_) => {}
        Err(e) => log::debug!(target: "util", "Reading {KERNEL_HOSTNAME} failed: {e}"),
    }

    match exec::run(&Context::background(), CommandSpec::new("hostname")) {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        Ok(_) => "localhost".to_string(),
        Err(e) => {
            log::warn!(target: "util", "Determining the hostname failed: {e}");
            "localhost".to_string()
        }
    }
}

/// Whether `host` refers to this machine.
///
/// An empty host means the tool's default, which is the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(
        host.trim(),
        "" | "localhost" | "127.0.0.1" | "::1" | "[::1]"
    ) || host.starts_with('/')
}

/// Hostname a snapshot of `host` is recorded under.
pub fn snapshot_host(host: &str) -> String {
    if is_local_host(host) {
        hostname()
    } else {
        host.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_never_empty() {
        assert!(!hostname().is_empty());
    }

    #[test]
    fn local_hosts() {
        assert!(is_local_host(""));
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        // unix domain socket
        assert!(is_local_host("/var/run/postgresql"));
        assert!(!is_local_host("db01.example.com"));
    }

    #[test]
    fn remote_host_is_kept() {
        assert_eq!(snapshot_host("db01.example.com"), "db01.example.com");
        assert_eq!(snapshot_host("localhost"), hostname());
    }
}
