//! Stand-in for the restic binary.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Shell script answering like restic, with its repository state in a
/// directory.
///
/// Every invocation is appended to a call log. `backup --stdin` stores the
/// streamed archive, `dump` writes it back.
pub(crate) struct FakeRestic {
    pub binary: PathBuf,
    calls: PathBuf,
}

impl FakeRestic {
    pub(crate) fn new(dir: &Path) -> Self {
        let binary = dir.join("restic");
        let calls = dir.join("calls");
        std::fs::write(
            &binary,
            format!(
                r#"#!/bin/sh
[ "$1" = version ] && exit 0
echo "$*" >> '{calls}'
case "$1" in
init)
    if [ -e '{state}' ]; then
        echo "Fatal: create key in repository at $RESTIC_REPOSITORY failed: repository master key and config already initialized" >&2
        exit 1
    fi
    touch '{state}'
    echo "created restic repository 1a2b3c at $RESTIC_REPOSITORY"
    ;;
unlock)
    ;;
backup)
    case " $* " in
    *" --stdin "*)
        cat > '{archive}'
        echo '{{"message_type":"summary","files_new":1,"snapshot_id":"fed987"}}'
        ;;
    *)
        echo '{{"message_type":"status","percent_done":1}}'
        echo 'warning: /srv/locked: permission denied' >&2
        echo '{{"message_type":"summary","files_new":1,"snapshot_id":"abc123","parent":"def456"}}'
        exit 3
        ;;
    esac
    ;;
forget)
    echo '[{{"keep":[{{"id":"k1"}}],"remove":[{{"id":"s1"}},{{"id":null}},{{"id":"s2"}}]}}]'
    ;;
restore)
    echo "restoring <Snapshot abc123> to /"
    ;;
dump)
    cat '{archive}'
    ;;
stats)
    echo 'Fatal: no snapshot found' >&2
    exit 1
    ;;
*)
    exit 2
    ;;
esac
"#,
                calls = calls.display(),
                state = dir.join("initialized").display(),
                archive = dir.join("stdin.tar").display(),
            ),
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        // ETXTBSY while a concurrently forked test process still holds the
        // script open for writing
        for _ in 0..50 {
            match Command::new(&binary).arg("version").status() {
                Err(e) if e.raw_os_error() == Some(26) => {
                    std::thread::sleep(Duration::from_millis(20))
                }
                _ => break,
            }
        }

        Self { binary, calls }
    }

    /// Arguments of every invocation so far, subcommand first.
    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        std::fs::read_to_string(&self.calls)
            .unwrap_or_default()
            .lines()
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    pub(crate) fn subcommands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.into_iter().next())
            .collect()
    }
}
