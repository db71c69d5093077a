//! Decoding of restic's `--json` output.
//!
//! Most subcommands print one JSON document, `backup`, `ls` and `tag` print
//! one JSON message per line. The captured output also contains restic's
//! standard error, so lines that aren't JSON are ignored.

use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;

use super::ResticError;

/// Outcome of `restic backup`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BackupResult {
    pub snapshot_id: String,
    /// Snapshot the backup was computed against, only on incremental backups.
    pub parent: Option<String>,
    pub files_new: Option<u64>,
    pub files_changed: Option<u64>,
    pub files_unmodified: Option<u64>,
    pub data_added: Option<u64>,
    pub total_bytes_processed: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
struct BackupMessage {
    message_type: String,
    snapshot_id: Option<String>,
    parent: Option<String>,
    files_new: Option<u64>,
    files_changed: Option<u64>,
    files_unmodified: Option<u64>,
    data_added: Option<u64>,
    total_bytes_processed: Option<u64>,
}

/// Outcome of `restic forget`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ForgetResult {
    pub removed: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ForgetGroup {
    #[allow(dead_code)]
    keep: Option<Vec<ForgetSnapshot>>,
    remove: Option<Vec<ForgetSnapshot>>,
}

#[derive(Debug, serde::Deserialize)]
struct ForgetSnapshot {
    id: Option<String>,
}

/// Files of one snapshot listed by `restic ls`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct LsResult {
    pub snapshot_id: String,
    pub paths: Vec<String>,
    pub time: Option<DateTime<FixedOffset>>,
    pub files: Vec<LsEntry>,
    /// Sum of the file sizes, only computed for long listings.
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct LsEntry {
    pub path: String,
    pub permissions: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub mtime: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, serde::Deserialize)]
struct LsMessage {
    id: Option<String>,
    short_id: Option<String>,
    paths: Option<Vec<String>>,
    time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "type")]
    node_type: Option<String>,
    path: Option<String>,
    permissions: Option<String>,
    uid: Option<u32>,
    gid: Option<u32>,
    size: Option<u64>,
    mtime: Option<DateTime<FixedOffset>>,
}

/// A snapshot as printed by `restic snapshots`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub short_id: String,
    pub time: DateTime<FixedOffset>,
    pub tree: Option<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Repository statistics printed by `restic stats`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub total_size: u64,
    #[serde(default)]
    pub total_file_count: u64,
    #[serde(default)]
    pub snapshots_count: u64,
    pub total_blob_count: Option<u64>,
    pub total_uncompressed_size: Option<u64>,
}

/// Matches of `restic find` inside one snapshot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FindResult {
    pub snapshot: String,
    #[serde(default)]
    pub hits: u64,
    #[serde(default)]
    pub matches: Vec<FindMatch>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FindMatch {
    pub path: String,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub permissions: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<DateTime<FixedOffset>>,
}

/// Snapshot replaced by `restic tag`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TagChange {
    pub old_snapshot_id: String,
    pub new_snapshot_id: String,
}

#[derive(Debug, serde::Deserialize)]
struct TagMessage {
    message_type: String,
    old_snapshot_id: Option<String>,
    new_snapshot_id: Option<String>,
}

fn json_lines(output: &str) -> impl Iterator<Item = &str> {
    output
        .trim_end_matches('\n')
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
}

/// Decode the first JSON document (object or array) of `output`.
pub(super) fn parse_document<T: DeserializeOwned>(output: &str) -> Result<T, ResticError> {
    let document = output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('[') || line.starts_with('{'))
        .ok_or(ResticError::MissingOutput("JSON document"))?;
    Ok(serde_json::from_str(document)?)
}

/// Find the summary of `restic backup --json`.
pub fn parse_backup(output: &str) -> Result<BackupResult, ResticError> {
    // one message per line, not a valid JSON document on its own
    let document = format!("[{}]", json_lines(output).collect::<Vec<_>>().join(","));
    let messages: Vec<BackupMessage> = serde_json::from_str(&document)?;

    let summary = messages
        .into_iter()
        .find(|message| message.message_type == "summary")
        .ok_or(ResticError::MissingOutput("summary message"))?;
    let snapshot_id = summary
        .snapshot_id
        .filter(|id| !id.is_empty())
        .ok_or(ResticError::MissingOutput("snapshot id"))?;

    Ok(BackupResult {
        snapshot_id,
        parent: summary.parent.filter(|id| !id.is_empty()),
        files_new: summary.files_new,
        files_changed: summary.files_changed,
        files_unmodified: summary.files_unmodified,
        data_added: summary.data_added,
        total_bytes_processed: summary.total_bytes_processed,
    })
}

/// Collect the removed snapshots of `restic forget --json --compact`.
pub fn parse_forget(output: &str) -> Result<ForgetResult, ResticError> {
    let groups: Option<Vec<ForgetGroup>> = parse_document(output)?;

    let removed = groups
        .into_iter()
        .flatten()
        .flat_map(|group| group.remove.into_iter().flatten())
        .filter_map(|snapshot| snapshot.id)
        .collect();

    Ok(ForgetResult { removed })
}

/// Group the files of `restic ls --json` by snapshot.
///
/// `long` keeps the metadata of every file and sums up their sizes.
pub fn parse_ls(output: &str, long: bool) -> Result<Vec<LsResult>, ResticError> {
    let mut results = Vec::new();
    let mut current: Option<LsResult> = None;

    for line in json_lines(output) {
        let message: LsMessage = serde_json::from_str(line)?;

        if let Some(short_id) = message.short_id.filter(|id| !id.is_empty()) {
            results.extend(current.take());
            current = Some(LsResult {
                snapshot_id: message.id.unwrap_or(short_id),
                paths: message.paths.unwrap_or_default(),
                time: message.time,
                ..Default::default()
            });
            continue;
        }

        let Some(group) = current.as_mut() else {
            log::debug!(target: "restic", "Ignoring ls entry outside of a snapshot");
            continue;
        };
        if message.node_type.as_deref() != Some("file") {
            continue;
        }
        let Some(path) = message.path else {
            continue;
        };

        let entry = if long {
            let size = message.size.unwrap_or(0);
            group.size += size;
            LsEntry {
                path,
                permissions: message.permissions,
                uid: message.uid,
                gid: message.gid,
                size: Some(size),
                mtime: message.mtime,
            }
        } else {
            LsEntry {
                path,
                ..Default::default()
            }
        };
        group.files.push(entry);
    }
    results.extend(current);

    Ok(results)
}

/// Collect the replaced snapshots of `restic tag --json`.
pub fn parse_tag(output: &str) -> Result<Vec<TagChange>, ResticError> {
    let mut changes = Vec::new();
    for line in json_lines(output) {
        let message: TagMessage = serde_json::from_str(line)?;
        if message.message_type != "changed" {
            continue;
        }
        if let (Some(old_snapshot_id), Some(new_snapshot_id)) =
            (message.old_snapshot_id, message.new_snapshot_id)
        {
            changes.push(TagChange {
                old_snapshot_id,
                new_snapshot_id,
            });
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_summary_with_parent() {
        let output = "{\"message_type\":\"summary\",\"snapshot_id\":\"abc123\",\"parent\":\"def456\"}\n";
        let result = parse_backup(output).unwrap();

        assert_eq!(result.snapshot_id, "abc123");
        assert_eq!(result.parent.as_deref(), Some("def456"));
    }

    #[test]
    fn backup_summary_among_status_messages() {
        let output = r#"{"message_type":"status","percent_done":0.5,"total_files":2,"files_done":1,"total_bytes":20,"bytes_done":10}
{"message_type":"status","percent_done":1,"total_files":2,"files_done":2,"total_bytes":20,"bytes_done":20}
{"message_type":"summary","files_new":2,"files_changed":0,"files_unmodified":0,"dirs_new":1,"data_added":20,"total_files_processed":2,"total_bytes_processed":20,"total_duration":0.25,"snapshot_id":"9f3ab1c2"}
"#;
        let result = parse_backup(output).unwrap();

        assert_eq!(result.snapshot_id, "9f3ab1c2");
        assert_eq!(result.parent, None);
        assert_eq!(result.files_new, Some(2));
        assert_eq!(result.data_added, Some(20));
    }

    #[test]
    fn backup_ignores_interleaved_stderr() {
        let output = "repository 1a2b3c opened (version 2)\n{\"message_type\":\"summary\",\"snapshot_id\":\"abc123\"}\n";
        assert_eq!(parse_backup(output).unwrap().snapshot_id, "abc123");
    }

    #[test]
    fn backup_without_summary_fails() {
        let output = "{\"message_type\":\"status\",\"percent_done\":1}\n";
        assert!(matches!(
            parse_backup(output),
            Err(ResticError::MissingOutput("summary message"))
        ));
        assert!(parse_backup("").is_err());
    }

    #[test]
    fn backup_summary_without_snapshot_fails() {
        let output = "{\"message_type\":\"summary\",\"files_new\":1}\n";
        assert!(matches!(
            parse_backup(output),
            Err(ResticError::MissingOutput("snapshot id"))
        ));
    }

    #[test]
    fn malformed_backup_output_fails() {
        let output = "{\"message_type\":\"summary\",\"snapshot_id\":\n";
        assert!(matches!(parse_backup(output), Err(ResticError::Json(_))));
    }

    #[test]
    fn forget_flattens_removed_snapshots() {
        let output = r#"[{"tags":null,"host":"db01","paths":["/var/backups"],"keep":[{"id":"k1","short_id":"k1"}],"remove":[{"id":"s1","short_id":"s1"},{"id":null},{"id":"s2","short_id":"s2"}],"reasons":[]}]"#;
        let result = parse_forget(output).unwrap();
        assert_eq!(result.removed, ["s1", "s2"]);
    }

    #[test]
    fn forget_without_removals() {
        let output = r#"[{"keep":[{"id":"k1"}],"remove":null},{"keep":null,"remove":[]}]"#;
        assert!(parse_forget(output).unwrap().removed.is_empty());
        assert!(parse_forget("null").unwrap().removed.is_empty());
    }

    #[test]
    fn forget_skips_prune_output() {
        let output = "[{\"remove\":[{\"id\":\"s1\"}]}]\nloading indexes...\nremoving 1 packs\n";
        assert_eq!(parse_forget(output).unwrap().removed, ["s1"]);
    }

    const LS_OUTPUT: &str = r#"{"time":"2024-05-01T02:00:00.123456789+02:00","tree":"t1","paths":["/srv"],"hostname":"db01","id":"aaaa1111","short_id":"aaaa1111","struct_type":"snapshot","message_type":"snapshot"}
{"name":"srv","type":"dir","path":"/srv","uid":0,"gid":0,"mode":2147484141,"permissions":"drwxr-xr-x","mtime":"2024-05-01T01:00:00+02:00","struct_type":"node","message_type":"node"}
{"name":"a.txt","type":"file","path":"/srv/a.txt","uid":1000,"gid":100,"size":10,"mode":420,"permissions":"-rw-r--r--","mtime":"2024-05-01T01:00:00+02:00","struct_type":"node","message_type":"node"}
{"name":"b.txt","type":"file","path":"/srv/b.txt","uid":1000,"gid":100,"size":32,"mode":420,"permissions":"-rw-r--r--","mtime":"2024-05-01T01:30:00+02:00","struct_type":"node","message_type":"node"}
{"time":"2024-05-02T02:00:00+02:00","paths":["/srv"],"id":"bbbb2222","short_id":"bbbb2222","struct_type":"snapshot","message_type":"snapshot"}
{"time":"2024-05-03T02:00:00+02:00","paths":["/srv"],"id":"cccc3333","short_id":"cccc3333","struct_type":"snapshot","message_type":"snapshot"}
{"name":"c.txt","type":"file","path":"/srv/c.txt","uid":0,"gid":0,"size":5,"permissions":"-rw-------","struct_type":"node","message_type":"node"}
"#;

    #[test]
    fn ls_long_groups_files_by_snapshot() {
        let results = parse_ls(LS_OUTPUT, true).unwrap();
        assert_eq!(results.len(), 3);

        let first = &results[0];
        assert_eq!(first.snapshot_id, "aaaa1111");
        assert_eq!(first.paths, ["/srv"]);
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.size, 42);
        assert_eq!(first.files[1].permissions.as_deref(), Some("-rw-r--r--"));
        assert_eq!(first.files[1].uid, Some(1000));
        assert!(first.time.is_some());

        // header directly followed by the next header
        assert_eq!(results[1].snapshot_id, "bbbb2222");
        assert!(results[1].files.is_empty());

        // last group is flushed after the loop
        assert_eq!(results[2].snapshot_id, "cccc3333");
        assert_eq!(results[2].files.len(), 1);
        assert_eq!(results[2].size, 5);
    }

    #[test]
    fn ls_short_keeps_paths_only() {
        let results = parse_ls(LS_OUTPUT, false).unwrap();
        let first = &results[0];

        assert_eq!(first.size, 0);
        assert_eq!(first.files[0].path, "/srv/a.txt");
        assert_eq!(first.files[0].permissions, None);
        assert_eq!(first.files[0].size, None);
    }

    #[test]
    fn ls_without_output() {
        assert!(parse_ls("", true).unwrap().is_empty());
    }

    #[test]
    fn snapshots_document() {
        let output = r#"[{"time":"2024-05-01T02:00:00.5+02:00","tree":"t1","paths":["/srv"],"hostname":"db01","username":"root","tags":["mysqldump"],"id":"aaaa1111bbbb","short_id":"aaaa1111"}]"#;
        let snapshots: Vec<Snapshot> = parse_document(output).unwrap();

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].short_id, "aaaa1111");
        assert_eq!(snapshots[0].tags, ["mysqldump"]);
        assert_eq!(snapshots[0].parent, None);
    }

    #[test]
    fn stats_document() {
        let output = "{\"total_size\":2048,\"total_file_count\":12,\"snapshots_count\":1}\n";
        let stats: Stats = parse_document(output).unwrap();
        assert_eq!(stats.total_size, 2048);
        assert_eq!(stats.total_file_count, 12);
    }

    #[test]
    fn find_document() {
        let output = r#"[{"hits":1,"snapshot":"aaaa1111","matches":[{"path":"/srv/a.txt","type":"file","size":10}]}]"#;
        let results: Vec<FindResult> = parse_document(output).unwrap();
        assert_eq!(results[0].hits, 1);
        assert_eq!(results[0].matches[0].path, "/srv/a.txt");
    }

    #[test]
    fn missing_document_fails() {
        assert!(matches!(
            parse_document::<Stats>("no json here"),
            Err(ResticError::MissingOutput(_))
        ));
    }

    #[test]
    fn tag_changes() {
        let output = r#"{"message_type":"changed","old_snapshot_id":"old1","new_snapshot_id":"new1"}
{"message_type":"summary","changed_snapshots":1}
"#;
        assert_eq!(
            parse_tag(output).unwrap(),
            [TagChange {
                old_snapshot_id: "old1".into(),
                new_snapshot_id: "new1".into()
            }]
        );
    }
}
