//! Archives streamed through `tar` into and out of restic.

use std::path::{Path, PathBuf};

use crate::args::to_args;
use crate::exec::CommandSpec;

/// A `tar` archive created on the fly.
///
/// Restic stores the archive as a single file named
/// [`stdin_filename`](Self::stdin_filename).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarStream {
    pub binary: String,
    pub paths: Vec<PathBuf>,
    pub exclude: Vec<String>,
    /// Directory `tar` changes into before archiving or extracting.
    pub directory: Option<PathBuf>,
    pub stdin_filename: String,
    pub one_file_system: bool,
}

impl Default for TarStream {
    fn default() -> Self {
        Self {
            binary: "tar".to_string(),
            paths: Vec::new(),
            exclude: Vec::new(),
            directory: None,
            stdin_filename: "archive.tar".to_string(),
            one_file_system: false,
        }
    }
}

#[derive(serde::Serialize)]
struct CreateArgs<'a> {
    #[serde(rename = "--create")]
    create: bool,
    #[serde(rename = "--file=")]
    file: &'a Path,
    #[serde(rename = "--directory=")]
    directory: Option<&'a Path>,
    #[serde(rename = "--exclude=")]
    exclude: &'a [String],
    #[serde(rename = "--one-file-system")]
    one_file_system: bool,
    paths: &'a [PathBuf],
}

#[derive(serde::Serialize)]
struct ExtractArgs<'a> {
    #[serde(rename = "--extract")]
    extract: bool,
    #[serde(rename = "--file=")]
    file: &'a Path,
    #[serde(rename = "--directory=")]
    directory: &'a Path,
}

impl TarStream {
    /// `tar --create` writing the archive to `file`, `-` for standard output.
    pub fn create_command(&self, file: &Path) -> CommandSpec {
        let args = CreateArgs {
            create: true,
            file,
            directory: self.directory.as_deref(),
            exclude: &self.exclude,
            one_file_system: self.one_file_system,
            paths: &self.paths,
        };
        CommandSpec::new(&self.binary).args(to_args(&args))
    }

    /// `tar --extract` reading the archive from `file`, `-` for standard input.
    pub fn extract_command(&self, file: &Path, target: &Path) -> CommandSpec {
        let args = ExtractArgs {
            extract: true,
            file,
            directory: target,
        };
        CommandSpec::new(&self.binary).args(to_args(&args))
    }

    /// Path of the archive inside the snapshot.
    pub fn snapshot_path(&self) -> String {
        format!("/{}", self.stdin_filename.trim_start_matches('/'))
    }

    /// Directory the archive is extracted into.
    pub fn extract_target(&self) -> &Path {
        self.directory.as_deref().unwrap_or(Path::new("/"))
    }
}
