use derive_more::{Display, Error, From};

use crate::exec::ExecError;

/// Documented exit codes of restic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ResticExitCode {
    /// Return Code 1
    #[display("fatal error (no snapshot created)")]
    Fatal,
    /// Return Code 3
    #[display("some source data could not be read (incomplete snapshot created)")]
    Incomplete,
    /// Return Code 10
    #[display("repository does not exist")]
    RepositoryUnavailable,
    /// Return Code 11
    #[display("repository is already locked")]
    RepositoryLocked,
    /// Return Code 12
    #[display("incorrect password")]
    IncorrectPassword,
}

impl ResticExitCode {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Fatal),
            3 => Some(Self::Incomplete),
            10 => Some(Self::RepositoryUnavailable),
            11 => Some(Self::RepositoryLocked),
            12 => Some(Self::IncorrectPassword),
            _ => None,
        }
    }
}

/// Errors of the restic subcommands.
#[derive(Debug, Display, Error, From)]
pub enum ResticError {
    /// Running restic failed.
    #[display("{_0}")]
    Exec(ExecError),

    /// restic exited with one of its documented exit codes.
    #[display("restic: {code}: {source}")]
    Exit {
        code: ResticExitCode,
        source: ExecError,
    },

    /// The repository exists already.
    ///
    /// Not a failure: callers treat an existing repository like a freshly
    /// created one.
    #[display("restic repository is already initialized")]
    AlreadyInitialized,

    /// restic's output isn't the JSON we expect.
    #[display("Decoding restic output failed: {_0}")]
    #[from]
    Json(serde_json::Error),

    /// A required part of restic's output is missing.
    #[display("restic output is missing the {_0}")]
    MissingOutput(#[error(ignore)] &'static str),

    /// Forgetting without any keep rule would remove every snapshot.
    #[display("Retention policy is empty, refusing to forget snapshots")]
    EmptyRetentionPolicy,
}

impl From<ExecError> for ResticError {
    fn from(e: ExecError) -> Self {
        match e.exit_code().and_then(ResticExitCode::from_code) {
            Some(code) => ResticError::Exit { code, source: e },
            None => ResticError::Exec(e),
        }
    }
}

impl ResticError {
    /// Combined output of the failed restic invocation.
    pub fn output(&self) -> &str {
        match self {
            ResticError::Exec(e) | ResticError::Exit { source: e, .. } => e.output(),
            _ => "",
        }
    }

    pub fn exit_code(&self) -> Option<ResticExitCode> {
        match self {
            ResticError::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_exit_codes() {
        assert_eq!(ResticExitCode::from_code(1), Some(ResticExitCode::Fatal));
        assert_eq!(ResticExitCode::from_code(3), Some(ResticExitCode::Incomplete));
        assert_eq!(
            ResticExitCode::from_code(11),
            Some(ResticExitCode::RepositoryLocked)
        );
        assert_eq!(ResticExitCode::from_code(2), None);
        assert_eq!(ResticExitCode::from_code(130), None);
    }
}
