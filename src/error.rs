use std::path::PathBuf;
use thiserror::Error;

/// Failures while listing the target directory. Either one aborts the
/// current cycle only.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("directory {path} unavailable: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("entry {path} unreadable: {source}")]
    EntryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("repository connection failure: {0}")]
    ConnectionFailure(String),

    #[error("repository rejected data: {0}")]
    SchemaViolation(String),

    #[error("{operation} is not supported by the {backend} repository")]
    Unimplemented {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("nothing stored for {0}")]
    NotFound(PathBuf),
}

impl RepoError {
    /// True when the same call may succeed on the next tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RepoError::ConnectionFailure(_))
    }
}

/// Anything that can end a scan cycle early.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepoError),
}
