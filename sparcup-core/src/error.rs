use std::path::PathBuf;
use thiserror::Error;

/// Problems with the manifest itself. All of these end the run before any
/// remote work starts.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot open manifest {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot read row {row} of {path}: {source}")]
    Row {
        path: PathBuf,
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("no dataset name in {path} (row {row}, column 1)")]
    MissingDataset { path: PathBuf, row: usize },
}

/// Errors reported by a [`crate::remote::Remote`] implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote object not found: {id}")]
    NotFound { id: String },

    #[error("remote rejected request: {message}")]
    Rejected { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    /// The out-of-band upload agent failed. Nothing can be known about the
    /// remote state afterwards.
    #[error("agent error: {message}")]
    Agent { message: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteError {
    /// Failures that must stop the remaining run rather than a single unit.
    pub fn is_channel_fatal(&self) -> bool {
        matches!(self, RemoteError::Agent { .. })
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        RemoteError::Rejected { message: message.into() }
    }
}

/// A source-file expression that cannot be turned into upload units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileIssue {
    #[error("wildcards are only supported in file names, not directories: {expr}")]
    WildcardInDirectory { expr: String },

    #[error("the path or file {expr} does not exist")]
    NoMatch { expr: String },

    #[error("bad file pattern {expr}: {message}")]
    BadPattern { expr: String, message: String },
}
