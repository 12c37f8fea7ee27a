use thiserror::Error;

/// Errors produced by the media layer.
///
/// `Clone` because fetch outcomes are shared between every caller waiting
/// on the same in-flight transfer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// The identity denotes an empty/placeholder document, or one the
    /// registry has never seen. No transfer is attempted.
    #[error("document {0} is empty or unknown")]
    EmptyDocument(i64),

    /// The transfer collaborator rejected the download.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The save-target collaborator declined or failed.
    #[error("save target unavailable: {0}")]
    SaveTarget(String),

    /// Writing the local cache copy failed.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        MediaError::Io(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MediaError>;
