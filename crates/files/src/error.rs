//! File engine error types.

/// Errors produced by uploads and downloads.
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transfer(#[from] cirrus_transfer::TransferError),

    #[error(transparent)]
    Client(#[from] cirrus_client::ClientError),

    #[error("part {part_number} response carried no ETag")]
    MissingEtag { part_number: u32 },

    #[error("unknown file type {content_type:?}, aborting download")]
    UnknownContentType { content_type: String },

    #[error("requested bytes {start}-{end}, server sent {content_range:?}")]
    RangeMismatch {
        start: u64,
        end: u64,
        content_range: String,
    },

    #[error("could not determine remote file size: {0}")]
    UnknownSize(String),

    #[error("cancelled")]
    Cancelled,

    #[error("task join error: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for FilesError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e.to_string())
    }
}
