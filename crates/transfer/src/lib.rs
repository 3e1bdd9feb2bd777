//! Multipart transfer building blocks: part planning, ranged file reads,
//! temp-file block writes, upload session state and progress tracking.
//!
//! Nothing in this crate touches the network. The orchestration that drives
//! these pieces over HTTP lives in `cirrus-files`.

mod chunked;
mod limits;
mod planner;
mod progress;
mod types;
mod validation;

pub use chunked::{BlockWriter, read_part};
pub use limits::TransferLimits;
pub use planner::{PartPlan, plan_parts};
pub use progress::{ProgressSnapshot, SpeedCalculator, TransferProgress};
pub use types::{DownloadTarget, UploadSession, UploadState};
pub use validation::{check_file_size, detect_file_type, validate_remote_name};

use cirrus_protocol::constants::BYTES_PER_GB;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "file size {:.1} GB ({size} bytes) exceeds the maximum allowed size of {:.1} GB ({max} bytes)",
        as_gb(.size),
        as_gb(.max)
    )]
    FileTooLarge { size: u64, max: u64 },

    #[error("cannot upload an empty file")]
    EmptyFile,

    #[error("unsupported file type {extension:?} for {path}: expected one of jsonl, parquet, csv")]
    UnsupportedFileType { path: String, extension: String },

    #[error("part size {part_size} bytes is below the minimum of {min} bytes")]
    PartTooSmall { part_size: u64, min: u64 },

    #[error("plan needs {parts} parts, more than the limit of {max}")]
    TooManyParts { parts: u64, max: u32 },

    #[error("part set mismatch: {0}")]
    PartSetMismatch(String),

    #[error("invalid upload state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: UploadState, to: UploadState },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

fn as_gb(bytes: &u64) -> f64 {
    *bytes as f64 / BYTES_PER_GB as f64
}
