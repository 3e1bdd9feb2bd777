use std::path::{Component, Path};

use cirrus_protocol::FileType;

use crate::{TransferError, TransferLimits};

/// Maps a local path to its upload file type by extension.
pub fn detect_file_type(path: &Path) -> Result<FileType, TransferError> {
    FileType::from_path(path).ok_or_else(|| TransferError::UnsupportedFileType {
        path: path.display().to_string(),
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

/// Rejects empty files and files above the configured ceiling.
pub fn check_file_size(size: u64, limits: &TransferLimits) -> Result<(), TransferError> {
    if size == 0 {
        return Err(TransferError::EmptyFile);
    }
    if size > limits.max_file_size {
        return Err(TransferError::FileTooLarge {
            size,
            max: limits.max_file_size,
        });
    }
    Ok(())
}

/// Validates a server-provided file name before it is joined onto a local
/// directory.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_remote_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty remote name".into()));
    }

    let path = Path::new(name);

    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {name}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {name}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {name}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
