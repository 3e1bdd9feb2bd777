use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{FileObject, FilePurpose, FileType};

// ---------------------------------------------------------------------------
// Multipart initiate
// ---------------------------------------------------------------------------

/// Body of `POST files/multipart/initiate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateUploadRequest {
    pub file_size: u64,
    pub file_type: FileType,
    pub purpose: FilePurpose,
    pub number_of_parts: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
}

/// One planned byte range and the pre-signed target it must be PUT to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDescriptor {
    pub part_number: u32,
    #[serde(rename = "url")]
    pub upload_url: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Response to an initiate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateUploadResponse {
    pub upload_id: String,
    pub file_id: String,
    pub parts: Vec<PartDescriptor>,
}

// ---------------------------------------------------------------------------
// Multipart complete / abort
// ---------------------------------------------------------------------------

/// Integrity token returned by the storage backend for one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Body of `POST files/multipart/complete`.
///
/// `parts` must be sorted by `part_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    pub upload_id: String,
    pub file_id: String,
    pub parts: Vec<CompletedPart>,
}

/// Response to a complete call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    pub file: FileObject,
}

/// Body of `POST files/multipart/abort`. The response is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortUploadRequest {
    pub upload_id: String,
    pub file_id: String,
}
