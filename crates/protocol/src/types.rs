use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Logical tag that selects the server-side validation rules for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilePurpose {
    #[serde(rename = "fine-tune")]
    FineTune,
    #[serde(rename = "eval")]
    Eval,
    #[serde(rename = "eval-sample")]
    EvalSample,
    #[serde(rename = "eval-output")]
    EvalOutput,
    #[serde(rename = "eval-summary")]
    EvalSummary,
    #[serde(rename = "batch-generated")]
    BatchGenerated,
    #[serde(rename = "batch-api")]
    BatchApi,
}

impl FilePurpose {
    /// Wire representation, as sent in form fields and JSON bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FineTune => "fine-tune",
            Self::Eval => "eval",
            Self::EvalSample => "eval-sample",
            Self::EvalOutput => "eval-output",
            Self::EvalSummary => "eval-summary",
            Self::BatchGenerated => "batch-generated",
            Self::BatchApi => "batch-api",
        }
    }
}

impl fmt::Display for FilePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data format of an uploaded file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Jsonl,
    Parquet,
    Csv,
}

impl FileType {
    /// Maps a file extension (without the dot, any case) to a file type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jsonl" => Some(Self::Jsonl),
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Maps a path to a file type using its final extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File object returned by the server after an upload completes.
///
/// Only `id`, `filename`, `bytes` and `purpose` are guaranteed. Fields the
/// server adds later are ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default = "default_object")]
    pub object: String,
    pub filename: String,
    pub bytes: u64,
    pub purpose: FilePurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
}

fn default_object() -> String {
    "file".into()
}
