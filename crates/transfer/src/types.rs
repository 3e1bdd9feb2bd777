use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cirrus_protocol::{CompletedPart, InitiateUploadResponse, PartDescriptor};

use crate::{PartPlan, TransferError};

/// Lifecycle of one multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    NotStarted,
    Initiated,
    PartsUploading,
    Completed,
    Aborted,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// Client-side record of a multipart upload.
///
/// Owned by the orchestrator call that initiated it. Completed parts are
/// keyed by part number so duplicates are caught on insert and the
/// completion list comes out sorted.
#[derive(Debug, Clone)]
pub struct UploadSession {
    upload_id: String,
    file_id: String,
    parts: Vec<PartDescriptor>,
    part_size_bytes: u64,
    total_size_bytes: u64,
    state: UploadState,
    completed: BTreeMap<u32, CompletedPart>,
}

impl UploadSession {
    /// Builds a session from the server's initiate response.
    ///
    /// The server must issue exactly one descriptor per planned part,
    /// numbered `1..=num_parts`.
    pub fn from_initiate(
        response: InitiateUploadResponse,
        plan: &PartPlan,
    ) -> Result<Self, TransferError> {
        let mut parts = response.parts;
        parts.sort_by_key(|p| p.part_number);

        if parts.len() != plan.num_parts as usize {
            return Err(TransferError::PartSetMismatch(format!(
                "server issued {} parts, planned {}",
                parts.len(),
                plan.num_parts
            )));
        }
        for (expected, part) in plan.part_numbers().zip(&parts) {
            if part.part_number != expected {
                return Err(TransferError::PartSetMismatch(format!(
                    "server issued part {} where part {expected} was expected",
                    part.part_number
                )));
            }
        }

        Ok(Self {
            upload_id: response.upload_id,
            file_id: response.file_id,
            parts,
            part_size_bytes: plan.part_size_bytes,
            total_size_bytes: plan.total_size_bytes,
            state: UploadState::Initiated,
            completed: BTreeMap::new(),
        })
    }

    /// Marks part dispatch as started.
    pub fn begin_parts(&mut self) -> Result<(), TransferError> {
        self.transition(UploadState::Initiated, UploadState::PartsUploading)
    }

    /// Records the integrity token for one uploaded part.
    pub fn record_part(&mut self, part: CompletedPart) -> Result<(), TransferError> {
        if self.state != UploadState::PartsUploading {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to: UploadState::PartsUploading,
            });
        }
        if !self.parts.iter().any(|p| p.part_number == part.part_number) {
            return Err(TransferError::PartSetMismatch(format!(
                "part {} was never issued",
                part.part_number
            )));
        }
        if self.completed.contains_key(&part.part_number) {
            return Err(TransferError::PartSetMismatch(format!(
                "part {} completed twice",
                part.part_number
            )));
        }
        self.completed.insert(part.part_number, part);
        Ok(())
    }

    /// Returns the sorted completion list, failing on any missing part.
    pub fn completion_parts(&self) -> Result<Vec<CompletedPart>, TransferError> {
        let missing: Vec<u32> = self
            .parts
            .iter()
            .map(|p| p.part_number)
            .filter(|n| !self.completed.contains_key(n))
            .collect();
        if !missing.is_empty() {
            return Err(TransferError::PartSetMismatch(format!(
                "missing parts {missing:?}"
            )));
        }
        Ok(self.completed.values().cloned().collect())
    }

    pub fn mark_completed(&mut self) -> Result<(), TransferError> {
        self.transition(UploadState::PartsUploading, UploadState::Completed)
    }

    /// Moves any live session to `Aborted`.
    ///
    /// Returns `false` if the session had already reached a terminal state,
    /// so repeated aborts are harmless.
    pub fn mark_aborted(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = UploadState::Aborted;
        true
    }

    fn transition(&mut self, from: UploadState, to: UploadState) -> Result<(), TransferError> {
        if self.state != from {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn parts(&self) -> &[PartDescriptor] {
        &self.parts
    }

    pub fn part_size_bytes(&self) -> u64 {
        self.part_size_bytes
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    pub fn state(&self) -> UploadState {
        self.state
    }
}

/// A planned local file materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub file_path: PathBuf,
    pub expected_size_bytes: u64,
    pub lock_path: PathBuf,
}

impl DownloadTarget {
    /// Derives the lock path as `<file_path>.lock`.
    pub fn new(file_path: impl Into<PathBuf>, expected_size_bytes: u64) -> Self {
        let file_path = file_path.into();
        let lock_path = lock_path_for(&file_path);
        Self {
            file_path,
            expected_size_bytes,
            lock_path,
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
