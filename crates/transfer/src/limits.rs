use std::time::Duration;

use cirrus_protocol::constants::{
    DOWNLOAD_BLOCK_SIZE, MAX_CONCURRENT_PARTS, MAX_FILE_SIZE_GB, MAX_MULTIPART_PARTS,
    MIN_PART_SIZE_BYTES, MULTIPART_THRESHOLD_BYTES, MULTIPART_UPLOAD_TIMEOUT,
    TARGET_PART_SIZE_BYTES, gb_to_bytes,
};

/// Size, count and concurrency limits applied to a transfer.
///
/// `Default` carries the values the server expects. Overrides exist for
/// deployments with different backend limits and for tests.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferLimits {
    /// Floor for every part except the last.
    pub min_part_size: u64,
    /// Preferred part size.
    pub target_part_size: u64,
    /// Cap on parts per upload.
    pub max_parts: u32,
    /// Files at or above this size use the multipart path.
    pub multipart_threshold: u64,
    /// Absolute ceiling on an uploaded file.
    pub max_file_size: u64,
    /// Worker pool size for part uploads.
    pub max_concurrent_parts: usize,
    /// Timeout for each part PUT.
    pub part_timeout: Duration,
    /// Range size per download request.
    pub download_block_size: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            min_part_size: MIN_PART_SIZE_BYTES,
            target_part_size: TARGET_PART_SIZE_BYTES,
            max_parts: MAX_MULTIPART_PARTS,
            multipart_threshold: MULTIPART_THRESHOLD_BYTES,
            max_file_size: gb_to_bytes(MAX_FILE_SIZE_GB),
            max_concurrent_parts: MAX_CONCURRENT_PARTS,
            part_timeout: MULTIPART_UPLOAD_TIMEOUT,
            download_block_size: DOWNLOAD_BLOCK_SIZE,
        }
    }
}

impl TransferLimits {
    pub fn with_min_part_size(mut self, bytes: u64) -> Self {
        self.min_part_size = bytes;
        self
    }

    /// Sets the preferred part size. Zero is treated as one byte.
    pub fn with_target_part_size(mut self, bytes: u64) -> Self {
        self.target_part_size = bytes.max(1);
        self
    }

    pub fn with_max_parts(mut self, max: u32) -> Self {
        self.max_parts = max;
        self
    }

    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold = bytes;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Sets the part worker pool size. Zero is treated as one.
    pub fn with_max_concurrent_parts(mut self, workers: usize) -> Self {
        self.max_concurrent_parts = workers.max(1);
        self
    }

    pub fn with_part_timeout(mut self, timeout: Duration) -> Self {
        self.part_timeout = timeout;
        self
    }

    /// Sets the download range size. Zero is treated as one byte.
    pub fn with_download_block_size(mut self, bytes: u64) -> Self {
        self.download_block_size = bytes.max(1);
        self
    }

    /// Returns `true` if a file of `file_size` bytes takes the multipart path.
    pub fn use_multipart(&self, file_size: u64) -> bool {
        file_size >= self.multipart_threshold
    }
}
