//! Limits and endpoint paths shared with the server.
//!
//! The numeric limits form part of the external contract: the storage
//! backend rejects plans that fall outside them.

use std::time::Duration;

/// Bytes in one GiB. File-size limits are expressed in these units.
pub const BYTES_PER_GB: u64 = 1 << 30;

/// Bytes in one MiB.
pub const BYTES_PER_MB: u64 = 1 << 20;

/// Smallest part the storage backend accepts (the final part is exempt).
pub const MIN_PART_SIZE_BYTES: u64 = 5 * BYTES_PER_MB;

/// Preferred part size before the part-count cap forces larger parts.
pub const TARGET_PART_SIZE_BYTES: u64 = 250 * BYTES_PER_MB;

/// Hard backend limit on parts per multipart upload.
pub const MAX_MULTIPART_PARTS: u32 = 250;

/// Files at or above this size go through the multipart path.
pub const MULTIPART_THRESHOLD_BYTES: u64 = 5 * BYTES_PER_GB;

/// Absolute ceiling on an uploaded file, in GiB.
pub const MAX_FILE_SIZE_GB: f64 = 50.1;

/// Timeout applied to each pre-signed part PUT.
pub const MULTIPART_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Parts uploaded in parallel.
pub const MAX_CONCURRENT_PARTS: usize = 4;

/// Range size fetched per request when downloading.
pub const DOWNLOAD_BLOCK_SIZE: u64 = 10 * BYTES_PER_MB;

/// Response header carrying the per-part integrity token.
pub const ETAG_HEADER: &str = "etag";

pub const FILES_ENDPOINT: &str = "files";
pub const MULTIPART_INITIATE_ENDPOINT: &str = "files/multipart/initiate";
pub const MULTIPART_COMPLETE_ENDPOINT: &str = "files/multipart/complete";
pub const MULTIPART_ABORT_ENDPOINT: &str = "files/multipart/abort";

/// Path of the content endpoint for a stored file.
pub fn file_content_endpoint(file_id: &str) -> String {
    format!("{FILES_ENDPOINT}/{file_id}/content")
}

/// Converts [`MAX_FILE_SIZE_GB`]-style values to bytes.
pub fn gb_to_bytes(gb: f64) -> u64 {
    (gb * BYTES_PER_GB as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_consistent() {
        const _: () = assert!(TARGET_PART_SIZE_BYTES > MIN_PART_SIZE_BYTES);
        const _: () = assert!(MULTIPART_THRESHOLD_BYTES > TARGET_PART_SIZE_BYTES);

        // The largest allowed file must be reachable with the part cap and
        // a part size well under the backend's 5 GiB per-part maximum.
        let max_file = gb_to_bytes(MAX_FILE_SIZE_GB);
        let needed_part = max_file.div_ceil(MAX_MULTIPART_PARTS as u64);
        assert!(needed_part < 5 * BYTES_PER_GB);
    }

    #[test]
    fn gb_conversion() {
        assert_eq!(gb_to_bytes(1.0), BYTES_PER_GB);
        assert_eq!(gb_to_bytes(0.5), BYTES_PER_GB / 2);
    }

    #[test]
    fn content_endpoint_path() {
        assert_eq!(file_content_endpoint("file-123"), "files/file-123/content");
    }
}
