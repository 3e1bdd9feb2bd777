//! File transfer engine for the cirrus API.
//!
//! Uploads are routed by size. Files below the multipart threshold go out
//! in one form request; larger files are planned into parts, pushed to
//! pre-signed URLs concurrently and finalized server-side, with a
//! best-effort abort on any failure. Downloads always go through the
//! chunked downloader, which holds an advisory lock on the destination.
//!
//! # Pipeline
//!
//! 1. **Check**: size ceiling and file type, before any network call
//! 2. **Plan**: split into parts (multipart only)
//! 3. **Initiate**: open the upload session and receive part URLs
//! 4. **Upload**: PUT parts with bounded concurrency
//! 5. **Complete**: send the sorted part list, or abort on failure

pub mod client;
pub mod download;
pub mod error;
pub mod events;
pub mod multipart;
pub mod parts;
pub mod single;

#[cfg(test)]
mod testing;

pub use client::FilesClient;
pub use download::{DownloadRequest, DownloadResult, Downloader};
pub use error::FilesError;
pub use events::{EventSink, TransferEvent};
pub use multipart::MultipartUploader;
pub use parts::PartUploader;
pub use single::SingleUploader;
