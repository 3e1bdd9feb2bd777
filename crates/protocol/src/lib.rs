//! Wire protocol types for the cirrus file transfer endpoints.
//!
//! Everything that crosses the network boundary lives here: the closed
//! purpose/file-type enums, the multipart initiate/complete/abort payloads,
//! the file object returned by the server, and the constants the server
//! expects clients to honor.

pub mod constants;
pub mod messages;
pub mod types;

pub use messages::{
    AbortUploadRequest, CompleteUploadRequest, CompleteUploadResponse, CompletedPart,
    InitiateUploadRequest, InitiateUploadResponse, PartDescriptor,
};
pub use types::{FileObject, FilePurpose, FileType};
