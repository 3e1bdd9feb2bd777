//! Single-shot uploader for files below the multipart threshold.

use std::path::Path;

use cirrus_client::{HttpRequest, Transport};
use cirrus_protocol::constants::FILES_ENDPOINT;
use cirrus_protocol::{FileObject, FilePurpose};
use cirrus_transfer::{TransferLimits, TransferProgress, check_file_size, detect_file_type};
use tracing::{info, warn};

use crate::FilesError;
use crate::events::EventSink;

/// Uploads a whole file in one multipart form request.
pub struct SingleUploader<'a> {
    transport: &'a dyn Transport,
    limits: &'a TransferLimits,
    events: EventSink,
}

impl<'a> SingleUploader<'a> {
    pub fn new(transport: &'a dyn Transport, limits: &'a TransferLimits) -> Self {
        Self {
            transport,
            limits,
            events: EventSink::disabled(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub async fn upload(&self, path: &Path, purpose: FilePurpose) -> Result<FileObject, FilesError> {
        let filename = file_name(path);
        let events = self.events.named(&filename);
        match self.run(path, &filename, purpose, &events).await {
            Ok(file) => {
                events.completed().await;
                Ok(file)
            }
            Err(e) => {
                events.failed(&e).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        path: &Path,
        filename: &str,
        purpose: FilePurpose,
        events: &EventSink,
    ) -> Result<FileObject, FilesError> {
        let size = tokio::fs::metadata(path).await?.len();
        check_file_size(size, self.limits)?;
        let file_type = detect_file_type(path)?;

        events.started(size, 1).await;
        info!(file = %filename, bytes = size, %file_type, %purpose, "uploading file");

        let request = HttpRequest::post(FILES_ENDPOINT).with_file_form(path, purpose.as_str(), filename);
        let file: FileObject = self.transport.send(request).await?.json()?;

        if file.bytes != size {
            warn!(
                file_id = %file.id,
                local_bytes = size,
                remote_bytes = file.bytes,
                "server reported a different size than the local file"
            );
        }

        let progress = TransferProgress::new(size, 1);
        progress.complete_part(size);
        events.progress(progress.snapshot());

        info!(file_id = %file.id, "upload complete");
        Ok(file)
    }
}

/// Final path component, used as the upload filename and event name.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
