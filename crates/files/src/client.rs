//! Entry point that routes uploads by size and runs downloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cirrus_client::{ClientConfig, HttpRequest, HttpTransport, Transport};
use cirrus_protocol::constants::{FILES_ENDPOINT, file_content_endpoint};
use cirrus_protocol::{FileObject, FilePurpose};
use cirrus_transfer::{TransferLimits, check_file_size};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::download::{DownloadRequest, DownloadResult, Downloader};
use crate::events::{EventSink, TransferEvent};
use crate::multipart::MultipartUploader;
use crate::single::SingleUploader;
use crate::FilesError;

/// File upload and download client.
///
/// Cheap to clone; clones share the transport and the event channel.
#[derive(Clone)]
pub struct FilesClient {
    transport: Arc<dyn Transport>,
    limits: TransferLimits,
    events: EventSink,
}

impl FilesClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            limits: TransferLimits::default(),
            events: EventSink::disabled(),
        }
    }

    /// Builds a client over the reqwest transport.
    pub fn from_config(config: ClientConfig) -> Result<Self, FilesError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Same as [`from_config`](Self::from_config) with `CIRRUS_*` variables.
    pub fn from_env() -> Result<Self, FilesError> {
        Self::from_config(ClientConfig::from_env())
    }

    pub fn with_limits(mut self, limits: TransferLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sends transfer events to `tx`. Progress events are dropped when the
    /// channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<TransferEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn limits(&self) -> &TransferLimits {
        &self.limits
    }

    pub async fn upload(&self, path: &Path, purpose: FilePurpose) -> Result<FileObject, FilesError> {
        self.upload_with_cancel(path, purpose, CancellationToken::new())
            .await
    }

    /// Uploads `path`, choosing single-shot or multipart by size.
    ///
    /// Cancellation only affects multipart uploads; a single-shot request
    /// runs to completion once sent.
    pub async fn upload_with_cancel(
        &self,
        path: &Path,
        purpose: FilePurpose,
        cancel: CancellationToken,
    ) -> Result<FileObject, FilesError> {
        let size = tokio::fs::metadata(path).await?.len();
        check_file_size(size, &self.limits)?;

        if self.limits.use_multipart(size) {
            debug!(path = %path.display(), bytes = size, "routing to multipart upload");
            MultipartUploader::new(self.transport.as_ref(), &self.limits)
                .with_cancel(cancel)
                .with_events(self.events.clone())
                .upload(path, purpose)
                .await
        } else {
            debug!(path = %path.display(), bytes = size, "routing to single-shot upload");
            SingleUploader::new(self.transport.as_ref(), &self.limits)
                .with_events(self.events.clone())
                .upload(path, purpose)
                .await
        }
    }

    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadResult, FilesError> {
        self.download_with_cancel(request, CancellationToken::new())
            .await
    }

    pub async fn download_with_cancel(
        &self,
        request: &DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<DownloadResult, FilesError> {
        Downloader::new(self.transport.as_ref(), &self.limits)
            .with_cancel(cancel)
            .with_events(self.events.clone())
            .download(request)
            .await
    }

    /// Downloads the content of a stored file.
    ///
    /// Without `output` the file lands in the working directory, named
    /// after the file id with an extension from the content type.
    pub async fn download_file(
        &self,
        file_id: &str,
        output: Option<PathBuf>,
    ) -> Result<DownloadResult, FilesError> {
        let mut request = DownloadRequest::new(file_content_endpoint(file_id)).with_remote_name(file_id);
        request.output = output;
        self.download(&request).await
    }

    /// Fetches the metadata of a stored file.
    pub async fn retrieve(&self, file_id: &str) -> Result<FileObject, FilesError> {
        let url = format!("{FILES_ENDPOINT}/{file_id}");
        let file = self.transport.send(HttpRequest::get(url)).await?.json()?;
        Ok(file)
    }
}
