//! Concurrent part uploader.
//!
//! Pushes each planned part to its pre-signed URL with bounded concurrency.
//! The first failing part ends the whole upload; in-flight parts are
//! dropped with the stream.

use std::path::Path;

use cirrus_client::{ClientError, HttpRequest, Transport};
use cirrus_protocol::constants::ETAG_HEADER;
use cirrus_protocol::{CompletedPart, PartDescriptor};
use cirrus_transfer::{PartPlan, TransferLimits, TransferProgress, read_part};
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::FilesError;
use crate::events::EventSink;

/// Uploads the parts of one multipart session.
pub struct PartUploader<'a> {
    transport: &'a dyn Transport,
    limits: &'a TransferLimits,
    cancel: CancellationToken,
    events: EventSink,
}

impl<'a> PartUploader<'a> {
    pub fn new(transport: &'a dyn Transport, limits: &'a TransferLimits) -> Self {
        Self {
            transport,
            limits,
            cancel: CancellationToken::new(),
            events: EventSink::disabled(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Uploads every descriptor and returns the integrity tokens sorted by
    /// part number.
    pub async fn upload(
        &self,
        path: &Path,
        plan: &PartPlan,
        parts: &[PartDescriptor],
        progress: &TransferProgress,
    ) -> Result<Vec<CompletedPart>, FilesError> {
        let workers = self.limits.max_concurrent_parts.max(1);
        debug!(parts = parts.len(), workers, "uploading parts");

        let mut results = stream::iter(parts)
            .map(|descriptor| self.upload_one(path, plan, descriptor, progress))
            .buffer_unordered(workers);

        let mut completed = Vec::with_capacity(parts.len());
        while let Some(result) = results.next().await {
            completed.push(result?);
        }

        completed.sort_by_key(|p| p.part_number);
        Ok(completed)
    }

    async fn upload_one(
        &self,
        path: &Path,
        plan: &PartPlan,
        descriptor: &PartDescriptor,
        progress: &TransferProgress,
    ) -> Result<CompletedPart, FilesError> {
        if self.cancel.is_cancelled() {
            return Err(FilesError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FilesError::Cancelled),
            result = self.put_part(path, plan, descriptor, progress) => result,
        }
    }

    async fn put_part(
        &self,
        path: &Path,
        plan: &PartPlan,
        descriptor: &PartDescriptor,
        progress: &TransferProgress,
    ) -> Result<CompletedPart, FilesError> {
        let part_number = descriptor.part_number;
        let data = read_part(path, plan, part_number).await?;
        let len = data.len() as u64;

        let request = HttpRequest::put(&descriptor.upload_url)
            .with_headers(descriptor.headers.clone())
            .with_bytes(data)
            .with_timeout(self.limits.part_timeout);

        let response = tokio::time::timeout(self.limits.part_timeout, self.transport.send(request))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "part {part_number} not accepted within {:?}",
                    self.limits.part_timeout
                ))
            })??
            .error_for_status()?;

        let etag = response
            .header(ETAG_HEADER)
            .filter(|e| !e.is_empty())
            .ok_or(FilesError::MissingEtag { part_number })?
            .to_string();

        progress.complete_part(len);
        self.events.progress(progress.snapshot());
        debug!(part = part_number, bytes = len, "part uploaded");

        Ok(CompletedPart { part_number, etag })
    }
}
