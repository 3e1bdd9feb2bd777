//! Multipart upload orchestrator.
//!
//! Drives one session through initiate, concurrent part upload and
//! completion. Any failure after initiation, cancellation included, sends a
//! best-effort abort and then returns the original error.

use std::path::Path;

use cirrus_client::{HttpRequest, HttpResponse, Transport};
use cirrus_protocol::constants::{
    MULTIPART_ABORT_ENDPOINT, MULTIPART_COMPLETE_ENDPOINT, MULTIPART_INITIATE_ENDPOINT,
};
use cirrus_protocol::{
    AbortUploadRequest, CompleteUploadRequest, CompleteUploadResponse, FileObject, FilePurpose,
    FileType, InitiateUploadRequest, InitiateUploadResponse,
};
use cirrus_transfer::{
    PartPlan, TransferLimits, TransferProgress, UploadSession, check_file_size, detect_file_type,
    plan_parts,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::FilesError;
use crate::events::EventSink;
use crate::parts::PartUploader;
use crate::single::file_name;

/// Uploads large files as multipart sessions.
pub struct MultipartUploader<'a> {
    transport: &'a dyn Transport,
    limits: &'a TransferLimits,
    cancel: CancellationToken,
    events: EventSink,
}

impl<'a> MultipartUploader<'a> {
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

    /// Uploads `path` and returns the server's file object.
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
        let plan = plan_parts(size, self.limits)?;
        self.check_cancelled()?;

        info!(
            file = %filename,
            bytes = size,
            parts = plan.num_parts,
            part_size = plan.part_size_bytes,
            "starting multipart upload"
        );

        let mut session = self
            .initiate(filename, file_type, purpose, &plan)
            .await?;
        events.started(size, plan.num_parts).await;

        match self.upload_session(&mut session, path, &plan, events).await {
            Ok(file) => {
                info!(upload_id = %session.upload_id(), file_id = %file.id, "multipart upload complete");
                Ok(file)
            }
            Err(e) => {
                warn!(upload_id = %session.upload_id(), error = %e, "multipart upload failed");
                self.abort(&mut session).await;
                Err(e)
            }
        }
    }

    async fn initiate(
        &self,
        filename: &str,
        file_type: FileType,
        purpose: FilePurpose,
        plan: &PartPlan,
    ) -> Result<UploadSession, FilesError> {
        let body = InitiateUploadRequest {
            file_size: plan.total_size_bytes,
            file_type,
            purpose,
            number_of_parts: plan.num_parts,
            filename: filename.to_string(),
        };
        let request = HttpRequest::post(MULTIPART_INITIATE_ENDPOINT).with_json(&body)?;
        let response: InitiateUploadResponse = self.transport.send(request).await?.json()?;
        debug!(upload_id = %response.upload_id, file_id = %response.file_id, "upload initiated");

        let upload_id = response.upload_id.clone();
        let file_id = response.file_id.clone();
        match UploadSession::from_initiate(response, plan) {
            Ok(session) => Ok(session),
            Err(e) => {
                // The server opened a session we cannot use.
                warn!(upload_id = %upload_id, error = %e, "part list does not match the plan");
                self.send_abort(&upload_id, &file_id).await;
                Err(e.into())
            }
        }
    }

    async fn upload_session(
        &self,
        session: &mut UploadSession,
        path: &Path,
        plan: &PartPlan,
        events: &EventSink,
    ) -> Result<FileObject, FilesError> {
        session.begin_parts()?;
        let progress = TransferProgress::new(plan.total_size_bytes, plan.num_parts);

        let completed = PartUploader::new(self.transport, self.limits)
            .with_cancel(self.cancel.clone())
            .with_events(events.clone())
            .upload(path, plan, session.parts(), &progress)
            .await?;
        for part in completed {
            session.record_part(part)?;
        }
        let parts = session.completion_parts()?;
        self.check_cancelled()?;

        let body = CompleteUploadRequest {
            upload_id: session.upload_id().to_string(),
            file_id: session.file_id().to_string(),
            parts,
        };
        let request = HttpRequest::post(MULTIPART_COMPLETE_ENDPOINT).with_json(&body)?;
        let response: CompleteUploadResponse = self.transport.send(request).await?.json()?;
        session.mark_completed()?;
        Ok(response.file)
    }

    /// Aborts the session on the server, best effort.
    ///
    /// Failures are logged and swallowed. Sessions that already completed
    /// or aborted are left alone, so calling this twice is harmless.
    pub async fn abort(&self, session: &mut UploadSession) {
        if !session.mark_aborted() {
            debug!(upload_id = %session.upload_id(), state = ?session.state(), "abort skipped");
            return;
        }
        self.send_abort(session.upload_id(), session.file_id()).await;
    }

    async fn send_abort(&self, upload_id: &str, file_id: &str) {
        let body = AbortUploadRequest {
            upload_id: upload_id.to_string(),
            file_id: file_id.to_string(),
        };
        let request = match HttpRequest::post(MULTIPART_ABORT_ENDPOINT).with_json(&body) {
            Ok(r) => r,
            Err(e) => {
                warn!(upload_id = %upload_id, error = %e, "failed to build abort request");
                return;
            }
        };
        match self
            .transport
            .send(request)
            .await
            .and_then(HttpResponse::error_for_status)
        {
            Ok(_) => info!(upload_id = %upload_id, file_id = %file_id, "multipart upload aborted"),
            Err(e) => {
                warn!(upload_id = %upload_id, file_id = %file_id, error = %e, "failed to abort multipart upload")
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), FilesError> {
        if self.cancel.is_cancelled() {
            Err(FilesError::Cancelled)
        } else {
            Ok(())
        }
    }
}
