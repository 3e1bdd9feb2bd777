//! Chunked downloader.
//!
//! Probes the remote resource for its size and type, takes an advisory lock
//! on the destination, fetches the body in ranged blocks into a temp file
//! beside the destination and renames it into place once the byte count
//! matches.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use cirrus_client::{HttpRequest, HttpResponse, Transport};
use cirrus_transfer::{
    BlockWriter, DownloadTarget, TransferLimits, TransferProgress, validate_remote_name,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::FilesError;
use crate::events::EventSink;

/// What to download and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Explicit destination. Wins over the remote name.
    pub output: Option<PathBuf>,
    /// Base name for the destination when no output is given.
    pub remote_name: Option<String>,
    /// Checkpoint step; appends `-checkpoint-<step>` to the remote name.
    pub checkpoint_step: Option<u32>,
    /// Directory for remote-named destinations. Defaults to the working
    /// directory.
    pub directory: Option<PathBuf>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output: None,
            remote_name: None,
            checkpoint_step: None,
            directory: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_remote_name(mut self, name: impl Into<String>) -> Self {
        self.remote_name = Some(name.into());
        self
    }

    pub fn with_checkpoint_step(mut self, step: u32) -> Self {
        self.checkpoint_step = Some(step);
        self
    }

    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }
}

/// A finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Size and type reported by the probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RemoteMetadata {
    size: u64,
    content_type: String,
}

/// Downloads remote files in fixed-size ranged blocks.
pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    limits: &'a TransferLimits,
    cancel: CancellationToken,
    events: EventSink,
}

impl<'a> Downloader<'a> {
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

    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadResult, FilesError> {
        let metadata = self.probe(&request.url).await?;
        let dest = resolve_destination(request, &metadata.content_type)?;
        let events = self.events.named(dest.display().to_string());

        match self.download_locked(request, &metadata, dest, &events).await {
            Ok(result) => {
                events.completed().await;
                Ok(result)
            }
            Err(e) => {
                events.failed(&e).await;
                Err(e)
            }
        }
    }

    async fn download_locked(
        &self,
        request: &DownloadRequest,
        metadata: &RemoteMetadata,
        dest: PathBuf,
        events: &EventSink,
    ) -> Result<DownloadResult, FilesError> {
        let target = DownloadTarget::new(dest, metadata.size);
        let _lock = DestinationLock::acquire(&target.lock_path).await?;
        self.check_cancelled()?;

        let block_size = self.limits.download_block_size.max(1);
        let blocks = u32::try_from(metadata.size.div_ceil(block_size)).unwrap_or(u32::MAX);
        events.started(target.expected_size_bytes, blocks).await;
        info!(
            path = %target.file_path.display(),
            bytes = target.expected_size_bytes,
            blocks,
            "starting download"
        );

        let dest = target.file_path.clone();
        let mut writer = tokio::task::spawn_blocking(move || BlockWriter::create_beside(&dest)).await??;
        let progress = TransferProgress::new(target.expected_size_bytes, 0);

        while writer.written() < target.expected_size_bytes {
            self.check_cancelled()?;

            let offset = writer.written();
            let end = (offset + block_size).min(target.expected_size_bytes) - 1;
            let response = self.fetch_range(&request.url, offset, end).await?;

            // A server that ignores Range sends the whole body at once.
            let whole_body = response.status == 200;
            if whole_body && offset != 0 {
                return Err(FilesError::RangeMismatch {
                    start: offset,
                    end,
                    content_range: "full body".into(),
                });
            }
            if !whole_body {
                check_block_range(&response, offset, end)?;
            }
            let data = response.body;
            if data.is_empty() {
                break;
            }
            let len = data.len() as u64;

            writer = tokio::task::spawn_blocking(move || {
                writer.write_block(offset, &data)?;
                Ok::<_, cirrus_transfer::TransferError>(writer)
            })
            .await??;

            progress.add_bytes(len);
            events.progress(progress.snapshot());
            debug!(offset, bytes = len, "block written");

            if whole_body {
                break;
            }
        }

        let expected = target.expected_size_bytes;
        let dest = target.file_path.clone();
        let path = tokio::task::spawn_blocking(move || writer.finish(expected, &dest)).await??;

        info!(path = %path.display(), bytes = expected, "download complete");
        Ok(DownloadResult {
            path,
            size_bytes: expected,
        })
    }

    /// Fetches the first two bytes to learn the size and content type.
    async fn probe(&self, url: &str) -> Result<RemoteMetadata, FilesError> {
        let response = self
            .transport
            .send(HttpRequest::get(url).with_header("Range", "bytes=0-1"))
            .await?
            .error_for_status()?;

        let size = remote_size(&response)?;
        let content_type = response.header("content-type").unwrap_or_default().to_string();
        debug!(url = %url, size, content_type = %content_type, "probed remote file");
        Ok(RemoteMetadata { size, content_type })
    }

    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<HttpResponse, FilesError> {
        let response = self
            .transport
            .send(HttpRequest::get(url).with_header("Range", format!("bytes={start}-{end}")))
            .await?
            .error_for_status()?;
        Ok(response)
    }

    fn check_cancelled(&self) -> Result<(), FilesError> {
        if self.cancel.is_cancelled() {
            Err(FilesError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Total size from `Content-Range: bytes 0-1/<total>`, else `Content-Length`.
fn remote_size(response: &HttpResponse) -> Result<u64, FilesError> {
    if let Some(range) = response.header("content-range") {
        if let Some(total) = range
            .rsplit_once('/')
            .and_then(|(_, total)| total.trim().parse::<u64>().ok())
        {
            return Ok(total);
        }
        warn!(content_range = %range, "unusable Content-Range, falling back to Content-Length");
    }

    let length = response
        .header("content-length")
        .ok_or_else(|| FilesError::UnknownSize("no Content-Range or Content-Length".into()))?;
    length
        .trim()
        .parse()
        .map_err(|_| FilesError::UnknownSize(format!("bad Content-Length {length:?}")))
}

/// Requires a partial response to cover bytes starting exactly at `start`
/// and ending no later than `end`.
fn check_block_range(response: &HttpResponse, start: u64, end: u64) -> Result<(), FilesError> {
    let content_range = response.header("content-range").unwrap_or_default();
    let served = content_range
        .trim()
        .strip_prefix("bytes ")
        .and_then(|r| r.split_once('/'))
        .and_then(|(span, _)| span.split_once('-'))
        .and_then(|(s, e)| Some((s.trim().parse::<u64>().ok()?, e.trim().parse::<u64>().ok()?)));

    match served {
        Some((s, e)) if s == start && e >= s && e <= end => Ok(()),
        _ => Err(FilesError::RangeMismatch {
            start,
            end,
            content_range: content_range.to_string(),
        }),
    }
}

/// Maps a content type to the archive extension it is stored under.
fn extension_for(content_type: &str) -> Option<&'static str> {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("x-tar") {
        Some(".tar.gz")
    } else if content_type.contains("zstd") {
        Some(".tar.zst")
    } else {
        None
    }
}

fn resolve_destination(request: &DownloadRequest, content_type: &str) -> Result<PathBuf, FilesError> {
    if let Some(output) = &request.output {
        return Ok(output.clone());
    }

    let mut name = match &request.remote_name {
        Some(name) => name.clone(),
        None => last_segment(&request.url).to_string(),
    };
    validate_remote_name(&name)?;

    let extension = match request.checkpoint_step {
        Some(step) => {
            name.push_str(&format!("-checkpoint-{step}"));
            ".tar.zst"
        }
        None => extension_for(content_type).ok_or_else(|| FilesError::UnknownContentType {
            content_type: content_type.to_string(),
        })?,
    };
    name.push_str(extension);

    let dir = request.directory.clone().unwrap_or_default();
    Ok(dir.join(name))
}

fn last_segment(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Exclusive advisory lock on `<dest>.lock`, released on drop.
struct DestinationLock {
    file: File,
}

impl DestinationLock {
    /// Blocks (off the async runtime) until the lock is free.
    async fn acquire(path: &Path) -> Result<Self, FilesError> {
        let path = path.to_path_buf();
        let lock = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock()?;
            debug!(path = %path.display(), "download lock acquired");
            Ok::<_, std::io::Error>(Self { file })
        })
        .await??;
        Ok(lock)
    }
}

impl Drop for DestinationLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(error = %e, "failed to release download lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TransferEvent;
    use crate::testing::{MockTransport, range_response, sample_data};
    use cirrus_client::{ClientError, Method};
    use cirrus_transfer::TransferError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const URL: &str = "https://api.test/v1/finetune/download";

    fn small_blocks(block: u64) -> TransferLimits {
        TransferLimits::default().with_download_block_size(block)
    }

    fn serving(content: Vec<u8>, content_type: &'static str) -> MockTransport {
        MockTransport::new(move |r| range_response(r, &content, content_type))
    }

    #[tokio::test]
    async fn downloads_in_blocks_to_explicit_output() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.bin");
        let content = sample_data(1000);
        let transport = serving(content.clone(), "application/zstd");
        let limits = small_blocks(256);

        let (tx, mut rx) = mpsc::channel(64);
        let result = Downloader::new(&transport, &limits)
            .with_events(EventSink::new(tx))
            .download(&DownloadRequest::new(URL).with_output(&dest))
            .await
            .unwrap();

        assert_eq!(result.path, dest);
        assert_eq!(result.size_bytes, 1000);
        assert_eq!(std::fs::read(&dest).unwrap(), content);

        let ranges: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.header("range").unwrap().to_string())
            .collect();
        assert_eq!(
            ranges,
            vec![
                "bytes=0-1",
                "bytes=0-255",
                "bytes=256-511",
                "bytes=512-767",
                "bytes=768-999"
            ]
        );

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert!(matches!(events.first(), Some(TransferEvent::Started { parts: 4, total_bytes: 1000, .. })));
        assert_eq!(
            events.iter().filter(|e| matches!(e, TransferEvent::Progress { .. })).count(),
            4
        );
        assert!(matches!(events.last(), Some(TransferEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn remote_name_gets_extension_from_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let transport = serving(sample_data(10), "application/x-tar");
        let limits = TransferLimits::default();

        let result = Downloader::new(&transport, &limits)
            .download(
                &DownloadRequest::new(URL)
                    .with_remote_name("ft-abc123")
                    .with_directory(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(result.path, dir.path().join("ft-abc123.tar.gz"));
        assert!(result.path.exists());
    }

    #[tokio::test]
    async fn checkpoint_step_names_zst_archive() {
        let dir = tempfile::tempdir().unwrap();
        let transport = serving(sample_data(10), "application/octet-stream");
        let limits = TransferLimits::default();

        let result = Downloader::new(&transport, &limits)
            .download(
                &DownloadRequest::new(URL)
                    .with_remote_name("ft-abc123")
                    .with_checkpoint_step(4)
                    .with_directory(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(result.path, dir.path().join("ft-abc123-checkpoint-4.tar.zst"));
    }

    #[tokio::test]
    async fn unknown_content_type_aborts_before_body() {
        let dir = tempfile::tempdir().unwrap();
        let transport = serving(sample_data(10), "text/html");
        let limits = TransferLimits::default();

        let err = Downloader::new(&transport, &limits)
            .download(
                &DownloadRequest::new(URL)
                    .with_remote_name("ft-abc123")
                    .with_directory(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FilesError::UnknownContentType { .. }));
        assert!(err.to_string().contains("aborting download"));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn content_type_match_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let transport = serving(sample_data(10), "application/X-Tar");
        let limits = TransferLimits::default();

        let result = Downloader::new(&transport, &limits)
            .download(
                &DownloadRequest::new(URL)
                    .with_remote_name("ft-abc123")
                    .with_directory(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(result.path, dir.path().join("ft-abc123.tar.gz"));
        assert_eq!(extension_for("Application/ZSTD"), Some(".tar.zst"));
    }

    #[tokio::test]
    async fn traversal_in_remote_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let transport = serving(sample_data(10), "application/zstd");
        let limits = TransferLimits::default();

        let err = Downloader::new(&transport, &limits)
            .download(
                &DownloadRequest::new(URL)
                    .with_remote_name("../escape")
                    .with_directory(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FilesError::Transfer(TransferError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn short_body_is_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.tar.zst");
        std::fs::write(&dest, b"previous").unwrap();

        let content = sample_data(100);
        let transport = MockTransport::new(move |r| {
            let mut resp = range_response(r, &content, "application/zstd")?;
            if r.header("range") != Some("bytes=0-1") {
                // Storage claims 100 bytes but only ever serves 60.
                resp = HttpResponse::new(200, content[..60].to_vec());
            }
            Ok(resp)
        });
        let limits = TransferLimits::default();

        let err = Downloader::new(&transport, &limits)
            .download(&DownloadRequest::new(URL).with_output(&dest))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FilesError::Transfer(TransferError::SizeMismatch { expected: 100, actual: 60 })
        ));
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn stale_range_response_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.tar.zst");
        let content = sample_data(100);
        // A cache that keeps answering with the first block.
        let transport = MockTransport::new(move |r| {
            if r.header("range") == Some("bytes=0-1") {
                return range_response(r, &content, "application/zstd");
            }
            Ok(HttpResponse::new(206, content[..50].to_vec())
                .with_header("Content-Type", "application/zstd")
                .with_header("Content-Range", "bytes 0-49/100"))
        });
        let limits = small_blocks(50);

        let err = Downloader::new(&transport, &limits)
            .download(&DownloadRequest::new(URL).with_output(&dest))
            .await
            .unwrap_err();
        match err {
            FilesError::RangeMismatch { start, end, content_range } => {
                assert_eq!((start, end), (50, 99));
                assert_eq!(content_range, "bytes 0-49/100");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn block_range_must_match_request() {
        let ok = HttpResponse::new(206, "x").with_header("Content-Range", "bytes 10-19/100");
        assert!(check_block_range(&ok, 10, 19).is_ok());
        // Short final block.
        assert!(check_block_range(&ok, 10, 29).is_ok());

        let overlong = HttpResponse::new(206, "x").with_header("Content-Range", "bytes 10-29/100");
        assert!(check_block_range(&overlong, 10, 19).is_err());
        assert!(check_block_range(&HttpResponse::new(206, "x"), 0, 9).is_err());
    }

    #[tokio::test]
    async fn full_body_after_first_block_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.tar.zst");
        let content = sample_data(100);
        let transport = MockTransport::new(move |r| match r.header("range") {
            Some("bytes=0-1") | Some("bytes=0-49") => range_response(r, &content, "application/zstd"),
            _ => Ok(HttpResponse::new(200, content.clone())),
        });
        let limits = small_blocks(50);

        let err = Downloader::new(&transport, &limits)
            .download(&DownloadRequest::new(URL).with_output(&dest))
            .await
            .unwrap_err();
        assert!(matches!(err, FilesError::RangeMismatch { start: 50, .. }), "{err}");
    }

    #[tokio::test]
    async fn range_ignoring_server_sends_whole_body() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.tar.zst");
        let content = sample_data(300);
        let body = content.clone();
        let transport = MockTransport::new(move |_| {
            Ok(HttpResponse::new(200, body.clone())
                .with_header("Content-Type", "application/zstd")
                .with_header("Content-Length", body.len().to_string()))
        });
        let limits = small_blocks(64);

        let result = Downloader::new(&transport, &limits)
            .download(&DownloadRequest::new(URL).with_output(&dest))
            .await
            .unwrap();
        assert_eq!(result.size_bytes, 300);
        assert_eq!(std::fs::read(&dest).unwrap(), content);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn probe_failure_surfaces_api_error() {
        let transport = MockTransport::new(|_| Ok(HttpResponse::new(404, "no such model")));
        let limits = TransferLimits::default();
        let err = Downloader::new(&transport, &limits)
            .download(&DownloadRequest::new(URL).with_output("unused.tar.zst"))
            .await
            .unwrap_err();
        assert!(matches!(err, FilesError::Client(ClientError::Api { status: 404, .. })));
    }

    #[tokio::test]
    async fn cancelled_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.tar.zst");
        let transport = serving(sample_data(100), "application/zstd");
        let limits = small_blocks(10);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Downloader::new(&transport, &limits)
            .with_cancel(cancel)
            .download(&DownloadRequest::new(URL).with_output(&dest))
            .await
            .unwrap_err();
        assert!(matches!(err, FilesError::Cancelled));
        assert!(!dest.exists());
        assert_eq!(transport.count(Method::Get, URL), 1);
    }

    #[test]
    fn size_from_content_range_then_length() {
        let resp = HttpResponse::new(206, "ab").with_header("Content-Range", "bytes 0-1/123456");
        assert_eq!(remote_size(&resp).unwrap(), 123456);

        let resp = HttpResponse::new(200, "").with_header("Content-Length", "42");
        assert_eq!(remote_size(&resp).unwrap(), 42);

        let resp = HttpResponse::new(206, "ab")
            .with_header("Content-Range", "bytes 0-1/*")
            .with_header("Content-Length", "2");
        assert_eq!(remote_size(&resp).unwrap(), 2);

        assert!(matches!(
            remote_size(&HttpResponse::new(200, "")),
            Err(FilesError::UnknownSize(_))
        ));
    }

    #[test]
    fn url_last_segment() {
        assert_eq!(last_segment("https://h/v1/files/file-1/content"), "content");
        assert_eq!(last_segment("https://h/models/ft-1/?sig=x"), "ft-1");
    }

    /// Transport that measures how many ranged block GETs overlap.
    struct OverlapGauge {
        content: Vec<u8>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Transport for OverlapGauge {
        fn send(&self, request: HttpRequest) -> cirrus_client::TransportFuture<'_> {
            Box::pin(async move {
                let probe = request.header("range") == Some("bytes=0-1");
                if !probe {
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                range_response(&request, &self.content, "application/zstd")
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn same_destination_downloads_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.tar.zst");
        let content = sample_data(500);
        let transport = Arc::new(OverlapGauge {
            content: content.clone(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let limits = Arc::new(small_blocks(50));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let transport = Arc::clone(&transport);
                let limits = Arc::clone(&limits);
                let dest = dest.clone();
                tokio::spawn(async move {
                    Downloader::new(transport.as_ref(), &limits)
                        .download(&DownloadRequest::new(URL).with_output(&dest))
                        .await
                })
            })
            .collect();

        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.size_bytes, 500);
        }

        assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&dest).unwrap(), content);
        assert!(dir.path().join("model.tar.zst.lock").exists());
    }

    #[tokio::test]
    async fn lock_released_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.tar.zst");
        let limits = TransferLimits::default();

        let failing = MockTransport::new(|r| {
            if r.header("range") == Some("bytes=0-1") {
                range_response(r, &[0u8; 10], "application/zstd")
            } else {
                Err(ClientError::Connection("reset".into()))
            }
        });
        assert!(Downloader::new(&failing, &limits)
            .download(&DownloadRequest::new(URL).with_output(&dest))
            .await
            .is_err());

        let content = sample_data(10);
        let working = serving(content.clone(), "application/zstd");
        tokio::time::timeout(
            Duration::from_secs(5),
            Downloader::new(&working, &limits).download(&DownloadRequest::new(URL).with_output(&dest)),
        )
        .await
        .expect("lock was not released")
        .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), content);
    }
}
