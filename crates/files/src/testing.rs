//! Recording transport and canned servers shared by the engine tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cirrus_client::{ClientError, HttpRequest, HttpResponse, Method, RequestBody, Transport, TransportFuture};
use cirrus_protocol::constants::{
    MULTIPART_ABORT_ENDPOINT, MULTIPART_COMPLETE_ENDPOINT, MULTIPART_INITIATE_ENDPOINT,
};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, ClientError> + Send + Sync;

/// Mock transport that records requests and answers through a handler.
pub(crate) struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub(crate) fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, ClientError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Delays every response, after the request has been recorded.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn count(&self, method: Method, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        self.requests.lock().unwrap().push(request.clone());
        let result = (self.handler)(&request);
        let delay = self.delay;
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            result
        })
    }
}

pub(crate) fn json_body(request: &HttpRequest) -> serde_json::Value {
    match &request.body {
        RequestBody::Json(v) => v.clone(),
        other => panic!("expected JSON body, got {other:?}"),
    }
}

pub(crate) fn json_response(value: serde_json::Value) -> HttpResponse {
    HttpResponse::new(200, value.to_string()).with_header("Content-Type", "application/json")
}

pub(crate) const UPLOAD_ID: &str = "upload-abc";
pub(crate) const FILE_ID: &str = "file-xyz";
pub(crate) const PART_URL_PREFIX: &str = "https://storage.test/up/";

/// In-memory multipart storage backend.
///
/// Issues one pre-signed URL per requested part, stores PUT bodies and
/// answers completion with a file object sized from the stored parts.
#[derive(Clone, Default)]
pub(crate) struct MultipartServer {
    pub(crate) stored: Arc<Mutex<BTreeMap<u32, Vec<u8>>>>,
    /// Overrides the number of parts issued by initiate.
    pub(crate) issue_parts: Option<u32>,
}

impl MultipartServer {
    pub(crate) fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        match (request.method, request.url.as_str()) {
            (Method::Post, MULTIPART_INITIATE_ENDPOINT) => {
                let body = json_body(request);
                let requested = body["number_of_parts"].as_u64().unwrap() as u32;
                let n = self.issue_parts.unwrap_or(requested);
                let parts: Vec<_> = (1..=n)
                    .map(|i| {
                        serde_json::json!({
                            "part_number": i,
                            "url": format!("{PART_URL_PREFIX}{i}"),
                            "headers": {"Content-Type": "application/octet-stream"},
                        })
                    })
                    .collect();
                Ok(json_response(serde_json::json!({
                    "upload_id": UPLOAD_ID,
                    "file_id": FILE_ID,
                    "parts": parts,
                })))
            }
            (Method::Put, url) if url.starts_with(PART_URL_PREFIX) => {
                let n: u32 = url[PART_URL_PREFIX.len()..].parse().unwrap();
                let RequestBody::Bytes(data) = &request.body else {
                    panic!("part PUT without byte body");
                };
                self.stored.lock().unwrap().insert(n, data.to_vec());
                Ok(HttpResponse::new(200, "").with_header("ETag", format!("\"etag-{n}\"")))
            }
            (Method::Post, MULTIPART_COMPLETE_ENDPOINT) => {
                let total: usize = self.stored.lock().unwrap().values().map(Vec::len).sum();
                Ok(json_response(serde_json::json!({
                    "file": {
                        "id": FILE_ID,
                        "object": "file",
                        "filename": "train.jsonl",
                        "bytes": total,
                        "purpose": "fine-tune",
                    }
                })))
            }
            (Method::Post, MULTIPART_ABORT_ENDPOINT) => Ok(json_response(serde_json::json!({}))),
            (method, url) => panic!("unexpected request {method} {url}"),
        }
    }

    /// Concatenation of the stored parts in part order.
    pub(crate) fn reassembled(&self) -> Vec<u8> {
        self.stored
            .lock()
            .unwrap()
            .values()
            .flat_map(|p| p.iter().copied())
            .collect()
    }
}

/// Serves `content` with HTTP range semantics.
pub(crate) fn range_response(
    request: &HttpRequest,
    content: &[u8],
    content_type: &str,
) -> Result<HttpResponse, ClientError> {
    let Some(range) = request.header("range") else {
        return Ok(HttpResponse::new(200, content.to_vec())
            .with_header("Content-Type", content_type)
            .with_header("Content-Length", content.len().to_string()));
    };
    let spec = range.strip_prefix("bytes=").unwrap();
    let (start, end) = spec.split_once('-').unwrap();
    let start: usize = start.parse().unwrap();
    let end: usize = end.parse::<usize>().unwrap().min(content.len() - 1);
    Ok(HttpResponse::new(206, content[start..=end].to_vec())
        .with_header("Content-Type", content_type)
        .with_header("Content-Range", format!("bytes {start}-{end}/{}", content.len())))
}

pub(crate) fn write_file(dir: &std::path::Path, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

pub(crate) fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
