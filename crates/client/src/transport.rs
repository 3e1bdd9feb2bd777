//! Transport trait and the request/response types that cross it.
//!
//! `Transport` is implemented by [`HttpTransport`](crate::HttpTransport) for
//! real traffic. Keeping it a trait lets the upload and download engines be
//! driven by recording mocks in tests.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::ClientError;

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, ClientError>> + Send + 'a>>;

/// Sends one HTTP request and returns the raw response.
///
/// Non-2xx statuses are returned as responses, not errors; callers decide
/// via [`HttpResponse::error_for_status`].
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Bytes(Bytes),
    /// Multipart form with a `purpose` text field and a `file` part streamed
    /// from disk.
    FileForm {
        path: PathBuf,
        purpose: String,
        filename: String,
    },
}

/// An outgoing request.
///
/// `url` is either an endpoint relative to the configured base URL or an
/// absolute URL (presigned storage links).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Serializes `body` as the JSON payload.
    pub fn with_json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Config(format!("unserializable request body: {e}")))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn with_bytes(mut self, data: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(data.into());
        self
    }

    pub fn with_file_form(
        mut self,
        path: impl Into<PathBuf>,
        purpose: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        self.body = RequestBody::FileForm {
            path: path.into(),
            purpose: purpose.into(),
            filename: filename.into(),
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response. Header names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turns a non-2xx response into [`ClientError::Api`].
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ClientError::Api {
            status: self.status,
            body: String::from_utf8_lossy(&self.body).into_owned(),
        })
    }

    /// Decodes a 2xx JSON body. Non-2xx statuses become API errors.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let resp = self.error_for_status()?;
        Ok(serde_json::from_slice(&resp.body)?)
    }
}
