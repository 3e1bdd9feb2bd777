//! `reqwest`-backed [`Transport`].

use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::ClientConfig;
use crate::transport::{HttpRequest, HttpResponse, Method, RequestBody, Transport, TransportFuture};
use crate::ClientError;

const USER_AGENT: &str = concat!("cirrus-rust/", env!("CARGO_PKG_VERSION"));

/// HTTP transport with a max-age policy on its pooled client.
///
/// The inner `reqwest::Client` (and its connection pool) is rebuilt on the
/// first checkout after it has lived longer than
/// [`ClientConfig::client_max_age`].
pub struct HttpTransport {
    config: ClientConfig,
    pool: RwLock<PooledClient>,
}

struct PooledClient {
    client: reqwest::Client,
    created_at: Instant,
    generation: u64,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = build_client(&config)?;
        Ok(Self {
            config,
            pool: RwLock::new(PooledClient {
                client,
                created_at: Instant::now(),
                generation: 0,
            }),
        })
    }

    /// Reads `CIRRUS_API_KEY` / `CIRRUS_BASE_URL` once and builds a transport.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn checkout(&self) -> Result<reqwest::Client, ClientError> {
        {
            let pool = self.pool.read().unwrap_or_else(PoisonError::into_inner);
            if pool.created_at.elapsed() < self.config.client_max_age {
                return Ok(pool.client.clone());
            }
        }

        let mut pool = self.pool.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have rebuilt it while we waited for the lock.
        if pool.created_at.elapsed() >= self.config.client_max_age {
            pool.client = build_client(&self.config)?;
            pool.created_at = Instant::now();
            pool.generation += 1;
            debug!(generation = pool.generation, "rebuilt HTTP client");
        }
        Ok(pool.client.clone())
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let client = self.checkout()?;
        let is_api_call = self.config.is_api_url(&request.url);
        let url = self.config.resolve_url(&request.url);

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = client
            .request(method, &url)
            .timeout(request.timeout.unwrap_or(self.config.request_timeout));

        // Presigned storage URLs carry their own credentials.
        if is_api_call && let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                ClientError::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                    reason: e.to_string(),
                }
            })?;
            builder = builder.header(AUTHORIZATION, value);
        }

        builder = builder.headers(header_map(&request.headers)?);

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes(data) => builder.body(data),
            RequestBody::FileForm {
                path,
                purpose,
                filename,
            } => builder.multipart(file_form(&path, purpose, filename).await?),
        };

        let resp = builder.send().await?;
        let status = resp.status().as_u16();

        let mut out = HttpResponse::new(status, Bytes::new());
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                out = out.with_header(name.as_str(), v);
            }
        }
        out.body = resp.bytes().await?;

        debug!(
            method = %request.method,
            url = %strip_query(&url),
            status,
            bytes = out.body.len(),
            "request completed"
        );
        Ok(out)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(self.execute(request))
    }
}

fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(header_map(&config.default_headers)?)
        .build()?;
    Ok(client)
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, ClientError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

/// Streams the file from disk rather than buffering it.
async fn file_form(path: &Path, purpose: String, filename: String) -> Result<Form, ClientError> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
    let part = Part::stream_with_length(body, len)
        .file_name(filename)
        .mime_str("application/octet-stream")?;
    Ok(Form::new().text("purpose", purpose).part("file", part))
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
