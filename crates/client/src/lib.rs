//! HTTP plumbing for the cirrus API.
//!
//! [`Transport`] is the seam the file engine talks through. [`HttpTransport`]
//! implements it on top of `reqwest`; tests implement it with in-memory mocks.

pub mod config;
pub mod error;
pub mod http;
pub mod transport;

pub use config::ClientConfig;
pub use error::ClientError;
pub use http::HttpTransport;
pub use transport::{HttpRequest, HttpResponse, Method, RequestBody, Transport, TransportFuture};
