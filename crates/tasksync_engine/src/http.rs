//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the sync engine.
//! The actual HTTP client is abstracted via a trait so the same transport
//! runs over reqwest in production and over an in-process loopback in tests.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use std::time::Duration;
use tasksync_protocol::{BatchSyncRequest, BatchSyncResponse, BATCH_PATH, HEALTH_PATH};
use thiserror::Error;
use tracing::debug;

/// Failure reported by an [`HttpClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HttpError {
    /// Error message.
    pub message: String,
    /// Whether the request hit its timeout.
    pub timed_out: bool,
}

impl HttpError {
    /// Creates a non-timeout failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }
}

impl From<HttpError> for SyncError {
    fn from(err: HttpError) -> Self {
        SyncError::Network {
            message: err.message,
            timed_out: err.timed_out,
        }
    }
}

/// HTTP client abstraction.
///
/// Implementations return the body of a 2xx response and report everything
/// else (refused connection, timeout, non-2xx status) as an [`HttpError`].
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, HttpError>;

    /// Sends a GET request and returns the response body.
    fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, HttpError>;
}

/// HTTP-based sync transport.
///
/// Uses JSON for request and response bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL and timeouts.
    config: SyncConfig,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(config: SyncConfig, client: C) -> Self {
        Self {
            config,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.server_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn record<T>(&self, result: Result<T, HttpError>) -> SyncResult<T> {
        match result {
            Ok(value) => {
                *self.last_error.write() = None;
                Ok(value)
            }
            Err(err) => {
                *self.last_error.write() = Some(err.message.clone());
                Err(err.into())
            }
        }
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn send_batch(&self, request: &BatchSyncRequest) -> SyncResult<BatchSyncResponse> {
        let body = request.encode()?;
        let url = self.config.endpoint(BATCH_PATH);
        debug!(%url, items = request.len(), "posting batch");

        let response = self.record(self.client.post(&url, body, self.config.request_timeout))?;
        Ok(BatchSyncResponse::decode(&response)?)
    }

    fn health(&self) -> SyncResult<()> {
        let url = self.config.endpoint(HEALTH_PATH);
        self.record(self.client.get(&url, self.config.health_timeout))
            .map(|_| ())
    }
}

/// Blocking reqwest client.
pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds a client using rustls.
    pub fn new() -> SyncResult<Self> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(concat!("tasksync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { inner })
    }

    fn finish(
        result: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<Vec<u8>, HttpError> {
        let response = result
            .and_then(|r| r.error_for_status())
            .map_err(Self::map_err)?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(Self::map_err)
    }

    fn map_err(err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            HttpError::timeout(err.to_string())
        } else {
            HttpError::new(err.to_string())
        }
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, HttpError> {
        Self::finish(
            self.inner
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .timeout(timeout)
                .body(body)
                .send(),
        )
    }

    fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, HttpError> {
        Self::finish(self.inner.get(url).timeout(timeout).send())
    }
}

/// Trait for servers that can handle loopback requests.
///
/// An `Err` stands for a non-2xx answer.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;

    /// Handles a GET request and returns the response body.
    fn handle_get(&self, path: &str) -> Result<Vec<u8>, String>;
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead. Timeouts are ignored.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the wrapped server.
    pub fn server(&self) -> &S {
        &self.server
    }

    fn path(url: &str) -> &str {
        url.find("/sync/").map(|i| &url[i..]).unwrap_or(url)
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>, _timeout: Duration) -> Result<Vec<u8>, HttpError> {
        self.server
            .handle_post(Self::path(url), &body)
            .map_err(HttpError::new)
    }

    fn get(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, HttpError> {
        self.server.handle_get(Self::path(url)).map_err(HttpError::new)
    }
}
