//! Per-region HTTP plumbing
//!
//! Thin wrapper over `reqwest` for the two remote contracts every region
//! exposes: the unauthenticated liveness probe and the bearer-authenticated
//! management API. Each call carries its own timeout; liveness probes use a
//! short one, management calls a longer one.

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Transport-level error for a single remote call.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection refused, DNS failure, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-success status.
    #[error("unexpected status: {0}")]
    Status(u16),

    /// The remote answered but the body did not parse.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result alias for remote calls.
pub type HttpResult<T> = Result<T, HttpError>;

/// Outcome of a single liveness probe against `{endpoint}/health/live`.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// HTTP 200 within the timeout.
    Up {
        /// Measured round-trip in milliseconds.
        latency_ms: u64,
    },
    /// The region answered, but not with 200.
    Degraded {
        /// Measured round-trip in milliseconds.
        latency_ms: u64,
        /// The status code the region returned.
        status: u16,
    },
    /// Timeout, connection refused, or DNS failure.
    Unreachable {
        /// Human-readable transport error.
        error: String,
    },
}

/// Probe a region's liveness endpoint.
///
/// Never returns an error: transport failures are folded into
/// [`ProbeOutcome::Unreachable`].
pub async fn probe_live(client: &reqwest::Client, endpoint: &str, timeout: Duration) -> ProbeOutcome {
    let url = format!("{}/health/live", endpoint.trim_end_matches('/'));
    let start = Instant::now();

    match client.get(&url).timeout(timeout).send().await {
        Ok(resp) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            let status = resp.status().as_u16();
            if status == 200 {
                ProbeOutcome::Up { latency_ms }
            } else {
                ProbeOutcome::Degraded { latency_ms, status }
            }
        }
        Err(e) => ProbeOutcome::Unreachable { error: e.to_string() },
    }
}

/// Client for a region's bearer-authenticated management API.
pub struct ManagementClient {
    client: reqwest::Client,
    bearer: RwLock<Option<String>>,
}

impl ManagementClient {
    /// Create a client with no credential attached.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            bearer: RwLock::new(None),
        }
    }

    /// Set or clear the bearer token used on subsequent calls.
    pub fn set_credential(&self, token: Option<String>) {
        *self.bearer.write() = token;
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.bearer.read().as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `GET {url}` and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, timeout: Duration) -> HttpResult<T> {
        let req = self.authorize(self.client.get(url)).timeout(timeout);
        let resp = req.send().await.map_err(|e| HttpError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(HttpError::Status(resp.status().as_u16()));
        }
        resp.json().await.map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// `POST {url}` with a JSON body and decode a JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> HttpResult<T> {
        let req = self.authorize(self.client.post(url)).json(body).timeout(timeout);
        let resp = req.send().await.map_err(|e| HttpError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(HttpError::Status(resp.status().as_u16()));
        }
        resp.json().await.map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// `POST {url}` with no body and decode a JSON response.
    pub async fn post_for_json<T: DeserializeOwned>(&self, url: &str, timeout: Duration) -> HttpResult<T> {
        let req = self.authorize(self.client.post(url)).timeout(timeout);
        let resp = req.send().await.map_err(|e| HttpError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(HttpError::Status(resp.status().as_u16()));
        }
        resp.json().await.map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// `POST {url}` with no body, discarding any response body.
    pub async fn post_empty(&self, url: &str, timeout: Duration) -> HttpResult<()> {
        let req = self.authorize(self.client.post(url)).timeout(timeout);
        let resp = req.send().await.map_err(|e| HttpError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(HttpError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    /// Borrow the underlying HTTP client for unauthenticated calls.
    pub fn raw(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Default for ManagementClient {
    fn default() -> Self {
        Self::new()
    }
}
