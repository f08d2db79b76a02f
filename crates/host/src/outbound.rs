//! Host-mediated outbound HTTP calls.
//!
//! A guest cannot touch the network itself; when it needs an HTTP call the
//! host executes one on its behalf, decoupled from the transaction's own
//! request and response. The call blocks the invoking transaction's flow
//! until the full response body has been read into memory, bounded by the
//! caller-supplied deadline.
//!
//! Known, intentional limitations of this surface: caller-supplied request
//! headers are not forwarded, no retry or redirect policy is exposed, and
//! construction, execution and body-read failures all surface as the single
//! transport error category.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tracing::debug;

use crate::error::HostError;

/// Executes outbound HTTP calls for guests.
///
/// Wraps a shared connection-pooling client; cloning is cheap and clones
/// share the pool.
#[derive(Debug, Clone, Default)]
pub struct Outbound {
    client: reqwest::Client,
}

/// The fully-read result of an outbound call.
#[derive(Debug)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub headers: HeaderMap,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Performs one HTTP call and reads the whole response into memory.
    ///
    /// `deadline` bounds the entire call, connect through body read; a call
    /// that exceeds it fails instead of blocking the transaction forever.
    /// Nothing is retried.
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        body: Option<&str>,
        deadline: Duration,
    ) -> Result<OutboundResponse, HostError> {
        let method = Method::from_bytes(method.as_bytes()).map_err(HostError::invalid_method)?;

        let mut request = self.client.request(method, uri).timeout(deadline);
        if let Some(body) = body.filter(|body| !body.is_empty()) {
            request = request.body(body.to_owned());
        }

        let mut response = request.send().await?;
        let status = response.status();
        let headers = std::mem::take(response.headers_mut());
        let body = response.bytes().await?;

        debug!(status = %status, bytes = body.len(), "outbound call completed");
        Ok(OutboundResponse { status, body, headers })
    }
}
