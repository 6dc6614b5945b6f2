//! HTTP reachability probe.
//!
//! One request per stream, headers only. The response body of a live stream
//! never ends, so the response is dropped as soon as the status is known.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{ProbeError, ReachabilityClient};
use crate::fingerprint::ClientIdentity;

/// Request method used for the reachability check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    /// Most streaming origins answer GET; plenty reject HEAD.
    #[default]
    Get,
    Head,
}

/// reqwest-backed [`ReachabilityClient`].
#[derive(Debug, Clone)]
pub struct HttpReachability {
    client: Client,
    method: ProbeMethod,
}

impl HttpReachability {
    /// Build a client presenting `identity`, with connection setup bounded by
    /// `connect_timeout`.
    pub fn new(
        identity: &ClientIdentity,
        method: ProbeMethod,
        connect_timeout: Duration,
    ) -> crate::error::Result<Self> {
        let client = Client::builder()
            // Don't assume HTTP/2 - let server negotiate
            .http2_adaptive_window(true)
            // Playlists often list many streams on the same origin
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .default_headers(identity.to_headers())
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client, method })
    }
}

#[async_trait]
impl ReachabilityClient for HttpReachability {
    #[instrument(skip(self), fields(method = ?self.method))]
    async fn probe(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let parsed =
            url::Url::parse(url).map_err(|e| ProbeError::Transport(format!("invalid URL: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ProbeError::UnsupportedScheme(other.to_string())),
        }

        let request = match self.method {
            ProbeMethod::Get => self.client.get(parsed),
            ProbeMethod::Head => self.client.head(parsed),
        };

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;
        let status = response.status();
        drop(response);

        debug!(status = %status, "Reachability response");

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}

fn classify_error(err: &reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        return ProbeError::Timeout;
    }

    // The outermost reqwest message is generic ("error sending request");
    // the root cause names the real problem.
    let mut source: &dyn std::error::Error = err;
    while let Some(next) = source.source() {
        source = next;
    }
    ProbeError::Transport(source.to_string())
}
