//! HTTP seam for GraphQL calls and classification of their outcome.
//!
//! [`GraphQlTransport`] only moves bytes. [`classify`] turns a reply into a
//! [`CallOutcome`], which is what the client's retry loop matches on.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, USER_AGENT};

use super::query::GraphQlRequest;
use super::response::GraphQlResponse;
use crate::config::{EngineConfig, Token};
use crate::domain::{PortfolioError, Result};

/// Raw reply from the GraphQL endpoint.
#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    /// `x-ratelimit-remaining`.
    pub rate_limit_remaining: Option<u32>,
    /// `x-ratelimit-reset`, epoch seconds.
    pub rate_limit_reset: Option<i64>,
    /// `retry-after`, seconds.
    pub retry_after: Option<u64>,
    pub body: String,
}

impl HttpReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Self::default()
        }
    }
}

/// The request never produced an HTTP reply (DNS, TLS, connection reset...).
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Sends one GraphQL request.
#[async_trait]
pub trait GraphQlTransport: Send + Sync {
    async fn post(&self, request: &GraphQlRequest) -> std::result::Result<HttpReply, TransportError>;
}

/// What the retry loop should do with a reply.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Success(GraphQlResponse),
    /// Pause until `reset_at` (or back off when unknown), then resend.
    RateLimited { reset_at: Option<DateTime<Utc>> },
    /// Resend after a bounded backoff.
    Retryable(String),
    /// Retrying cannot help, but other batches may still succeed.
    Rejected(String),
    /// Credential rejected; nothing else in the run can succeed.
    Fatal(String),
}

/// Map a transport result onto a [`CallOutcome`].
pub fn classify(
    reply: std::result::Result<HttpReply, TransportError>,
    now: DateTime<Utc>,
) -> CallOutcome {
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => return CallOutcome::Retryable(e.to_string()),
    };

    let header_reset = reply
        .rate_limit_reset
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .or_else(|| reply.retry_after.and_then(|secs| retry_at(now, secs)));

    match reply.status {
        401 => CallOutcome::Fatal(format!("credential rejected: {}", snippet(&reply.body))),
        403 | 429 if looks_rate_limited(&reply) => CallOutcome::RateLimited {
            reset_at: header_reset,
        },
        408 | 500..=599 => CallOutcome::Retryable(format!(
            "HTTP {}: {}",
            reply.status,
            snippet(&reply.body)
        )),
        200..=299 => {
            let response: GraphQlResponse = match serde_json::from_str(&reply.body) {
                Ok(response) => response,
                Err(e) => return CallOutcome::Retryable(format!("malformed response body: {e}")),
            };
            if response.is_rate_limited() {
                let reset_at = response.rate_limit().map(|r| r.reset_at).or(header_reset);
                return CallOutcome::RateLimited { reset_at };
            }
            if response.data.is_none() {
                let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
                return CallOutcome::Rejected(format!("query rejected: {}", messages.join("; ")));
            }
            CallOutcome::Success(response)
        }
        status => CallOutcome::Rejected(format!("HTTP {status}: {}", snippet(&reply.body))),
    }
}

/// `now + secs`, or `None` when the header value is out of range. The caller
/// then falls back to bounded backoff.
fn retry_at(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::try_seconds(i64::try_from(secs).ok()?)?;
    now.checked_add_signed(delta)
}

fn looks_rate_limited(reply: &HttpReply) -> bool {
    reply.status == 429
        || reply.rate_limit_remaining == Some(0)
        || reply.retry_after.is_some()
        || reply.body.to_ascii_lowercase().contains("rate limit")
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// [`GraphQlTransport`] over `reqwest`.
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    url: String,
    token: Token,
}

impl ReqwestTransport {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PortfolioError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            url: config.api_url.clone(),
            token: config.token.clone(),
        })
    }
}

fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl GraphQlTransport for ReqwestTransport {
    async fn post(&self, request: &GraphQlRequest) -> std::result::Result<HttpReply, TransportError> {
        let response = self
            .http_client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token.expose()))
            .header(USER_AGENT, concat!("portfolio-core/", env!("CARGO_PKG_VERSION")))
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let headers = response.headers();
        let mut reply = HttpReply {
            status: response.status().as_u16(),
            rate_limit_remaining: header(headers, "x-ratelimit-remaining"),
            rate_limit_reset: header(headers, "x-ratelimit-reset"),
            retry_after: header(headers, "retry-after"),
            body: String::new(),
        };
        reply.body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(reply)
    }
}
