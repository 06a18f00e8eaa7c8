//! Classified upstream failures.
//!
//! Retry logic keys off the variant alone, so transport errors are mapped
//! here once instead of being re-inspected by callers.

use std::error::Error as StdError;
use thiserror::Error;

/// Retry hint used when a 429 carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("weather provider did not respond in time")]
    Timeout,

    #[error("weather provider rate limit reached, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("weather provider returned HTTP {status_code}")]
    UpstreamError { status_code: u16 },

    #[error("network error reaching weather provider: {0}")]
    NetworkError(String),
}

impl FetchFailure {
    /// Stable wire name used in response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchFailure::Timeout => "timeout",
            FetchFailure::RateLimited { .. } => "rate_limited",
            FetchFailure::UpstreamError { .. } => "upstream_error",
            FetchFailure::NetworkError(_) => "network_error",
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            FetchFailure::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Map a transport-level `reqwest` error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchFailure::Timeout
        } else if let Some(status) = err.status() {
            FetchFailure::from_status(status.as_u16(), None)
        } else {
            FetchFailure::NetworkError(format_reqwest_error(err))
        }
    }

    /// Map a non-success HTTP status, using `Retry-After` for 429s.
    pub fn from_status(status_code: u16, retry_after: Option<&str>) -> Self {
        match status_code {
            429 => FetchFailure::RateLimited {
                retry_after_secs: retry_after
                    .and_then(parse_retry_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            408 | 504 => FetchFailure::Timeout,
            _ => FetchFailure::UpstreamError { status_code },
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values fall back to the default.
fn parse_retry_after(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

pub(crate) fn retry_after_header(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

pub(crate) fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so DNS/TLS/socket failures are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}
