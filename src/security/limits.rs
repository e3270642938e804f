//! Request parameter limits.
//!
//! # Responsibilities
//! - Enforce maximum URI length
//! - Enforce maximum header count
//! - Enforce maximum declared body size and a well-formed `Content-Length`
//! - Reject control characters and dot-dot segments in the path
//!
//! # Design Decisions
//! - Limits are checked from the request head only (early rejection);
//!   bodies are streamed, never buffered for inspection
//! - Every violation is a 400 `VALIDATION_ERROR`

use axum::http::{header, HeaderMap, Uri};

use crate::config::ValidationConfig;

/// Why a request head was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitViolation {
    #[error("request URI exceeds {0} bytes")]
    UriTooLong(usize),

    #[error("request carries more than {0} headers")]
    TooManyHeaders(usize),

    #[error("Content-Length header is malformed")]
    MalformedContentLength,

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(u64),

    #[error("request path contains invalid characters")]
    InvalidPath,
}

#[derive(Debug, Clone)]
pub struct RequestLimits {
    max_uri_length: usize,
    max_header_count: usize,
    max_body_bytes: u64,
}

impl RequestLimits {
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self {
            max_uri_length: config.max_uri_length,
            max_header_count: config.max_header_count,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn check(&self, uri: &Uri, headers: &HeaderMap) -> Result<(), LimitViolation> {
        let uri_len = uri
            .path_and_query()
            .map(|pq| pq.as_str().len())
            .unwrap_or_else(|| uri.path().len());
        if uri_len > self.max_uri_length {
            return Err(LimitViolation::UriTooLong(self.max_uri_length));
        }

        if headers.len() > self.max_header_count {
            return Err(LimitViolation::TooManyHeaders(self.max_header_count));
        }

        if let Some(value) = headers.get(header::CONTENT_LENGTH) {
            let length = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or(LimitViolation::MalformedContentLength)?;
            if length > self.max_body_bytes {
                return Err(LimitViolation::BodyTooLarge(self.max_body_bytes));
            }
        }

        if !path_is_clean(uri.path()) {
            return Err(LimitViolation::InvalidPath);
        }

        Ok(())
    }
}

fn path_is_clean(path: &str) -> bool {
    if path.bytes().any(|b| b.is_ascii_control()) {
        return false;
    }
    path.split('/').all(|segment| {
        let segment = segment.to_ascii_lowercase();
        !matches!(segment.as_str(), ".." | "%2e%2e" | ".%2e" | "%2e.")
            && !segment.contains("%00")
    })
}
