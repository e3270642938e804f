//! Upstream instance abstraction.
//!
//! # Responsibilities
//! - Represent one physical instance of a logical service
//! - Precompute the scheme and authority used to rewrite request URIs
//! - Track in-flight requests (for least-connections selection)

use std::ops::Deref;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::uri::{Authority, Scheme};
use url::Url;

/// Error building an instance from a configured URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstanceError {
    #[error("invalid instance url '{0}'")]
    InvalidUrl(String),

    #[error("instance url '{0}' must use http")]
    UnsupportedScheme(String),
}

/// A single upstream instance.
#[derive(Debug)]
pub struct Instance {
    /// Base URL as configured.
    pub url: Url,
    pub scheme: Scheme,
    pub authority: Authority,
    /// Path prefix of the base URL, without a trailing slash.
    pub base_path: String,
    in_flight: AtomicUsize,
}

impl Instance {
    pub fn parse(raw: &str) -> Result<Self, InstanceError> {
        let url = Url::parse(raw).map_err(|_| InstanceError::InvalidUrl(raw.to_string()))?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            _ => return Err(InstanceError::UnsupportedScheme(raw.to_string())),
        };

        let host = url
            .host_str()
            .ok_or_else(|| InstanceError::InvalidUrl(raw.to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority =
            Authority::from_str(&authority).map_err(|_| InstanceError::InvalidUrl(raw.to_string()))?;

        let base_path = url.path().trim_end_matches('/').to_string();

        Ok(Self {
            url,
            scheme,
            authority,
            base_path,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Number of requests currently forwarded to this instance.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Count a request against this instance until the guard drops.
    pub fn acquire(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            instance: Arc::clone(self),
        }
    }
}

/// A RAII guard that manages the in-flight count.
#[derive(Debug)]
pub struct InFlightGuard {
    instance: Arc<Instance>,
}

impl Deref for InFlightGuard {
    type Target = Instance;
    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.instance.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
