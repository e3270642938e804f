//! Protocol upgrade passthrough.
//!
//! # Responsibilities
//! - Detect `Connection: upgrade` requests (WebSocket and friends)
//! - Forward the handshake like any other request
//! - On `101 Switching Protocols`, splice client and upstream byte streams
//!
//! # Data Flow
//! ```text
//! Client ←──── opaque bytes ────→ Gateway ←──── opaque bytes ────→ Upstream
//! ```
//!
//! # Design Decisions
//! - No frame parsing: the gateway never interprets the upgraded protocol
//! - The pipeline (auth, rate limit, breaker) applies to the handshake only
//! - Either side closing ends the tunnel

use axum::http::{header, HeaderMap, HeaderValue, Request};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

/// Whether the request asks to switch protocols.
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    let connection_upgrade = req
        .headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && req.headers().contains_key(header::UPGRADE)
}

/// Put back the two headers hop-by-hop stripping removed.
pub fn restore_upgrade_headers(headers: &mut HeaderMap, upgrade: HeaderValue) {
    headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(header::UPGRADE, upgrade);
}

/// Copy bytes between the two upgraded connections until one side closes.
pub fn spawn_tunnel(client: OnUpgrade, upstream: OnUpgrade, service: String) {
    tokio::spawn(async move {
        let (client, upstream) = match tokio::try_join!(client, upstream) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "Upgrade handshake did not complete");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);

        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((to_upstream, to_client)) => {
                tracing::debug!(service = %service, to_upstream, to_client, "Upgraded connection closed");
            }
            Err(e) => {
                tracing::debug!(service = %service, error = %e, "Upgraded connection ended with error");
            }
        }
    });
}
