//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use edge_gateway::config::{GatewayConfig, RouteConfig, ServiceConfig};
use edge_gateway::http::HttpServer;
use edge_gateway::lifecycle::Shutdown;

pub const SECRET: &str = "integration-secret";
pub const ISSUER: &str = "x-form-api-gateway";
pub const AUDIENCE: &str = "x-form-services";

const PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/rsa_private.pem");

/// Public modulus of `fixtures/rsa_private.pem`, base64url.
pub const RSA_N: &str = "w_PrdEppd5B57ADh9pmJeZGkeZubXlmgPBDhNox2Ri_dgHlSMne7CIdU36jtQVjeNTvQhPrgPd9DmY3_8aILJoLqEBkxgaV4E1TZ1DTIUKn9vDb3yk0t_2kBhe_UrLY5CQ8xP8qZthP3ElnVKZ9ix0bzdCelQ_OVGL1-dEKhyb8Nxkby3cQ7Ty6_oahl4nDnIKWeAZ1jZ-UdZf4tsXF9-ZzjlvWMUYNcF4O96lZPeak6DW4CXFvrWqvmaqgsS3aBifdD7L1dBqdx99e3E26zCYtzSwPFeLJgJKztbVhmxGwA48MDoCJnHWKOYgyaMbxfcRWI_MAGWnBJ2uABotv0LQ";
pub const RSA_E: &str = "AQAB";

/// A mock server and the number of requests it has seen.
pub struct Upstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

#[derive(Clone)]
struct Programmed {
    hits: Arc<AtomicUsize>,
    status: StatusCode,
    delay: Duration,
}

/// Echo the request back as JSON: method, path, query and headers.
async fn echo(State(p): State<Programmed>, req: Request<Body>) -> Response {
    p.hits.fetch_add(1, Ordering::SeqCst);
    if !p.delay.is_zero() {
        tokio::time::sleep(p.delay).await;
    }

    let headers: BTreeMap<String, String> = req
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
    let body = json!({
        "method": req.method().as_str(),
        "path": req.uri().path(),
        "query": req.uri().query(),
        "headers": headers,
    });
    (p.status, Json(body)).into_response()
}

async fn programmed(status: StatusCode, delay: Duration) -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = Programmed {
        hits: Arc::clone(&hits),
        status,
        delay,
    };
    let addr = serve(Router::new().fallback(echo).with_state(state)).await;
    Upstream { addr, hits }
}

/// 200 with an echo of the request.
pub async fn echo_upstream() -> Upstream {
    programmed(StatusCode::OK, Duration::ZERO).await
}

/// Always answers `status`.
pub async fn status_upstream(status: StatusCode) -> Upstream {
    programmed(status, Duration::ZERO).await
}

/// Answers 200 after `delay`.
pub async fn slow_upstream(delay: Duration) -> Upstream {
    programmed(StatusCode::OK, delay).await
}

/// Upstream that fails until `healthy` is set.
pub struct Switchable {
    pub upstream: Upstream,
    pub healthy: Arc<std::sync::atomic::AtomicBool>,
}

pub async fn switchable_upstream() -> Switchable {
    let hits = Arc::new(AtomicUsize::new(0));
    let healthy = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let state = (Arc::clone(&hits), Arc::clone(&healthy));
    let router = Router::new()
        .fallback(
            |State((hits, healthy)): State<(Arc<AtomicUsize>, Arc<std::sync::atomic::AtomicBool>)>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                if healthy.load(Ordering::SeqCst) {
                    (StatusCode::OK, "ok")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
                }
            },
        )
        .with_state(state);

    Switchable {
        upstream: Upstream {
            addr: serve(router).await,
            hits,
        },
        healthy,
    }
}

/// A JWKS endpoint publishing the fixture key under each kid in `kids`.
pub async fn jwks_server(kids: Arc<Mutex<Vec<String>>>, delay: Duration) -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = (Arc::clone(&hits), kids);

    let router = Router::new()
        .fallback(
            move |State((hits, kids)): State<(Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>)>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let keys: Vec<Value> = kids
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|kid| json!({"kid": kid, "kty": "RSA", "alg": "RS256", "use": "sig", "n": RSA_N, "e": RSA_E}))
                    .collect();
                Json(json!({ "keys": keys }))
            },
        )
        .with_state(state);

    Upstream {
        addr: serve(router).await,
        hits,
    }
}

pub fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// Valid claims for `sub`, expiring in an hour.
pub fn claims(sub: &str) -> Value {
    json!({
        "sub": sub,
        "email": format!("{sub}@example.com"),
        "roles": ["user"],
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": now(),
        "exp": now() + 3600,
    })
}

pub fn sign_hs256(claims: &Value) -> String {
    encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub fn sign_rs256(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(PRIVATE_PEM).unwrap()).unwrap()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Defaults with HMAC auth, no health polling and relaxed rate limits.
pub fn base_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.shutdown_grace_secs = 1;
    config.auth.jwt_secret = Some(SECRET.into());
    config.health_check.enabled = false;
    config.rate_limit.requests = 10_000;
    config
}

pub fn service(name: &str, upstream: &Upstream) -> ServiceConfig {
    ServiceConfig::new(name, upstream.url())
}

/// `base_config` with one service behind `prefix`.
pub fn single_service(prefix: &str, name: &str, upstream: &Upstream) -> GatewayConfig {
    let mut config = base_config();
    config.services.push(service(name, upstream));
    config.routes.push(RouteConfig::new(prefix, name));
    config
}

/// A running gateway instance.
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

pub async fn start_gateway(config: GatewayConfig) -> Gateway {
    start_gateway_with(HttpServer::new(config, None).unwrap()).await
}

pub async fn start_gateway_with(server: HttpServer) -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));
    Gateway { addr, shutdown, handle }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// The `error.code` of an envelope body.
pub async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

/// Headers the upstream echoed back.
pub async fn echoed(response: reqwest::Response) -> (String, HeaderMap) {
    let body: Value = response.json().await.unwrap();
    let mut headers = HeaderMap::new();
    if let Some(map) = body["headers"].as_object() {
        for (k, v) in map {
            if let (Ok(name), Some(value)) = (k.parse::<axum::http::HeaderName>(), v.as_str()) {
                headers.insert(name, value.parse().unwrap());
            }
        }
    }
    (body["path"].as_str().unwrap_or_default().to_string(), headers)
}
