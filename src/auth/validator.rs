//! Bearer token validation.
//!
//! # Responsibilities
//! - Select the verification key from the token's algorithm family
//! - Verify signature, issuer, audience, `exp` and `nbf`
//! - Reject tokens issued materially in the future
//! - Normalize the payload into `Claims`
//!
//! # Design Decisions
//! - HS* tokens verify only against the shared secret and RS*/PS* tokens
//!   only against JWKS keys, so one family can never be verified with the
//!   other's key material
//! - `AuthError` keeps the precise reason for logs and metrics; callers map
//!   every variant to the same client-facing error

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

use crate::auth::claims::{Claims, RawClaims};
use crate::auth::keys::KeyCache;
use crate::config::AuthConfig;

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,

    #[error("algorithm {0:?} is not accepted")]
    UnsupportedAlgorithm(Algorithm),

    #[error("token header has no kid")]
    MissingKid,

    #[error("no signing key for kid {0}")]
    UnknownKey(String),

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token was issued in the future")]
    IssuedInFuture,

    #[error("token issuer is not accepted")]
    InvalidIssuer,

    #[error("token audience is not accepted")]
    InvalidAudience,

    #[error("token is missing claim {0}")]
    MissingClaim(String),
}

impl AuthError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Malformed => "malformed",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::MissingKid => "missing_kid",
            AuthError::UnknownKey(_) => "unknown_key",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "expired",
            AuthError::NotYetValid => "not_yet_valid",
            AuthError::IssuedInFuture => "issued_in_future",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::MissingClaim(_) => "missing_claim",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::ImmatureSignature => AuthError::NotYetValid,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
            _ => AuthError::Malformed,
        }
    }
}

/// Validates bearer tokens against the configured trust settings.
pub struct TokenValidator {
    secret: Option<DecodingKey>,
    keys: Arc<KeyCache>,
    issuer: String,
    audience: String,
    leeway_secs: u64,
    iat_skew: Duration,
}

impl TokenValidator {
    pub fn new(config: &AuthConfig, keys: Arc<KeyCache>) -> Self {
        Self {
            secret: config
                .jwt_secret
                .as_deref()
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            leeway_secs: config.leeway_secs,
            iat_skew: Duration::from_secs(config.iat_skew_secs),
        }
    }

    pub fn keys(&self) -> &Arc<KeyCache> {
        &self.keys
    }

    /// Validate a raw token and return its claims.
    pub async fn validate(&self, raw: &str) -> Result<Claims, AuthError> {
        let header = decode_header(raw).map_err(|_| AuthError::Malformed)?;

        let key = match header.alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => self
                .secret
                .clone()
                .ok_or(AuthError::UnsupportedAlgorithm(header.alg))?,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => {
                let kid = header.kid.as_deref().ok_or(AuthError::MissingKid)?;
                self.keys
                    .resolve(kid)
                    .await
                    .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))?
            }
            other => return Err(AuthError::UnsupportedAlgorithm(other)),
        };

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);

        let data = decode::<RawClaims>(raw, &key, &validation)?;
        self.check_issued_at(data.claims.iat)?;

        Claims::from_raw(data.claims).ok_or_else(|| AuthError::MissingClaim("sub".to_string()))
    }

    fn check_issued_at(&self, iat: Option<u64>) -> Result<(), AuthError> {
        let Some(iat) = iat else {
            return Ok(());
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if iat > now.saturating_add(self.iat_skew.as_secs()) {
            return Err(AuthError::IssuedInFuture);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::{rsa_jwk, CountingSource};
    use crate::auth::keys::{JwksDocument, KeySource};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PEM: &[u8] = include_bytes!("../../tests/fixtures/rsa_private.pem");

    fn now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: Some("unit-secret".into()),
            ..AuthConfig::default()
        }
    }

    fn claims(exp_offset: i64) -> serde_json::Value {
        json!({
            "sub": "user-1",
            "email": "u@example.com",
            "roles": ["editor"],
            "iss": "x-form-api-gateway",
            "aud": ["x-form-services", "other"],
            "iat": now(),
            "exp": (now() as i64 + exp_offset) as u64,
        })
    }

    fn hs_token(payload: &serde_json::Value) -> String {
        encode(&Header::new(Algorithm::HS256), payload, &EncodingKey::from_secret(b"unit-secret")).unwrap()
    }

    fn rs_token(kid: &str, payload: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, payload, &EncodingKey::from_rsa_pem(PEM).unwrap()).unwrap()
    }

    fn rsa_validator(calls: Arc<CountingSource>) -> TokenValidator {
        let source: Arc<dyn KeySource> = calls;
        let cache = Arc::new(KeyCache::new(Some(source), Duration::from_secs(2)));
        TokenValidator::new(&config(), cache)
    }

    fn counting(kid: &str) -> Arc<CountingSource> {
        Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            doc: JwksDocument { keys: vec![rsa_jwk(kid)] },
            delay: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn test_hmac_token_validates() {
        let validator = TokenValidator::new(&config(), Arc::new(KeyCache::disabled()));
        let claims = validator.validate(&hs_token(&claims(600))).await.unwrap();
        assert_eq!(claims.subject, "user-1");
        assert_eq!(claims.email.as_deref(), Some("u@example.com"));
        assert_eq!(claims.roles, vec!["editor"]);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let validator = TokenValidator::new(&config(), Arc::new(KeyCache::disabled()));
        let err = validator.validate(&hs_token(&claims(-60))).await.unwrap_err();
        assert_eq!(err, AuthError::Expired);
    }

    #[tokio::test]
    async fn test_issuer_and_audience_enforced() {
        let validator = TokenValidator::new(&config(), Arc::new(KeyCache::disabled()));

        let mut wrong_iss = claims(600);
        wrong_iss["iss"] = json!("someone-else");
        assert_eq!(validator.validate(&hs_token(&wrong_iss)).await.unwrap_err(), AuthError::InvalidIssuer);

        let mut wrong_aud = claims(600);
        wrong_aud["aud"] = json!("billing");
        assert_eq!(validator.validate(&hs_token(&wrong_aud)).await.unwrap_err(), AuthError::InvalidAudience);
    }

    #[tokio::test]
    async fn test_not_before_and_future_iat() {
        let validator = TokenValidator::new(&config(), Arc::new(KeyCache::disabled()));

        let mut immature = claims(600);
        immature["nbf"] = json!(now() + 300);
        assert_eq!(validator.validate(&hs_token(&immature)).await.unwrap_err(), AuthError::NotYetValid);

        let mut future = claims(3600);
        future["iat"] = json!(now() + 3600);
        assert_eq!(validator.validate(&hs_token(&future)).await.unwrap_err(), AuthError::IssuedInFuture);

        let mut small_skew = claims(600);
        small_skew["iat"] = json!(now() + 60);
        assert!(validator.validate(&hs_token(&small_skew)).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_signature() {
        let validator = TokenValidator::new(&config(), Arc::new(KeyCache::disabled()));
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims(600),
            &EncodingKey::from_secret(b"not-the-secret"),
        )
        .unwrap();
        assert_eq!(validator.validate(&forged).await.unwrap_err(), AuthError::BadSignature);
        assert_eq!(validator.validate("garbage").await.unwrap_err(), AuthError::Malformed);
    }

    #[tokio::test]
    async fn test_rsa_token_resolves_key_once() {
        let source = counting("rsa-1");
        let validator = rsa_validator(source.clone());

        let token = rs_token("rsa-1", &claims(600));
        assert_eq!(validator.validate(&token).await.unwrap().subject, "user-1");
        assert_eq!(validator.validate(&token).await.unwrap().subject, "user-1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_is_rejected_after_one_refresh() {
        let source = counting("rsa-1");
        let validator = rsa_validator(source.clone());

        let err = validator.validate(&rs_token("rotated-away", &claims(600))).await.unwrap_err();
        assert_eq!(err, AuthError::UnknownKey("rotated-away".into()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rsa_without_kid() {
        let validator = rsa_validator(counting("rsa-1"));
        let token = encode(
            &Header::new(Algorithm::RS256),
            &claims(600),
            &EncodingKey::from_rsa_pem(PEM).unwrap(),
        )
        .unwrap();
        assert_eq!(validator.validate(&token).await.unwrap_err(), AuthError::MissingKid);
    }

    #[tokio::test]
    async fn test_hmac_rejected_without_secret() {
        let mut cfg = config();
        cfg.jwt_secret = None;
        let validator = TokenValidator::new(&cfg, Arc::new(KeyCache::disabled()));
        let err = validator.validate(&hs_token(&claims(600))).await.unwrap_err();
        assert_eq!(err, AuthError::UnsupportedAlgorithm(Algorithm::HS256));
    }
}
