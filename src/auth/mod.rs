//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → validator.rs (decode header, pick key by algorithm family)
//!         HS*      → shared secret
//!         RS*/PS*  → keys.rs (kid lookup, one coordinated refresh on miss)
//!     → validator.rs (signature, iss, aud, exp, nbf, iat skew)
//!     → claims.rs (normalized Claims)
//!     → attached to the request context
//!
//! Background:
//!     refresher.rs → keys.rs refresh on a fixed interval
//! ```
//!
//! # Design Decisions
//! - The key cache is an injected state holder, never a global
//! - Callers never learn why a token failed beyond "invalid"

pub mod claims;
pub mod keys;
pub mod refresher;
pub mod validator;

pub use claims::Claims;
pub use keys::{HttpKeySource, JwksDocument, KeyCache, KeyError, KeySource, SigningKeySet};
pub use refresher::KeyRefreshTask;
pub use validator::{AuthError, TokenValidator};
