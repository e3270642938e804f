//! Token claims.

use serde::{Deserialize, Serialize};

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(a) => vec![a],
            Audience::Many(list) => list,
        }
    }
}

/// Claims as they appear in the token payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawClaims {
    pub sub: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub session_id: Option<String>,
    pub iss: Option<String>,
    pub aud: Option<Audience>,
    pub exp: Option<u64>,
    pub nbf: Option<u64>,
    pub iat: Option<u64>,
}

/// Authenticated identity carried through the request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    pub subject: String,
    pub email: Option<String>,
    /// `role` and `roles[]` merged, without duplicates.
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub session_id: Option<String>,
    pub issuer: Option<String>,
    pub audience: Vec<String>,
    pub expires_at: Option<u64>,
    pub issued_at: Option<u64>,
}

impl Claims {
    /// Normalize raw claims. `None` when no subject is present.
    pub fn from_raw(raw: RawClaims) -> Option<Self> {
        let subject = raw.sub.or(raw.user_id).filter(|s| !s.is_empty())?;

        let mut roles = Vec::with_capacity(raw.roles.len() + 1);
        for role in raw.role.into_iter().chain(raw.roles) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        Some(Self {
            subject,
            email: raw.email,
            roles,
            permissions: raw.permissions,
            session_id: raw.session_id,
            issuer: raw.iss,
            audience: raw.aud.map(Audience::into_vec).unwrap_or_default(),
            expires_at: raw.exp,
            issued_at: raw.iat,
        })
    }

    /// Any-of role check. An empty requirement always passes.
    pub fn has_any_role(&self, required: &[String]) -> bool {
        required.is_empty() || required.iter().any(|r| self.roles.contains(r))
    }

    /// All-of permission check.
    pub fn has_all_permissions(&self, required: &[String]) -> bool {
        required.iter().all(|p| self.permissions.contains(p))
    }
}
