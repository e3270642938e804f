//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the longest matching prefix for a request path
//! - Rewrite the forwarded path for routes with `strip_prefix`
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan over routes sorted longest-first
//! - Prefixes match on segment boundaries: `/api/auth` does not match `/api/authz`
//! - Explicit `None` rather than silent default

use crate::config::RouteConfig;

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Normalized prefix (no trailing slash except for the root route).
    pub prefix: String,
    pub service: String,
    pub strip_prefix: Option<String>,
    pub required_roles: Vec<String>,
    pub required_permissions: Vec<String>,
}

impl Route {
    fn from_config(config: &RouteConfig) -> Self {
        Self {
            prefix: normalize(&config.prefix),
            service: config.service.clone(),
            strip_prefix: config.strip_prefix.as_deref().map(normalize),
            required_roles: config.required_roles.clone(),
            required_permissions: config.required_permissions.clone(),
        }
    }

    /// Whether `path` falls under this route's prefix.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Path to send upstream.
    pub fn upstream_path(&self, path: &str) -> String {
        let Some(strip) = self.strip_prefix.as_deref() else {
            return path.to_string();
        };
        if strip == "/" {
            return path.to_string();
        }
        match path.strip_prefix(strip) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }
}

fn normalize(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Static `{prefix → service}` table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs.iter().map(Route::from_config).collect();
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        for route in &routes {
            tracing::debug!(prefix = %route.prefix, service = %route.service, "Route registered");
        }

        Self { routes }
    }

    /// Longest-prefix match.
    pub fn lookup(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let mut forms = RouteConfig::new("/api/v1/forms", "form-service");
        forms.strip_prefix = Some("/api/v1".into());
        RouteTable::from_config(&[
            RouteConfig::new("/api/v1", "fallback-service"),
            RouteConfig::new("/api/v1/auth/", "auth-service"),
            forms,
        ])
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = table();
        assert_eq!(table.lookup("/api/v1/auth/profile").unwrap().service, "auth-service");
        assert_eq!(table.lookup("/api/v1/auth").unwrap().service, "auth-service");
        assert_eq!(table.lookup("/api/v1/other").unwrap().service, "fallback-service");
        assert!(table.lookup("/health").is_none());
    }

    #[test]
    fn test_segment_boundary() {
        let table = table();
        assert_eq!(table.lookup("/api/v1/authz").unwrap().service, "fallback-service");
        assert!(table.lookup("/api/v10").is_none());
    }

    #[test]
    fn test_strip_prefix() {
        let table = table();
        let route = table.lookup("/api/v1/forms/42").unwrap();
        assert_eq!(route.upstream_path("/api/v1/forms/42"), "/forms/42");

        let auth = table.lookup("/api/v1/auth/me").unwrap();
        assert_eq!(auth.upstream_path("/api/v1/auth/me"), "/api/v1/auth/me");
    }

    #[test]
    fn test_root_route() {
        let table = RouteTable::from_config(&[RouteConfig::new("/", "web")]);
        assert_eq!(table.lookup("/anything/at/all").unwrap().service, "web");
    }
}
