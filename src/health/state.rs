//! Per-service health state and the aggregate report.
//!
//! # States
//! - Unknown: not probed yet
//! - Healthy: last probe answered 2xx within its timeout
//! - Unhealthy: last probe failed, timed out or answered non-2xx
//!
//! # Aggregation
//! ```text
//! no services, or none unhealthy → healthy   (200)
//! some unhealthy                 → degraded  (503)
//! all unhealthy                  → unhealthy (503)
//! ```
//!
//! # Design Decisions
//! - Written only by pollers; request handling never reads or locks it
//! - Unknown is not evidence of failure and does not degrade the report

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Latest probe result for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub status: HealthStatus,
    /// Probe latency in milliseconds.
    pub response_time: Option<u64>,
    /// Unix milliseconds of the last probe.
    pub last_check: Option<u64>,
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn unknown() -> Self {
        Self {
            status: HealthStatus::Unknown,
            response_time: None,
            last_check: None,
            error: None,
        }
    }

    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time: Some(response_time_ms),
            last_check: Some(unix_millis()),
            error: None,
        }
    }

    pub fn unhealthy(response_time_ms: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time: response_time_ms,
            last_check: Some(unix_millis()),
            error: Some(error.into()),
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub overall: OverallStatus,
    pub per_service: BTreeMap<String, ServiceHealth>,
    pub timestamp: u64,
}

impl HealthReport {
    pub fn status_code(&self) -> StatusCode {
        match self.overall {
            OverallStatus::Healthy => StatusCode::OK,
            OverallStatus::Degraded | OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Latest health of every polled service.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    entries: DashMap<String, ServiceHealth>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a service as unknown.
    pub fn register(&self, service: &str) {
        self.entries.entry(service.to_string()).or_insert_with(ServiceHealth::unknown);
    }

    pub fn record(&self, service: &str, health: ServiceHealth) {
        self.entries.insert(service.to_string(), health);
    }

    pub fn get(&self, service: &str) -> Option<ServiceHealth> {
        self.entries.get(service).map(|e| e.value().clone())
    }

    pub fn report(&self) -> HealthReport {
        let per_service: BTreeMap<String, ServiceHealth> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let unhealthy = per_service
            .values()
            .filter(|h| h.status == HealthStatus::Unhealthy)
            .count();

        let overall = if unhealthy == 0 {
            OverallStatus::Healthy
        } else if unhealthy == per_service.len() {
            OverallStatus::Unhealthy
        } else {
            OverallStatus::Degraded
        };

        HealthReport {
            overall,
            per_service,
            timestamp: unix_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_is_healthy() {
        let report = HealthRegistry::new().report();
        assert_eq!(report.overall, OverallStatus::Healthy);
        assert_eq!(report.status_code(), StatusCode::OK);
    }

    #[test]
    fn test_aggregation() {
        let registry = HealthRegistry::new();
        registry.register("a");
        registry.register("b");
        assert_eq!(registry.report().overall, OverallStatus::Healthy);

        registry.record("a", ServiceHealth::healthy(12));
        registry.record("b", ServiceHealth::unhealthy(None, "connection refused"));
        let report = registry.report();
        assert_eq!(report.overall, OverallStatus::Degraded);
        assert_eq!(report.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        registry.record("a", ServiceHealth::unhealthy(Some(5000), "timeout"));
        assert_eq!(registry.report().overall, OverallStatus::Unhealthy);
    }

    #[test]
    fn test_report_json_shape() {
        let registry = HealthRegistry::new();
        registry.record("auth-service", ServiceHealth::healthy(7));

        let json = serde_json::to_value(registry.report()).unwrap();
        assert_eq!(json["overall"], "healthy");
        let svc = &json["perService"]["auth-service"];
        assert_eq!(svc["status"], "healthy");
        assert_eq!(svc["responseTime"], 7);
        assert!(svc["lastCheck"].as_u64().unwrap() > 0);
        assert!(svc["error"].is_null());
    }
}
