//! Sliding-window rate limiting with endpoint tiers.
//!
//! # Responsibilities
//! - Keep one window of admission timestamps per (tier, identity)
//! - Pick exactly one tier per request: endpoint pattern, else global
//! - Report limit / remaining / reset for every decision
//! - Periodically drop windows that have gone idle
//!
//! # Design Decisions
//! - Strictly sliding log: a request is admitted only if fewer than `limit`
//!   admissions happened in `(now - window, now]`
//! - Rejected requests are not recorded, so a window never holds more than
//!   `limit` timestamps
//! - Windows live in a `DashMap`; mutation happens under the shard's entry
//!   guard, so two identities rarely contend

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;
use crate::routing::matcher::{PathPattern, PatternTable};

/// A limit applied over a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTier {
    /// `global`, or the endpoint pattern that selected this tier.
    pub name: String,
    pub limit: u32,
    pub window: Duration,
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub tier: String,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the oldest counted admission leaves the window.
    pub reset_after: Duration,
}

impl RateDecision {
    /// Whole seconds a rejected client should wait, at least one.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.reset_after).max(1)
    }

    /// Unix timestamp (seconds) at which the window frees a slot.
    pub fn reset_epoch_secs(&self, now: SystemTime) -> u64 {
        let now = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        now + ceil_secs(self.reset_after)
    }
}

#[derive(Debug)]
struct Window {
    stamps: VecDeque<Instant>,
    span: Duration,
}

/// State holder for all rate windows.
#[derive(Debug)]
pub struct RateLimiter {
    global: RateTier,
    endpoints: PatternTable<RateTier>,
    exempt: PatternTable<()>,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let endpoints = PatternTable::new(config.endpoints.iter().map(|e| {
            (
                PathPattern::parse(&e.pattern),
                RateTier {
                    name: e.pattern.clone(),
                    limit: e.requests,
                    window: Duration::from_secs(e.window_secs),
                },
            )
        }));

        Self {
            global: RateTier {
                name: "global".to_string(),
                limit: config.requests,
                window: Duration::from_secs(config.window_secs),
            },
            endpoints,
            exempt: PatternTable::from_patterns(&config.exempt_paths),
            windows: DashMap::new(),
        }
    }

    /// The tier that governs `path`.
    pub fn tier_for(&self, path: &str) -> &RateTier {
        self.endpoints
            .lookup(path)
            .map(|(_, tier)| tier)
            .unwrap_or(&self.global)
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt.is_match(path)
    }

    /// Check and record one request. `None` when the path is exempt.
    pub fn check(&self, identity: &str, path: &str) -> Option<RateDecision> {
        self.check_at(identity, path, Instant::now())
    }

    pub fn check_at(&self, identity: &str, path: &str, now: Instant) -> Option<RateDecision> {
        if self.is_exempt(path) {
            return None;
        }

        let tier = self.tier_for(path);
        let key = format!("{}|{}", tier.name, identity);

        let mut entry = self.windows.entry(key).or_insert_with(|| Window {
            stamps: VecDeque::with_capacity(tier.limit.min(1024) as usize),
            span: tier.window,
        });
        let window = entry.value_mut();

        while let Some(oldest) = window.stamps.front() {
            if now.saturating_duration_since(*oldest) >= tier.window {
                window.stamps.pop_front();
            } else {
                break;
            }
        }

        let count = window.stamps.len() as u32;
        let allowed = count < tier.limit;
        if allowed {
            window.stamps.push_back(now);
        }

        let reset_after = window
            .stamps
            .front()
            .map(|oldest| tier.window.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(tier.window);

        Some(RateDecision {
            allowed,
            tier: tier.name.clone(),
            limit: tier.limit,
            remaining: tier.limit.saturating_sub(window.stamps.len() as u32),
            reset_after,
        })
    }

    /// Drop windows whose newest admission has aged out.
    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window
                .stamps
                .back()
                .map(|newest| now.saturating_duration_since(*newest) < window.span)
                .unwrap_or(false)
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked (tier, identity) windows.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Run the idle-window janitor until shutdown.
    pub fn spawn_janitor(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.purge_idle_at(Instant::now());
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.tracked(), "Purged idle rate windows");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limit janitor stopping");
                        break;
                    }
                }
            }
        })
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
