//! Fixed-window, in-memory [`RateLimiter`].

use std::time::{Duration, Instant};

use bastion_core::capability::{EndpointClass, RateLimiter};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per (client, endpoint class) attempt counters.
///
/// Each key gets a window of `window_secs`; the first attempt after the
/// window elapses starts a new one.
#[derive(Debug)]
pub struct WindowedRateLimiter {
    config: RateLimitConfig,
    windows: DashMap<(String, EndpointClass), Window>,
}

impl WindowedRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    fn limit(&self, class: EndpointClass) -> u32 {
        match class {
            EndpointClass::SignIn => self.config.sign_in_max,
            EndpointClass::TwoFactor => self.config.two_factor_max,
            EndpointClass::Default => self.config.default_max,
        }
    }

    fn check_at(&self, client: &str, class: EndpointClass, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let window = self.window();
        let mut entry = self
            .windows
            .entry((client.to_string(), class))
            .or_insert(Window {
                started: now,
                count: 0,
            });

        if now.saturating_duration_since(entry.started) >= window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        entry.count = entry.count.saturating_add(1);

        let allowed = entry.count <= self.limit(class);
        if !allowed {
            warn!(client, class = class.as_str(), "Rate limit exceeded");
        }
        allowed
    }

    /// Drop windows that have fully elapsed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let window = self.window();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Swept expired rate-limit windows");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl RateLimiter for WindowedRateLimiter {
    fn check(&self, client: &str, class: EndpointClass) -> bool {
        self.check_at(client, class, Instant::now())
    }
}
