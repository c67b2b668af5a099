//! Per-IP sliding-window connection throttle (§4.4, §5). Grounded on
//! `internal/smtp/rate_limiter.go`: a map of IP to recent connection
//! timestamps, pruned both on each `allow` check and by a background
//! sweep that drops IPs with no timestamps left in the window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { max_requests, window, requests: Mutex::new(HashMap::new()) }
    }

    /// Records a connection attempt from `ip` and reports whether it is
    /// within the window's budget. Timestamps older than the window are
    /// dropped from `ip`'s entry before the count is taken.
    pub fn allow(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap();
        let times = requests.entry(ip.to_string()).or_default();
        times.retain(|t| now.duration_since(*t) < self.window);
        if times.len() >= self.max_requests {
            return false;
        }
        times.push(now);
        true
    }

    /// Drops any IP whose window has emptied out. Run on a fixed interval
    /// alongside the SMTP accept loop so the map doesn't grow unbounded.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap();
        requests.retain(|_, times| {
            times.retain(|t| now.duration_since(*t) < self.window);
            !times.is_empty()
        });
    }

    pub fn cleanup_interval() -> Duration {
        CLEANUP_INTERVAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_configured_burst() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[test]
    fn tracks_ips_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[test]
    fn cleanup_drops_ips_whose_window_has_emptied() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.allow("10.0.0.1"));
        std::thread::sleep(Duration::from_millis(20));
        limiter.cleanup();
        assert!(limiter.requests.lock().unwrap().is_empty());
    }
}
