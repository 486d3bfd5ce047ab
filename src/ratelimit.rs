//! Rate Limiter (C8).
//!
//! A per-key weighted sliding-window counter, lock-free via the same
//! atomics-and-`compare_exchange` window-roll the teacher's
//! `SlidingWindowCounter` uses (`enterprise/ratelimit/algorithm.rs`).
//! Keys are opaque strings built by callers from the five templates in
//! spec §4.8; each template owns its own limit and window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u64 },
    Denied { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

struct Window {
    limit: u64,
    window_nanos: u64,
    current_window: AtomicU64,
    current_count: AtomicU64,
    previous_count: AtomicU64,
}

impl Window {
    fn new(limit: u64, window: Duration) -> Self {
        let now = now_nanos();
        let window_nanos = window.as_nanos() as u64;
        Self {
            limit,
            window_nanos,
            current_window: AtomicU64::new((now / window_nanos) * window_nanos),
            current_count: AtomicU64::new(0),
            previous_count: AtomicU64::new(0),
        }
    }

    fn check(&self) -> Decision {
        let now = now_nanos();
        let window_start = (now / self.window_nanos) * self.window_nanos;

        let current_window = self.current_window.load(Ordering::Acquire);
        if window_start > current_window
            && self
                .current_window
                .compare_exchange(current_window, window_start, Ordering::Release, Ordering::Acquire)
                .is_ok()
        {
            let count = self.current_count.swap(0, Ordering::AcqRel);
            self.previous_count.store(count, Ordering::Release);
        }

        let elapsed = now - self.current_window.load(Ordering::Acquire);
        let progress = elapsed as f64 / self.window_nanos as f64;

        let current = self.current_count.load(Ordering::Acquire) as f64;
        let previous = self.previous_count.load(Ordering::Acquire) as f64;
        let weighted = (previous * (1.0 - progress) + current).ceil() as u64;

        let retry_after = ((self.window_nanos - elapsed) / 1_000_000_000).max(1);

        if weighted < self.limit {
            self.current_count.fetch_add(1, Ordering::AcqRel);
            Decision::Allowed { remaining: self.limit.saturating_sub(weighted + 1) }
        } else {
            Decision::Denied { retry_after_secs: retry_after }
        }
    }
}

fn now_nanos() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_nanos() as u64
}

/// The five default buckets from spec §4.8. Each carries its own key
/// prefix, limit, and window; callers supply the identifying suffix
/// (email, ip, user id, or principal id).
#[derive(Debug, Clone, Copy)]
pub enum Bucket {
    Login,
    Register,
    Reset,
    Refresh,
    General,
}

impl Bucket {
    fn prefix(self) -> &'static str {
        match self {
            Bucket::Login => "login",
            Bucket::Register => "register",
            Bucket::Reset => "reset",
            Bucket::Refresh => "refresh",
            Bucket::General => "general",
        }
    }

    fn limit_and_window(self) -> (u64, Duration) {
        match self {
            Bucket::Login => (5, Duration::from_secs(60)),
            Bucket::Register => (3, Duration::from_secs(300)),
            Bucket::Reset => (3, Duration::from_secs(900)),
            Bucket::Refresh => (10, Duration::from_secs(60)),
            Bucket::General => (100, Duration::from_secs(60)),
        }
    }
}

/// Fails closed under construction races: two threads racing to create the
/// same key's window both get a fresh `Window`, and `dashmap`'s
/// entry-or-insert keeps exactly one — the loser's handle is dropped, never
/// observed as a bypass.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { windows: DashMap::new() }
    }

    pub fn check(&self, bucket: Bucket, suffix: &str) -> Decision {
        let key = format!("{}:{}", bucket.prefix(), suffix);
        let (limit, window) = bucket.limit_and_window();
        self.windows.entry(key).or_insert_with(|| Window::new(limit, window)).check()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check(Bucket::Login, "alice@example.com").is_allowed());
        }
        assert!(!limiter.check(Bucket::Login, "alice@example.com").is_allowed());
    }

    #[test]
    fn distinct_keys_have_independent_budgets() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check(Bucket::Login, "alice@example.com").is_allowed());
        }
        assert!(limiter.check(Bucket::Login, "bob@example.com").is_allowed());
    }

    #[test]
    fn denied_reports_nonzero_retry_after() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            limiter.check(Bucket::Register, "203.0.113.5");
        }
        match limiter.check(Bucket::Register, "203.0.113.5") {
            Decision::Denied { retry_after_secs } => assert!(retry_after_secs > 0),
            Decision::Allowed { .. } => panic!("expected denial"),
        }
    }
}
