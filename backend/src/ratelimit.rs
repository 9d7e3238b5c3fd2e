use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::AppError;

const WINDOW: Duration = Duration::from_secs(60);

/// Fixed one-minute window per client key.
#[derive(Debug, Default)]
pub struct RateLimiter {
    clients: DashMap<String, (AtomicU32, Instant)>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one request from `client`; fails once more than `limit`
    /// requests arrived in the current window. A limit of 0 disables the check.
    pub fn check(&self, client: &str, limit: u32) -> Result<(), AppError> {
        self.check_at(client, limit, Instant::now())
    }

    fn check_at(&self, client: &str, limit: u32, now: Instant) -> Result<(), AppError> {
        if limit == 0 {
            return Ok(());
        }

        let mut entry = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| (AtomicU32::new(0), now));

        if now.duration_since(entry.1) > WINDOW {
            entry.0.store(0, Ordering::Relaxed);
            entry.1 = now;
        }

        let count = entry.0.fetch_add(1, Ordering::Relaxed);
        if count >= limit {
            log::warn!("Rate limit exceeded for {}", client);
            return Err(AppError::RateLimited);
        }
        Ok(())
    }

    /// Drops clients whose window has expired.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut purged = 0;
        self.clients.retain(|_, (_, started)| {
            let keep = now.saturating_duration_since(*started) <= WINDOW;
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", 3, now).is_ok());
        }
        assert!(matches!(
            limiter.check_at("10.0.0.1", 3, now),
            Err(AppError::RateLimited)
        ));
        assert!(limiter.check_at("10.0.0.2", 3, now).is_ok());
    }

    #[test]
    fn window_resets_after_a_minute() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        assert!(limiter.check_at("a", 1, start).is_ok());
        assert!(limiter.check_at("a", 1, start).is_err());
        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at("a", 1, later).is_ok());
    }

    #[test]
    fn purge_drops_only_expired_clients() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        assert!(limiter.check_at("old", 5, start).is_ok());
        let later = start + Duration::from_secs(90);
        assert!(limiter.check_at("fresh", 5, later).is_ok());

        assert_eq!(limiter.purge_expired_at(later), 1);
        assert_eq!(limiter.clients.len(), 1);
        assert!(limiter.clients.contains_key("fresh"));
        assert_eq!(limiter.purge_expired_at(later), 0);
    }

    #[test]
    fn purge_while_clients_arrive() {
        let limiter = Arc::new(RateLimiter::new());
        let writer = {
            let limiter = limiter.clone();
            std::thread::spawn(move || {
                for i in 0..5_000 {
                    limiter.check(&format!("10.0.{}.{}", i / 256, i % 256), 10).unwrap();
                }
            })
        };

        let mut purged = 0;
        while !writer.is_finished() {
            purged += limiter.purge_expired();
        }
        writer.join().unwrap();

        assert_eq!(purged, 0);
        assert_eq!(limiter.clients.len(), 5_000);
    }

    #[test]
    fn zero_limit_disables() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            assert!(limiter.check("a", 0).is_ok());
        }
    }
}
