//! Per-domain admission control
//!
//! Each domain gets one [`DomainSlot`] holding both its concurrency limiter
//! and its last-request timestamp, created on first use under the registry
//! lock so two callers never end up with different limiters for one domain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

struct DomainSlot {
    admission: Arc<Semaphore>,
    /// Held across the delay sleep, so the delay check and the timestamp
    /// update are one step per domain
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl DomainSlot {
    fn new(max_concurrent: usize) -> Self {
        Self {
            admission: Arc::new(Semaphore::new(max_concurrent)),
            last_request: tokio::sync::Mutex::new(None),
        }
    }
}

/// Bounds in-flight requests and request spacing per domain
pub struct DomainThrottle {
    max_concurrent: usize,
    min_delay: Duration,
    max_jitter: Duration,
    domains: Mutex<HashMap<String, Arc<DomainSlot>>>,
}

/// Admission to one domain. The slot is returned when this is dropped.
#[must_use = "dropping the permit releases the domain slot immediately"]
pub struct ThrottlePermit {
    domain: String,
    _permit: OwnedSemaphorePermit,
}

impl ThrottlePermit {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Give the slot back now instead of at end of scope
    pub fn release(self) {}
}

impl DomainThrottle {
    pub fn new(max_concurrent: usize, min_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            min_delay,
            max_jitter,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &crate::config::FetchConfig) -> Self {
        Self::new(
            config.max_concurrent_per_domain,
            config.min_delay(),
            config.max_jitter(),
        )
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Arc<DomainSlot>>> {
        self.domains.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, domain: &str) -> Arc<DomainSlot> {
        let mut domains = self.registry();
        Arc::clone(
            domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(DomainSlot::new(self.max_concurrent))),
        )
    }

    /// Wait for a free slot on `domain`, then for the minimum delay (plus
    /// jitter) since the previous request to it.
    pub async fn acquire(&self, domain: &str) -> Result<ThrottlePermit, AcquireError> {
        let slot = self.slot(domain);
        let permit = Arc::clone(&slot.admission).acquire_owned().await?;

        let mut last = slot.last_request.lock().await;
        if let Some(prev) = *last {
            let gap = self.min_delay + self.jitter();
            let elapsed = prev.elapsed();
            if elapsed < gap {
                let wait = gap - elapsed;
                debug!(domain, wait_ms = wait.as_millis() as u64, "throttling request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
        drop(last);

        Ok(ThrottlePermit {
            domain: domain.to_string(),
            _permit: permit,
        })
    }

    /// Explicit counterpart of `acquire`; equivalent to dropping the permit
    pub fn release(&self, permit: ThrottlePermit) {
        permit.release();
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        self.max_jitter.mul_f64(rand::random::<f64>())
    }

    /// Requests currently admitted for `domain`
    pub fn in_flight(&self, domain: &str) -> usize {
        self.registry()
            .get(domain)
            .map(|slot| self.max_concurrent - slot.admission.available_permits())
            .unwrap_or(0)
    }

    pub fn tracked_domains(&self) -> usize {
        self.registry().len()
    }

    /// Drop state for domains with nothing in flight or waiting whose last
    /// request is at least `max_idle` old. Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut domains = self.registry();
        let before = domains.len();
        domains.retain(|_, slot| {
            if Arc::strong_count(slot) > 1
                || slot.admission.available_permits() < self.max_concurrent
            {
                return true;
            }
            match slot.last_request.try_lock() {
                Ok(last) => last.is_some_and(|t| t.elapsed() < max_idle),
                Err(_) => true,
            }
        });
        before - domains.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn throttle(max_concurrent: usize, min_delay_ms: u64) -> DomainThrottle {
        DomainThrottle::new(
            max_concurrent,
            Duration::from_millis(min_delay_ms),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_concurrency_bound_per_domain() {
        let throttle = Arc::new(throttle(2, 0));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                let done = Arc::clone(&done);
                tokio::spawn(async move {
                    let permit = throttle.acquire("example.test").await.unwrap();
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    throttle.release(permit);
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(throttle.in_flight("example.test"), 0);
    }

    #[tokio::test]
    async fn test_one_slot_per_domain() {
        let throttle = throttle(2, 0);
        let a = throttle.acquire("a.test").await.unwrap();
        let b = throttle.acquire("a.test").await.unwrap();
        let c = throttle.acquire("b.test").await.unwrap();
        assert_eq!(throttle.tracked_domains(), 2);
        assert_eq!(throttle.in_flight("a.test"), 2);
        assert_eq!(throttle.in_flight("b.test"), 1);
        assert_eq!(c.domain(), "b.test");
        drop(a);
        assert_eq!(throttle.in_flight("a.test"), 1);
        b.release();
        assert_eq!(throttle.in_flight("a.test"), 0);
    }

    #[tokio::test]
    async fn test_permit_released_on_error_path() {
        let throttle = throttle(1, 0);
        async fn failing(throttle: &DomainThrottle) -> Result<(), String> {
            let _permit = throttle.acquire("err.test").await.map_err(|e| e.to_string())?;
            Err("boom".to_string())
        }
        assert!(failing(&throttle).await.is_err());
        assert_eq!(throttle.in_flight("err.test"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_between_requests() {
        let throttle = throttle(4, 500);
        let start = Instant::now();
        drop(throttle.acquire("slow.test").await.unwrap());
        drop(throttle.acquire("slow.test").await.unwrap());
        drop(throttle.acquire("slow.test").await.unwrap());
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_are_spaced() {
        let throttle = Arc::new(throttle(4, 500));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                tokio::spawn(async move {
                    let permit = throttle.acquire("d.test").await.unwrap();
                    let admitted = start.elapsed();
                    drop(permit);
                    admitted
                })
            })
            .collect();

        let mut admitted = Vec::new();
        for task in tasks {
            admitted.push(task.await.unwrap());
        }
        admitted.sort();

        assert_eq!(admitted.len(), 3);
        for pair in admitted.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_per_domain() {
        let throttle = throttle(4, 500);
        let start = Instant::now();
        drop(throttle.acquire("one.test").await.unwrap());
        drop(throttle.acquire("two.test").await.unwrap());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle() {
        let throttle = throttle(2, 0);
        drop(throttle.acquire("old.test").await.unwrap());
        let held = throttle.acquire("busy.test").await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;
        drop(throttle.acquire("fresh.test").await.unwrap());

        let evicted = throttle.evict_idle(Duration::from_secs(60));
        assert_eq!(evicted, 1);
        assert_eq!(throttle.tracked_domains(), 2);
        drop(held);
    }
}
