//! Backend availability tracking
//!
//! A single background task probes the hardware backend on a fixed interval
//! and caches the outcome. The health endpoint reads that cache; it never
//! calls the backend itself.

use crate::metrics::HegelMetrics;
use hegel_client::HardwareClient;
use hegel_common::Error;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Last known reachability of the hardware backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Availability {
    /// No probe has completed yet
    #[default]
    Unknown,
    Available,
    Unavailable,
}

/// Point-in-time view of the tracker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub availability: Availability,
    /// Probes that succeeded since startup
    pub successes: u64,
    /// Probes that failed since startup
    pub failures: u64,
    /// When the latest probe completed
    pub last_probe: Option<Instant>,
}

impl HealthSnapshot {
    /// True only if the latest probe succeeded
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }
}

/// Periodic prober of the hardware backend
pub struct AvailabilityTracker {
    client: Arc<dyn HardwareClient>,
    metrics: Arc<HegelMetrics>,
    timeout: Duration,
    state: RwLock<HealthSnapshot>,
}

impl AvailabilityTracker {
    /// Create a tracker in the `Unknown` state
    pub fn new(
        client: Arc<dyn HardwareClient>,
        metrics: Arc<HegelMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            metrics,
            timeout,
            state: RwLock::new(HealthSnapshot::default()),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> HealthSnapshot {
        *self.state.read()
    }

    /// Probe the backend once and record the outcome
    pub async fn probe_once(&self) -> Availability {
        let outcome = match tokio::time::timeout(self.timeout, self.client.probe()).await {
            Ok(result) => result,
            Err(_) => Err(Error::BackendUnavailable(format!(
                "probe timed out after {:?}",
                self.timeout
            ))),
        };

        let availability = match outcome {
            Ok(()) => {
                debug!("hardware backend reachable");
                self.metrics.backend_healthcheck(true);
                Availability::Available
            }
            Err(e) => {
                error!("hardware backend health check failed: {e}");
                self.metrics.backend_healthcheck(false);
                self.metrics.error("backend", "healthcheck");
                Availability::Unavailable
            }
        };

        let mut state = self.state.write();
        state.availability = availability;
        if availability == Availability::Available {
            state.successes += 1;
        } else {
            state.failures += 1;
        }
        state.last_probe = Some(Instant::now());
        availability
    }

    /// Long-running background task: probe every `interval`, starting now
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.probe_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hegel_client::Hardware;
    use hegel_common::Result;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FlakyBackend {
        up: AtomicBool,
        hang: bool,
        probes: AtomicUsize,
    }

    impl FlakyBackend {
        fn new(up: bool) -> Self {
            Self {
                up: AtomicBool::new(up),
                hang: false,
                probes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HardwareClient for FlakyBackend {
        async fn by_ip(&self, ip: &str) -> Result<Hardware> {
            Err(Error::HardwareNotFound(ip.to_string()))
        }

        async fn probe(&self) -> Result<()> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(Error::BackendUnavailable("connection refused".to_string()))
            }
        }
    }

    fn tracker(backend: Arc<FlakyBackend>) -> (AvailabilityTracker, Arc<HegelMetrics>) {
        let metrics = Arc::new(HegelMetrics::new());
        let tracker =
            AvailabilityTracker::new(backend, Arc::clone(&metrics), Duration::from_millis(50));
        (tracker, metrics)
    }

    #[test]
    fn test_starts_unknown() {
        let (tracker, _) = tracker(Arc::new(FlakyBackend::new(true)));
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.availability, Availability::Unknown);
        assert!(!snapshot.is_available());
        assert!(snapshot.last_probe.is_none());
    }

    #[tokio::test]
    async fn test_successful_probes() {
        let (tracker, metrics) = tracker(Arc::new(FlakyBackend::new(true)));
        for _ in 0..3 {
            assert_eq!(tracker.probe_once().await, Availability::Available);
        }

        let snapshot = tracker.snapshot();
        assert!(snapshot.is_available());
        assert_eq!(snapshot.successes, 3);
        assert_eq!(snapshot.failures, 0);
        assert!(metrics.backend_connected());
    }

    #[tokio::test]
    async fn test_failure_flips_state() {
        let backend = Arc::new(FlakyBackend::new(true));
        let (tracker, metrics) = tracker(Arc::clone(&backend));
        for _ in 0..5 {
            tracker.probe_once().await;
        }
        assert!(metrics.backend_connected());

        // One failure outweighs any run of earlier successes
        backend.up.store(false, Ordering::SeqCst);
        assert_eq!(tracker.probe_once().await, Availability::Unavailable);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.availability, Availability::Unavailable);
        assert!(!snapshot.is_available());
        assert_eq!(snapshot.successes, 5);
        assert_eq!(snapshot.failures, 1);
        assert!(!metrics.backend_connected());
        assert_eq!(metrics.error_count("backend", "healthcheck"), 1);

        backend.up.store(true, Ordering::SeqCst);
        assert_eq!(tracker.probe_once().await, Availability::Available);
    }

    #[tokio::test]
    async fn test_hung_probe_times_out() {
        let backend = Arc::new(FlakyBackend {
            hang: true,
            ..FlakyBackend::new(true)
        });
        let (tracker, _) = tracker(backend);
        assert_eq!(tracker.probe_once().await, Availability::Unavailable);
        assert_eq!(tracker.snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_run_probes_immediately() {
        let backend = Arc::new(FlakyBackend::new(true));
        let (tracker, _) = tracker(Arc::clone(&backend));
        let tracker = Arc::new(tracker);

        let task = tokio::spawn(Arc::clone(&tracker).run(Duration::from_secs(3600)));
        for _ in 0..100 {
            if tracker.snapshot().successes > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();

        assert_eq!(tracker.snapshot().availability, Availability::Available);
        assert_eq!(backend.probes.load(Ordering::SeqCst), 1);
    }
}
