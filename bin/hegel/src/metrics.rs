//! Hegel metrics for Prometheus
//!
//! Tracks metadata lookups, backend health checks, and per-route HTTP
//! request counts and latencies.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Latency histogram buckets in milliseconds
const LATENCY_BUCKET_BOUNDARIES_MS: [u64; 11] =
    [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

/// Error label pairs that are always exported, even at zero
const KNOWN_ERRORS: [(&str, &str); 2] = [("metadata", "lookup"), ("backend", "healthcheck")];

/// Per-route HTTP metrics
#[derive(Debug, Default)]
struct RouteMetrics {
    /// Successful requests (2xx)
    requests_success: AtomicU64,
    /// Client errors (4xx)
    requests_client_error: AtomicU64,
    /// Server errors (5xx)
    requests_server_error: AtomicU64,
    /// Anything else (1xx, 3xx)
    requests_other: AtomicU64,
    /// Total requests, also the histogram count
    requests_total: AtomicU64,
    /// Latency sum in microseconds
    latency_sum_us: AtomicU64,
    /// Cumulative latency histogram, one bucket per boundary
    latency_buckets: [AtomicU64; 11],
}

impl RouteMetrics {
    fn record(&self, status_code: u16, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let class = match status_code {
            200..300 => &self.requests_success,
            400..500 => &self.requests_client_error,
            500.. => &self.requests_server_error,
            _ => &self.requests_other,
        };
        class.fetch_add(1, Ordering::Relaxed);

        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        let latency_ms = latency_us / 1000;
        for (i, &boundary) in LATENCY_BUCKET_BOUNDARIES_MS.iter().enumerate() {
            if latency_ms <= boundary {
                self.latency_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Hegel metrics collector
///
/// One instance is shared by the request handlers, the request-tracking
/// middleware and the availability tracker.
#[derive(Debug)]
pub struct HegelMetrics {
    metadata_requests: AtomicU64,
    errors: RwLock<BTreeMap<(String, String), AtomicU64>>,
    backend_connected: AtomicU64,
    healthchecks_ok: AtomicU64,
    healthchecks_failed: AtomicU64,
    in_flight: AtomicU64,
    routes: RwLock<BTreeMap<String, RouteMetrics>>,
    start_time: Instant,
}

impl Default for HegelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HegelMetrics {
    /// Create a new collector
    #[must_use]
    pub fn new() -> Self {
        let errors = KNOWN_ERRORS
            .iter()
            .map(|&(op, state)| ((op.to_string(), state.to_string()), AtomicU64::new(0)))
            .collect();
        Self {
            metadata_requests: AtomicU64::new(0),
            errors: RwLock::new(errors),
            backend_connected: AtomicU64::new(0),
            healthchecks_ok: AtomicU64::new(0),
            healthchecks_failed: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            routes: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Count a metadata request that reached the backend lookup
    pub fn metadata_request(&self) {
        self.metadata_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Metadata requests counted so far
    pub fn metadata_requests(&self) -> u64 {
        self.metadata_requests.load(Ordering::Relaxed)
    }

    /// Count an error of operation `op` in stage `state`
    pub fn error(&self, op: &str, state: &str) {
        if let Some(counter) = self.errors.read().get(&(op.to_string(), state.to_string())) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.errors
            .write()
            .entry((op.to_string(), state.to_string()))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Errors counted so far for `op` / `state`
    pub fn error_count(&self, op: &str, state: &str) -> u64 {
        self.errors
            .read()
            .get(&(op.to_string(), state.to_string()))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Record the outcome of one backend health check
    pub fn backend_healthcheck(&self, ok: bool) {
        self.backend_connected.store(u64::from(ok), Ordering::Relaxed);
        let counter = if ok {
            &self.healthchecks_ok
        } else {
            &self.healthchecks_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the last health check reached the backend
    pub fn backend_connected(&self) -> bool {
        self.backend_connected.load(Ordering::Relaxed) == 1
    }

    pub fn request_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// HTTP requests currently being served
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Record a finished HTTP request against its route pattern
    pub fn record_request(&self, route: &str, status_code: u16, latency_us: u64) {
        if let Some(metrics) = self.routes.read().get(route) {
            metrics.record(status_code, latency_us);
            return;
        }
        self.routes
            .write()
            .entry(route.to_string())
            .or_default()
            .record(status_code, latency_us);
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(4 * 1024);
        // Writing into a String never fails
        let _ = self.write_prometheus(&mut output);
        output
    }

    #[allow(clippy::cast_precision_loss)]
    fn write_prometheus(&self, out: &mut String) -> fmt::Result {
        let uptime = self.start_time.elapsed().as_secs();
        writeln!(out, "# HELP hegel_uptime_seconds Process uptime in seconds")?;
        writeln!(out, "# TYPE hegel_uptime_seconds counter")?;
        writeln!(out, "hegel_uptime_seconds {uptime}")?;

        writeln!(
            out,
            "# HELP hegel_metadata_requests_total Metadata requests that triggered a hardware lookup"
        )?;
        writeln!(out, "# TYPE hegel_metadata_requests_total counter")?;
        writeln!(out, "hegel_metadata_requests_total {}", self.metadata_requests())?;

        writeln!(out, "# HELP hegel_errors_total Errors by operation and stage")?;
        writeln!(out, "# TYPE hegel_errors_total counter")?;
        for ((op, state), count) in self.errors.read().iter() {
            writeln!(
                out,
                "hegel_errors_total{{op=\"{op}\",state=\"{state}\"}} {}",
                count.load(Ordering::Relaxed)
            )?;
        }

        writeln!(
            out,
            "# HELP hegel_backend_connected Whether the last health check reached the hardware backend"
        )?;
        writeln!(out, "# TYPE hegel_backend_connected gauge")?;
        writeln!(
            out,
            "hegel_backend_connected {}",
            self.backend_connected.load(Ordering::Relaxed)
        )?;

        writeln!(
            out,
            "# HELP hegel_backend_healthchecks_total Hardware backend health checks by outcome"
        )?;
        writeln!(out, "# TYPE hegel_backend_healthchecks_total counter")?;
        writeln!(
            out,
            "hegel_backend_healthchecks_total{{status=\"true\"}} {}",
            self.healthchecks_ok.load(Ordering::Relaxed)
        )?;
        writeln!(
            out,
            "hegel_backend_healthchecks_total{{status=\"false\"}} {}",
            self.healthchecks_failed.load(Ordering::Relaxed)
        )?;

        writeln!(
            out,
            "# HELP hegel_http_requests_in_flight HTTP requests currently being served"
        )?;
        writeln!(out, "# TYPE hegel_http_requests_in_flight gauge")?;
        writeln!(out, "hegel_http_requests_in_flight {}", self.in_flight())?;

        let routes = self.routes.read();
        if routes.is_empty() {
            return Ok(());
        }

        writeln!(out, "# HELP hegel_http_requests_total HTTP requests by route and status class")?;
        writeln!(out, "# TYPE hegel_http_requests_total counter")?;
        for (route, metrics) in routes.iter() {
            for (class, counter) in [
                ("2xx", &metrics.requests_success),
                ("4xx", &metrics.requests_client_error),
                ("5xx", &metrics.requests_server_error),
                ("other", &metrics.requests_other),
            ] {
                let count = counter.load(Ordering::Relaxed);
                if count > 0 {
                    writeln!(
                        out,
                        "hegel_http_requests_total{{route=\"{route}\",status=\"{class}\"}} {count}"
                    )?;
                }
            }
        }

        writeln!(
            out,
            "# HELP hegel_http_request_duration_seconds HTTP request latency by route"
        )?;
        writeln!(out, "# TYPE hegel_http_request_duration_seconds histogram")?;
        for (route, metrics) in routes.iter() {
            for (i, &boundary) in LATENCY_BUCKET_BOUNDARIES_MS.iter().enumerate() {
                writeln!(
                    out,
                    "hegel_http_request_duration_seconds_bucket{{route=\"{route}\",le=\"{}\"}} {}",
                    boundary as f64 / 1000.0,
                    metrics.latency_buckets[i].load(Ordering::Relaxed)
                )?;
            }
            let total = metrics.requests_total.load(Ordering::Relaxed);
            writeln!(
                out,
                "hegel_http_request_duration_seconds_bucket{{route=\"{route}\",le=\"+Inf\"}} {total}"
            )?;
            writeln!(
                out,
                "hegel_http_request_duration_seconds_sum{{route=\"{route}\"}} {}",
                metrics.latency_sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
            )?;
            writeln!(
                out,
                "hegel_http_request_duration_seconds_count{{route=\"{route}\"}} {total}"
            )?;
        }
        Ok(())
    }
}
