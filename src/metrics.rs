//! Request metrics: counters and latency histograms.
//!
//! Two series families, both labelled by route pattern rather than raw path:
//!
//! - `http_requests_total{method, path, status}` (counter)
//! - `http_request_duration_seconds{method, path}` (histogram)
//!
//! Each series lives in a `DashMap` shard as plain atomics. Updating an
//! existing series takes a shard read lock; only the first observation of a
//! new label set takes the write lock. Nothing here can fail.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use http::StatusCode;

use crate::method::Method;

/// Histogram upper bounds. Fixed for the lifetime of the process.
pub const DURATION_BUCKETS: [Duration; 11] = [
    Duration::from_millis(5),
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(250),
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_millis(2_500),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

const REQUESTS_TOTAL: &str = "http_requests_total";
const REQUEST_DURATION: &str = "http_request_duration_seconds";

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct RequestKey {
    method: Method,
    route: String,
    status: u16,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct RouteKey {
    method: Method,
    route: String,
}

/// Per-bucket (non-cumulative) counts; the last slot is the `+Inf` overflow.
/// The total count is the sum of the slots, so it never disagrees with them.
struct AtomicHistogram {
    buckets: [AtomicU64; DURATION_BUCKETS.len() + 1],
    sum_nanos: AtomicU64,
}

impl Default for AtomicHistogram {
    fn default() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_nanos: AtomicU64::new(0),
        }
    }
}

impl AtomicHistogram {
    fn observe(&self, duration: Duration) {
        let slot = DURATION_BUCKETS
            .iter()
            .position(|bound| duration <= *bound)
            .unwrap_or(DURATION_BUCKETS.len());
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);

        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

/// Process-wide request metrics. Share it with `Arc`.
#[derive(Default)]
pub struct MetricsRegistry {
    requests: DashMap<RequestKey, AtomicU64>,
    durations: DashMap<RouteKey, AtomicHistogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one to the counter for `(method, route, status)`.
    pub fn increment_request_count(&self, method: Method, route: &str, status: StatusCode) {
        let key = RequestKey { method, route: route.to_owned(), status: status.as_u16() };
        if let Some(counter) = self.requests.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.requests.entry(key).or_default().fetch_add(1, Ordering::Relaxed);
    }

    /// Records one latency sample for `(method, route)`.
    pub fn observe_duration(&self, method: Method, route: &str, duration: Duration) {
        let key = RouteKey { method, route: route.to_owned() };
        if let Some(histogram) = self.durations.get(&key) {
            histogram.observe(duration);
            return;
        }
        self.durations.entry(key).or_default().observe(duration);
    }

    /// A point-in-time copy of every series, sorted by route, method, status.
    ///
    /// Each series is read atomically on its own; series may be mutually
    /// out of date by whatever requests completed during the walk.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut requests: Vec<RequestCount> = self
            .requests
            .iter()
            .map(|entry| {
                let key = entry.key();
                RequestCount {
                    method: key.method,
                    route: key.route.clone(),
                    status: key.status,
                    count: entry.value().load(Ordering::Relaxed),
                }
            })
            .collect();
        requests.sort_by(|a, b| {
            a.route.cmp(&b.route).then(a.method.cmp(&b.method)).then(a.status.cmp(&b.status))
        });

        let mut durations: Vec<DurationHistogram> = self
            .durations
            .iter()
            .map(|entry| {
                let key = entry.key();
                let hist = entry.value();
                let raw: Vec<u64> = hist.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect();

                let mut running = 0;
                let buckets = DURATION_BUCKETS
                    .iter()
                    .zip(&raw)
                    .map(|(bound, n)| {
                        running += n;
                        (bound.as_secs_f64(), running)
                    })
                    .collect();

                DurationHistogram {
                    method: key.method,
                    route: key.route.clone(),
                    buckets,
                    count: raw.iter().sum(),
                    sum_seconds: Duration::from_nanos(hist.sum_nanos.load(Ordering::Relaxed)).as_secs_f64(),
                }
            })
            .collect();
        durations.sort_by(|a, b| a.route.cmp(&b.route).then(a.method.cmp(&b.method)));

        MetricsSnapshot { requests, durations }
    }
}

/// One counter series.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestCount {
    pub method: Method,
    pub route: String,
    pub status: u16,
    pub count: u64,
}

/// One histogram series. `buckets` are cumulative `(upper bound in seconds, count)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DurationHistogram {
    pub method: Method,
    pub route: String,
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum_seconds: f64,
}

/// Output of [`MetricsRegistry::snapshot`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub requests: Vec<RequestCount>,
    pub durations: Vec<DurationHistogram>,
}

impl MetricsSnapshot {
    /// Sum of every request counter.
    pub fn total_requests(&self) -> u64 {
        self.requests.iter().map(|r| r.count).sum()
    }

    /// Sum of every histogram's sample count.
    pub fn total_observations(&self) -> u64 {
        self.durations.iter().map(|d| d.count).sum()
    }

    pub fn request_count(&self, method: Method, route: &str, status: u16) -> u64 {
        self.requests
            .iter()
            .find(|r| r.method == method && r.route == route && r.status == status)
            .map_or(0, |r| r.count)
    }

    pub fn histogram(&self, method: Method, route: &str) -> Option<&DurationHistogram> {
        self.durations.iter().find(|d| d.method == method && d.route == route)
    }

    /// Prometheus text exposition format, version 0.0.4.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP {REQUESTS_TOTAL} Total number of HTTP requests");
        let _ = writeln!(out, "# TYPE {REQUESTS_TOTAL} counter");
        for r in &self.requests {
            let _ = writeln!(
                out,
                "{REQUESTS_TOTAL}{{method=\"{}\",path=\"{}\",status=\"{}\"}} {}",
                r.method,
                escape_label(&r.route),
                r.status,
                r.count
            );
        }

        let _ = writeln!(out, "# HELP {REQUEST_DURATION} HTTP request duration in seconds");
        let _ = writeln!(out, "# TYPE {REQUEST_DURATION} histogram");
        for d in &self.durations {
            let labels = format!("method=\"{}\",path=\"{}\"", d.method, escape_label(&d.route));
            for (le, count) in &d.buckets {
                let _ = writeln!(out, "{REQUEST_DURATION}_bucket{{{labels},le=\"{le}\"}} {count}");
            }
            let _ = writeln!(out, "{REQUEST_DURATION}_bucket{{{labels},le=\"+Inf\"}} {}", d.count);
            let _ = writeln!(out, "{REQUEST_DURATION}_sum{{{labels}}} {}", d.sum_seconds);
            let _ = writeln!(out, "{REQUEST_DURATION}_count{{{labels}}} {}", d.count);
        }

        out
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_per_label_triple() {
        let registry = MetricsRegistry::new();
        registry.increment_request_count(Method::Get, "/health", StatusCode::OK);
        registry.increment_request_count(Method::Get, "/health", StatusCode::OK);
        registry.increment_request_count(Method::Get, "/health", StatusCode::SERVICE_UNAVAILABLE);
        registry.increment_request_count(Method::Post, "/health", StatusCode::OK);

        let snap = registry.snapshot();
        assert_eq!(snap.request_count(Method::Get, "/health", 200), 2);
        assert_eq!(snap.request_count(Method::Get, "/health", 503), 1);
        assert_eq!(snap.request_count(Method::Post, "/health", 200), 1);
        assert_eq!(snap.request_count(Method::Put, "/health", 200), 0);
        assert_eq!(snap.total_requests(), 4);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let registry = MetricsRegistry::new();
        registry.observe_duration(Method::Get, "/ready", Duration::from_millis(3));
        registry.observe_duration(Method::Get, "/ready", Duration::from_millis(40));
        registry.observe_duration(Method::Get, "/ready", Duration::from_secs(30));

        let snap = registry.snapshot();
        let hist = snap.histogram(Method::Get, "/ready").unwrap();
        assert_eq!(hist.count, 3);
        assert_eq!(hist.buckets.len(), DURATION_BUCKETS.len());
        assert_eq!(hist.buckets[0], (0.005, 1));
        assert_eq!(hist.buckets[3], (0.05, 2));
        assert_eq!(hist.buckets.last().unwrap(), &(10.0, 2));
        assert!((hist.sum_seconds - 30.043).abs() < 1e-9);
    }

    #[test]
    fn boundary_value_falls_in_its_bucket() {
        let registry = MetricsRegistry::new();
        registry.observe_duration(Method::Get, "/x", Duration::from_millis(5));
        let snap = registry.snapshot();
        assert_eq!(snap.histogram(Method::Get, "/x").unwrap().buckets[0].1, 1);
    }

    #[test]
    fn render_emits_prometheus_text() {
        let registry = MetricsRegistry::new();
        registry.increment_request_count(Method::Get, "/api/v1/business/crm", StatusCode::OK);
        registry.observe_duration(Method::Get, "/api/v1/business/crm", Duration::from_millis(2));

        let text = registry.snapshot().render();
        assert!(text.contains("# TYPE http_requests_total counter"));
        assert!(text.contains(
            r#"http_requests_total{method="GET",path="/api/v1/business/crm",status="200"} 1"#
        ));
        assert!(text.contains(
            r#"http_request_duration_seconds_bucket{method="GET",path="/api/v1/business/crm",le="0.005"} 1"#
        ));
        assert!(text.contains(
            r#"http_request_duration_seconds_bucket{method="GET",path="/api/v1/business/crm",le="+Inf"} 1"#
        ));
        assert!(text.contains(r#"http_request_duration_seconds_count{method="GET",path="/api/v1/business/crm"} 1"#));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label("a\"b\\c\n"), "a\\\"b\\\\c\\n");
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let registry = Arc::new(MetricsRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let route = format!("/r{}", (t + i) % 4);
                        registry.increment_request_count(Method::Get, &route, StatusCode::OK);
                        registry.observe_duration(Method::Get, &route, Duration::from_micros(i));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let snap = registry.snapshot();
        assert_eq!(snap.total_requests(), 4_000);
        assert_eq!(snap.total_observations(), 4_000);
        assert_eq!(snap.requests.len(), 4);
    }
}
