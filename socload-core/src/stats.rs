use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use hdrhistogram::Histogram;

use socload_http::HttpTransportErrorKind;

use crate::threat::ThreatType;

/// Terminal classification of one request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Backend answered; 2xx counts as success, anything else as failure.
    Http(u16),
    /// The request never completed (connect error, timeout, bad response).
    Transport(HttpTransportErrorKind),
}

/// One completed request attempt. Created by the backend client, handed to
/// the aggregator by value, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub threat: ThreatType,
    pub at: SystemTime,
    pub latency: Duration,
    pub status: OutcomeStatus,
}

impl RequestOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Http(s) if (200..300).contains(&s))
    }
}

#[derive(Debug, Default)]
struct TypeCounters {
    requests: AtomicU64,
    failed: AtomicU64,
}

/// Shared run aggregator. The only mutable state simulated users share;
/// counters are atomics, the latency histogram sits behind a mutex.
#[derive(Debug)]
pub struct RunStats {
    requests_total: AtomicU64,
    failed_requests_total: AtomicU64,
    status_2xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    by_type: [TypeCounters; ThreatType::ALL.len()],
    failures_by_kind: Mutex<HashMap<String, u64>>,
    latency_us: Mutex<Histogram<u64>>,

    running_users: AtomicU64,
    running_users_peak: AtomicU64,
}

impl Default for RunStats {
    fn default() -> Self {
        // Track up to 60s in microseconds (with 3 sigfigs).
        let hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)
            .unwrap_or_else(|err| panic!("failed to init histogram: {err}"));

        Self {
            requests_total: AtomicU64::new(0),
            failed_requests_total: AtomicU64::new(0),
            status_2xx: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            by_type: Default::default(),
            failures_by_kind: Mutex::new(HashMap::new()),
            latency_us: Mutex::new(hist),
            running_users: AtomicU64::new(0),
            running_users_peak: AtomicU64::new(0),
        }
    }
}

impl RunStats {
    pub fn record_outcome(&self, outcome: RequestOutcome) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let counters = &self.by_type[outcome.threat.index()];
        counters.requests.fetch_add(1, Ordering::Relaxed);

        let failed = !outcome.is_success();
        if failed {
            self.failed_requests_total.fetch_add(1, Ordering::Relaxed);
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }

        match outcome.status {
            OutcomeStatus::Http(status) => {
                match status {
                    200..=299 => {
                        self.status_2xx.fetch_add(1, Ordering::Relaxed);
                    }
                    400..=499 => {
                        self.status_4xx.fetch_add(1, Ordering::Relaxed);
                    }
                    500..=599 => {
                        self.status_5xx.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
                if status >= 400 {
                    self.record_failure_kind(&format!("http_status:{status}"));
                }
            }
            OutcomeStatus::Transport(kind) => {
                self.record_failure_kind(&format!("http_error:{kind}"));
            }
        }

        self.record_latency(outcome.latency);
    }

    fn record_failure_kind(&self, kind: &str) {
        let mut map = self
            .failures_by_kind
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match map.get_mut(kind) {
            Some(n) => *n = n.saturating_add(1),
            None => {
                map.insert(kind.to_string(), 1);
            }
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        let us = elapsed.as_micros();
        if us == 0 {
            return;
        }

        let mut h = self
            .latency_us
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = h.record(us as u64);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn failed_requests_total(&self) -> u64 {
        self.failed_requests_total.load(Ordering::Relaxed)
    }

    pub fn user_started(&self) {
        let now = self.running_users.fetch_add(1, Ordering::Relaxed) + 1;
        self.running_users_peak.fetch_max(now, Ordering::Relaxed);
    }

    pub fn user_stopped(&self) {
        self.running_users.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn running_users(&self) -> u64 {
        self.running_users.load(Ordering::Relaxed)
    }

    /// High-water mark of concurrently running users over the run.
    pub fn running_users_peak(&self) -> u64 {
        self.running_users_peak.load(Ordering::Relaxed)
    }

    pub fn summarize(&self, elapsed: Duration) -> RunSummary {
        let requests_total = self.requests_total.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64().max(1e-9);

        let mut by_type = BTreeMap::new();
        for ty in ThreatType::ALL {
            let counters = &self.by_type[ty.index()];
            let requests = counters.requests.load(Ordering::Relaxed);
            if requests == 0 {
                continue;
            }
            by_type.insert(
                ty,
                TypeSummary {
                    requests,
                    failed: counters.failed.load(Ordering::Relaxed),
                },
            );
        }

        let failures_by_kind = {
            let map = self
                .failures_by_kind
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };

        let (latency, latency_recorded_us) = {
            let h = self
                .latency_us
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (latency_summary(&h), recorded_pairs(&h))
        };

        RunSummary {
            requests_total,
            failed_requests_total: self.failed_requests_total.load(Ordering::Relaxed),
            status_2xx: self.status_2xx.load(Ordering::Relaxed),
            status_4xx: self.status_4xx.load(Ordering::Relaxed),
            status_5xx: self.status_5xx.load(Ordering::Relaxed),
            by_type,
            failures_by_kind,
            run_duration_ms: elapsed.as_millis() as u64,
            rps: requests_total as f64 / secs,
            latency,
            latency_recorded_us,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TypeSummary {
    pub requests: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub stdev_ms: f64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Per-worker (and merged) aggregate of one run. Serializable: workers ship
/// it to the coordinator as one JSON line.
///
/// `latency_recorded_us` carries the sparse histogram contents so merging
/// across workers re-records counts instead of averaging pre-computed
/// percentiles.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub status_2xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
    pub by_type: BTreeMap<ThreatType, TypeSummary>,
    pub failures_by_kind: BTreeMap<String, u64>,
    pub run_duration_ms: u64,
    pub rps: f64,
    pub latency: Option<LatencySummary>,
    pub latency_recorded_us: Vec<(u64, u64)>,
}

impl RunSummary {
    /// An all-zero summary (used for an idle worker share of 0 users).
    pub fn empty(elapsed: Duration) -> Self {
        Self {
            requests_total: 0,
            failed_requests_total: 0,
            status_2xx: 0,
            status_4xx: 0,
            status_5xx: 0,
            by_type: BTreeMap::new(),
            failures_by_kind: BTreeMap::new(),
            run_duration_ms: elapsed.as_millis() as u64,
            rps: 0.0,
            latency: None,
            latency_recorded_us: Vec::new(),
        }
    }
}

pub(crate) fn latency_summary(h: &Histogram<u64>) -> Option<LatencySummary> {
    #[allow(clippy::len_zero)]
    if h.len() == 0 {
        return None;
    }

    Some(LatencySummary {
        mean_ms: h.mean() / 1000.0,
        stdev_ms: h.stdev() / 1000.0,
        max_ms: h.max() / 1000,
        p50_ms: h.value_at_quantile(0.50) / 1000,
        p90_ms: h.value_at_quantile(0.90) / 1000,
        p95_ms: h.value_at_quantile(0.95) / 1000,
        p99_ms: h.value_at_quantile(0.99) / 1000,
    })
}

pub(crate) fn recorded_pairs(h: &Histogram<u64>) -> Vec<(u64, u64)> {
    h.iter_recorded()
        .map(|v| (v.value_iterated_to(), v.count_at_value()))
        .collect()
}

pub(crate) fn new_latency_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)
        .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
}
