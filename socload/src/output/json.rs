use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use serde::Serialize;

use socload_core::{MergedSummary, ProgressFn, RunConfig, TrafficRegistry};

use super::OutputFormatter;

pub(crate) struct JsonOutput {
    headless: bool,
}

impl JsonOutput {
    pub(crate) fn new(headless: bool) -> Self {
        Self { headless }
    }
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _cfg: &RunConfig, _registry: &TrafficRegistry) {}

    fn progress(&self) -> Option<ProgressFn> {
        if self.headless {
            return None;
        }

        Some(Arc::new(move |u| {
            let line = JsonProgressLine {
                kind: "progress",
                elapsed_secs: u.elapsed.as_secs(),
                running_users: u.running_users,
                requests_total: u.requests_total,
                failed_requests_total: u.failed_requests_total,
                requests_per_sec: u.rps_now,
            };
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, merged: &MergedSummary) -> anyhow::Result<()> {
        let line = build_summary_line(merged);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct JsonProgressLine {
    kind: &'static str,
    elapsed_secs: u64,
    running_users: u64,
    requests_total: u64,
    failed_requests_total: u64,
    requests_per_sec: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub workers_total: u32,
    pub unreachable_workers: Vec<JsonUnreachableWorker>,
    pub totals: JsonTotals,
    pub by_type: BTreeMap<String, JsonTypeCounts>,
    pub failures_by_kind: BTreeMap<String, u64>,
    pub latency: Option<JsonLatencySummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonUnreachableWorker {
    pub worker_id: u32,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTotals {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub status_2xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
    pub run_duration_ms: u64,
    pub requests_per_sec: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTypeCounts {
    pub requests: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub mean_ms: f64,
    pub stdev_ms: f64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

pub(crate) fn build_summary_line(merged: &MergedSummary) -> JsonSummaryLine {
    let s = &merged.summary;

    JsonSummaryLine {
        kind: "summary",
        workers_total: merged.workers_total,
        unreachable_workers: merged
            .unreachable
            .iter()
            .map(|w| JsonUnreachableWorker {
                worker_id: w.worker_id,
                reason: w.reason.clone(),
            })
            .collect(),
        totals: JsonTotals {
            requests_total: s.requests_total,
            failed_requests_total: s.failed_requests_total,
            status_2xx: s.status_2xx,
            status_4xx: s.status_4xx,
            status_5xx: s.status_5xx,
            run_duration_ms: s.run_duration_ms,
            requests_per_sec: s.rps,
        },
        by_type: s
            .by_type
            .iter()
            .map(|(ty, counts)| {
                (
                    ty.to_string(),
                    JsonTypeCounts {
                        requests: counts.requests,
                        failed: counts.failed,
                    },
                )
            })
            .collect(),
        failures_by_kind: s.failures_by_kind.clone(),
        latency: s.latency.as_ref().map(|l| JsonLatencySummary {
            mean_ms: l.mean_ms,
            stdev_ms: l.stdev_ms,
            max_ms: l.max_ms,
            p50_ms: l.p50_ms,
            p90_ms: l.p90_ms,
            p95_ms: l.p95_ms,
            p99_ms: l.p99_ms,
        }),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use socload_core::{RunSummary, ThreatType, TypeSummary};
    use std::time::Duration;

    #[test]
    fn summary_line_has_kind_and_totals() {
        let mut summary = RunSummary::empty(Duration::from_secs(3));
        summary.requests_total = 9;
        summary.failed_requests_total = 1;
        summary.by_type.insert(
            ThreatType::GeoAnomaly,
            TypeSummary {
                requests: 9,
                failed: 1,
            },
        );

        let line = build_summary_line(&MergedSummary::from_single(summary));
        let v: Value = match serde_json::to_value(&line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(
            v.pointer("/totals/requests_total").and_then(Value::as_u64),
            Some(9)
        );
        assert_eq!(
            v.pointer("/by_type/geo_anomaly/requests")
                .and_then(Value::as_u64),
            Some(9)
        );
        assert_eq!(v.get("workers_total").and_then(Value::as_u64), Some(1));
    }
}
