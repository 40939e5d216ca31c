use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::RunConfig;
use crate::error::Result;
use crate::stats::{RunSummary, latency_summary, new_latency_histogram, recorded_pairs};
use crate::traffic::TrafficRegistry;

/// Split a total population as evenly as possible across `workers` shares;
/// the remainder goes to the first workers.
pub fn partition_population(total: u64, workers: u32) -> Vec<u64> {
    if workers == 0 {
        return Vec::new();
    }

    let workers = u64::from(workers);
    let base = total / workers;
    let remainder = total % workers;

    (0..workers)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// One JSON line from the controller to a worker's stdin: the worker's
/// population share plus the run parameters, spawn rate and duration
/// forwarded unchanged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkerCommand {
    pub worker_id: u32,
    pub config: RunConfig,
    pub registry: TrafficRegistry,
}

impl WorkerCommand {
    pub fn new(worker_id: u32, cfg: &RunConfig, registry: &TrafficRegistry, share: u64) -> Self {
        let mut config = cfg.clone();
        config.target_population = share;
        Self {
            worker_id,
            config,
            registry: registry.clone(),
        }
    }

    /// Re-validate on the worker side; the registry deserializer already
    /// enforces class invariants.
    pub fn into_parts(self) -> Result<(RunConfig, TrafficRegistry)> {
        self.config.validate()?;
        Ok((self.config, self.registry))
    }
}

/// One JSON line back from a worker's stdout.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkerReport {
    pub worker_id: u32,
    pub summary: RunSummary,
}

/// What the controller got out of one worker.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Report(WorkerReport),
    /// The worker could not be spawned, exited abnormally, or produced no
    /// parseable report. Its contribution is missing, not zero.
    Unreachable { worker_id: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UnreachableWorker {
    pub worker_id: u32,
    pub reason: String,
}

/// Cross-worker aggregate. `unreachable` workers are reported explicitly;
/// the run still produces a summary from the workers that answered.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MergedSummary {
    pub summary: RunSummary,
    pub workers_total: u32,
    pub unreachable: Vec<UnreachableWorker>,
}

impl MergedSummary {
    /// Wrap a single-process run so reporting has one shape.
    pub fn from_single(summary: RunSummary) -> Self {
        Self {
            summary,
            workers_total: 1,
            unreachable: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.unreachable.is_empty()
    }
}

/// Merge worker outcomes by summing counts and re-recording each worker's
/// sparse latency histogram into one merged histogram. Percentiles are
/// computed from the merged histogram, never averaged across workers.
pub fn merge_outcomes(outcomes: Vec<WorkerOutcome>) -> MergedSummary {
    let workers_total = outcomes.len() as u32;

    let mut merged = RunSummary::empty(Duration::ZERO);
    let mut by_type: BTreeMap<_, crate::stats::TypeSummary> = BTreeMap::new();
    let mut failures_by_kind: BTreeMap<String, u64> = BTreeMap::new();
    let mut hist = new_latency_histogram();
    let mut unreachable = Vec::new();

    for outcome in outcomes {
        let report = match outcome {
            WorkerOutcome::Report(r) => r,
            WorkerOutcome::Unreachable { worker_id, reason } => {
                unreachable.push(UnreachableWorker { worker_id, reason });
                continue;
            }
        };
        let s = report.summary;

        merged.requests_total += s.requests_total;
        merged.failed_requests_total += s.failed_requests_total;
        merged.status_2xx += s.status_2xx;
        merged.status_4xx += s.status_4xx;
        merged.status_5xx += s.status_5xx;
        merged.run_duration_ms = merged.run_duration_ms.max(s.run_duration_ms);

        for (ty, counts) in s.by_type {
            let entry = by_type.entry(ty).or_default();
            entry.requests += counts.requests;
            entry.failed += counts.failed;
        }
        for (kind, n) in s.failures_by_kind {
            *failures_by_kind.entry(kind).or_insert(0) += n;
        }
        for (value_us, count) in s.latency_recorded_us {
            let _ = hist.record_n(value_us, count);
        }
    }

    merged.by_type = by_type;
    merged.failures_by_kind = failures_by_kind;
    merged.latency = latency_summary(&hist);
    merged.latency_recorded_us = recorded_pairs(&hist);

    let secs = (merged.run_duration_ms as f64 / 1000.0).max(1e-9);
    merged.rps = merged.requests_total as f64 / secs;

    MergedSummary {
        summary: merged,
        workers_total,
        unreachable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{OutcomeStatus, RequestOutcome, RunStats};
    use crate::threat::ThreatType;
    use std::time::SystemTime;

    #[test]
    fn partition_is_even_with_remainder_up_front() {
        assert_eq!(partition_population(10, 3), vec![4, 3, 3]);
        assert_eq!(partition_population(9, 3), vec![3, 3, 3]);
        assert_eq!(partition_population(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(partition_population(0, 2), vec![0, 0]);
        assert_eq!(partition_population(5, 0), Vec::<u64>::new());
    }

    #[test]
    fn partition_preserves_the_total() {
        for total in [0u64, 1, 7, 100, 1001] {
            for workers in [1u32, 2, 3, 8] {
                let parts = partition_population(total, workers);
                assert_eq!(parts.iter().sum::<u64>(), total);
                let max = parts.iter().max().copied().unwrap_or(0);
                let min = parts.iter().min().copied().unwrap_or(0);
                assert!(max - min <= 1, "uneven partition: {parts:?}");
            }
        }
    }

    fn worker_summary(requests: u64, latency_ms: u64) -> RunSummary {
        let stats = RunStats::default();
        for _ in 0..requests {
            stats.record_outcome(RequestOutcome {
                threat: ThreatType::BotTraffic,
                at: SystemTime::now(),
                latency: Duration::from_millis(latency_ms),
                status: OutcomeStatus::Http(200),
            });
        }
        stats.summarize(Duration::from_secs(10))
    }

    #[test]
    fn merged_total_equals_sum_of_reachable_workers() {
        let outcomes = vec![
            WorkerOutcome::Report(WorkerReport {
                worker_id: 0,
                summary: worker_summary(10, 10),
            }),
            WorkerOutcome::Report(WorkerReport {
                worker_id: 1,
                summary: worker_summary(7, 30),
            }),
        ];

        let merged = merge_outcomes(outcomes);
        assert_eq!(merged.summary.requests_total, 17);
        assert_eq!(merged.workers_total, 2);
        assert!(!merged.is_partial());
        assert_eq!(
            merged.summary.by_type[&ThreatType::BotTraffic].requests,
            17
        );
    }

    #[test]
    fn unreachable_worker_is_flagged_not_zeroed() {
        let outcomes = vec![
            WorkerOutcome::Report(WorkerReport {
                worker_id: 0,
                summary: worker_summary(5, 10),
            }),
            WorkerOutcome::Unreachable {
                worker_id: 1,
                reason: "exited with status 1".to_string(),
            },
        ];

        let merged = merge_outcomes(outcomes);
        assert_eq!(merged.summary.requests_total, 5);
        assert_eq!(merged.workers_total, 2);
        assert!(merged.is_partial());
        assert_eq!(merged.unreachable.len(), 1);
        assert_eq!(merged.unreachable[0].worker_id, 1);
    }

    #[test]
    fn latency_merges_by_re_recording_not_averaging() {
        // Worker A: 100 fast requests; worker B: 1 slow request. A naive
        // average of per-worker p50s would land mid-way; the merged p50
        // must stay fast.
        let outcomes = vec![
            WorkerOutcome::Report(WorkerReport {
                worker_id: 0,
                summary: worker_summary(100, 10),
            }),
            WorkerOutcome::Report(WorkerReport {
                worker_id: 1,
                summary: worker_summary(1, 5_000),
            }),
        ];

        let merged = merge_outcomes(outcomes);
        let lat = match merged.summary.latency {
            Some(l) => l,
            None => panic!("expected merged latency"),
        };
        assert!(lat.p50_ms < 100, "merged p50 {} should stay fast", lat.p50_ms);
        assert!(lat.max_ms >= 4_900, "merged max {} lost the slow tail", lat.max_ms);

        let count: u64 = merged
            .summary
            .latency_recorded_us
            .iter()
            .map(|(_, n)| n)
            .sum();
        assert_eq!(count, 101);
    }

    #[test]
    fn command_round_trip_preserves_share() -> Result<()> {
        let cfg = RunConfig::new("http://localhost:8000", 10, 2.0);
        let registry = TrafficRegistry::default_profile();
        let cmd = WorkerCommand::new(1, &cfg, &registry, 4);

        let json = serde_json::to_string(&cmd)?;
        let back: WorkerCommand = serde_json::from_str(&json)?;
        assert_eq!(back, cmd);

        let (worker_cfg, worker_reg) = back.into_parts()?;
        assert_eq!(worker_cfg.target_population, 4);
        assert_eq!(worker_cfg.spawn_rate, 2.0);
        assert_eq!(worker_reg, registry);
        Ok(())
    }
}
