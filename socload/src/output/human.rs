use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use socload_core::{MergedSummary, ProgressFn, RunConfig, Selection, TrafficRegistry};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    headless: bool,
    progress: Arc<RunProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new(headless: bool) -> Self {
        Self {
            headless,
            progress: Arc::new(RunProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, cfg: &RunConfig, registry: &TrafficRegistry) {
        println!("target: {}", cfg.host);
        println!(
            "population: {} users, spawn rate {}/s, duration {}",
            cfg.target_population,
            format_rate(cfg.spawn_rate),
            cfg.duration
                .map_or_else(|| "unbounded".to_string(), format_duration),
        );
        for class in registry.classes() {
            println!(
                "class: {} weight={} wait={}..{} threats={}",
                class.name,
                class.weight,
                format_duration(class.pacing.min),
                format_duration(class.pacing.max),
                format_selection(&class.selection)
            );
        }
        println!();

        self.progress.set_total(cfg.duration);
    }

    fn progress(&self) -> Option<ProgressFn> {
        if self.headless {
            return None;
        }

        let progress = self.progress.clone();
        Some(Arc::new(move |u| {
            let message = format!(
                "users={} requests={} failed={} rps={}",
                u.running_users,
                u.requests_total,
                u.failed_requests_total,
                format_rate(u.rps_now)
            );
            progress.update(u.elapsed, message);
        }))
    }

    fn print_summary(&self, merged: &MergedSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(merged));

        if merged.is_partial() {
            eprintln!("unreachable workers: {}", merged.unreachable.len());
            for w in &merged.unreachable {
                eprintln!("  worker {}: {}", w.worker_id, w.reason);
            }
        }

        Ok(())
    }
}

struct RunProgress {
    inner: Mutex<Inner>,
}

struct Inner {
    bar: Option<ProgressBar>,
    total: Option<Duration>,
}

impl RunProgress {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                bar: None,
                total: None,
            }),
        }
    }

    fn set_total(&self, total: Option<Duration>) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.total = total;
    }

    fn update(&self, elapsed: Duration, message: String) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let total = inner.total;
        let bar = inner.bar.get_or_insert_with(|| new_bar(total));
        bar.set_message(message);

        match total {
            Some(total) => {
                let total_ms = total.as_millis() as u64;
                let elapsed_ms = elapsed.as_millis() as u64;
                bar.set_length(total_ms);
                bar.set_position(elapsed_ms.min(total_ms));
            }
            None => bar.tick(),
        }
    }

    fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(bar) = inner.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn new_bar(total: Option<Duration>) -> ProgressBar {
    let bar = match total {
        Some(_) => {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("[ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█░"),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        }
    };
    bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
    bar
}

fn render(merged: &MergedSummary) -> String {
    let s = &merged.summary;
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  requests: {} (failed {})",
        s.requests_total, s.failed_requests_total
    )
    .ok();
    writeln!(
        &mut out,
        "  status: 2xx={} 4xx={} 5xx={}",
        s.status_2xx, s.status_4xx, s.status_5xx
    )
    .ok();
    writeln!(
        &mut out,
        "  duration: {} rps={}",
        format_duration(Duration::from_millis(s.run_duration_ms)),
        format_rate(s.rps)
    )
    .ok();

    if !s.by_type.is_empty() {
        out.push_str("  by threat type:\n");
        let mut types: Vec<_> = s.by_type.iter().collect();
        types.sort_by(|(a_ty, a), (b_ty, b)| {
            b.requests.cmp(&a.requests).then_with(|| a_ty.cmp(b_ty))
        });
        for (ty, counts) in types {
            writeln!(
                &mut out,
                "    {ty}: {} (failed {})",
                counts.requests, counts.failed
            )
            .ok();
        }
    }

    if !s.failures_by_kind.is_empty() {
        out.push_str("  failures:\n");
        let mut kinds: Vec<_> = s.failures_by_kind.iter().collect();
        kinds.sort_by(|(a_kind, a), (b_kind, b)| b.cmp(a).then_with(|| a_kind.cmp(b_kind)));
        for (kind, count) in kinds {
            writeln!(&mut out, "    {kind}: {count}").ok();
        }
    }

    match &s.latency {
        Some(l) => {
            writeln!(
                &mut out,
                "  latency = p50={}ms p90={}ms p95={}ms p99={}ms mean={:.1}ms max={}ms",
                l.p50_ms, l.p90_ms, l.p95_ms, l.p99_ms, l.mean_ms, l.max_ms
            )
            .ok();
        }
        None => out.push_str("  latency: n/a\n"),
    }

    if merged.workers_total > 1 {
        writeln!(
            &mut out,
            "  workers: {} (unreachable {})",
            merged.workers_total,
            merged.unreachable.len()
        )
        .ok();
    }

    out
}

fn format_selection(selection: &Selection) -> String {
    match selection {
        Selection::Uniform(types) => types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
        Selection::Weighted(entries) => entries
            .iter()
            .map(|(ty, w)| format!("{ty}:{w}"))
            .collect::<Vec<_>>()
            .join(","),
    }
}

fn format_rate(v: f64) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    if v < 10.0 {
        format!("{v:.1}")
    } else {
        format!("{v:.0}")
    }
}

fn format_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        return format!("{}ms", d.as_millis());
    }
    humantime::format_duration(Duration::from_secs(d.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use socload_core::{RunSummary, UnreachableWorker};

    #[test]
    fn render_includes_totals_and_types() {
        let mut summary = RunSummary::empty(Duration::from_secs(10));
        summary.requests_total = 42;
        summary.failed_requests_total = 2;
        summary.status_2xx = 40;
        summary.status_5xx = 2;
        summary.rps = 4.2;
        summary
            .by_type
            .insert(socload_core::ThreatType::BotTraffic, socload_core::TypeSummary {
                requests: 42,
                failed: 2,
            });
        summary.failures_by_kind.insert("http_status:500".to_string(), 2);

        let out = render(&MergedSummary::from_single(summary));
        assert!(out.contains("requests: 42 (failed 2)"), "{out}");
        assert!(out.contains("bot_traffic: 42 (failed 2)"), "{out}");
        assert!(out.contains("http_status:500: 2"), "{out}");
        assert!(out.contains("latency: n/a"), "{out}");
        assert!(!out.contains("workers:"), "{out}");
    }

    #[test]
    fn render_shows_worker_counts_for_distributed_runs() {
        let merged = MergedSummary {
            summary: RunSummary::empty(Duration::from_secs(1)),
            workers_total: 3,
            unreachable: vec![UnreachableWorker {
                worker_id: 2,
                reason: "exited with status 1".to_string(),
            }],
        };

        let out = render(&merged);
        assert!(out.contains("workers: 3 (unreachable 1)"), "{out}");
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
    }
}
