use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::error::Result;
use crate::stats::RunSummary;
use crate::traffic::TrafficRegistry;
use crate::user::{CompiledClass, UserContext, run_user};

/// Assigns newly spawned users to traffic classes proportionally to the
/// registry weights. Largest-deficit quota rule: after n assignments, each
/// class has received within one user of `n * weight / total`.
#[derive(Debug)]
pub(crate) struct ClassAssigner {
    weights: Vec<u64>,
    total: u64,
    assigned: Vec<u64>,
    assigned_total: u64,
}

impl ClassAssigner {
    pub fn new(registry: &TrafficRegistry) -> Self {
        let weights: Vec<u64> = registry
            .classes()
            .iter()
            .map(|c| u64::from(c.weight))
            .collect();
        let total = weights.iter().sum();
        let assigned = vec![0; weights.len()];

        Self {
            weights,
            total,
            assigned,
            assigned_total: 0,
        }
    }

    /// Class index for the next user: the class whose assigned count falls
    /// furthest below its quota. Ties resolve to the earlier class.
    pub fn next(&mut self) -> usize {
        let n = (self.assigned_total + 1) as f64;

        let mut best = 0usize;
        let mut best_deficit = f64::MIN;
        for (i, weight) in self.weights.iter().enumerate() {
            let quota = n * (*weight as f64) / (self.total as f64);
            let deficit = quota - self.assigned[i] as f64;
            if deficit > best_deficit {
                best = i;
                best_deficit = deficit;
            }
        }

        self.assigned[best] += 1;
        self.assigned_total += 1;
        best
    }
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub tick: u64,
    pub elapsed: Duration,
    pub running_users: u64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub rps_now: f64,
}

/// Spawn scheduler granularity. Fine enough that ramp time stays within one
/// spawn interval of `target / spawn_rate`.
const SPAWN_TICK: Duration = Duration::from_millis(100);

/// Ramp the population from 0 to `cfg.target_population` at
/// `cfg.spawn_rate` users per second, hold until the deadline or an
/// external stop, then stop every user cooperatively and fold the final
/// summary.
///
/// Invariants: the number of running users never exceeds the target, and at
/// most `spawn_rate` users start per second (fractional rates accumulate
/// across ticks).
pub async fn run_population(
    ctx: &RunContext,
    cfg: &RunConfig,
    progress: Option<ProgressFn>,
) -> Result<RunSummary> {
    cfg.validate()?;

    let compiled: Vec<Arc<CompiledClass>> = ctx
        .registry
        .classes()
        .iter()
        .map(|c| CompiledClass::compile(c).map(Arc::new))
        .collect::<Result<_>>()?;

    let mut assigner = ClassAssigner::new(&ctx.registry);

    let started = Instant::now();
    let deadline = cfg.duration.map(|d| started + d);

    let progress_handle = progress.map(|progress| {
        let stats = ctx.stats.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            let mut tick_id = 0u64;
            let mut last_at = Instant::now();
            let mut last_requests_total = stats.requests_total();

            loop {
                interval.tick().await;

                tick_id = tick_id.saturating_add(1);
                let now = Instant::now();
                let dt = now.duration_since(last_at);
                last_at = now;

                let requests_total = stats.requests_total();
                let delta = requests_total.saturating_sub(last_requests_total);
                last_requests_total = requests_total;

                (progress)(ProgressUpdate {
                    tick: tick_id,
                    elapsed: started.elapsed(),
                    running_users: stats.running_users(),
                    requests_total,
                    failed_requests_total: stats.failed_requests_total(),
                    rps_now: delta as f64 / dt.as_secs_f64().max(1e-9),
                });
            }
        })
    });

    let mut handles = Vec::with_capacity(cfg.target_population.min(usize::MAX as u64) as usize);
    let mut spawned = 0u64;
    let mut carry = 0.0f64;
    let mut last_tick = started;

    let mut interval = tokio::time::interval(SPAWN_TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if ctx.stop.is_stopped() {
            break;
        }
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            break;
        }

        if spawned < cfg.target_population {
            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f64();
            last_tick = now;

            carry += cfg.spawn_rate * dt;
            let due = carry.floor() as u64;
            carry -= due as f64;

            let to_spawn = due.min(cfg.target_population - spawned);
            for _ in 0..to_spawn {
                let class = compiled[assigner.next()].clone();
                let user_ctx = UserContext {
                    class,
                    backend: ctx.backend.clone(),
                    stats: ctx.stats.clone(),
                    stop: ctx.stop.clone(),
                };
                handles.push(tokio::spawn(run_user(user_ctx)));
                spawned += 1;
            }
        }

        tokio::select! {
            _ = interval.tick() => {}
            () = ctx.stop.wait() => break,
            () = sleep_until_opt(deadline) => break,
        }
    }

    // Cooperative shutdown: users finish their in-flight request first.
    ctx.stop.stop();
    for h in handles {
        h.await?;
    }

    if let Some(h) = progress_handle {
        h.abort();
        let _ = h.await;
    }

    Ok(ctx.stats.summarize(started.elapsed()))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d.into()).await,
        None => std::future::pending().await,
    }
}
