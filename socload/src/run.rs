use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::process::Command;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::scenario_yaml::{self, ScenarioYaml, YamlDuration};
use crate::output;

use socload_core::{
    MergedSummary, ProgressFn, RunConfig, RunContext, StopSignal, TrafficRegistry,
    WorkerCommand, WorkerOutcome, WorkerReport, merge_outcomes, partition_population,
    run_population,
};

/// Defaults matching the built-in profile's intended scale.
const DEFAULT_USERS: u64 = 10;
const DEFAULT_SPAWN_RATE: f64 = 2.0;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    if args.workers == 0 {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "--workers must be at least 1"
        )));
    }

    let scenario = match &args.scenario {
        Some(path) => Some(
            scenario_yaml::load_scenario(path)
                .await
                .map_err(RunError::InvalidInput)?,
        ),
        None => None,
    };
    let (cfg, registry) =
        resolve_config(&args, scenario.as_ref()).map_err(RunError::InvalidInput)?;

    let out = output::formatter(args.output, args.headless);
    out.print_header(&cfg, &registry);

    let merged = if args.workers == 1 {
        run_single(&cfg, registry, out.progress()).await?
    } else {
        run_distributed(&cfg, &registry, args.workers).await?
    };

    out.print_summary(&merged).map_err(RunError::RuntimeError)?;

    if merged.is_partial() {
        Ok(ExitCode::PartialResults)
    } else {
        Ok(ExitCode::Success)
    }
}

/// Precedence: CLI flag, then scenario file, then built-in default.
fn resolve_config(
    args: &RunArgs,
    scenario: Option<&ScenarioYaml>,
) -> anyhow::Result<(RunConfig, TrafficRegistry)> {
    let registry = match scenario {
        Some(s) => s.registry()?,
        None => TrafficRegistry::default_profile(),
    };

    let host = args
        .host
        .clone()
        .or_else(|| scenario.and_then(|s| s.host.clone()))
        .context("no target host (pass it as an argument or set `host` in the scenario file)")?;

    let users = args
        .users
        .or_else(|| scenario.and_then(|s| s.users))
        .unwrap_or(DEFAULT_USERS);
    let spawn_rate = args
        .spawn_rate
        .or_else(|| scenario.and_then(|s| s.spawn_rate))
        .unwrap_or(DEFAULT_SPAWN_RATE);

    let mut cfg = RunConfig::new(host, users, spawn_rate);
    cfg.duration = args
        .duration
        .or_else(|| scenario.and_then(|s| s.duration.map(YamlDuration::into_inner)));
    if let Some(timeout) = args
        .request_timeout
        .or_else(|| scenario.and_then(|s| s.request_timeout.map(YamlDuration::into_inner)))
    {
        cfg.request_timeout = timeout;
    }

    cfg.validate()?;
    Ok((cfg, registry))
}

async fn run_single(
    cfg: &RunConfig,
    registry: TrafficRegistry,
    progress: Option<ProgressFn>,
) -> Result<MergedSummary, RunError> {
    let ctx = RunContext::new(cfg, registry)
        .map_err(|err| RunError::InvalidInput(anyhow::Error::from(err)))?;

    let stop = ctx.stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let summary = run_population(&ctx, cfg, progress)
        .await
        .map_err(|err| RunError::RuntimeError(anyhow::Error::from(err)))?;

    Ok(MergedSummary::from_single(summary))
}

/// Split the population across worker subprocesses and merge their reports.
/// A worker that fails to spawn or report is recorded as unreachable; the
/// remaining workers still produce a (partial) summary. On Ctrl-C each
/// worker's stdin is closed, which tells it to wind down and report early.
async fn run_distributed(
    cfg: &RunConfig,
    registry: &TrafficRegistry,
    workers: u32,
) -> Result<MergedSummary, RunError> {
    let exe = std::env::current_exe()
        .context("failed to resolve own executable path")
        .map_err(RunError::RuntimeError)?;

    let stop = Arc::new(StopSignal::new());
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.stop();
            }
        });
    }

    let shares = partition_population(cfg.target_population, workers);
    let mut tasks = Vec::with_capacity(shares.len());
    for (worker_id, share) in shares.into_iter().enumerate() {
        let command = WorkerCommand::new(worker_id as u32, cfg, registry, share);
        tasks.push(tokio::spawn(drive_worker(exe.clone(), command, Arc::clone(&stop))));
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        let outcome = task
            .await
            .context("worker task panicked")
            .map_err(RunError::RuntimeError)?;
        outcomes.push(outcome);
    }

    Ok(merge_outcomes(outcomes))
}

async fn drive_worker(
    exe: PathBuf,
    command: WorkerCommand,
    stop: Arc<StopSignal>,
) -> WorkerOutcome {
    let worker_id = command.worker_id;
    match try_drive_worker(exe, command, stop).await {
        Ok(report) => WorkerOutcome::Report(report),
        Err(err) => WorkerOutcome::Unreachable {
            worker_id,
            reason: format!("{err:#}"),
        },
    }
}

async fn try_drive_worker(
    exe: PathBuf,
    command: WorkerCommand,
    stop: Arc<StopSignal>,
) -> anyhow::Result<WorkerReport> {
    let mut child = Command::new(exe)
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .context("failed to spawn worker process")?;

    let mut stdin = child.stdin.take().context("worker stdin unavailable")?;
    let line = serde_json::to_string(&command).context("failed to encode worker command")?;
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    // Held open until the run stops; closing it is the worker's stop signal.
    let mut stdin = Some(stdin);

    let stdout = child.stdout.take().context("worker stdout unavailable")?;
    let mut lines = BufReader::new(stdout).lines();

    let mut report: Option<WorkerReport> = None;
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Ok(r) = serde_json::from_str::<WorkerReport>(&line) {
                        report = Some(r);
                        break;
                    }
                }
                None => break,
            },
            () = stop.wait(), if stdin.is_some() => {
                drop(stdin.take());
            }
        }
    }

    let status = child.wait().await.context("failed to await worker exit")?;
    let report =
        report.with_context(|| format!("worker exited ({status}) without reporting"))?;
    anyhow::ensure!(
        report.worker_id == command.worker_id,
        "worker id mismatch: sent {}, got {}",
        command.worker_id,
        report.worker_id
    );
    Ok(report)
}
