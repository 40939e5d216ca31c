use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use socload_core::{
    PacingRange, ProgressUpdate, RunConfig, RunContext, Selection, ThreatType, TrafficClass,
    TrafficRegistry, run_population,
};
use socload_testserver::{TestServer, TestServerOptions};

fn fast_registry(selection: Selection) -> TrafficRegistry {
    let classes = vec![TrafficClass {
        name: "fast".to_string(),
        weight: 1,
        pacing: PacingRange::fixed(Duration::from_millis(5)),
        selection,
    }];
    match TrafficRegistry::new(classes) {
        Ok(reg) => reg,
        Err(err) => panic!("registry invalid: {err}"),
    }
}

#[tokio::test]
async fn timed_run_issues_requests_and_summarizes() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let mut cfg = RunConfig::new(server.base_url(), 4, 100.0);
    cfg.duration = Some(Duration::from_millis(500));

    let registry = fast_registry(Selection::Uniform(vec![ThreatType::BotTraffic]));
    let ctx = RunContext::new(&cfg, registry)?;

    let summary = run_population(&ctx, &cfg, None).await?;

    assert!(summary.requests_total > 0, "expected traffic");
    assert_eq!(summary.failed_requests_total, 0);
    assert_eq!(summary.status_2xx, summary.requests_total);
    assert_eq!(
        summary.by_type[&ThreatType::BotTraffic].requests,
        summary.requests_total
    );
    assert_eq!(
        server.stats().requests_for("bot_traffic"),
        summary.requests_total
    );
    assert!(summary.latency.is_some());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn failed_responses_are_counted_but_never_stop_a_user() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        response_latency: None,
        fail_every: Some(2),
    })
    .await?;

    let mut cfg = RunConfig::new(server.base_url(), 2, 100.0);
    cfg.duration = Some(Duration::from_millis(500));

    let registry = fast_registry(Selection::Uniform(vec![ThreatType::RateLimitBreach]));
    let ctx = RunContext::new(&cfg, registry)?;

    let summary = run_population(&ctx, &cfg, None).await?;

    // Every other request gets a 500; the users keep going regardless.
    assert!(summary.requests_total >= 4);
    assert!(summary.failed_requests_total > 0);
    assert!(summary.failed_requests_total < summary.requests_total);
    assert_eq!(summary.status_5xx, summary.failed_requests_total);
    assert_eq!(
        summary.failures_by_kind["http_status:500"],
        summary.failed_requests_total
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn population_never_overshoots_the_target() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let mut cfg = RunConfig::new(server.base_url(), 3, 1000.0);
    cfg.duration = Some(Duration::from_millis(400));

    let registry = fast_registry(Selection::Uniform(vec![ThreatType::GeoAnomaly]));
    let ctx = RunContext::new(&cfg, registry)?;
    let stats = ctx.stats.clone();

    run_population(&ctx, &cfg, None).await?;

    assert!(stats.running_users_peak() <= 3);
    assert_eq!(stats.running_users(), 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn ramp_reaches_the_target_within_a_spawn_interval() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    // 5 users at 50/s need 100ms of ramp; a 1s run leaves ample slack.
    let mut cfg = RunConfig::new(server.base_url(), 5, 50.0);
    cfg.duration = Some(Duration::from_secs(1));

    let registry = fast_registry(Selection::Uniform(vec![ThreatType::BotTraffic]));
    let ctx = RunContext::new(&cfg, registry)?;
    let stats = ctx.stats.clone();

    run_population(&ctx, &cfg, None).await?;

    assert_eq!(stats.running_users_peak(), 5);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn zero_population_runs_and_issues_nothing() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let mut cfg = RunConfig::new(server.base_url(), 0, 1.0);
    cfg.duration = Some(Duration::from_millis(200));

    let registry = fast_registry(Selection::Uniform(vec![ThreatType::ProxyNetwork]));
    let ctx = RunContext::new(&cfg, registry)?;

    let summary = run_population(&ctx, &cfg, None).await?;
    assert_eq!(summary.requests_total, 0);
    assert_eq!(server.stats().requests_total(), 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn external_stop_ends_an_unbounded_run() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    // No duration: the run ends only on the stop signal.
    let cfg = RunConfig::new(server.base_url(), 2, 100.0);

    let registry = fast_registry(Selection::Uniform(vec![ThreatType::DeviceCompromise]));
    let ctx = RunContext::new(&cfg, registry)?;

    let stop = ctx.stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop.stop();
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        run_population(&ctx, &cfg, None),
    )
    .await??;

    assert!(summary.requests_total > 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn progress_callback_observes_the_run() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let mut cfg = RunConfig::new(server.base_url(), 2, 100.0);
    cfg.duration = Some(Duration::from_millis(1500));

    let registry = fast_registry(Selection::Uniform(vec![ThreatType::AnomalyDetection]));
    let ctx = RunContext::new(&cfg, registry)?;

    let ticks = Arc::new(AtomicU64::new(0));
    let seen = ticks.clone();
    let progress: socload_core::ProgressFn = Arc::new(move |update: ProgressUpdate| {
        assert!(update.running_users <= 2);
        seen.fetch_add(1, Ordering::Relaxed);
    });

    run_population(&ctx, &cfg, Some(progress)).await?;
    assert!(ticks.load(Ordering::Relaxed) >= 1);

    server.shutdown().await;
    Ok(())
}
