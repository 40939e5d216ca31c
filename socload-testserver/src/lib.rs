//! In-process stand-in for the threat-analysis backend, used by integration
//! and e2e tests. Accepts the trigger endpoint, counts requests per threat
//! type, and can inject latency and periodic failures.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_TRIGGER: &str = "/api/threats/trigger";

pub const THREAT_TYPES: [&str; 6] = [
    "bot_traffic",
    "proxy_network",
    "device_compromise",
    "anomaly_detection",
    "rate_limit_breach",
    "geo_anomaly",
];

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    rejected_total: Arc<AtomicU64>,
    injected_failures: Arc<AtomicU64>,
    by_type: Arc<[AtomicU64; THREAT_TYPES.len()]>,
}

impl TestServerStats {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Requests rejected with 400 (unknown type or malformed body).
    pub fn rejected_total(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }

    /// Requests that were answered 500 by fail-every injection.
    pub fn injected_failures(&self) -> u64 {
        self.injected_failures.load(Ordering::Relaxed)
    }

    pub fn requests_for(&self, threat_type: &str) -> u64 {
        THREAT_TYPES
            .iter()
            .position(|t| *t == threat_type)
            .map(|i| self.by_type[i].load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Behavior knobs for the simulated backend.
#[derive(Debug, Clone, Default)]
pub struct TestServerOptions {
    /// Added to every trigger response before answering.
    pub response_latency: Option<Duration>,
    /// Every Nth valid trigger returns 500 instead of 200.
    pub fail_every: Option<u64>,
}

#[derive(Clone)]
struct AppState {
    stats: TestServerStats,
    options: TestServerOptions,
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    threat_type: String,
}

async fn handle_trigger(State(state): State<AppState>, body: Bytes) -> (StatusCode, Bytes) {
    let n = state.stats.requests_total.fetch_add(1, Ordering::Relaxed) + 1;

    if let Some(latency) = state.options.response_latency {
        sleep(latency).await;
    }

    let req: TriggerRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            state.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
            return (StatusCode::BAD_REQUEST, Bytes::from_static(b"bad json"));
        }
    };

    let Some(idx) = THREAT_TYPES.iter().position(|t| *t == req.threat_type) else {
        state.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
        return (
            StatusCode::BAD_REQUEST,
            Bytes::from_static(b"unknown threat type"),
        );
    };
    state.stats.by_type[idx].fetch_add(1, Ordering::Relaxed);

    if let Some(every) = state.options.fail_every
        && every > 0
        && n % every == 0
    {
        state.stats.injected_failures.fetch_add(1, Ordering::Relaxed);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"injected failure"),
        );
    }

    (StatusCode::OK, Bytes::from_static(b"{\"status\":\"queued\"}"))
}

pub fn router(stats: TestServerStats, options: TestServerOptions) -> Router {
    Router::new()
        .route(PATH_TRIGGER, post(handle_trigger))
        .with_state(AppState { stats, options })
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    trigger_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(options: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone(), options);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let base_url = format!("http://{addr}");
        let trigger_url = format!("{base_url}{PATH_TRIGGER}");

        Ok(Self {
            addr,
            base_url,
            trigger_url,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn trigger_url(&self) -> &str {
        &self.trigger_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
