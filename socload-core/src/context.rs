use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::backend::BackendClient;
use crate::config::RunConfig;
use crate::error::Result;
use crate::stats::RunStats;
use crate::traffic::TrafficRegistry;

/// Cooperative shutdown flag. Users check it at the top of every loop
/// iteration and race their pacing sleep against `wait`; an in-flight
/// request is never interrupted.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            if self.is_stopped() {
                return;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flag, so a `stop` landing
            // between the load and the await cannot be missed.
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Explicit per-run state handed to the population controller: the validated
/// traffic registry, the backend client, the shared aggregator, and the stop
/// signal. Created once per run, dropped when the run completes; there is no
/// ambient global registry of active users.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub registry: Arc<TrafficRegistry>,
    pub backend: Arc<BackendClient>,
    pub stats: Arc<RunStats>,
    pub stop: Arc<StopSignal>,
}

impl RunContext {
    pub fn new(cfg: &RunConfig, registry: TrafficRegistry) -> Result<Self> {
        cfg.validate()?;
        let backend = BackendClient::new(&cfg.host, cfg.request_timeout)?;

        Ok(Self {
            registry: Arc::new(registry),
            backend: Arc::new(backend),
            stats: Arc::new(RunStats::default()),
            stop: Arc::new(StopSignal::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::StopSignal;

    #[tokio::test]
    async fn wait_returns_immediately_when_already_stopped() {
        let stop = StopSignal::new();
        stop.stop();

        let waited = tokio::time::timeout(Duration::from_secs(1), stop.wait()).await;
        if waited.is_err() {
            panic!("wait must not block once the signal is set");
        }
    }

    #[tokio::test]
    async fn wait_observes_a_stop_that_races_its_registration() {
        // Interleave stop() with waiters at every yield point the runtime
        // offers; a waiter that registers after notify_waiters fires must
        // still see the flag and return.
        for _ in 0..64 {
            let stop = std::sync::Arc::new(StopSignal::new());

            let waiter = {
                let stop = std::sync::Arc::clone(&stop);
                tokio::spawn(async move { stop.wait().await })
            };
            tokio::task::yield_now().await;
            stop.stop();

            let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => panic!("waiter task failed: {e}"),
                Err(_) => panic!("waiter hung after stop"),
            }
        }
    }
}
