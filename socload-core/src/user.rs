use std::sync::Arc;

use rand::SeedableRng as _;
use rand::rngs::StdRng;

use crate::backend::BackendClient;
use crate::context::StopSignal;
use crate::error::Result;
use crate::selector::TrafficSelector;
use crate::stats::RunStats;
use crate::traffic::{PacingRange, TrafficClass};

/// A traffic class with its selection distribution compiled, shared by every
/// user assigned to the class.
#[derive(Debug)]
pub(crate) struct CompiledClass {
    pub name: Arc<str>,
    pub pacing: PacingRange,
    pub selector: TrafficSelector,
}

impl CompiledClass {
    pub fn compile(class: &TrafficClass) -> Result<Self> {
        Ok(Self {
            name: Arc::from(class.name.as_str()),
            pacing: class.pacing,
            selector: TrafficSelector::compile(&class.name, &class.selection)?,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UserContext {
    pub class: Arc<CompiledClass>,
    pub backend: Arc<BackendClient>,
    pub stats: Arc<RunStats>,
    pub stop: Arc<StopSignal>,
}

/// One simulated user: select, request, record, wait, repeat.
///
/// Shutdown is cooperative. The stop signal is observed at the top of each
/// iteration and during the pacing sleep; a request already in flight runs
/// to completion (or its timeout) first. A failed request is recorded and
/// the loop continues; a single iteration is exactly one attempt.
pub(crate) async fn run_user(ctx: UserContext) {
    let mut rng = StdRng::from_entropy();

    ctx.stats.user_started();

    loop {
        if ctx.stop.is_stopped() {
            break;
        }

        let threat = ctx.class.selector.select(&mut rng);
        let outcome = ctx.backend.trigger(threat).await;
        ctx.stats.record_outcome(outcome);

        let wait = ctx.class.pacing.next_wait(&mut rng);
        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = ctx.stop.wait() => break,
        }
    }

    ctx.stats.user_stopped();
}
