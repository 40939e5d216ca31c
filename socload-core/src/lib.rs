#![forbid(unsafe_code)]

mod backend;
mod config;
mod context;
mod coordinator;
mod error;
mod population;
mod selector;
mod stats;
mod threat;
mod traffic;
mod user;

pub use backend::{BackendClient, TRIGGER_PATH};
pub use config::{DEFAULT_REQUEST_TIMEOUT, RunConfig};
pub use context::{RunContext, StopSignal};
pub use coordinator::{
    MergedSummary, UnreachableWorker, WorkerCommand, WorkerOutcome, WorkerReport, merge_outcomes,
    partition_population,
};
pub use error::{ConfigError, Error, Result};
pub use population::{ProgressFn, ProgressUpdate, run_population};
pub use selector::TrafficSelector;
pub use stats::{
    LatencySummary, OutcomeStatus, RequestOutcome, RunStats, RunSummary, TypeSummary,
};
pub use threat::ThreatType;
pub use traffic::{PacingRange, Selection, TrafficClass, TrafficRegistry};
