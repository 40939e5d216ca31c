use std::time::Duration;

use crate::error::ConfigError;

/// Every backend request carries a bounded timeout; exceeding it is a failed
/// outcome, not a crash.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Controller-level run configuration, abstracted from CLI flags.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunConfig {
    /// Base URL of the backend under test.
    pub host: String,
    /// Target number of concurrently running simulated users. Zero is a
    /// valid run that issues no requests.
    pub target_population: u64,
    /// Users added per second while ramping toward the target.
    pub spawn_rate: f64,
    /// Run length; `None` runs until an external stop signal.
    pub duration: Option<Duration>,
    pub request_timeout: Duration,
}

impl RunConfig {
    pub fn new(host: impl Into<String>, target_population: u64, spawn_rate: f64) -> Self {
        Self {
            host: host.into(),
            target_population,
            spawn_rate,
            duration: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.spawn_rate.is_finite() && self.spawn_rate > 0.0) {
            return Err(ConfigError::InvalidSpawnRate);
        }

        let parsed = url::Url::parse(&self.host)
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;
        if parsed.scheme() != "http" || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }

        Ok(())
    }
}
