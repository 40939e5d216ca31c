use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;

use socload_http::{HttpClient, HttpRequest};

use crate::error::{ConfigError, Result};
use crate::stats::{OutcomeStatus, RequestOutcome};
use crate::threat::ThreatType;

/// The backend's single operation: submit a threat trigger, get an analysis
/// result back. The response body is opaque to the generator; only status
/// and latency are observed.
pub const TRIGGER_PATH: &str = "/api/threats/trigger";

#[derive(Debug, serde::Serialize)]
struct TriggerRequest {
    threat_type: ThreatType,
}

/// Client for the threat-analysis backend.
///
/// Request bodies for all six threat types are pre-encoded at construction,
/// so the per-request hot path is one clone of a `Bytes` handle.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: HttpClient,
    trigger_url: String,
    timeout: Duration,
    bodies: [Bytes; ThreatType::ALL.len()],
}

impl BackendClient {
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let base = url::Url::parse(host).map_err(|_| ConfigError::InvalidHost(host.to_string()))?;
        let trigger_url = base
            .join(TRIGGER_PATH)
            .map_err(|_| ConfigError::InvalidHost(host.to_string()))?
            .to_string();

        let mut bodies: [Bytes; ThreatType::ALL.len()] = Default::default();
        for ty in ThreatType::ALL {
            let body = serde_json::to_vec(&TriggerRequest { threat_type: ty })?;
            bodies[ty.index()] = Bytes::from(body);
        }

        Ok(Self {
            http: HttpClient::default(),
            trigger_url,
            timeout,
            bodies,
        })
    }

    pub fn trigger_url(&self) -> &str {
        &self.trigger_url
    }

    /// Issue exactly one trigger request. Failures come back as data, never
    /// as an error: a timeout or refused connection yields a failed
    /// `RequestOutcome` the same way a 5xx does.
    pub async fn trigger(&self, threat: ThreatType) -> RequestOutcome {
        let req = HttpRequest::post(
            self.trigger_url.clone(),
            self.bodies[threat.index()].clone(),
        )
        .with_header("content-type", "application/json")
        .with_timeout(self.timeout);

        let at = SystemTime::now();
        let started = Instant::now();
        let status = match self.http.post(req).await {
            Ok(res) => OutcomeStatus::Http(res.status),
            Err(err) => OutcomeStatus::Transport(err.transport_error_kind()),
        };

        RequestOutcome {
            threat,
            at,
            latency: started.elapsed(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_url_joins_base_host() -> Result<()> {
        let client = BackendClient::new("http://localhost:8000", Duration::from_secs(1))?;
        assert_eq!(
            client.trigger_url(),
            "http://localhost:8000/api/threats/trigger"
        );
        Ok(())
    }

    #[test]
    fn bodies_carry_the_wire_form() -> Result<()> {
        let client = BackendClient::new("http://127.0.0.1:1", Duration::from_secs(1))?;
        let body = &client.bodies[ThreatType::RateLimitBreach.index()];
        let text = match std::str::from_utf8(body) {
            Ok(s) => s,
            Err(err) => panic!("body is not utf8: {err}"),
        };
        assert_eq!(text, r#"{"threat_type":"rate_limit_breach"}"#);
        Ok(())
    }

    #[test]
    fn invalid_host_is_rejected() {
        let err = BackendClient::new("::not-a-url::", Duration::from_secs(1));
        assert!(matches!(
            err,
            Err(crate::Error::Config(ConfigError::InvalidHost(_)))
        ));
    }
}
