use std::str::FromStr;

use crate::error::ConfigError;

/// The closed set of threat categories the backend accepts.
///
/// The wire form (and the string form in scenario files) is snake_case. The
/// set is fixed for the duration of a run; configuration referencing anything
/// outside it is rejected at load time.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThreatType {
    BotTraffic,
    ProxyNetwork,
    DeviceCompromise,
    AnomalyDetection,
    RateLimitBreach,
    GeoAnomaly,
}

impl ThreatType {
    /// All threat types in registry order. Weighted selection ties resolve to
    /// the earlier entry of this ordering.
    pub const ALL: [ThreatType; 6] = [
        ThreatType::BotTraffic,
        ThreatType::ProxyNetwork,
        ThreatType::DeviceCompromise,
        ThreatType::AnomalyDetection,
        ThreatType::RateLimitBreach,
        ThreatType::GeoAnomaly,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Self::from_str(s).map_err(|_| ConfigError::UnknownThreatType(s.to_string()))
    }
}
