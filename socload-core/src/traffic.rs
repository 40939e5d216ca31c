use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;
use crate::selector::TrafficSelector;
use crate::threat::ThreatType;

/// Uniform wait range between consecutive requests of one simulated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PacingRange {
    pub min: Duration,
    pub max: Duration,
}

impl PacingRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(wait: Duration) -> Self {
        Self {
            min: wait,
            max: wait,
        }
    }

    /// Sample the next wait. Every call draws independently; min == max
    /// degenerates to a fixed wait.
    pub fn next_wait<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// How a class picks the threat type of each request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Uniform choice over the listed types.
    Uniform(Vec<ThreatType>),
    /// Weighted choice; entries omitted default to weight 0.
    Weighted(Vec<(ThreatType, u32)>),
}

/// One behavioral profile: a share of the simulated population plus its
/// pacing and selection distributions. Immutable after configuration load.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrafficClass {
    pub name: String,
    /// Relative share of the total population assigned to this class.
    pub weight: u32,
    pub pacing: PacingRange,
    pub selection: Selection,
}

/// Ordered, validated set of traffic classes for one run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<TrafficClass>", into = "Vec<TrafficClass>")]
pub struct TrafficRegistry {
    classes: Vec<TrafficClass>,
}

impl TrafficRegistry {
    pub fn new(classes: Vec<TrafficClass>) -> Result<Self, ConfigError> {
        if classes.is_empty() {
            return Err(ConfigError::NoClasses);
        }
        if classes.iter().all(|c| c.weight == 0) {
            return Err(ConfigError::ZeroClassWeights);
        }

        for class in &classes {
            if class.pacing.min > class.pacing.max {
                return Err(ConfigError::InvalidPacingRange {
                    class: class.name.clone(),
                    min: class.pacing.min,
                    max: class.pacing.max,
                });
            }
            // Compiling the selector performs the selection validation.
            TrafficSelector::compile(&class.name, &class.selection)?;
        }

        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[TrafficClass] {
        &self.classes
    }

    /// The default profile, matching real-world SOC traffic patterns:
    /// mostly steady operators, a burst-attack slice, and a weighted
    /// realistic mix.
    pub fn default_profile() -> Self {
        let classes = vec![
            TrafficClass {
                name: "steady_state".to_string(),
                weight: 5,
                pacing: PacingRange::new(Duration::from_secs(2), Duration::from_secs(5)),
                selection: Selection::Uniform(ThreatType::ALL.to_vec()),
            },
            TrafficClass {
                name: "burst_attack".to_string(),
                weight: 2,
                pacing: PacingRange::new(Duration::from_millis(100), Duration::from_millis(500)),
                selection: Selection::Uniform(vec![
                    ThreatType::BotTraffic,
                    ThreatType::RateLimitBreach,
                ]),
            },
            TrafficClass {
                name: "mixed_realistic".to_string(),
                weight: 3,
                pacing: PacingRange::new(Duration::from_secs(1), Duration::from_secs(3)),
                selection: Selection::Weighted(vec![
                    (ThreatType::BotTraffic, 30),
                    (ThreatType::RateLimitBreach, 20),
                    (ThreatType::AnomalyDetection, 15),
                    (ThreatType::ProxyNetwork, 15),
                    (ThreatType::GeoAnomaly, 10),
                    (ThreatType::DeviceCompromise, 10),
                ]),
            },
        ];

        // The built-in profile is statically valid.
        match Self::new(classes) {
            Ok(reg) => reg,
            Err(err) => unreachable!("default profile must validate: {err}"),
        }
    }
}

impl TryFrom<Vec<TrafficClass>> for TrafficRegistry {
    type Error = ConfigError;

    fn try_from(classes: Vec<TrafficClass>) -> Result<Self, Self::Error> {
        Self::new(classes)
    }
}

impl From<TrafficRegistry> for Vec<TrafficClass> {
    fn from(reg: TrafficRegistry) -> Self {
        reg.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    fn class(name: &str, weight: u32) -> TrafficClass {
        TrafficClass {
            name: name.to_string(),
            weight,
            pacing: PacingRange::new(Duration::from_millis(10), Duration::from_millis(20)),
            selection: Selection::Uniform(ThreatType::ALL.to_vec()),
        }
    }

    #[test]
    fn empty_registry_is_rejected() {
        assert_eq!(TrafficRegistry::new(Vec::new()), Err(ConfigError::NoClasses));
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        let err = TrafficRegistry::new(vec![class("a", 0), class("b", 0)]);
        assert_eq!(err, Err(ConfigError::ZeroClassWeights));
    }

    #[test]
    fn single_zero_weight_class_is_allowed() {
        let reg = TrafficRegistry::new(vec![class("a", 1), class("b", 0)]);
        assert!(reg.is_ok());
    }

    #[test]
    fn inverted_pacing_range_is_rejected() {
        let mut c = class("bad", 1);
        c.pacing = PacingRange::new(Duration::from_secs(5), Duration::from_secs(2));
        match TrafficRegistry::new(vec![c]) {
            Err(ConfigError::InvalidPacingRange { class, .. }) => assert_eq!(class, "bad"),
            other => panic!("expected InvalidPacingRange, got {other:?}"),
        }
    }

    #[test]
    fn pacing_samples_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = PacingRange::new(Duration::from_millis(100), Duration::from_millis(500));
        for _ in 0..1_000 {
            let wait = range.next_wait(&mut rng);
            assert!(wait >= range.min, "sampled {wait:?} below min");
            assert!(wait <= range.max, "sampled {wait:?} above max");
        }
    }

    #[test]
    fn degenerate_pacing_range_is_fixed() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = PacingRange::fixed(Duration::from_secs(3));
        for _ in 0..100 {
            assert_eq!(range.next_wait(&mut rng), Duration::from_secs(3));
        }
    }

    #[test]
    fn default_profile_matches_reference_shares() {
        let reg = TrafficRegistry::default_profile();
        let weights: Vec<u32> = reg.classes().iter().map(|c| c.weight).collect();
        assert_eq!(weights, vec![5, 2, 3]);
        assert_eq!(reg.classes()[0].pacing.min, Duration::from_secs(2));
        assert_eq!(reg.classes()[1].pacing.max, Duration::from_millis(500));
    }

    #[test]
    fn registry_serde_round_trip_revalidates() -> anyhow::Result<()> {
        let reg = TrafficRegistry::default_profile();
        let json = serde_json::to_string(&reg)?;
        let back: TrafficRegistry = serde_json::from_str(&json)?;
        assert_eq!(back, reg);
        Ok(())
    }
}
