use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use socload_core::{PacingRange, Selection, ThreatType, TrafficClass, TrafficRegistry};

/// On-disk scenario: run parameters plus the traffic class mix. Every field
/// is optional; CLI flags override whatever the file sets, and an absent
/// `classes` list falls back to the built-in profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_timeout: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub classes: Vec<ClassYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ClassYaml {
    pub name: String,

    #[serde(default = "default_weight")]
    pub weight: u32,

    pub wait_min: YamlDuration,
    pub wait_max: YamlDuration,

    /// Uniform selection over these threat types.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub threats: Vec<String>,

    /// Weighted selection; mutually exclusive with `threats`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub threat_weights: BTreeMap<String, u32>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 30s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration cannot be negative"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(E::custom("duration must be a non-negative number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v)
                    .map(YamlDuration)
                    .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
            }
        }

        deserializer.deserialize_any(V)
    }
}

pub(crate) async fn load_scenario(path: &Path) -> anyhow::Result<ScenarioYaml> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read scenario file: {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("invalid scenario file: {}", path.display()))
}

impl ScenarioYaml {
    /// Build the traffic registry from the `classes` list, or fall back to
    /// the built-in profile when the file does not define one.
    pub(crate) fn registry(&self) -> anyhow::Result<TrafficRegistry> {
        if self.classes.is_empty() {
            return Ok(TrafficRegistry::default_profile());
        }

        let classes = self
            .classes
            .iter()
            .map(class_from_yaml)
            .collect::<anyhow::Result<Vec<_>>>()?;

        TrafficRegistry::new(classes).map_err(anyhow::Error::from)
    }
}

fn class_from_yaml(class: &ClassYaml) -> anyhow::Result<TrafficClass> {
    let selection = match (class.threats.is_empty(), class.threat_weights.is_empty()) {
        (false, false) => anyhow::bail!(
            "class `{}`: `threats` and `threatWeights` are mutually exclusive",
            class.name
        ),
        (true, true) => anyhow::bail!(
            "class `{}`: one of `threats` or `threatWeights` is required",
            class.name
        ),
        (false, true) => Selection::Uniform(
            class
                .threats
                .iter()
                .map(|t| parse_threat(&class.name, t))
                .collect::<anyhow::Result<Vec<_>>>()?,
        ),
        (true, false) => {
            let mut entries = class
                .threat_weights
                .iter()
                .map(|(t, w)| Ok((parse_threat(&class.name, t)?, *w)))
                .collect::<anyhow::Result<Vec<_>>>()?;
            // The map iterates its keys alphabetically; the cumulative
            // buckets follow threat declaration order instead.
            entries.sort_by_key(|(ty, _)| *ty);
            Selection::Weighted(entries)
        }
    };

    Ok(TrafficClass {
        name: class.name.clone(),
        weight: class.weight,
        pacing: PacingRange::new(class.wait_min.into_inner(), class.wait_max.into_inner()),
        selection,
    })
}

fn parse_threat(class: &str, raw: &str) -> anyhow::Result<ThreatType> {
    ThreatType::parse(raw).with_context(|| format!("class `{class}`"))
}
