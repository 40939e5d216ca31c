use rand::Rng;

use crate::error::ConfigError;
use crate::threat::ThreatType;
use crate::traffic::Selection;

/// A compiled selection distribution.
///
/// Weighted selections are normalized into a cumulative distribution at
/// configuration time; each `select` then costs one uniform draw. The random
/// source is injected so tests can seed it deterministically.
#[derive(Debug, Clone)]
pub struct TrafficSelector {
    inner: Inner,
}

#[derive(Debug, Clone)]
enum Inner {
    Uniform(Vec<ThreatType>),
    Weighted {
        entries: Vec<ThreatType>,
        /// Normalized cumulative weights, same order as `entries`; the last
        /// value is 1.0 up to float rounding.
        cumulative: Vec<f64>,
    },
}

impl TrafficSelector {
    pub fn compile(class_name: &str, selection: &Selection) -> Result<Self, ConfigError> {
        match selection {
            Selection::Uniform(types) => {
                if types.is_empty() {
                    return Err(ConfigError::EmptySelection(class_name.to_string()));
                }
                Ok(Self {
                    inner: Inner::Uniform(types.clone()),
                })
            }
            Selection::Weighted(weights) => {
                if weights.is_empty() {
                    return Err(ConfigError::EmptySelection(class_name.to_string()));
                }

                let total: u64 = weights.iter().map(|(_, w)| u64::from(*w)).sum();
                if total == 0 {
                    return Err(ConfigError::ZeroSelectionWeights(class_name.to_string()));
                }

                let mut entries = Vec::with_capacity(weights.len());
                let mut cumulative = Vec::with_capacity(weights.len());
                let mut acc = 0u64;
                for (ty, w) in weights {
                    acc += u64::from(*w);
                    entries.push(*ty);
                    cumulative.push(acc as f64 / total as f64);
                }

                Ok(Self {
                    inner: Inner::Weighted {
                        entries,
                        cumulative,
                    },
                })
            }
        }
    }

    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> ThreatType {
        match &self.inner {
            Inner::Uniform(types) => types[rng.gen_range(0..types.len())],
            Inner::Weighted {
                entries,
                cumulative,
            } => {
                let x: f64 = rng.r#gen();
                for (i, cum) in cumulative.iter().enumerate() {
                    // Strict comparison: a zero-weight entry shares its
                    // cumulative bound with the previous entry and can never
                    // win the draw.
                    if x < *cum {
                        return entries[i];
                    }
                }
                // Rounding can leave the last bound a hair under 1.0.
                entries[entries.len() - 1]
            }
        }
    }
}
