use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ConsensusConfig;
use crate::data::types::ForecastSample;
use crate::strategies::types::ConsensusResult;

/// Per-source weights with a fallback for unlisted sources.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightPolicy {
    pub per_source_weight: BTreeMap<String, f64>,
    pub default_weight: f64,
}

impl WeightPolicy {
    pub fn uniform() -> Self {
        Self {
            per_source_weight: BTreeMap::new(),
            default_weight: 1.0,
        }
    }

    pub fn weight(&self, source: &str) -> f64 {
        self.per_source_weight
            .get(source)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidencePolicy {
    pub priority_sources: Vec<String>,
    pub priority_tolerance: f64,
    pub agreement_tolerance: f64,
    pub priority_base_confidence: f64,
    pub base_confidence: f64,
    pub penalty_divisor: f64,
    pub max_penalty: f64,
    pub single_source_factor: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self::from(&ConsensusConfig::default())
    }
}

impl From<&ConsensusConfig> for ConfidencePolicy {
    fn from(config: &ConsensusConfig) -> Self {
        Self {
            priority_sources: config.priority_sources.clone(),
            priority_tolerance: config.priority_tolerance,
            agreement_tolerance: config.agreement_tolerance,
            priority_base_confidence: config.priority_base_confidence,
            base_confidence: config.base_confidence,
            penalty_divisor: config.penalty_divisor,
            max_penalty: config.max_penalty,
            single_source_factor: config.single_source_factor,
        }
    }
}

impl From<&ConsensusConfig> for WeightPolicy {
    fn from(config: &ConsensusConfig) -> Self {
        Self {
            per_source_weight: config.weights.clone(),
            default_weight: config.default_weight,
        }
    }
}

/// Combines disagreeing forecast sources into one value and a confidence.
///
/// Confidence with two or more sources is
/// `base - min(sigma / penalty_divisor, max_penalty)`, floored at zero, where
/// `base` is raised when any priority source sits within tolerance of the
/// consensus. A lone source gets `base * single_source_factor`.
#[derive(Debug, Clone)]
pub struct ConsensusEstimator {
    weights: WeightPolicy,
    policy: ConfidencePolicy,
}

impl ConsensusEstimator {
    pub fn new(weights: WeightPolicy, policy: ConfidencePolicy) -> Self {
        Self { weights, policy }
    }

    pub fn from_config(config: &ConsensusConfig) -> Self {
        Self::new(WeightPolicy::from(config), ConfidencePolicy::from(config))
    }

    /// Estimate from raw samples; the newest sample per source wins.
    pub fn estimate_samples(&self, samples: &[ForecastSample]) -> ConsensusResult {
        let mut latest: BTreeMap<&str, &ForecastSample> = BTreeMap::new();
        for sample in samples {
            match latest.get(sample.source.as_str()) {
                Some(held) if held.observed_at > sample.observed_at => {}
                _ => {
                    latest.insert(&sample.source, sample);
                }
            }
        }
        let mapping = latest
            .into_iter()
            .map(|(source, sample)| (source.to_string(), sample.temperature))
            .collect();
        self.estimate(&mapping)
    }

    pub fn estimate(&self, samples: &BTreeMap<String, f64>) -> ConsensusResult {
        if samples.is_empty() {
            return ConsensusResult {
                value: f64::NAN,
                confidence: 0.0,
                agreement_rate: 0.0,
                deviations: BTreeMap::new(),
                sample_count: 0,
            };
        }

        let value = weighted_mean(samples, &self.weights);

        let deviations: BTreeMap<String, f64> = samples
            .iter()
            .map(|(source, temp)| (source.clone(), temp - value))
            .collect();

        let agreeing = deviations
            .values()
            .filter(|d| d.abs() <= self.policy.agreement_tolerance)
            .count();
        let agreement_rate = agreeing as f64 / samples.len() as f64;

        let priority_agreement = self.policy.priority_sources.iter().any(|source| {
            deviations
                .get(source)
                .is_some_and(|d| d.abs() < self.policy.priority_tolerance)
        });

        let base = if priority_agreement {
            self.policy.priority_base_confidence
        } else {
            self.policy.base_confidence
        };

        let confidence = if samples.len() > 1 {
            let sigma = rms_deviation(&deviations);
            let penalty = (sigma / self.policy.penalty_divisor).min(self.policy.max_penalty);
            debug!(
                "consensus {:.2}°F from {} sources, sigma={:.3}, penalty={:.3}, priority_agreement={}",
                value,
                samples.len(),
                sigma,
                penalty,
                priority_agreement
            );
            (base - penalty).max(0.0)
        } else {
            base * self.policy.single_source_factor
        };

        ConsensusResult {
            value,
            confidence: confidence.clamp(0.0, 1.0),
            agreement_rate,
            deviations,
            sample_count: samples.len(),
        }
    }
}

pub fn weighted_mean(samples: &BTreeMap<String, f64>, weights: &WeightPolicy) -> f64 {
    let (weighted_sum, total_weight) = samples
        .iter()
        .fold((0.0, 0.0), |(sum, total), (source, temp)| {
            let w = weights.weight(source);
            (sum + temp * w, total + w)
        });

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        f64::NAN
    }
}

/// Root-mean-square of the per-source deviations from the consensus value.
pub fn rms_deviation(deviations: &BTreeMap<String, f64>) -> f64 {
    if deviations.is_empty() {
        return 0.0;
    }
    let n = deviations.len() as f64;
    (deviations.values().map(|d| d * d).sum::<f64>() / n).sqrt()
}
