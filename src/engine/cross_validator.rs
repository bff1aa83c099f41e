//! Cross-source validation.
//!
//! Several providers are asked for the same datum concurrently; their
//! numeric answers are reconciled around the median. Values too far from
//! the median are reported as outliers and excluded from the result.

use serde::Serialize;

use crate::registry::{Category, ProviderId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossValidationConfig {
    /// Providers asked per validation.
    pub max_sources: usize,
    /// Numeric answers required for a result.
    pub min_sources: usize,
    /// Maximum relative deviation from the median for an inlier (0.05 = 5 %).
    pub outlier_threshold: f64,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            max_sources: 3,
            min_sources: 2,
            outlier_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CrossValidationError {
    #[error("no pool serves category '{0}'")]
    CategoryNotFound(Category),
    #[error("invalid validation request: {0}")]
    InvalidRequest(String),
    #[error("only {got} of the required {required} sources returned a number")]
    InsufficientSources { required: usize, got: usize },
    #[error("only {agreeing} of {responders} sources agree within tolerance of the median {median}, {required} required")]
    NoAgreement {
        required: usize,
        agreeing: usize,
        responders: usize,
        median: f64,
    },
}

/// One provider's numeric answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSample {
    pub provider: ProviderId,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    /// Mean of the inliers.
    pub value: f64,
    pub median: f64,
    /// Population standard deviation of the inliers over their mean.
    pub coefficient_of_variation: f64,
    /// `(inliers / responders) × (1 − min(cv / threshold, 1))`, in `[0, 1]`.
    pub confidence: f64,
    pub responders: usize,
    pub inliers: Vec<SourceSample>,
    pub outliers: Vec<SourceSample>,
}

#[derive(Debug, Clone, Default)]
pub struct CrossValidator {
    config: CrossValidationConfig,
}

impl CrossValidator {
    pub fn new(config: CrossValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CrossValidationConfig {
        &self.config
    }

    pub fn reconcile(&self, samples: Vec<SourceSample>) -> Result<Reconciliation, CrossValidationError> {
        let samples: Vec<_> = samples.into_iter().filter(|s| s.value.is_finite()).collect();
        let required = self.config.min_sources.max(1);
        if samples.len() < required {
            return Err(CrossValidationError::InsufficientSources {
                required,
                got: samples.len(),
            });
        }

        let median = median(samples.iter().map(|s| s.value).collect());
        let threshold = self.config.outlier_threshold;
        let scale = median.abs().max(f64::EPSILON);

        let responders = samples.len();
        let (inliers, outliers): (Vec<_>, Vec<_>) = samples
            .into_iter()
            .partition(|s| (s.value - median).abs() / scale <= threshold);
        if inliers.len() < required {
            return Err(CrossValidationError::NoAgreement {
                required,
                agreeing: inliers.len(),
                responders,
                median,
            });
        }

        let values: Vec<f64> = inliers.iter().map(|s| s.value).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let cv = if mean.abs() > f64::EPSILON {
            variance.sqrt() / mean.abs()
        } else {
            0.0
        };

        let dispersion_penalty = if threshold > 0.0 {
            (cv / threshold).min(1.0)
        } else {
            0.0
        };
        let confidence = (inliers.len() as f64 / responders as f64) * (1.0 - dispersion_penalty);

        Ok(Reconciliation {
            value: mean,
            median,
            coefficient_of_variation: cv,
            confidence,
            responders,
            inliers,
            outliers,
        })
    }
}

/// Median of a non-empty list; mean of the middle pair for even lengths.
fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(provider: &str, value: f64) -> SourceSample {
        SourceSample {
            provider: provider.into(),
            value,
        }
    }

    #[test]
    fn outlier_is_dropped_from_result() {
        let validator = CrossValidator::default();
        let result = validator
            .reconcile(vec![sample("a", 100.0), sample("b", 101.0), sample("c", 140.0)])
            .unwrap();

        assert_eq!(result.median, 101.0);
        assert!((result.value - 100.5).abs() < 1e-9);
        assert_eq!(result.inliers.len(), 2);
        assert_eq!(result.outliers, vec![sample("c", 140.0)]);
        assert!((result.confidence - 0.6003).abs() < 0.001, "confidence {}", result.confidence);
    }

    #[test]
    fn agreeing_sources_have_full_confidence() {
        let validator = CrossValidator::default();
        let result = validator
            .reconcile(vec![sample("a", 50.0), sample("b", 50.0)])
            .unwrap();

        assert_eq!(result.value, 50.0);
        assert_eq!(result.coefficient_of_variation, 0.0);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn too_few_numbers_is_an_error() {
        let validator = CrossValidator::default();
        let err = validator
            .reconcile(vec![sample("a", 1.0), sample("b", f64::NAN)])
            .unwrap_err();
        assert_eq!(
            err,
            CrossValidationError::InsufficientSources { required: 2, got: 1 }
        );
    }

    #[test]
    fn disagreeing_sources_are_an_error() {
        let validator = CrossValidator::default();
        let err = validator
            .reconcile(vec![sample("a", 100.0), sample("b", 120.0)])
            .unwrap_err();
        assert_eq!(
            err,
            CrossValidationError::NoAgreement {
                required: 2,
                agreeing: 0,
                responders: 2,
                median: 110.0,
            }
        );
    }

    #[test]
    fn one_agreeing_source_is_not_enough() {
        let validator = CrossValidator::default();
        let err = validator
            .reconcile(vec![sample("a", 100.0), sample("b", 130.0), sample("c", 160.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            CrossValidationError::NoAgreement { agreeing: 1, responders: 3, .. }
        ));
    }

    #[test]
    fn even_count_median_is_midpoint() {
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
