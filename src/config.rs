//! # Tuning Configuration
//!
//! Knobs for the linkage pipeline. The heuristic constants (match threshold
//! factor, non-match keep ratio, window width) are carried here rather than
//! hard-coded so they can be tuned per dataset.

use crate::error::LinkageError;
use crate::index::PairMethod;
use serde::{Deserialize, Serialize};

/// Similarity measure selection for the comparer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureTuning {
    /// Named measure for text columns (e.g. "levenshtein", "jarowinkler", "exact").
    pub string_method: String,
    /// Named measure for numeric columns (e.g. "linear", "step", "exact").
    pub numeric_method: String,
    /// Acceptance threshold collapsing continuous string scores to {0, 1}.
    /// A value of 0 keeps scores continuous.
    pub string_threshold: f64,
    /// Scale of the linear numeric proximity measure: |a - b| >= scale scores 0.
    pub numeric_scale: f64,
}

impl Default for MeasureTuning {
    fn default() -> Self {
        Self {
            string_method: "levenshtein".to_string(),
            numeric_method: "linear".to_string(),
            string_threshold: 0.85,
            numeric_scale: 1.0,
        }
    }
}

/// Cluster-level split proportions for train/test/validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitFractions {
    pub train: f64,
    pub test: f64,
    pub validation: f64,
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            train: 0.7,
            test: 0.2,
            validation: 0.1,
        }
    }
}

impl SplitFractions {
    pub fn validate(&self) -> Result<(), LinkageError> {
        let sum = self.train + self.test + self.validation;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(LinkageError::Configuration(format!(
                "split fractions must sum to 1.0, got {sum}"
            )));
        }
        if self.train <= 0.0 || self.test < 0.0 || self.validation < 0.0 {
            return Err(LinkageError::Configuration(
                "split fractions must be non-negative with a positive train share".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pipeline-wide tuning defaults. Per-dataset overrides are applied on top.
#[derive(Debug, Clone)]
pub struct LinkageTuning {
    /// Default blocking strategy.
    pub pair_method: PairMethod,
    /// Number of entropy-ranked blocking keys to union over.
    pub num_keys: usize,
    /// Window width for sorted-neighbourhood blocking.
    pub window: usize,
    /// Seed for every stochastic step: random blocking, cluster shuffling,
    /// negative sampling, training-row shuffling.
    pub random_seed: u64,
    /// Number of pairs sampled by the random baseline strategy.
    /// Zero derives the count from the larger table's row count.
    pub random_pairs: usize,
    pub measures: MeasureTuning,
    /// Match decision threshold: floor(factor * compared_columns).
    pub match_threshold_factor: f64,
    /// Share of non-match feature rows kept as negative training examples.
    pub non_match_keep_ratio: f64,
    pub split: SplitFractions,
}

impl Default for LinkageTuning {
    fn default() -> Self {
        Self {
            pair_method: PairMethod::Block,
            num_keys: 1,
            window: 3,
            random_seed: 42,
            random_pairs: 0,
            measures: MeasureTuning::default(),
            match_threshold_factor: 0.5,
            non_match_keep_ratio: 0.7,
            split: SplitFractions::default(),
        }
    }
}

impl LinkageTuning {
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Favor recall: tolerant blocking over two keys with a wider window.
    pub fn high_recall() -> Self {
        Self {
            pair_method: PairMethod::SortedNeighbourhood,
            num_keys: 2,
            window: 5,
            ..Self::default()
        }
    }

    /// Exhaustive cartesian pairing. Only viable for small tables.
    pub fn exhaustive() -> Self {
        Self {
            pair_method: PairMethod::Full,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), LinkageError> {
        if self.num_keys == 0 {
            return Err(LinkageError::Configuration(
                "num_keys must be at least 1".to_string(),
            ));
        }
        if self.window < 2 {
            return Err(LinkageError::Configuration(
                "sorted-neighbourhood window must be at least 2".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.non_match_keep_ratio) {
            return Err(LinkageError::Configuration(
                "non_match_keep_ratio must lie in [0, 1]".to_string(),
            ));
        }
        if self.match_threshold_factor < 0.0 {
            return Err(LinkageError::Configuration(
                "match_threshold_factor must be non-negative".to_string(),
            ));
        }
        self.split.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tuning_is_valid() {
        LinkageTuning::default().validate().unwrap();
        LinkageTuning::high_recall().validate().unwrap();
        LinkageTuning::exhaustive().validate().unwrap();
    }

    #[test]
    fn test_split_fractions_must_sum_to_one() {
        let bad = SplitFractions {
            train: 0.5,
            test: 0.2,
            validation: 0.1,
        };
        assert!(matches!(
            bad.validate(),
            Err(LinkageError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_keys_rejected() {
        let tuning = LinkageTuning {
            num_keys: 0,
            ..LinkageTuning::default()
        };
        assert!(tuning.validate().is_err());
    }
}
