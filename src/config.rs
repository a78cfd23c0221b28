//! Run configuration and its validation.
//!
//! A [`DisambiguatorConfig`] can be built in code or loaded from TOML:
//!
//! ```
//! use bibident::config::DisambiguatorConfig;
//! use bibident::BlockingStrategy;
//!
//! let config = DisambiguatorConfig::from_toml_str(r#"
//!     merge_threshold = 0.8
//!     blocking_strategy = "full_name"
//!
//!     [similarity_weights]
//!     name = 0.5
//!     affiliation = 0.1
//!     coauthor = 0.3
//!     temporal = 0.1
//! "#).unwrap();
//!
//! assert_eq!(config.merge_threshold, 0.8);
//! assert_eq!(config.blocking_strategy, BlockingStrategy::FullName);
//! ```

use crate::block::BlockingStrategy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default merge threshold for composite scores.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.72;
/// Default bucket size above which a warning is logged.
pub const DEFAULT_MAX_BUCKET_SIZE_WARNING: usize = 500;

/// Configuration errors, all detected before a run starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {signal} weight: {value}")]
    InvalidWeight { signal: &'static str, value: f64 },

    #[error("Similarity weights sum to zero")]
    ZeroWeightSum,

    #[error("Merge threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),

    #[error("Bucket size warning threshold must be at least 1")]
    ZeroBucketSizeWarning,

    #[error("Temporal decay must be a positive number of years, got {0}")]
    InvalidTemporalDecay(f64),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Relative weights of the four similarity signals.
///
/// Weights need not sum to one; the composite score divides by their total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub name: f64,
    pub affiliation: f64,
    pub coauthor: f64,
    pub temporal: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            name: 0.4,
            affiliation: 0.2,
            coauthor: 0.3,
            temporal: 0.1,
        }
    }
}

impl SimilarityWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.name + self.affiliation + self.coauthor + self.temporal
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("name", self.name),
            ("affiliation", self.affiliation),
            ("coauthor", self.coauthor),
            ("temporal", self.temporal),
        ];
        for (signal, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { signal, value });
            }
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::ZeroWeightSum);
        }
        Ok(())
    }
}

/// Configuration options for a disambiguation run.
///
/// # Examples
///
/// ```
/// use bibident::{BlockingStrategy, DisambiguatorConfig};
///
/// let config = DisambiguatorConfig {
///     merge_threshold: 0.75,
///     blocking_strategy: BlockingStrategy::SurnameInitial,
///     run_in_parallel: false,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
///
/// # Notes
///
/// - `career_window_years` is the half-width of the window around a
///   publication year; two records whose windows do not overlap can be
///   flagged as strong-negative evidence
/// - `run_in_parallel` has no effect when the crate is built without the
///   `parallel` feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisambiguatorConfig {
    /// Weights of the name, affiliation, co-author and temporal signals
    pub similarity_weights: SimilarityWeights,
    /// Composite score at or above which a pair becomes a merge edge
    pub merge_threshold: f64,
    /// How candidate buckets are keyed
    pub blocking_strategy: BlockingStrategy,
    /// Bucket size above which a warning is logged
    pub max_bucket_size_warning: usize,
    /// Year distance over which temporal proximity decays by a factor of e
    pub temporal_decay_years: f64,
    /// Half-width, in years, of a record's career window
    pub career_window_years: u32,
    /// Score buckets and resolve clusters on the rayon thread pool
    pub run_in_parallel: bool,
}

impl Default for DisambiguatorConfig {
    fn default() -> Self {
        Self {
            similarity_weights: SimilarityWeights::default(),
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            blocking_strategy: BlockingStrategy::default(),
            max_bucket_size_warning: DEFAULT_MAX_BUCKET_SIZE_WARNING,
            temporal_decay_years: 5.0,
            career_window_years: 2,
            run_in_parallel: true,
        }
    }
}

impl DisambiguatorConfig {
    /// Parses and validates a TOML configuration. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every option, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.similarity_weights.validate()?;
        if !(0.0..=1.0).contains(&self.merge_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.merge_threshold));
        }
        if self.max_bucket_size_warning == 0 {
            return Err(ConfigError::ZeroBucketSizeWarning);
        }
        if !self.temporal_decay_years.is_finite() || self.temporal_decay_years <= 0.0 {
            return Err(ConfigError::InvalidTemporalDecay(self.temporal_decay_years));
        }
        Ok(())
    }
}
