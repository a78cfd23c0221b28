//! Author identity disambiguation for bibliographic records.
//!
//! `bibident` takes author mentions collected from many bibliographic sources
//! (with inconsistent spellings, initials, affiliations and co-author lists)
//! and decides which of them refer to the same person.
//!
//! # Pipeline
//!
//! The work is split into five stages, each usable on its own:
//!
//! - [`normalize`]: raw names and affiliations into comparable keys
//! - [`block`]: candidate buckets sharing surname + first initial
//! - [`score`]: weighted similarity of record pairs within a bucket
//! - [`cluster`]: identity graph resolved into disjoint clusters
//! - [`canonical`]: one canonical author per cluster
//!
//! The [`Disambiguator`] composes them.
//!
//! # Basic Usage
//!
//! ```rust
//! use bibident::{Disambiguator, Record};
//!
//! let records = vec![
//!     Record::new("r1", "John Smith")
//!         .with_affiliation("MIT")
//!         .with_coauthors(["Jane Doe"]),
//!     Record::new("r2", "J. Smith")
//!         .with_affiliation("MIT")
//!         .with_coauthors(["Jane Doe"]),
//! ];
//!
//! let result = Disambiguator::new().disambiguate(&records).unwrap();
//! assert_eq!(result.authors.len(), 1);
//! assert_eq!(result.authors[0].name, "John Smith");
//! assert_eq!(result.assignments["r1"], result.assignments["r2"]);
//! ```
//!
//! # Configuration
//!
//! ```rust
//! use bibident::{BlockingStrategy, Disambiguator, DisambiguatorConfig};
//!
//! let config = DisambiguatorConfig {
//!     merge_threshold: 0.8,
//!     blocking_strategy: BlockingStrategy::FullName,
//!     ..Default::default()
//! };
//! let disambiguator = Disambiguator::new().with_config(config);
//! ```
//!
//! # Error Handling
//!
//! Configuration problems fail before any record is touched. Problems with
//! individual records never abort a run: malformed records are listed in
//! [`Disambiguation::malformed`] and unresolvable clusters in
//! [`Disambiguation::conflicts`].
//!
//! ```rust
//! use bibident::{ConfigError, DisambiguationError, Disambiguator, DisambiguatorConfig};
//!
//! let config = DisambiguatorConfig {
//!     merge_threshold: 1.5,
//!     ..Default::default()
//! };
//! let result = Disambiguator::new().with_config(config).disambiguate(&[]);
//! assert!(matches!(
//!     result,
//!     Err(DisambiguationError::Config(ConfigError::ThresholdOutOfRange(_)))
//! ));
//! ```
//!
//! # Thread Safety
//!
//! With the `parallel` feature (on by default) buckets are scored and
//! clusters are resolved on the rayon thread pool. No stage shares mutable
//! state, so the output is identical to a sequential run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod block;
pub mod canonical;
pub mod cluster;
pub mod config;
pub mod normalize;
pub mod pipeline;
mod regex;
pub mod score;
mod utils;

// Reexports
pub use block::{BlockingKey, BlockingStrategy, CandidateBucket};
pub use canonical::{CanonicalAuthor, CanonicalAuthorId};
pub use cluster::{Cluster, ClusterSet, ClusteringConflict};
pub use config::{ConfigError, DisambiguatorConfig, SimilarityWeights};
pub use normalize::{NormalizedKey, NormalizedName};
pub use pipeline::{ConflictReport, Disambiguation, Disambiguator};
pub use score::{PairScore, SignalScores};

/// A specialized Result type for disambiguation runs.
pub type Result<T> = std::result::Result<T, DisambiguationError>;

/// Errors that abort a disambiguation run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DisambiguationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Duplicate record id: {0}")]
    DuplicateRecordId(String),

    #[error("Disambiguation run was cancelled")]
    Cancelled,
}

/// One bibliographic mention of an author.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier, unique within a run
    pub id: String,
    /// Raw author name as it appeared in the source
    pub name: String,
    /// Raw affiliation strings
    #[serde(default)]
    pub affiliations: Vec<String>,
    /// Identifier of the publication this mention comes from
    #[serde(default)]
    pub publication_id: Option<String>,
    /// Raw names of the other authors on the publication
    #[serde(default)]
    pub coauthors: Vec<String>,
    /// Publication year
    #[serde(default)]
    pub year: Option<i32>,
    /// Journal or conference name
    #[serde(default)]
    pub venue: Option<String>,
    /// ORCID iD supplied by the source, if any
    #[serde(default)]
    pub orcid: Option<String>,
    /// Past or variant names of the author (e.g. a maiden name)
    #[serde(default)]
    pub alternate_names: Vec<String>,
}

impl Record {
    /// Creates a record with an id and a raw name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliations.push(affiliation.into());
        self
    }

    #[must_use]
    pub fn with_coauthors<I, S>(mut self, coauthors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.coauthors.extend(coauthors.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_publication(mut self, publication_id: impl Into<String>) -> Self {
        self.publication_id = Some(publication_id.into());
        self
    }

    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    #[must_use]
    pub fn with_orcid(mut self, orcid: impl Into<String>) -> Self {
        self.orcid = Some(orcid.into());
        self
    }

    #[must_use]
    pub fn with_alternate_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternate_names.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Index of a record in a run's arena.
///
/// Records are arranged in ascending id order, so comparing two `NodeId`s
/// compares their record ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disambiguation_error_display() {
        let error = DisambiguationError::DuplicateRecordId("r1".to_string());
        assert_eq!(error.to_string(), "Duplicate record id: r1");

        let error = DisambiguationError::from(ConfigError::ZeroWeightSum);
        assert_eq!(
            error.to_string(),
            "Configuration error: Similarity weights sum to zero"
        );
    }

    #[test]
    fn test_record_builder() {
        let record = Record::new("r1", "Smith, John")
            .with_affiliation("MIT")
            .with_affiliation("Harvard")
            .with_coauthors(["Jane Doe"])
            .with_publication("doi:10.1000/1")
            .with_year(2020)
            .with_venue("Nature");

        assert_eq!(record.affiliations, vec!["MIT", "Harvard"]);
        assert_eq!(record.coauthors, vec!["Jane Doe"]);
        assert_eq!(record.publication_id.as_deref(), Some("doi:10.1000/1"));
        assert_eq!(record.year, Some(2020));
        assert_eq!(record.orcid, None);
    }

    #[test]
    fn test_record_deserializes_with_missing_fields() {
        let record: Record = serde_json::from_str(r#"{"id": "r1", "name": "Wei Zhang"}"#).unwrap();
        assert_eq!(record, Record::new("r1", "Wei Zhang"));
    }
}
