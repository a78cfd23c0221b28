//! End-to-end disambiguation runs.
//!
//! [`Disambiguator`] validates its configuration, arranges the records in an
//! arena ordered by record id, and runs the five stages in sequence:
//! normalize, block, score, cluster and canonicalize.
//!
//! ## Usage
//!
//! ```rust
//! use bibident::{Disambiguator, DisambiguatorConfig, Record};
//!
//! let records = vec![
//!     Record::new("a", "Smith, Jane A.").with_affiliation("Dept. of Physics, Univ. of Oxford"),
//!     Record::new("b", "Jane A. Smith").with_affiliation("University of Oxford"),
//!     Record::new("c", "Ada Lovelace"),
//! ];
//!
//! let config = DisambiguatorConfig {
//!     run_in_parallel: false,
//!     ..Default::default()
//! };
//! let result = Disambiguator::new().with_config(config).disambiguate(&records).unwrap();
//!
//! for author in &result.authors {
//!     println!("{} -> {:?}", author.name, author.members);
//! }
//! assert_eq!(result.assignments.len(), 3);
//! ```
//!
//! ## Cancellation
//!
//! A run can be stopped from another thread through a shared flag. The flag
//! is checked between buckets and between clusters; a cancelled run returns
//! [`DisambiguationError::Cancelled`] and no partial output.
//!
//! ```rust
//! use bibident::{DisambiguationError, Disambiguator, Record};
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! let cancel = Arc::new(AtomicBool::new(true));
//! let result = Disambiguator::new()
//!     .with_cancel_flag(Arc::clone(&cancel))
//!     .disambiguate(&[Record::new("r1", "John Smith")]);
//! assert_eq!(result, Err(DisambiguationError::Cancelled));
//! ```

use crate::block::{CandidateBucket, block};
use crate::canonical::{CanonicalAuthor, CanonicalAuthorId, canonicalize};
use crate::cluster::cluster_graph;
use crate::cluster::graph::IdentityGraph;
use crate::config::DisambiguatorConfig;
use crate::normalize::{NormalizedKey, normalize_record};
use crate::score::{PairScore, Scorer};
use crate::{DisambiguationError, Record, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A strong-negative pair that stayed inside one canonical author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Record ids of the conflicting pair, lower id first
    pub records: (String, String),
    /// The author both records were assigned to
    pub author: CanonicalAuthorId,
    /// Record ids of every member of that author
    pub members: Vec<String>,
}

/// Output of a disambiguation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Disambiguation {
    /// Canonical authors, ordered by id
    pub authors: Vec<CanonicalAuthor>,
    /// Record id to canonical author id, for every input record
    pub assignments: BTreeMap<String, CanonicalAuthorId>,
    /// Clusters kept whole despite strong-negative evidence
    pub conflicts: Vec<ConflictReport>,
    /// Ids of records with no usable identifying field
    pub malformed: Vec<String>,
}

impl Disambiguation {
    /// The canonical author a record was assigned to.
    pub fn author_of(&self, record_id: &str) -> Option<&CanonicalAuthor> {
        let id = self.assignments.get(record_id)?;
        self.authors
            .binary_search_by(|author| author.id.cmp(id))
            .ok()
            .map(|index| &self.authors[index])
    }
}

/// Runs the full disambiguation pipeline.
///
/// # Examples
///
/// ```
/// use bibident::{Disambiguator, DisambiguatorConfig};
///
/// let disambiguator = Disambiguator::new().with_config(DisambiguatorConfig {
///     merge_threshold: 0.8,
///     ..Default::default()
/// });
/// ```
///
/// # Performance
///
/// - Scoring is quadratic in bucket size and linear in the number of buckets
/// - With the `parallel` feature, buckets, large buckets' pairs and clusters
///   are processed on the rayon thread pool
#[derive(Debug, Default, Clone)]
pub struct Disambiguator {
    config: DisambiguatorConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl Disambiguator {
    /// Creates a disambiguator with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration. It is validated when a run starts.
    #[must_use]
    pub fn with_config(mut self, config: DisambiguatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Stops the run once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &DisambiguatorConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn parallel(&self) -> bool {
        cfg!(feature = "parallel") && self.config.run_in_parallel
    }

    /// Resolves `records` into canonical authors.
    ///
    /// The output depends only on the set of records and the configuration,
    /// not on input order.
    ///
    /// # Errors
    ///
    /// - [`DisambiguationError::Config`] if the configuration is invalid
    /// - [`DisambiguationError::DuplicateRecordId`] if two records share an id
    /// - [`DisambiguationError::Cancelled`] if the cancel flag was set
    pub fn disambiguate(&self, records: &[Record]) -> Result<Disambiguation> {
        self.config.validate()?;

        let mut arena = records.to_vec();
        arena.sort_by(|x, y| x.id.cmp(&y.id));
        if let Some(pair) = arena.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(DisambiguationError::DuplicateRecordId(pair[0].id.clone()));
        }

        let keys = self.normalize(&arena);
        let malformed: Vec<String> = arena
            .iter()
            .zip(&keys)
            .filter(|(_, key)| key.malformed)
            .map(|(record, _)| record.id.clone())
            .collect();
        for id in &malformed {
            tracing::warn!(record = %id, "record has no usable identifying field");
        }

        let buckets: Vec<CandidateBucket> = block(
            &keys,
            self.config.blocking_strategy,
            self.config.max_bucket_size_warning,
        )
        .into_values()
        .collect();
        tracing::debug!(buckets = buckets.len(), "blocked records");

        let scores = self.score(&buckets, &keys)?;
        tracing::debug!(pairs = scores.len(), "scored candidate pairs");

        let graph = IdentityGraph::build(arena.len(), &scores, self.config.merge_threshold);
        tracing::debug!(
            edges = graph.edges().len(),
            negative_edges = graph.negative_edges().len(),
            "built identity graph"
        );
        let clusters = cluster_graph(&graph, self.parallel(), || self.is_cancelled())?;

        let authors: Vec<CanonicalAuthor> = clusters
            .clusters
            .iter()
            .map(|cluster| canonicalize(cluster, &keys, &arena))
            .collect();

        let mut assignments = BTreeMap::new();
        for author in &authors {
            for member in &author.members {
                assignments.insert(member.clone(), author.id.clone());
            }
        }

        let conflicts = clusters
            .conflicts
            .iter()
            .filter_map(|conflict| {
                let (a, b) = (&arena[conflict.a.index()].id, &arena[conflict.b.index()].id);
                let author = assignments.get(a)?.clone();
                Some(ConflictReport {
                    records: (a.clone(), b.clone()),
                    author,
                    members: conflict
                        .members
                        .iter()
                        .map(|node| arena[node.index()].id.clone())
                        .collect(),
                })
            })
            .collect::<Vec<_>>();

        tracing::info!(
            records = arena.len(),
            buckets = buckets.len(),
            pairs = scores.len(),
            authors = authors.len(),
            conflicts = conflicts.len(),
            malformed = malformed.len(),
            "disambiguation finished"
        );

        Ok(Disambiguation {
            authors,
            assignments,
            conflicts,
            malformed,
        })
    }

    fn normalize(&self, arena: &[Record]) -> Vec<NormalizedKey> {
        #[cfg(feature = "parallel")]
        {
            if self.parallel() {
                use rayon::prelude::*;

                return arena.par_iter().map(normalize_record).collect();
            }
        }

        arena.iter().map(normalize_record).collect()
    }

    fn score(&self, buckets: &[CandidateBucket], keys: &[NormalizedKey]) -> Result<Vec<PairScore>> {
        let scorer = Scorer::from_config(&self.config);
        let parallel = self.parallel();
        let score_bucket = |bucket: &CandidateBucket| -> Result<Vec<PairScore>> {
            if self.is_cancelled() {
                return Err(DisambiguationError::Cancelled);
            }
            Ok(scorer.score_bucket(bucket, keys, parallel))
        };

        #[cfg(feature = "parallel")]
        {
            if parallel {
                use rayon::prelude::*;

                let scored = buckets
                    .par_iter()
                    .map(score_bucket)
                    .collect::<Result<Vec<_>>>()?;
                return Ok(scored.into_iter().flatten().collect());
            }
        }

        let scored = buckets
            .iter()
            .map(score_bucket)
            .collect::<Result<Vec<_>>>()?;
        Ok(scored.into_iter().flatten().collect())
    }
}
