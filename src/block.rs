//! Candidate blocking.
//!
//! Comparing every record with every other record is quadratic. Blocking
//! partitions records into buckets sharing a cheap key, and only pairs
//! inside a bucket are scored.
//!
//! With the default [`BlockingStrategy::SurnameInitial`], `"John Smith"`,
//! `"J. Smith"` and `"Smith, Jonathan"` share the bucket `smith|j`. Records
//! without a parseable surname go to a single catch-all bucket, so no record
//! is ever dropped.

use crate::NodeId;
use crate::normalize::NormalizedKey;
use compact_str::{CompactString, format_compact};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How records are keyed into candidate buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingStrategy {
    /// Normalized surname + first initial of the given name
    #[default]
    SurnameInitial,
    /// Full normalized name; tighter buckets, lower recall for initials
    FullName,
}

/// Key shared by all records of a [`CandidateBucket`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockingKey {
    Name(CompactString),
    /// Records without a parseable surname
    CatchAll,
}

impl fmt::Display for BlockingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingKey::Name(key) => f.write_str(key),
            BlockingKey::CatchAll => f.write_str("<catch-all>"),
        }
    }
}

/// Records sharing a blocking key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateBucket {
    pub key: BlockingKey,
    /// Members in ascending order
    pub members: Vec<NodeId>,
}

impl CandidateBucket {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of pairs the scorer will compare in this bucket.
    pub fn pair_count(&self) -> usize {
        let n = self.members.len();
        n * n.saturating_sub(1) / 2
    }

    /// Every unordered pair of members, lower node first.
    pub fn pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.members.iter().copied().tuple_combinations()
    }
}

/// Computes the blocking key of one normalized record.
pub fn blocking_key(key: &NormalizedKey, strategy: BlockingStrategy) -> BlockingKey {
    let Some(name) = key.name.as_ref().filter(|n| !n.surname.is_empty()) else {
        return BlockingKey::CatchAll;
    };

    match strategy {
        BlockingStrategy::SurnameInitial => {
            let initial = name.first_initial().map(String::from).unwrap_or_default();
            BlockingKey::Name(format_compact!("{}|{}", name.surname, initial))
        }
        BlockingStrategy::FullName => BlockingKey::Name(key.full_name.clone()),
    }
}

/// Partitions records into candidate buckets.
///
/// `keys` is indexed by [`NodeId`]. Every record lands in exactly one
/// bucket. Buckets larger than `max_bucket_size_warning` are kept intact but
/// logged, since their pair count grows quadratically.
pub fn block(
    keys: &[NormalizedKey],
    strategy: BlockingStrategy,
    max_bucket_size_warning: usize,
) -> BTreeMap<BlockingKey, CandidateBucket> {
    let mut buckets: BTreeMap<BlockingKey, CandidateBucket> = BTreeMap::new();

    for (index, key) in keys.iter().enumerate() {
        let bucket_key = blocking_key(key, strategy);
        buckets
            .entry(bucket_key.clone())
            .or_insert_with(|| CandidateBucket {
                key: bucket_key,
                members: Vec::new(),
            })
            .members
            .push(NodeId::new(index));
    }

    for bucket in buckets.values() {
        if bucket.len() > max_bucket_size_warning {
            tracing::warn!(
                bucket = %bucket.key,
                size = bucket.len(),
                pairs = bucket.pair_count(),
                threshold = max_bucket_size_warning,
                "candidate bucket exceeds size warning threshold"
            );
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::*;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn keys_for(names: &[&str]) -> Vec<NormalizedKey> {
        names
            .iter()
            .map(|name| normalize::<&str, &str>(name, &[], &[]))
            .collect()
    }

    fn name_key(key: &str) -> BlockingKey {
        BlockingKey::Name(CompactString::from(key))
    }

    #[test]
    fn test_surname_initial_groups_initial_variants() {
        let keys = keys_for(&["John Smith", "J. Smith", "Smith, Jonathan", "Jane Doe"]);
        let buckets = block(&keys, BlockingStrategy::SurnameInitial, 100);

        assert_eq!(buckets.len(), 2);
        assert_eq!(
            buckets[&name_key("smith|j")].members,
            vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)]
        );
        assert_eq!(buckets[&name_key("doe|j")].members, vec![NodeId::new(3)]);
    }

    #[test]
    fn test_full_name_strategy_separates_initials() {
        let keys = keys_for(&["John Smith", "J. Smith", "Smith, John"]);
        let buckets = block(&keys, BlockingStrategy::FullName, 100);

        assert_eq!(
            buckets[&name_key("john smith")].members,
            vec![NodeId::new(0), NodeId::new(2)]
        );
        assert_eq!(buckets[&name_key("j smith")].members, vec![NodeId::new(1)]);
    }

    #[test]
    fn test_unparseable_names_go_to_catch_all() {
        let keys = keys_for(&["", "???", "Wei Zhang"]);
        let buckets = block(&keys, BlockingStrategy::SurnameInitial, 100);

        assert_eq!(
            buckets[&BlockingKey::CatchAll].members,
            vec![NodeId::new(0), NodeId::new(1)]
        );
        assert_eq!(buckets[&name_key("zhang|w")].members, vec![NodeId::new(2)]);
    }

    #[test]
    fn test_surname_without_given_name() {
        let keys = keys_for(&["Smith"]);
        assert_eq!(
            blocking_key(&keys[0], BlockingStrategy::SurnameInitial),
            name_key("smith|")
        );
    }

    #[test]
    fn test_oversized_bucket_is_kept() {
        let keys = keys_for(&["John Smith", "J. Smith", "Jon Smith"]);
        let buckets = block(&keys, BlockingStrategy::SurnameInitial, 1);
        assert_eq!(buckets[&name_key("smith|j")].len(), 3);
        assert_eq!(buckets[&name_key("smith|j")].pair_count(), 3);
    }

    /// Collects the `bucket` field of every warning event.
    #[derive(Clone, Default)]
    struct WarnedBuckets(Arc<Mutex<Vec<String>>>);

    struct BucketField<'a>(&'a mut Option<String>);

    impl Visit for BucketField<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "bucket" {
                *self.0 = Some(format!("{value:?}"));
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for WarnedBuckets {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() != tracing::Level::WARN {
                return;
            }
            let mut bucket = None;
            event.record(&mut BucketField(&mut bucket));
            if let Some(bucket) = bucket {
                self.0.lock().unwrap().push(bucket);
            }
        }
    }

    fn warned_buckets(keys: &[NormalizedKey], max_bucket_size_warning: usize) -> Vec<String> {
        let warned = WarnedBuckets::default();
        let subscriber = tracing_subscriber::registry().with(warned.clone());
        tracing::subscriber::with_default(subscriber, || {
            block(keys, BlockingStrategy::SurnameInitial, max_bucket_size_warning);
        });
        let buckets = warned.0.lock().unwrap().clone();
        buckets
    }

    #[rstest]
    #[case(2, vec!["smith|j"])]
    #[case(3, vec![])]
    #[case(500, vec![])]
    fn test_oversized_bucket_warns_above_limit(#[case] limit: usize, #[case] expected: Vec<&str>) {
        let keys = keys_for(&["John Smith", "J. Smith", "Jon Smith", "Jane Doe"]);
        assert_eq!(warned_buckets(&keys, limit), expected);
    }

    #[test]
    fn test_pairs() {
        let bucket = CandidateBucket {
            key: BlockingKey::CatchAll,
            members: vec![NodeId::new(1), NodeId::new(4), NodeId::new(7)],
        };
        let pairs: Vec<_> = bucket.pairs().collect();
        assert_eq!(
            pairs,
            vec![
                (NodeId::new(1), NodeId::new(4)),
                (NodeId::new(1), NodeId::new(7)),
                (NodeId::new(4), NodeId::new(7)),
            ]
        );
    }

    proptest! {
        #[test]
        fn every_record_lands_in_exactly_one_bucket(
            names in proptest::collection::vec("[A-Za-z .,-]{0,16}", 0..40),
            full_name in any::<bool>(),
        ) {
            let keys: Vec<NormalizedKey> = names
                .iter()
                .map(|name| normalize::<&str, &str>(name, &[], &[]))
                .collect();
            let strategy = if full_name { BlockingStrategy::FullName } else { BlockingStrategy::SurnameInitial };
            let buckets = block(&keys, strategy, 10);

            let mut seen: Vec<NodeId> = buckets.values().flat_map(|b| b.members.iter().copied()).collect();
            seen.sort();
            let expected: Vec<NodeId> = (0..keys.len()).map(NodeId::new).collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
