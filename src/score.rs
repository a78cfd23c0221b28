//! Pairwise similarity scoring.
//!
//! A [`Scorer`] compares two normalized records from the same candidate
//! bucket and produces a [`PairScore`]: a composite score in `[0, 1]`, the
//! four sub-scores it was built from, and flags for identifier evidence.
//!
//! ## Signals
//!
//! | Signal      | Measure                                                   | Default weight |
//! |-------------|-----------------------------------------------------------|----------------|
//! | name        | Jaro-Winkler / initials-aware given-name compatibility    | 0.4            |
//! | affiliation | Jaccard of organization tokens (0 when either is missing) | 0.2            |
//! | co-author   | Initials-aware overlap of co-author names (0 if missing)  | 0.3            |
//! | temporal    | Year proximity decay and venue equality                   | 0.1            |
//!
//! ## Strong-negative evidence
//!
//! Two records with the same surname and initial, disjoint affiliations,
//! non-overlapping career windows and no shared co-author are flagged as
//! strong negatives. The flag is set independently of the composite score
//! and keeps common names such as "Wei Zhang" from merging on name alone.
//!
//! Equal ORCID iDs are decisive in the other direction: the composite is
//! forced to `1.0`. Two different ORCID iDs are a strong negative.
//!
//! Two mentions of the same publication with the same surname and first
//! initial almost always come from the same author slot in different
//! sources; the composite is raised to at least `0.9`.

use crate::NodeId;
use crate::block::CandidateBucket;
use crate::config::{DisambiguatorConfig, SimilarityWeights};
use crate::normalize::{NormalizedKey, NormalizedName};
use crate::utils::jaccard;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

const EQUAL_INITIALS_SCORE: f64 = 0.9;
const INITIAL_MATCHES_FULL_SCORE: f64 = 0.85;
const MISSING_GIVEN_NAME_SCORE: f64 = 0.5;
const EXTRA_GIVEN_TOKEN_PENALTY: f64 = 0.05;
/// Composite floor for two mentions of the same publication.
const SHARED_PUBLICATION_SCORE: f64 = 0.9;
/// Minimum Jaro-Winkler for two spelled-out given names to count as variants.
const GIVEN_NAME_VARIANT_THRESHOLD: f64 = 0.88;

/// Buckets with at least this many pairs are scored in parallel.
#[cfg(feature = "parallel")]
const PARALLEL_PAIR_THRESHOLD: usize = 256;

/// Per-signal sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub name: f64,
    pub affiliation: f64,
    pub coauthor: f64,
    pub temporal: f64,
}

/// Similarity of one candidate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    /// Lower node of the pair
    pub a: NodeId,
    /// Higher node of the pair
    pub b: NodeId,
    /// Weighted composite in `[0, 1]`
    pub score: f64,
    pub signals: SignalScores,
    /// The pair must never end up in the same cluster
    pub strong_negative: bool,
    /// Both records carry the same ORCID iD
    pub identifier_match: bool,
    /// Same publication id, surname and first initial
    pub shared_publication: bool,
}

/// Computes [`PairScore`]s with a fixed set of weights.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: SimilarityWeights,
    temporal_decay_years: f64,
    career_window_years: u32,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::from_config(&DisambiguatorConfig::default())
    }
}

impl Scorer {
    /// Creates a scorer from a validated configuration.
    #[must_use]
    pub fn from_config(config: &DisambiguatorConfig) -> Self {
        Self {
            weights: config.similarity_weights.clone(),
            temporal_decay_years: config.temporal_decay_years,
            career_window_years: config.career_window_years,
        }
    }

    /// Scores one pair. The result does not depend on argument order.
    pub fn score(
        &self,
        a: NodeId,
        key_a: &NormalizedKey,
        b: NodeId,
        key_b: &NormalizedKey,
    ) -> PairScore {
        let ((a, key_a), (b, key_b)) = if a <= b {
            ((a, key_a), (b, key_b))
        } else {
            ((b, key_b), (a, key_a))
        };

        let signals = SignalScores {
            name: name_similarity(key_a, key_b),
            affiliation: jaccard(&key_a.affiliation_tokens, &key_b.affiliation_tokens),
            coauthor: coauthor_overlap(&key_a.coauthors, &key_b.coauthors),
            temporal: temporal_proximity(key_a, key_b, self.temporal_decay_years),
        };

        let (identifier_match, identifier_conflict) = match (&key_a.orcid, &key_b.orcid) {
            (Some(x), Some(y)) => (x == y, x != y),
            _ => (false, false),
        };

        let shared_publication = key_a.publication.is_some()
            && key_a.publication == key_b.publication
            && same_surname_initial(key_a, key_b);

        let score = if identifier_match {
            1.0
        } else if shared_publication {
            self.composite(&signals).max(SHARED_PUBLICATION_SCORE)
        } else {
            self.composite(&signals)
        };
        let strong_negative = !identifier_match
            && (identifier_conflict
                || conflicting_careers(key_a, key_b, self.career_window_years));

        PairScore {
            a,
            b,
            score,
            signals,
            strong_negative,
            identifier_match,
            shared_publication,
        }
    }

    /// Weighted mean of the sub-scores.
    pub fn composite(&self, signals: &SignalScores) -> f64 {
        let w = &self.weights;
        let weighted = w.name * signals.name
            + w.affiliation * signals.affiliation
            + w.coauthor * signals.coauthor
            + w.temporal * signals.temporal;
        (weighted / w.total()).clamp(0.0, 1.0)
    }

    /// Scores every pair of a bucket, in [`CandidateBucket::pairs`] order.
    pub fn score_bucket(
        &self,
        bucket: &CandidateBucket,
        keys: &[NormalizedKey],
        parallel: bool,
    ) -> Vec<PairScore> {
        let score_pair =
            |(a, b): (NodeId, NodeId)| self.score(a, &keys[a.index()], b, &keys[b.index()]);

        #[cfg(feature = "parallel")]
        {
            if parallel && bucket.pair_count() >= PARALLEL_PAIR_THRESHOLD {
                use rayon::prelude::*;

                let pairs: Vec<_> = bucket.pairs().collect();
                return pairs.into_par_iter().map(score_pair).collect();
            }
        }
        #[cfg(not(feature = "parallel"))]
        let _ = parallel;

        bucket.pairs().map(score_pair).collect()
    }
}

/// Best similarity over all name variants of the two records.
pub fn name_similarity(a: &NormalizedKey, b: &NormalizedKey) -> f64 {
    if a.name.is_none() || b.name.is_none() {
        // Fallback identity keys: only a plain string comparison is possible
        if a.full_name.is_empty() || b.full_name.is_empty() {
            return 0.0;
        }
        return ordered_jaro_winkler(&a.full_name, &b.full_name);
    }

    a.name_variants()
        .flat_map(|x| b.name_variants().map(move |y| variant_similarity(x, y)))
        .fold(0.0, f64::max)
}

fn variant_similarity(x: &NormalizedName, y: &NormalizedName) -> f64 {
    let (full_x, full_y) = (x.full(), y.full());
    if full_x == full_y {
        return 1.0;
    }

    let string_score = ordered_jaro_winkler(&full_x, &full_y);
    if x.surname != y.surname {
        return string_score;
    }
    string_score.max(given_name_compatibility(&x.given, &y.given))
}

/// Jaro-Winkler with its arguments in a fixed order, so `f(x, y) == f(y, x)` exactly.
fn ordered_jaro_winkler(x: &str, y: &str) -> f64 {
    if x <= y {
        jaro_winkler(x, y)
    } else {
        jaro_winkler(y, x)
    }
}

/// Position-wise comparison of given-name tokens, aware of initials.
///
/// `["john"]` vs `["j"]` is compatible (0.85); `["john"]` vs `["james"]` is not (0.0).
pub fn given_name_compatibility<T: AsRef<str>>(x: &[T], y: &[T]) -> f64 {
    if x.is_empty() && y.is_empty() {
        return 1.0;
    }
    if x.is_empty() || y.is_empty() {
        return MISSING_GIVEN_NAME_SCORE;
    }

    let mut total = 0.0;
    for (tx, ty) in x.iter().zip(y.iter()) {
        match token_compatibility(tx.as_ref(), ty.as_ref()) {
            Some(score) => total += score,
            None => return 0.0,
        }
    }

    let aligned = x.len().min(y.len());
    let extra = x.len().abs_diff(y.len());
    (total / aligned as f64 - EXTRA_GIVEN_TOKEN_PENALTY * extra as f64).max(0.0)
}

fn token_compatibility(x: &str, y: &str) -> Option<f64> {
    let x_initial = x.chars().count() == 1;
    let y_initial = y.chars().count() == 1;

    match (x_initial, y_initial) {
        (true, true) => (x == y).then_some(EQUAL_INITIALS_SCORE),
        (true, false) | (false, true) => {
            (x.chars().next() == y.chars().next()).then_some(INITIAL_MATCHES_FULL_SCORE)
        }
        (false, false) if x == y => Some(1.0),
        (false, false) => {
            let score = ordered_jaro_winkler(x, y);
            (score >= GIVEN_NAME_VARIANT_THRESHOLD).then_some(score * EQUAL_INITIALS_SCORE)
        }
    }
}

/// Mean of year proximity and venue equality, over the signals both records have.
pub fn temporal_proximity(a: &NormalizedKey, b: &NormalizedKey, decay_years: f64) -> f64 {
    let year = a
        .year
        .zip(b.year)
        .map(|(x, y)| (-(x.abs_diff(y) as f64) / decay_years).exp());
    let venue = a
        .venue
        .as_ref()
        .zip(b.venue.as_ref())
        .map(|(x, y)| if x == y { 1.0 } else { 0.0 });

    match (year, venue) {
        (Some(year), Some(venue)) => (year + venue) / 2.0,
        (Some(score), None) | (None, Some(score)) => score,
        (None, None) => 0.0,
    }
}

/// Initials-aware overlap of two co-author lists.
///
/// Names are matched one to one, exact names first; the result is
/// `matched / (|a| + |b| - matched)`, or `0.0` when either list is empty.
pub fn coauthor_overlap(a: &[NormalizedName], b: &[NormalizedName]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = matched_coauthors(a, b).min(matched_coauthors(b, a));
    shared as f64 / (a.len() + b.len() - shared) as f64
}

fn matched_coauthors(from: &[NormalizedName], into: &[NormalizedName]) -> usize {
    let mut taken = vec![false; into.len()];
    let mut matched = 0;
    for name in from {
        let free = |i: &usize| !taken[*i];
        let slot = (0..into.len())
            .filter(free)
            .find(|&i| into[i].same_name(name))
            .or_else(|| {
                (0..into.len())
                    .filter(free)
                    .find(|&i| into[i].is_compatible_with(name))
            });
        if let Some(i) = slot {
            taken[i] = true;
            matched += 1;
        }
    }
    matched
}

fn same_surname_initial(a: &NormalizedKey, b: &NormalizedKey) -> bool {
    match (&a.name, &b.name) {
        (Some(x), Some(y)) => {
            !x.surname.is_empty() && x.surname == y.surname && x.first_initial() == y.first_initial()
        }
        _ => false,
    }
}

/// Same surname and initial, but nothing else in common and careers far apart.
fn conflicting_careers(a: &NormalizedKey, b: &NormalizedKey, career_window_years: u32) -> bool {
    let same_initials = same_surname_initial(a, b);
    let disjoint_affiliations = !a.affiliation_tokens.is_empty()
        && !b.affiliation_tokens.is_empty()
        && a.affiliation_tokens.is_disjoint(&b.affiliation_tokens);
    let separate_windows = a
        .year
        .zip(b.year)
        .is_some_and(|(x, y)| u64::from(x.abs_diff(y)) > 2 * u64::from(career_window_years));
    let no_shared_coauthors = coauthor_overlap(&a.coauthors, &b.coauthors) == 0.0;

    same_initials && disjoint_affiliations && separate_windows && no_shared_coauthors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use crate::normalize::normalize_record;
    use proptest::prelude::*;
    use rstest::*;

    fn key(record: Record) -> NormalizedKey {
        normalize_record(&record)
    }

    fn score(a: Record, b: Record) -> PairScore {
        Scorer::default().score(NodeId::new(0), &key(a), NodeId::new(1), &key(b))
    }

    #[test]
    fn test_initial_variant_with_shared_context_merges() {
        let pair = score(
            Record::new("1", "John Smith")
                .with_affiliation("MIT")
                .with_coauthors(["Jane Doe"]),
            Record::new("2", "J. Smith")
                .with_affiliation("MIT")
                .with_coauthors(["Jane Doe"]),
        );

        assert_eq!(pair.signals.name, INITIAL_MATCHES_FULL_SCORE);
        assert_eq!(pair.signals.affiliation, 1.0);
        assert_eq!(pair.signals.coauthor, 1.0);
        assert_eq!(pair.signals.temporal, 0.0);
        assert!(pair.score >= 0.72, "score {}", pair.score);
        assert!(!pair.strong_negative);
    }

    #[test]
    fn test_common_name_far_apart_is_strong_negative() {
        let pair = score(
            Record::new("1", "Wei Zhang")
                .with_affiliation("Tsinghua University")
                .with_coauthors(["Li Na"])
                .with_year(2006),
            Record::new("2", "Wei Zhang")
                .with_affiliation("Stanford University")
                .with_coauthors(["Andrew Ng"])
                .with_year(2020),
        );

        assert_eq!(pair.signals.name, 1.0);
        assert!(pair.strong_negative);
        assert!(pair.score < 0.72);
    }

    #[rstest]
    #[case::shared_coauthor(2006, 2020, "Li Na", false)]
    #[case::overlapping_windows(2006, 2009, "Andrew Ng", false)]
    #[case::separate_windows(2006, 2011, "Andrew Ng", true)]
    fn test_strong_negative_needs_every_condition(
        #[case] year_a: i32,
        #[case] year_b: i32,
        #[case] coauthor_b: &str,
        #[case] expected: bool,
    ) {
        let pair = score(
            Record::new("1", "Wei Zhang")
                .with_affiliation("Tsinghua University")
                .with_coauthors(["Li Na"])
                .with_year(year_a),
            Record::new("2", "Wei Zhang")
                .with_affiliation("Stanford University")
                .with_coauthors([coauthor_b])
                .with_year(year_b),
        );
        assert_eq!(pair.strong_negative, expected);
    }

    #[test]
    fn test_missing_affiliation_is_not_negative_evidence() {
        let pair = score(
            Record::new("1", "Wei Zhang").with_year(2006),
            Record::new("2", "Wei Zhang")
                .with_affiliation("Stanford University")
                .with_year(2020),
        );
        assert_eq!(pair.signals.affiliation, 0.0);
        assert!(!pair.strong_negative);
    }

    #[test]
    fn test_equal_orcid_is_decisive() {
        let pair = score(
            Record::new("1", "Wei Zhang")
                .with_affiliation("Tsinghua University")
                .with_year(2006)
                .with_orcid("0000-0002-1825-0097"),
            Record::new("2", "W. Zhang")
                .with_affiliation("Stanford University")
                .with_year(2020)
                .with_orcid("https://orcid.org/0000-0002-1825-0097"),
        );
        assert_eq!(pair.score, 1.0);
        assert!(pair.identifier_match);
        assert!(!pair.strong_negative);
    }

    #[test]
    fn test_different_orcids_are_strong_negative() {
        let pair = score(
            Record::new("1", "John Smith")
                .with_affiliation("MIT")
                .with_orcid("0000-0002-1825-0097"),
            Record::new("2", "John Smith")
                .with_affiliation("MIT")
                .with_orcid("0000-0001-5109-3700"),
        );
        assert!(pair.strong_negative);
        assert!(!pair.identifier_match);
    }

    #[rstest]
    #[case(&["john"], &["j"], INITIAL_MATCHES_FULL_SCORE)]
    #[case(&["j"], &["j"], EQUAL_INITIALS_SCORE)]
    #[case(&["john"], &["john"], 1.0)]
    #[case(&["john"], &["james"], 0.0)]
    #[case(&["j"], &["k"], 0.0)]
    #[case(&["john", "a"], &["john"], 0.95)]
    #[case(&[], &["john"], MISSING_GIVEN_NAME_SCORE)]
    fn test_given_name_compatibility(#[case] x: &[&str], #[case] y: &[&str], #[case] expected: f64) {
        assert!((given_name_compatibility(x, y) - expected).abs() < 1e-9);
        assert!((given_name_compatibility(y, x) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_alternate_names_are_compared() {
        let pair = score(
            Record::new("1", "Jane Doe").with_alternate_names(["Jane Williams"]),
            Record::new("2", "Jane Williams"),
        );
        assert_eq!(pair.signals.name, 1.0);
    }

    #[test]
    fn test_temporal_proximity() {
        let a = key(Record::new("1", "A B").with_year(2010).with_venue("Nature"));
        let same = key(Record::new("2", "A B").with_year(2010).with_venue("nature"));
        let later = key(Record::new("3", "A B").with_year(2015));
        let unknown = key(Record::new("4", "A B"));

        assert_eq!(temporal_proximity(&a, &same, 5.0), 1.0);
        assert!((temporal_proximity(&a, &later, 5.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert_eq!(temporal_proximity(&a, &unknown, 5.0), 0.0);
    }

    #[test]
    fn test_empty_records_score_zero() {
        let pair = score(Record::new("1", ""), Record::new("2", ""));
        assert_eq!(pair.score, 0.0);
        assert!(!pair.strong_negative);
    }

    #[test]
    fn test_huge_career_window_does_not_overflow() {
        let config = DisambiguatorConfig {
            career_window_years: u32::MAX,
            ..Default::default()
        };
        let scorer = Scorer::from_config(&config);
        let a = key(Record::new("1", "Wei Zhang").with_affiliation("Tsinghua University").with_year(2005));
        let b = key(Record::new("2", "Wei Zhang").with_affiliation("Stanford University").with_year(2020));

        let pair = scorer.score(NodeId::new(0), &a, NodeId::new(1), &b);
        assert!(!pair.strong_negative);
    }

    #[test]
    fn test_shared_publication_lifts_pair_over_threshold() {
        let without = score(Record::new("1", "John Smith"), Record::new("2", "J. Smith"));
        assert!(without.score < 0.72, "score {}", without.score);
        assert!(!without.shared_publication);

        let with = score(
            Record::new("1", "John Smith").with_publication("doi:10.1000/xyz"),
            Record::new("2", "J. Smith").with_publication("DOI:10.1000/XYZ"),
        );
        assert!(with.shared_publication);
        assert_eq!(with.score, SHARED_PUBLICATION_SCORE);
    }

    #[test]
    fn test_shared_publication_needs_matching_initial() {
        let pair = score(
            Record::new("1", "John Smith").with_publication("doi:10.1000/xyz"),
            Record::new("2", "Mary Smith").with_publication("doi:10.1000/xyz"),
        );
        assert!(!pair.shared_publication);
        assert!(pair.score < 0.72);
    }

    #[rstest]
    #[case(&["Jane Doe"], &["J. Doe"], 1.0)]
    #[case(&["Jane Doe"], &["John Doe"], 0.0)]
    #[case(&["Jane Doe", "Li Na"], &["Jane Doe", "Bob Stone"], 1.0 / 3.0)]
    #[case(&["J. Doe", "Jane Doe"], &["Jane Doe"], 0.5)]
    #[case(&[], &["Jane Doe"], 0.0)]
    fn test_coauthor_overlap(#[case] x: &[&str], #[case] y: &[&str], #[case] expected: f64) {
        let parse = |names: &[&str]| -> Vec<NormalizedName> {
            names.iter().filter_map(|n| crate::normalize::parse_name(n)).collect()
        };
        let (x, y) = (parse(x), parse(y));
        assert!((coauthor_overlap(&x, &y) - expected).abs() < 1e-12);
        assert!((coauthor_overlap(&y, &x) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_same_surname_coauthors_are_not_shared() {
        let pair = score(
            Record::new("1", "Wei Zhang")
                .with_affiliation("Tsinghua University")
                .with_coauthors(["Jane Doe"])
                .with_year(2006),
            Record::new("2", "Wei Zhang")
                .with_affiliation("Stanford University")
                .with_coauthors(["John Doe"])
                .with_year(2020),
        );
        assert_eq!(pair.signals.coauthor, 0.0);
        assert!(pair.strong_negative);
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        (
            prop::sample::select(vec!["John Smith", "J. Smith", "Smith, John A.", "Jon Smith", ""]),
            prop::collection::vec(prop::sample::select(vec!["MIT", "Harvard", "Stanford Univ."]), 0..3),
            prop::collection::vec(prop::sample::select(vec!["Jane Doe", "Li Na", "Bob Stone"]), 0..3),
            prop::option::of(1990i32..2025),
            prop::option::of(prop::sample::select(vec!["Nature", "Science"])),
            prop::option::of(prop::sample::select(vec!["doi:10.1/a", "doi:10.1/b"])),
        )
            .prop_map(|(name, affiliations, coauthors, year, venue, publication)| Record {
                id: String::new(),
                name: name.to_string(),
                affiliations: affiliations.into_iter().map(String::from).collect(),
                coauthors: coauthors.into_iter().map(String::from).collect(),
                year,
                venue: venue.map(String::from),
                publication_id: publication.map(String::from),
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn score_is_symmetric(a in arb_record(), b in arb_record()) {
            let scorer = Scorer::default();
            let (ka, kb) = (key(a), key(b));
            let forward = scorer.score(NodeId::new(3), &ka, NodeId::new(8), &kb);
            let backward = scorer.score(NodeId::new(8), &kb, NodeId::new(3), &ka);
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn score_stays_in_unit_interval(a in arb_record(), b in arb_record()) {
            let pair = Scorer::default().score(NodeId::new(0), &key(a), NodeId::new(1), &key(b));
            prop_assert!((0.0..=1.0).contains(&pair.score));
            for signal in [pair.signals.name, pair.signals.affiliation, pair.signals.coauthor, pair.signals.temporal] {
                prop_assert!((0.0..=1.0).contains(&signal));
            }
        }
    }
}
