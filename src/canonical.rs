//! Canonical author profiles.
//!
//! Each resolved cluster becomes one [`CanonicalAuthor`]. The canonical name
//! is the most frequent normalized full name among the members; ties go to
//! the longest form, then the lexicographically smallest one. The display
//! name keeps the original casing of the lowest-id member using that form.

use crate::cluster::Cluster;
use crate::normalize::NormalizedKey;
use crate::{NodeId, Record};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable identifier of a canonical author: `author:<smallest member id>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalAuthorId(String);

impl CanonicalAuthorId {
    pub fn for_record(record_id: &str) -> Self {
        Self(format!("author:{record_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalAuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One resolved author identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAuthor {
    pub id: CanonicalAuthorId,
    /// Display name in original casing, "Given Surname" order
    pub name: String,
    /// Canonical normalized full name
    pub normalized_name: CompactString,
    /// Union of the members' affiliation tokens
    pub affiliation_tokens: BTreeSet<CompactString>,
    /// Raw affiliation strings of all members, deduplicated and sorted
    pub affiliations: Vec<String>,
    /// Member record ids, ascending
    pub members: Vec<String>,
    /// Smallest ORCID iD carried by a member
    pub orcid: Option<CompactString>,
    /// Earliest and latest publication year among members
    pub years: Option<(i32, i32)>,
    /// The cluster holds an unresolved strong-negative pair
    pub ambiguous: bool,
}

/// Builds the canonical profile of one cluster.
///
/// `keys` and `records` are both indexed by [`NodeId`].
pub fn canonicalize(cluster: &Cluster, keys: &[NormalizedKey], records: &[Record]) -> CanonicalAuthor {
    let members = &cluster.members;
    let smallest = members
        .first()
        .map(|node| records[node.index()].id.as_str())
        .unwrap_or_default();

    let normalized_name = canonical_form(members, keys);
    let name = members
        .iter()
        .find(|node| keys[node.index()].full_name == normalized_name)
        .map(|&node| display_name(&keys[node.index()], &records[node.index()]))
        .unwrap_or_default();

    let affiliation_tokens = members
        .iter()
        .flat_map(|node| keys[node.index()].affiliation_tokens.iter().cloned())
        .collect();
    let affiliations = members
        .iter()
        .flat_map(|node| records[node.index()].affiliations.iter())
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let orcid = members
        .iter()
        .filter_map(|node| keys[node.index()].orcid.clone())
        .min();
    let years = members
        .iter()
        .filter_map(|node| keys[node.index()].year)
        .fold(None, |span, year| match span {
            None => Some((year, year)),
            Some((low, high)) => Some((low.min(year), high.max(year))),
        });

    CanonicalAuthor {
        id: CanonicalAuthorId::for_record(smallest),
        name,
        normalized_name,
        affiliation_tokens,
        affiliations,
        members: members.iter().map(|node| records[node.index()].id.clone()).collect(),
        orcid,
        years,
        ambiguous: cluster.ambiguous,
    }
}

/// Most frequent full-name form; ties go to the longest, then the smallest.
/// Empty forms only win when no member has anything else.
fn canonical_form(members: &[NodeId], keys: &[NormalizedKey]) -> CompactString {
    let mut counts: BTreeMap<&CompactString, usize> = BTreeMap::new();
    for node in members {
        *counts.entry(&keys[node.index()].full_name).or_default() += 1;
    }

    counts
        .into_iter()
        .max_by(|(x, cx), (y, cy)| {
            (!x.is_empty())
                .cmp(&!y.is_empty())
                .then_with(|| cx.cmp(cy))
                .then_with(|| x.chars().count().cmp(&y.chars().count()))
                .then_with(|| y.cmp(x))
        })
        .map(|(form, _)| form.clone())
        .unwrap_or_default()
}

fn display_name(key: &NormalizedKey, record: &Record) -> String {
    match &key.name {
        Some(name) if !name.display.is_empty() => name.display.clone(),
        _ => record.name.trim().to_string(),
    }
}
