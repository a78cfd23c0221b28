use crate::regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static ORCID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-?(\d{4})-?(\d{4})-?(\d{3}[\dX])$").unwrap()
});

/// Formats an ORCID iD by removing URL prefixes and normalizing separators
///
/// Returns `None` when the value does not look like an ORCID iD.
///
/// # Arguments
///
/// * `orcid_str` - The ORCID string to format
pub(crate) fn format_orcid(orcid_str: &str) -> Option<String> {
    let trimmed = orcid_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Keep only the path segment after any "https://orcid.org/" style prefix
    let tail = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let candidate = tail
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .replace(|c: char| c.is_whitespace(), "")
        .to_uppercase();

    ORCID_REGEX
        .captures(&candidate)
        .map(|caps| format!("{}-{}-{}-{}", &caps[1], &caps[2], &caps[3], &caps[4]))
}

/// Jaccard similarity of two token sets.
///
/// An empty side carries no evidence, so the result is `0.0` rather than
/// the conventional `1.0` for two empty sets.
pub(crate) fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Collapse runs of whitespace into a single space and trim the ends
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
