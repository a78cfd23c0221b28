//! Name and affiliation normalization.
//!
//! Turns raw bibliographic strings into comparable keys. Everything here is
//! a pure function of its input: the same raw strings always produce the
//! same [`NormalizedKey`].
//!
//! ## Rules
//!
//! 1. Lowercase fold with diacritic stripping (`"Müller"` → `"muller"`)
//! 2. Whitespace/punctuation collapsing, honorific and suffix removal
//! 3. Name form detection: `"Smith, John A."`, `"Smith JA"` and `"John A. Smith"`
//!    all produce surname `smith`
//! 4. Initials are kept as single-letter tokens, so `"J. Smith"` (`j smith`)
//!    and `"John Smith"` (`john smith`) are compatible but distinguishable
//! 5. Affiliations become a set of organization tokens with generic words
//!    (`university`, `department`, ...) removed
//!
//! ```
//! use bibident::normalize::normalize;
//!
//! let key = normalize("Smith, John A.", &["Dept. of Physics, MIT"], &["Jane Doe"]);
//! assert_eq!(key.full_name, "john a smith");
//! assert!(key.affiliation_tokens.contains("mit"));
//! assert_eq!(key.coauthors[0].full(), "jane doe");
//! ```

use crate::Record;
use crate::utils::{collapse_whitespace, format_orcid};
use compact_str::CompactString;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Letters that NFKD leaves intact but which have a conventional ASCII form.
const FOLD_REPLACEMENTS: [(char, &str); 14] = [
    ('ß', "ss"),
    ('ø', "o"),
    ('Ø', "o"),
    ('ł', "l"),
    ('Ł', "l"),
    ('æ', "ae"),
    ('Æ', "ae"),
    ('œ', "oe"),
    ('Œ', "oe"),
    ('đ', "d"),
    ('Đ', "d"),
    ('þ', "th"),
    ('Þ', "th"),
    ('ı', "i"),
];

const HONORIFICS: &[&str] = &["dr", "prof", "professor", "mr", "mrs", "ms", "sir"];

const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "phd", "md", "esq"];

/// Lowercase particles that belong to the surname when they precede it.
const SURNAME_PARTICLES: &[&str] = &[
    "van", "von", "de", "der", "den", "da", "di", "del", "della", "du", "dos", "le", "la", "bin",
    "al", "ter",
];

/// Short surnames that are usually written in capitals after the given name
/// (`"Wei WU"`), where they would otherwise read as MEDLINE initials.
const SHORT_SURNAMES: &[&str] = &[
    "an", "bai", "cai", "cao", "cho", "dai", "du", "fan", "fu", "gao", "guo", "han", "he", "ho",
    "hou", "hu", "im", "ji", "jin", "kim", "ko", "lai", "lam", "lau", "li", "lim", "lin", "liu",
    "lu", "luo", "ma", "mao", "nam", "ng", "oh", "pan", "qi", "ryu", "shi", "son", "su", "sun",
    "tan", "tao", "wan", "wu", "xie", "xu", "yan", "ye", "yin", "yu", "zhu",
];

const AFFILIATION_ABBREVIATIONS: &[(&str, &str)] = &[
    ("univ", "university"),
    ("inst", "institute"),
    ("dept", "department"),
    ("natl", "national"),
    ("lab", "laboratory"),
    ("labs", "laboratory"),
    ("tech", "technology"),
    ("technol", "technology"),
    ("sci", "science"),
    ("sciences", "science"),
    ("ctr", "center"),
    ("centre", "center"),
    ("hosp", "hospital"),
    ("intl", "international"),
    ("res", "research"),
    ("acad", "academy"),
];

const AFFILIATION_STOPWORDS: &[&str] = &[
    "of", "the", "and", "for", "at", "in", "de", "der", "des", "du", "la", "le", "di", "del", "y",
    "e", "und", "et",
];

/// Organization-type words shared by unrelated institutions.
const GENERIC_ORGANIZATION_WORDS: &[&str] = &[
    "university",
    "universitat",
    "universite",
    "universidad",
    "universidade",
    "universita",
    "universiteit",
    "institute",
    "institut",
    "instituto",
    "istituto",
    "college",
    "school",
    "department",
    "faculty",
    "laboratory",
    "center",
    "hospital",
    "academy",
    "division",
    "graduate",
    "campus",
];

/// A parsed personal name.
///
/// `surname` and `given` are folded and stripped of punctuation; `display`
/// keeps the original casing in "Given Surname" order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedName {
    /// Folded surname, particles included (`"van beethoven"`)
    pub surname: CompactString,
    /// Folded given-name tokens; initials are single letters
    pub given: Vec<CompactString>,
    /// Human-readable form in "Given Surname" order
    pub display: String,
}

impl NormalizedName {
    /// First letter of the first given-name token.
    pub fn first_initial(&self) -> Option<char> {
        self.given.first().and_then(|token| token.chars().next())
    }

    /// Full normalized form, given names first (`"john a smith"`).
    pub fn full(&self) -> String {
        self.given
            .iter()
            .map(CompactString::as_str)
            .chain(std::iter::once(self.surname.as_str()))
            .filter(|s| !s.is_empty())
            .join(" ")
    }

    /// Whether both names can belong to the same person: same surname, and
    /// given-name tokens that agree position by position, an initial agreeing
    /// with any token starting with that letter.
    ///
    /// `"J. Smith"` is compatible with `"John Smith"` and `"Jane Smith"`, but
    /// `"John Smith"` is not compatible with `"Jane Smith"`.
    pub fn is_compatible_with(&self, other: &NormalizedName) -> bool {
        self.surname == other.surname
            && self
                .given
                .iter()
                .zip(&other.given)
                .all(|(x, y)| given_tokens_agree(x, y))
    }

    /// Same surname and given-name tokens, ignoring the display form.
    pub fn same_name(&self, other: &NormalizedName) -> bool {
        self.surname == other.surname && self.given == other.given
    }
}

fn given_tokens_agree(x: &str, y: &str) -> bool {
    if x == y {
        return true;
    }
    let is_initial = |t: &str| t.chars().count() == 1;
    (is_initial(x) || is_initial(y)) && x.chars().next() == y.chars().next()
}

/// Comparable keys derived from one [`Record`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedKey {
    /// Parsed primary name, `None` when the raw name could not be parsed
    pub name: Option<NormalizedName>,
    /// Canonical full-name form; the lowercased trimmed raw name when unparseable
    pub full_name: CompactString,
    /// Parsed alternate (past or variant) names
    pub alternate_names: Vec<NormalizedName>,
    /// Organization tokens from all affiliations
    pub affiliation_tokens: BTreeSet<CompactString>,
    /// Parsed co-author names, excluding the author, ordered by full name
    pub coauthors: Vec<NormalizedName>,
    /// Folded venue name
    pub venue: Option<CompactString>,
    /// Validated ORCID iD
    pub orcid: Option<CompactString>,
    /// Publication year
    pub year: Option<i32>,
    /// Trimmed, lowercased publication identifier
    pub publication: Option<CompactString>,
    /// No parseable name and no other identifying field
    pub malformed: bool,
}

impl NormalizedKey {
    /// Folded surname, if the name was parseable and has one.
    pub fn surname(&self) -> Option<&str> {
        self.name
            .as_ref()
            .map(|n| n.surname.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Primary name followed by alternate names.
    pub fn name_variants(&self) -> impl Iterator<Item = &NormalizedName> {
        self.name.iter().chain(self.alternate_names.iter())
    }
}

/// Normalizes a raw name, affiliations and co-author list into a [`NormalizedKey`].
///
/// Never fails: an unparseable name falls back to its lowercased, trimmed form.
pub fn normalize<A, C>(raw_name: &str, raw_affiliations: &[A], raw_coauthors: &[C]) -> NormalizedKey
where
    A: AsRef<str>,
    C: AsRef<str>,
{
    let name = parse_name(raw_name);
    let full_name = match &name {
        Some(parsed) => CompactString::from(parsed.full()),
        None => CompactString::from(raw_name.trim().to_lowercase()),
    };

    let mut coauthors: Vec<NormalizedName> = raw_coauthors
        .iter()
        .map(|c| -> &str { c.as_ref() })
        .filter(|c| !is_coauthor_placeholder(c))
        .filter_map(parse_name)
        .filter(|coauthor| name.as_ref().is_none_or(|own| !own.is_compatible_with(coauthor)))
        .collect();
    coauthors.sort_by_cached_key(NormalizedName::full);
    coauthors.dedup_by(|x, y| x.same_name(y));

    let affiliation_tokens = affiliation_tokens(raw_affiliations);
    let malformed = name.is_none() && affiliation_tokens.is_empty() && coauthors.is_empty();

    NormalizedKey {
        name,
        full_name,
        alternate_names: Vec::new(),
        affiliation_tokens,
        coauthors,
        venue: None,
        orcid: None,
        year: None,
        publication: None,
        malformed,
    }
}

/// Normalizes every field of a [`Record`] that the scorer compares.
pub fn normalize_record(record: &Record) -> NormalizedKey {
    let mut key = normalize(&record.name, &record.affiliations, &record.coauthors);

    key.alternate_names = record
        .alternate_names
        .iter()
        .filter_map(|n| parse_name(n))
        .filter(|n| Some(n) != key.name.as_ref())
        .collect();
    key.venue = record
        .venue
        .as_deref()
        .map(normalize_venue)
        .filter(|v| !v.is_empty());
    key.orcid = record
        .orcid
        .as_deref()
        .and_then(format_orcid)
        .map(CompactString::from);
    key.year = record.year;
    key.publication = record
        .publication_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| CompactString::from(id.to_lowercase()));
    key.malformed = key.malformed && key.orcid.is_none() && key.alternate_names.is_empty();

    key
}

/// Lowercase fold with diacritics removed.
pub fn fold(input: &str) -> String {
    let mut folded = String::with_capacity(input.len());
    for c in input.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        match FOLD_REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => folded.push_str(to),
            None => folded.extend(c.to_lowercase()),
        }
    }
    folded
}

/// Folds a token and keeps only its alphanumeric characters.
fn clean_token(token: &str) -> String {
    fold(token).chars().filter(|c| c.is_alphanumeric()).collect()
}

fn is_honorific(token: &str) -> bool {
    HONORIFICS.contains(&clean_token(token).as_str())
}

fn is_suffix(token: &str) -> bool {
    SUFFIXES.contains(&clean_token(token).as_str())
}

/// `"et al."` and friends stand in for omitted co-authors.
fn is_coauthor_placeholder(raw: &str) -> bool {
    matches!(clean_token(raw).as_str(), "etal" | "others" | "andothers")
}

fn is_particle(token: &str) -> bool {
    token.chars().all(|c| !c.is_uppercase()) && SURNAME_PARTICLES.contains(&clean_token(token).as_str())
}

/// A block of 1-3 capital letters such as `JA` in `"Smith JA"`.
fn is_initials_block(token: &str) -> bool {
    (1..=3).contains(&token.len()) && token.chars().all(|c| c.is_ascii_uppercase())
}

/// A capitals block that is a surname rather than initials: a known short
/// surname (`WU`, `LI`) or three letters with at least two vowels (`DOE`).
fn is_uppercase_surname(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    let vowels = lower.chars().filter(|c| "aeiou".contains(*c)).count();
    token.len() >= 2 && (SHORT_SURNAMES.contains(&lower.as_str()) || (token.len() == 3 && vowels >= 2))
}

/// `"WU"` → `"Wu"`; tokens that are not all capitals are kept as written.
fn surname_display(token: &str) -> String {
    if token.chars().count() < 2 || token.chars().any(|c| c.is_lowercase()) {
        return token.to_string();
    }
    let mut chars = token.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect())
        .unwrap_or_default()
}

/// Parses a raw personal name in any of the supported forms.
///
/// Returns `None` when nothing usable as a surname survives cleaning.
pub fn parse_name(raw: &str) -> Option<NormalizedName> {
    let raw = collapse_whitespace(raw);
    if raw.is_empty() {
        return None;
    }

    let comma_parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && !is_suffix(part))
        .collect();

    let (surname_tokens, given_tokens, medline): (Vec<&str>, Vec<&str>, bool) =
        if comma_parts.len() >= 2 {
            // "Last, First Middle"
            let given: Vec<&str> = comma_parts[1..]
                .iter()
                .copied()
                .flat_map(str::split_whitespace)
                .filter(|t| !is_honorific(t))
                .collect();
            (comma_parts[0].split_whitespace().collect(), given, false)
        } else {
            let single = comma_parts.first().copied().unwrap_or_default();
            let mut tokens: Vec<&str> = single.split_whitespace().collect();
            while tokens.first().is_some_and(|t| is_honorific(t)) && tokens.len() > 1 {
                tokens.remove(0);
            }
            while tokens.last().is_some_and(|t| is_suffix(t)) && tokens.len() > 1 {
                tokens.pop();
            }
            split_uninverted(tokens)
        };

    let surname = surname_tokens
        .iter()
        .map(|t| clean_token(t))
        .filter(|t| !t.is_empty())
        .join(" ");
    if surname.is_empty() {
        return None;
    }

    let mut given = Vec::new();
    let mut given_display = Vec::new();
    for token in given_tokens {
        push_given_token(token, medline, &mut given, &mut given_display);
    }

    let display = given_display
        .into_iter()
        .chain(surname_tokens.iter().map(|t| surname_display(t)))
        .join(" ");

    Some(NormalizedName {
        surname: CompactString::from(surname),
        given,
        display,
    })
}

/// Splits an uninverted token list into (surname, given, is_medline).
fn split_uninverted(tokens: Vec<&str>) -> (Vec<&str>, Vec<&str>, bool) {
    match tokens.len() {
        0 => (Vec::new(), Vec::new(), false),
        1 => (tokens, Vec::new(), false),
        n => {
            let last = tokens[n - 1];
            let first_is_caps = tokens[0].chars().all(|c| !c.is_lowercase());
            if is_initials_block(last) && !first_is_caps {
                if is_uppercase_surname(last) {
                    // "Wei WU"
                    return (vec![last], tokens[..n - 1].to_vec(), false);
                }
                // "Smith JA"
                return (tokens[..n - 1].to_vec(), vec![last], true);
            }

            // "First Middle [particles] Last"
            let mut surname_start = n - 1;
            while surname_start > 1 && is_particle(tokens[surname_start - 1]) {
                surname_start -= 1;
            }
            (tokens[surname_start..].to_vec(), tokens[..surname_start].to_vec(), false)
        }
    }
}

/// Splits one raw given-name token into normalized pieces and display pieces.
fn push_given_token(
    token: &str,
    medline: bool,
    given: &mut Vec<CompactString>,
    display: &mut Vec<String>,
) {
    // "JA" after a comma or in MEDLINE form is a run of initials
    let initials_run = token.len() >= 2 && is_initials_block(token) && (medline || !token.contains('.'));
    if initials_run {
        for c in token.chars() {
            given.push(CompactString::from(clean_token(&c.to_string())));
            display.push(format!("{c}."));
        }
        return;
    }

    for piece in token.split(['-', '.']).filter(|p| !p.is_empty()) {
        let cleaned = clean_token(piece);
        if cleaned.is_empty() {
            continue;
        }
        if cleaned.chars().count() == 1 {
            display.push(format!("{}.", piece.to_uppercase()));
        } else {
            display.push(piece.to_string());
        }
        given.push(CompactString::from(cleaned));
    }
}

/// Tokenizes affiliation strings into organization tokens.
pub fn affiliation_tokens<S: AsRef<str>>(raw_affiliations: &[S]) -> BTreeSet<CompactString> {
    raw_affiliations
        .iter()
        .flat_map(|affiliation| {
            fold(affiliation.as_ref())
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| t.chars().count() >= 2 && !t.chars().all(|c| c.is_ascii_digit()))
                .map(|t| {
                    AFFILIATION_ABBREVIATIONS
                        .iter()
                        .find(|(abbr, _)| *abbr == t)
                        .map_or(t, |(_, full)| *full)
                })
                .filter(|t| {
                    !AFFILIATION_STOPWORDS.contains(t) && !GENERIC_ORGANIZATION_WORDS.contains(t)
                })
                .map(CompactString::from)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Folded venue with punctuation collapsed (`"Phys. Rev. B"` → `"phys rev b"`).
pub fn normalize_venue(raw: &str) -> CompactString {
    CompactString::from(
        fold(raw)
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .join(" "),
    )
}
