// src/domain/search.rs
//
// Field autocomplete and the universal case search ranking.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::CaseStatus;

pub const MIN_QUERY_CHARS: usize = 2;
pub const AUTOCOMPLETE_LIMIT: usize = 8;
pub const SEARCH_PREFETCH: i64 = 150;
pub const SEARCH_LIMIT: usize = 10;

const EXACT_SCORE: u32 = 130;
const PREFIX_SCORE: u32 = 110;
const SUBSTRING_SCORE: u32 = 90;
const WORD_PREFIX_SCORE: u32 = 75;
const FUZZY_CEILING: f64 = 60.0;
const FUZZY_FLOOR: f64 = 0.65;

/// Lowercases and collapses runs of whitespace.
pub fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn like_prefix(normalized: &str) -> String {
    format!("{}%", escape_like(normalized))
}

pub fn like_contains(normalized: &str) -> String {
    format!("%{}%", escape_like(normalized))
}

// ───────────────────────────────────────
// Autocomplete
// ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutocompleteField {
    Place,
    Diagnosis,
    ReferredBy,
}

impl AutocompleteField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "place" => Some(AutocompleteField::Place),
            "diagnosis" => Some(AutocompleteField::Diagnosis),
            "referred_by" => Some(AutocompleteField::ReferredBy),
            _ => None,
        }
    }

    /// Column name; only ever one of these constants reaches SQL.
    pub fn column(self) -> &'static str {
        match self {
            AutocompleteField::Place => "place",
            AutocompleteField::Diagnosis => "diagnosis",
            AutocompleteField::ReferredBy => "referred_by",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequentValue {
    pub text: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Suggestions {
    Matches(Vec<String>),
    Common(Vec<FrequentValue>),
}

fn is_short_acronym(token: &str) -> bool {
    token.chars().count() <= 5
        && token.chars().any(char::is_alphabetic)
        && token.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase)
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Display form for a group of spellings sharing one normalized form:
/// short all-caps tokens are kept when any spelling uses them, the rest is title-cased.
fn display_form(variants: &[&str]) -> String {
    let tokenized: Vec<Vec<&str>> = variants.iter().map(|v| v.split_whitespace().collect()).collect();
    let width = tokenized.first().map_or(0, Vec::len);
    (0..width)
        .map(|i| {
            tokenized
                .iter()
                .filter_map(|tokens| tokens.get(i))
                .find(|token| is_short_acronym(token))
                .map(|token| token.to_string())
                .unwrap_or_else(|| title_case(tokenized[0][i]))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds suggestions from `(stored value, occurrences)` pairs.
///
/// An empty query lists the most common values with counts; a query shorter
/// than two characters yields nothing; otherwise distinct values whose
/// normalized form starts with the normalized query, sorted.
pub fn suggest(values: &[(String, i64)], raw_query: &str) -> Suggestions {
    let query = normalize(raw_query);
    if !query.is_empty() && query.chars().count() < MIN_QUERY_CHARS {
        return Suggestions::Matches(Vec::new());
    }

    let mut groups: BTreeMap<String, (Vec<&str>, i64)> = BTreeMap::new();
    for (value, count) in values {
        let key = normalize(value);
        if key.is_empty() || !key.starts_with(&query) {
            continue;
        }
        let entry = groups.entry(key).or_default();
        entry.0.push(value.as_str());
        entry.1 += count;
    }

    if query.is_empty() {
        let mut common: Vec<FrequentValue> = groups
            .values()
            .map(|(variants, count)| FrequentValue { text: display_form(variants), count: *count })
            .collect();
        common.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.text.cmp(&b.text)));
        common.truncate(AUTOCOMPLETE_LIMIT);
        Suggestions::Common(common)
    } else {
        let mut matches: Vec<String> = groups.values().map(|(variants, _)| display_form(variants)).collect();
        matches.sort();
        matches.truncate(AUTOCOMPLETE_LIMIT);
        Suggestions::Matches(matches)
    }
}

// ───────────────────────────────────────
// Universal case search
// ───────────────────────────────────────

#[derive(Debug, Clone, FromRow)]
pub struct SearchCandidate {
    pub case_id: i64,
    pub uhid: String,
    pub patient_name: String,
    pub phone_number: String,
    pub diagnosis: String,
    pub age: Option<i32>,
    pub place: String,
    pub status: CaseStatus,
    pub category_name: String,
    pub high_risk: bool,
    pub referred_by: String,
    pub ncd_flags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub kind: &'static str,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: i64,
    pub uhid: String,
    pub name: String,
    pub age: Option<i32>,
    pub village: String,
    pub phone_number: String,
    pub diagnosis: String,
    pub category: String,
    pub status: CaseStatus,
    pub score: u32,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<Tag>,
    pub detail_url: String,
}

const PREFETCH_STEM_CHARS: usize = 3;

/// LIKE patterns for the prefetch: the first few characters of each query word,
/// so misspelled words still pull their candidates in for fuzzy scoring.
pub fn prefetch_patterns(query: &str) -> Vec<String> {
    let mut patterns: Vec<String> = normalize(query)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| like_contains(&t.chars().take(PREFETCH_STEM_CHARS).collect::<String>()))
        .collect();
    patterns.sort();
    patterns.dedup();
    patterns
}

/// Tiered relevance of one field for an already-normalized query.
pub fn score_field(query: &str, value: &str) -> u32 {
    let value = normalize(value);
    if query.is_empty() || value.is_empty() {
        return 0;
    }
    if value == query {
        return EXACT_SCORE;
    }
    if value.starts_with(query) {
        return PREFIX_SCORE;
    }
    if value.contains(query) {
        return SUBSTRING_SCORE;
    }

    let words: Vec<&str> = value.split(' ').collect();
    if query.split(' ').all(|term| words.iter().any(|w| w.starts_with(term))) {
        return WORD_PREFIX_SCORE;
    }

    let similarity = words
        .iter()
        .map(|w| strsim::normalized_levenshtein(query, w))
        .fold(strsim::normalized_levenshtein(query, &value), f64::max);
    if similarity < FUZZY_FLOOR {
        0
    } else {
        ((similarity * FUZZY_CEILING) as u32).min(FUZZY_CEILING as u32 - 1)
    }
}

/// Best field score; identifiers get a small bonus so an equal-tier UHID or
/// phone hit outranks a name or diagnosis hit.
pub fn score_candidate(query: &str, candidate: &SearchCandidate) -> u32 {
    [
        (candidate.uhid.as_str(), 6),
        (candidate.phone_number.as_str(), 4),
        (candidate.patient_name.as_str(), 2),
        (candidate.diagnosis.as_str(), 0),
    ]
    .into_iter()
    .map(|(value, bonus)| match score_field(query, value) {
        0 => 0,
        score => score + bonus,
    })
    .max()
    .unwrap_or(0)
}

fn tags(candidate: &SearchCandidate) -> Vec<Tag> {
    let mut tags = vec![Tag { kind: "category", label: candidate.category_name.clone() }];
    if candidate.high_risk {
        tags.push(Tag { kind: "high_risk", label: "High risk".into() });
    }
    if !candidate.referred_by.trim().is_empty() {
        tags.push(Tag { kind: "referred", label: format!("Ref: {}", candidate.referred_by.trim()) });
    }
    if !candidate.ncd_flags.is_empty() {
        tags.push(Tag { kind: "ncd", label: candidate.ncd_flags.join(", ") });
    }
    tags
}

/// Scores, drops non-matches, orders by (score desc, updated desc, id desc), keeps the top ten.
pub fn rank(raw_query: &str, candidates: Vec<SearchCandidate>) -> Vec<SearchResult> {
    let query = normalize(raw_query);
    if query.chars().count() < MIN_QUERY_CHARS {
        return Vec::new();
    }

    let mut scored: Vec<(u32, SearchCandidate)> = candidates
        .into_iter()
        .map(|c| (score_candidate(&query, &c), c))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by_key(|(score, c)| (Reverse(*score), Reverse(c.updated_at), Reverse(c.case_id)));
    scored.truncate(SEARCH_LIMIT);

    scored
        .into_iter()
        .map(|(score, c)| SearchResult {
            id: c.case_id,
            tags: tags(&c),
            detail_url: format!("/api/v1/cases/{}", c.case_id),
            uhid: c.uhid,
            name: c.patient_name,
            age: c.age,
            village: c.place,
            phone_number: c.phone_number,
            diagnosis: c.diagnosis,
            category: c.category_name,
            status: c.status,
            score,
            updated_at: c.updated_at,
        })
        .collect()
}
