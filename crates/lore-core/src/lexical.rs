//! Lexical fallback scorer.
//!
//! Term-overlap ranking over chunk text, used when the vector path is
//! disabled, unavailable or degraded. Pure functions with no state, so they
//! are safe to call from any number of concurrent queries.
//!
//! # Scoring
//!
//! Text is lowercased and split into alphanumeric terms; possessive `'s`
//! and simple plurals are folded (`dragons` → `dragon`) and common English
//! stopwords dropped. For each distinct query term the chunk earns a
//! saturated term frequency `tf / (tf + 0.5)`; the chunk score is the mean
//! over query terms, which lies in `[0, 1)`. Covering more query terms
//! always beats repeating one.

use std::collections::{HashMap, HashSet};

use crate::models::{rank_and_truncate, Chunk, ScoredChunk};

/// Saturation constant for term frequency.
const TF_SATURATION: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for",
    "from", "had", "has", "have", "how", "i", "in", "is", "it", "its", "me", "my", "of", "on",
    "or", "tell", "that", "the", "their", "there", "this", "to", "was", "we", "were", "what",
    "when", "where", "which", "who", "why", "with", "you",
];

/// Split text into normalized search terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter_map(|raw| {
            let word = raw.trim_matches('\'').to_lowercase();
            let word = word
                .strip_suffix("'s")
                .map(str::to_string)
                .unwrap_or(word)
                .replace('\'', "");
            if word.is_empty() || STOPWORDS.contains(&word.as_str()) {
                None
            } else {
                Some(fold_plural(&word))
            }
        })
        .collect()
}

fn fold_plural(word: &str) -> String {
    if word.len() <= 3 || !word.is_ascii() {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    for suffix in ["sses", "shes", "ches", "xes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}

/// Score every chunk against `query`.
///
/// Returns `chunk_id → score` for all given chunks; chunks sharing no term
/// with the query score `0.0`. An empty or stopword-only query scores
/// every chunk `0.0`.
pub fn score<'a, I>(query: &str, chunks: I) -> HashMap<String, f64>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let terms: HashSet<String> = tokenize(query).into_iter().collect();
    chunks
        .into_iter()
        .map(|chunk| (chunk.chunk_id.clone(), score_text(&terms, &chunk.text)))
        .collect()
}

fn score_text(terms: &HashSet<String>, text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let mut tf: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        if terms.contains(&token) {
            *tf.entry(token).or_insert(0) += 1;
        }
    }
    let total: f64 = tf
        .values()
        .map(|&n| n as f64 / (n as f64 + TF_SATURATION))
        .sum();
    total / terms.len() as f64
}

/// Top-`k` chunks by lexical score, dropping chunks that share no term.
///
/// Ties are ordered by `(source_id, ordinal)`. An empty corpus yields an
/// empty result.
pub fn search<'a, I>(query: &str, chunks: I, k: usize) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let chunks: Vec<&Chunk> = chunks.into_iter().collect();
    let scores = score(query, chunks.iter().copied());
    let mut hits: Vec<ScoredChunk> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let s = scores.get(&chunk.chunk_id).copied().unwrap_or(0.0);
            (s > 0.0).then(|| ScoredChunk {
                chunk: chunk.clone(),
                score: s,
            })
        })
        .collect();
    rank_and_truncate(&mut hits, k);
    hits
}
