//! Free-text entity search
//!
//! No single heuristic is reliable against short, noisy queries (ticker
//! symbols, partial names, raw addresses), so independent signals are
//! scored separately and summed: exact, substring, fuzzy edit distance,
//! and term overlap, plus a flat boost for well-known entities.

use std::collections::HashMap;
use std::sync::LazyLock;

use rayon::prelude::*;
use tracing::debug;

use screener_core::{Entity, ScoredEntity, SearchConfig};

const EXACT_MATCH: u32 = 100;
const SUBSTRING_MATCH: u32 = 50;
const ADDRESS_SUBSTRING_MATCH: u32 = 30;
const FUZZY_SCALE: f64 = 40.0;
const TERM_IN_INDEX: u32 = 10;
const INDEX_IN_TERM: u32 = 5;
const POPULARITY_BOOST: u32 = 20;

/// Symbols that get a flat popularity boost when they match at all.
static WELL_KNOWN_SYMBOLS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "weth", "usdc", "usdt", "dai", "wbtc", "uni", "link", "aave", "zora", "degen", "pepe",
    ]
});

/// Cached searchable form of one entity.
#[derive(Debug, Clone)]
pub struct SearchIndexEntry {
    pub entity: Entity,
    normalized_name: String,
    normalized_symbol: String,
    terms: Vec<String>,
}

impl SearchIndexEntry {
    fn build(entity: Entity) -> Self {
        let normalized_name = normalize(&entity.name);
        let normalized_symbol = normalize(&entity.symbol);

        let mut terms: Vec<String> = Vec::new();

        // Word-split fragments of name and symbol
        for word in entity.name.split_whitespace() {
            push_term(&mut terms, word.to_lowercase());
        }
        for word in entity.symbol.split_whitespace() {
            push_term(&mut terms, word.to_lowercase());
        }

        // No-space concatenations and full normalized forms
        push_term(&mut terms, normalized_name.clone());
        push_term(&mut terms, normalized_symbol.clone());

        // Entities with empty name/symbol still index on address
        push_term(&mut terms, entity.address.to_lowercase());

        Self {
            entity,
            normalized_name,
            normalized_symbol,
            terms,
        }
    }
}

/// Searchable term sets per entity, rebuilt only when identity fields
/// change.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    config: SearchConfig,
    entries: HashMap<String, SearchIndexEntry>,
}

impl SearchIndex {
    /// Build a fresh index over the given entity set.
    pub fn build(entities: &[Entity], config: SearchConfig) -> Self {
        let entries: HashMap<String, SearchIndexEntry> = entities
            .par_iter()
            .map(|e| (e.address_key(), SearchIndexEntry::build(e.clone())))
            .collect();

        debug!("Built search index over {} entities", entries.len());

        Self { config, entries }
    }

    /// Refresh the index for a new entity set, reusing term sets for
    /// entities whose name/symbol/address did not change.
    pub fn update(&mut self, entities: &[Entity]) {
        let mut next: HashMap<String, SearchIndexEntry> = HashMap::with_capacity(entities.len());

        for entity in entities {
            let key = entity.address_key();
            match self.entries.remove(&key) {
                Some(mut existing) if existing.entity.identity_fields_eq(entity) => {
                    // Terms are still valid; refresh the volatile fields
                    existing.entity = entity.clone();
                    next.insert(key, existing);
                }
                _ => {
                    next.insert(key, SearchIndexEntry::build(entity.clone()));
                }
            }
        }

        self.entries = next;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Answer a free-text query. Returns at most `limit` entities with a
    /// positive blended match score, best first.
    ///
    /// Queries below the configured minimum length are the caller's
    /// problem; this method just returns nothing for them.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredEntity> {
        let query = query.trim().to_lowercase();
        if query.len() < self.config.min_query_len {
            return Vec::new();
        }

        let normalized_query = normalize(&query);
        let query_terms: Vec<&str> = query.split_whitespace().collect();

        let mut results: Vec<ScoredEntity> = self
            .entries
            .values()
            .filter_map(|entry| {
                let score = self.match_entry(entry, &query, &normalized_query, &query_terms);
                (score > 0).then(|| ScoredEntity {
                    entity: entry.entity.clone(),
                    score: score as f64,
                    match_score: Some(score),
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.match_score
                .cmp(&a.match_score)
                .then_with(|| a.entity.address_key().cmp(&b.entity.address_key()))
        });
        results.truncate(limit);
        results
    }

    fn match_entry(
        &self,
        entry: &SearchIndexEntry,
        query: &str,
        normalized_query: &str,
        query_terms: &[&str],
    ) -> u32 {
        let mut score = 0u32;
        let name = &entry.normalized_name;
        let symbol = &entry.normalized_symbol;

        // Exact matches, cumulative across fields
        if !normalized_query.is_empty() {
            if name == normalized_query {
                score += EXACT_MATCH;
            }
            if symbol == normalized_query {
                score += EXACT_MATCH;
            }
        }
        if entry.entity.address.eq_ignore_ascii_case(query) {
            score += EXACT_MATCH;
        }

        // Substring containment in either direction
        if !normalized_query.is_empty() {
            if contains_either(name, normalized_query) {
                score += SUBSTRING_MATCH;
            }
            if contains_either(symbol, normalized_query) {
                score += SUBSTRING_MATCH;
            }
        }
        if entry.entity.address.to_lowercase().contains(query) {
            score += ADDRESS_SUBSTRING_MATCH;
        }

        // Fuzzy similarity on the raw (unstripped) lowercased fields
        let threshold = self.config.similarity_threshold;
        let name_sim = similarity(&entry.entity.name.to_lowercase(), query);
        if name_sim > threshold {
            score += (name_sim * FUZZY_SCALE).floor() as u32;
        }
        let symbol_sim = similarity(&entry.entity.symbol.to_lowercase(), query);
        if symbol_sim > threshold {
            score += (symbol_sim * FUZZY_SCALE).floor() as u32;
        }

        // Term overlap between query words and indexed terms
        for query_term in query_terms {
            for term in &entry.terms {
                if term.contains(query_term) {
                    score += TERM_IN_INDEX;
                } else if query_term.contains(term.as_str()) {
                    score += INDEX_IN_TERM;
                }
            }
        }

        // Flat boost for well-known entities that matched on anything
        if score > 0 && WELL_KNOWN_SYMBOLS.contains(&symbol.as_str()) {
            score += POPULARITY_BOOST;
        }

        score
    }
}

/// Lowercase and strip all non-alphanumeric characters.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn push_term(terms: &mut Vec<String>, term: String) {
    if !term.is_empty() && !terms.contains(&term) {
        terms.push(term);
    }
}

fn contains_either(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// Similarity ratio in [0, 1] based on normalized Levenshtein distance,
/// with fast paths for equality (1.0) and full containment (0.8).
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(b) || b.contains(a) {
        return 0.8;
    }

    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Classic two-row Levenshtein edit distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
