//! In-memory search index — lexical scoring with optional vector upgrade.
//!
//! The index is rebuilt from `observations.json` on every startup, so crash
//! recovery never needs a repair pass: whatever survived the rename is
//! reindexed. From then on index and observations file are mutated under the
//! same project lock.
//!
//! Three read layers (progressive disclosure): layer 1 returns compact hits
//! from here; layers 2 and 3 read the authoritative observation list in the
//! manager, not the index.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::error::{MemorixError, Result};
use crate::memory::types::{Observation, ObservationType};

/// Searchable fields, in boost order. Nothing else is ever searched.
const FIELD_COUNT: usize = 6;
const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "title",
    "entityName",
    "concepts",
    "narrative",
    "facts",
    "filesModified",
];
const FIELD_BOOSTS: [f32; FIELD_COUNT] = [3.0, 2.0, 1.5, 1.0, 1.0, 0.5];

/// Hybrid-mode knobs.
const SIMILARITY_THRESHOLD: f32 = 0.5;
const TEXT_WEIGHT: f32 = 0.6;
const VECTOR_WEIGHT: f32 = 0.4;

/// Down-weight applied per edit of fuzzy distance.
const FUZZY_WEIGHT: f32 = 0.45;

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    /// Already-expanded alias set; empty means no project filter.
    pub project_aliases: Vec<String>,
    pub obs_type: Option<ObservationType>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
    pub max_tokens: Option<usize>,
}

/// Layer-1 compact hit, ~50–100 tokens on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: u64,
    pub time: String,
    #[serde(rename = "type")]
    pub obs_type: ObservationType,
    pub icon: &'static str,
    pub title: String,
    pub tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_fields: Option<Vec<String>>,
}

struct IndexedDoc {
    project_id: String,
    obs_type: ObservationType,
    created_at: String,
    title: String,
    tokens: usize,
    access_count: u32,
    last_accessed_at: String,
    /// Lowercased field texts, for term frequencies and match annotation.
    field_text: [String; FIELD_COUNT],
    /// term → per-field occurrence counts.
    term_freq: HashMap<String, [u16; FIELD_COUNT]>,
    embedding: Option<Vec<f32>>,
}

#[derive(Default)]
pub struct SearchIndex {
    docs: HashMap<u64, IndexedDoc>,
    /// term → ids of docs containing it in any field.
    postings: HashMap<String, HashSet<u64>>,
    /// Insertion order, for empty-term queries.
    insertion: Vec<u64>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.docs.contains_key(&id)
    }

    /// Insert or replace one observation.
    pub fn insert(&mut self, obs: &Observation, embedding: Option<Vec<f32>>) {
        if self.docs.contains_key(&obs.id) {
            self.remove(obs.id);
        }

        let field_text = [
            obs.title.to_lowercase(),
            obs.entity_name.to_lowercase(),
            obs.concepts.join(" ").to_lowercase(),
            obs.narrative.to_lowercase(),
            obs.facts.join(" ").to_lowercase(),
            obs.files_modified.join(" ").to_lowercase(),
        ];

        let mut term_freq: HashMap<String, [u16; FIELD_COUNT]> = HashMap::new();
        for (field, text) in field_text.iter().enumerate() {
            for token in tokenize(text) {
                term_freq.entry(token).or_default()[field] += 1;
            }
        }

        for term in term_freq.keys() {
            self.postings.entry(term.clone()).or_default().insert(obs.id);
        }

        self.docs.insert(
            obs.id,
            IndexedDoc {
                project_id: obs.project_id.clone(),
                obs_type: obs.obs_type,
                created_at: obs.created_at.clone(),
                title: obs.title.clone(),
                tokens: obs.tokens,
                access_count: obs.access_count,
                last_accessed_at: obs.last_accessed_at.clone(),
                field_text,
                term_freq,
                embedding,
            },
        );
        self.insertion.push(obs.id);
    }

    pub fn remove(&mut self, id: u64) {
        if let Some(doc) = self.docs.remove(&id) {
            for term in doc.term_freq.keys() {
                if let Some(ids) = self.postings.get_mut(term) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.postings.remove(term);
                    }
                }
            }
            self.insertion.retain(|&i| i != id);
        }
    }

    /// Rewrite the stored projectId on alias canonicalization.
    pub fn rewrite_project_id(&mut self, id: u64, canonical: &str) {
        if let Some(doc) = self.docs.get_mut(&id) {
            doc.project_id = canonical.to_string();
        }
    }

    /// Layer-1 search. `query_vector` is the pre-embedded query when a
    /// provider is active; passing `None` keeps the search lexical.
    pub fn search(&self, query: &SearchQuery, query_vector: Option<&[f32]>) -> Result<Vec<SearchHit>> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
        let query_tokens = tokenize(&query.query.to_lowercase());

        // Single alias: push the filter into scoring. Multiple: score the
        // wider pool and post-filter so observations written under a
        // pre-canonical id are not lost.
        let pushdown_alias = match query.project_aliases.len() {
            1 => Some(query.project_aliases[0].as_str()),
            _ => None,
        };

        let mut scored: Vec<(u64, f32)> = if query_tokens.is_empty() {
            // Empty term queries through the scoring path are unreliable;
            // serve straight from insertion order.
            self.insertion
                .iter()
                .filter(|&&id| {
                    self.docs
                        .get(&id)
                        .map(|d| pushdown_alias.map_or(true, |a| d.project_id == a))
                        .unwrap_or(false)
                })
                .map(|&id| (id, 0.0))
                .collect()
        } else {
            let text_scores = self.score_lexical(&query_tokens, pushdown_alias);
            self.combine_scores(text_scores, query_vector, pushdown_alias)
        };

        // Filters that always run in memory, after scoring.
        scored.retain(|(id, _)| {
            let doc = &self.docs[id];
            if !query.project_aliases.is_empty()
                && !query.project_aliases.iter().any(|a| a == &doc.project_id)
            {
                return false;
            }
            if let Some(t) = query.obs_type {
                if doc.obs_type != t {
                    return false;
                }
            }
            if let Some(since) = &query.since {
                if timestamp_lt(&doc.created_at, since) {
                    return false;
                }
            }
            if let Some(until) = &query.until {
                if timestamp_lt(until, &doc.created_at) {
                    return false;
                }
            }
            true
        });

        if !query_tokens.is_empty() {
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
        }
        scored.truncate(limit);

        // Token budget: longest prefix whose sum stays inside, but never an
        // empty result just because the first hit alone is over budget.
        if let Some(budget) = query.max_tokens {
            let mut total = 0usize;
            let mut kept = 0usize;
            for (id, _) in &scored {
                let tokens = self.docs[id].tokens;
                if kept > 0 && total + tokens > budget {
                    break;
                }
                if kept == 0 && tokens > budget {
                    kept = 1;
                    break;
                }
                total += tokens;
                kept += 1;
            }
            scored.truncate(kept);
        }

        Ok(scored
            .iter()
            .map(|(id, _)| {
                let doc = &self.docs[id];
                SearchHit {
                    id: *id,
                    time: doc.created_at.clone(),
                    obs_type: doc.obs_type,
                    icon: doc.obs_type.icon(),
                    title: doc.title.clone(),
                    tokens: doc.tokens,
                    matched_fields: if query_tokens.is_empty() {
                        None
                    } else {
                        Some(self.matched_fields(doc, &query_tokens))
                    },
                }
            })
            .collect())
    }

    /// Require a vector path: error when no provider produced a query vector.
    pub fn require_vector(&self, query_vector: Option<&[f32]>) -> Result<()> {
        if query_vector.is_none() {
            return Err(MemorixError::EmbeddingUnavailable);
        }
        Ok(())
    }

    fn score_lexical(
        &self,
        query_tokens: &[String],
        pushdown_alias: Option<&str>,
    ) -> HashMap<u64, f32> {
        let mut scores: HashMap<u64, f32> = HashMap::new();

        for token in query_tokens {
            let max_edits = if token.chars().count() <= 6 { 1 } else { 2 };

            // Exact postings first, then the fuzzy expansion over the term
            // dictionary, down-weighted per edit.
            let mut matched_terms: Vec<(&String, u32)> = Vec::new();
            for term in self.postings.keys() {
                if term == token {
                    matched_terms.push((term, 0));
                } else if let Some(d) = bounded_levenshtein(token, term, max_edits) {
                    matched_terms.push((term, d));
                }
            }

            for (term, distance) in matched_terms {
                let weight = FUZZY_WEIGHT.powi(distance as i32);
                for &id in &self.postings[term] {
                    let doc = &self.docs[&id];
                    if let Some(alias) = pushdown_alias {
                        if doc.project_id != alias {
                            continue;
                        }
                    }
                    let freq = &doc.term_freq[term];
                    let mut contribution = 0.0f32;
                    for field in 0..FIELD_COUNT {
                        contribution += FIELD_BOOSTS[field] * freq[field] as f32;
                    }
                    *scores.entry(id).or_default() += contribution * weight;
                }
            }
        }

        scores
    }

    /// Merge lexical scores with vector similarity when hybrid mode is on.
    fn combine_scores(
        &self,
        text_scores: HashMap<u64, f32>,
        query_vector: Option<&[f32]>,
        pushdown_alias: Option<&str>,
    ) -> Vec<(u64, f32)> {
        let max_text = text_scores.values().cloned().fold(0.0f32, f32::max);

        let Some(query_vector) = query_vector else {
            return text_scores.into_iter().collect();
        };

        let mut combined: HashMap<u64, f32> = HashMap::new();
        for (&id, score) in &text_scores {
            let normalized = if max_text > 0.0 { score / max_text } else { 0.0 };
            combined.insert(id, TEXT_WEIGHT * normalized);
        }

        for (&id, doc) in &self.docs {
            if let Some(alias) = pushdown_alias {
                if doc.project_id != alias {
                    continue;
                }
            }
            let Some(embedding) = &doc.embedding else {
                continue;
            };
            let similarity = cosine_similarity(query_vector, embedding);
            if similarity >= SIMILARITY_THRESHOLD {
                *combined.entry(id).or_default() += VECTOR_WEIGHT * similarity;
            }
        }

        combined.into_iter().collect()
    }

    /// Field names whose content contains any query token longer than one
    /// char. A hit with no containing field matched only fuzzily.
    fn matched_fields(&self, doc: &IndexedDoc, query_tokens: &[String]) -> Vec<String> {
        let mut fields = Vec::new();
        for (i, name) in FIELD_NAMES.iter().enumerate() {
            let matched = query_tokens
                .iter()
                .filter(|t| t.chars().count() > 1)
                .any(|t| doc.field_text[i].contains(t.as_str()));
            if matched {
                fields.push((*name).to_string());
            }
        }
        if fields.is_empty() {
            fields.push("fuzzy".to_string());
        }
        fields
    }

    /// Bump access stats on the index's copy of each returned hit. The
    /// manager updates the authoritative observation records in the same
    /// fire-and-forget pass.
    pub fn record_access(&mut self, ids: &[u64], now: &str) {
        for id in ids {
            if let Some(doc) = self.docs.get_mut(id) {
                doc.access_count += 1;
                doc.last_accessed_at = now.to_string();
            }
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Levenshtein distance capped at `max`; `None` when the bound is exceeded.
fn bounded_levenshtein(a: &str, b: &str, max: u32) -> Option<u32> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.len().abs_diff(b.len()) > max as usize {
        return None;
    }

    let mut prev: Vec<u32> = (0..=b.len() as u32).collect();
    let mut current = vec![0u32; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i as u32 + 1;
        let mut row_min = current[0];
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut current);
    }

    let distance = prev[b.len()];
    (distance <= max).then_some(distance)
}

/// Compare two timestamps, parsing RFC-3339 when possible and falling back
/// to lexicographic order for identical formats.
fn timestamp_lt(a: &str, b: &str) -> bool {
    match (
        chrono::DateTime::parse_from_rfc3339(a),
        chrono::DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(ta), Ok(tb)) => ta < tb,
        _ => a < b,
    }
}
