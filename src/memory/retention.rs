//! Retention — decay scoring, classification, and archival.
//!
//! score = base-by-type × exp(−ageHours / halfLifeHours) × (1 + ln(1 + accessCount))
//!
//! High-value types (decision, gotcha) start higher and several conditions
//! grant outright immunity from archival, whatever the score says.

use serde::Serialize;

use crate::error::Result;
use crate::index::SearchIndex;
use crate::memory::observations::ObservationStore;
use crate::memory::types::{Observation, ObservationType};

// Decay constants. These varied across deployments, so they are named and
// overridable through the [retention] config section rather than inlined.

/// Base score per type. Decisions and gotchas keep their value longest.
pub fn base_score(obs_type: ObservationType) -> f64 {
    match obs_type {
        ObservationType::Decision | ObservationType::Gotcha => BASE_SCORE_HIGH,
        ObservationType::TradeOff | ObservationType::ProblemSolution => BASE_SCORE_MEDIUM,
        ObservationType::WhyItExists
        | ObservationType::HowItWorks
        | ObservationType::Discovery
        | ObservationType::WhatChanged => BASE_SCORE_LOW,
        ObservationType::SessionRequest => BASE_SCORE_FLOOR,
    }
}

pub const BASE_SCORE_HIGH: f64 = 10.0;
pub const BASE_SCORE_MEDIUM: f64 = 8.0;
pub const BASE_SCORE_LOW: f64 = 6.0;
pub const BASE_SCORE_FLOOR: f64 = 3.0;

/// Default half-life, in hours (~30 days).
pub const HALF_LIFE_HOURS: f64 = 720.0;

/// Records that explain *why* decay slower (~90 days).
pub const CAUSAL_HALF_LIFE_HOURS: f64 = 2_160.0;

/// Classification boundaries.
pub const ACTIVE_MIN_SCORE: f64 = 5.0;
pub const STALE_MIN_SCORE: f64 = 1.0;

/// Access count that makes a record immune regardless of score.
pub const IMMUNE_ACCESS_COUNT: u32 = 5;

/// Overridable decay parameters, defaulted from the named constants.
#[derive(Debug, Clone)]
pub struct RetentionParams {
    pub half_life_hours: f64,
    pub causal_half_life_hours: f64,
}

impl Default for RetentionParams {
    fn default() -> Self {
        Self {
            half_life_hours: HALF_LIFE_HOURS,
            causal_half_life_hours: CAUSAL_HALF_LIFE_HOURS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionClass {
    Active,
    Stale,
    Archive,
}

/// Decay score of one observation at `now`.
pub fn score(obs: &Observation, now: chrono::DateTime<chrono::Utc>, params: &RetentionParams) -> f64 {
    let age_hours = chrono::DateTime::parse_from_rfc3339(&obs.created_at)
        .map(|created| (now - created.with_timezone(&chrono::Utc)).num_minutes() as f64 / 60.0)
        .unwrap_or(0.0)
        .max(0.0);

    let half_life = if obs.has_causal_language {
        params.causal_half_life_hours
    } else {
        params.half_life_hours
    };

    let decay = (-age_hours * std::f64::consts::LN_2 / half_life).exp();
    let access_boost = 1.0 + (1.0 + obs.access_count as f64).ln();

    base_score(obs.obs_type) * decay * access_boost
}

pub fn classify(value: f64) -> RetentionClass {
    if value > ACTIVE_MIN_SCORE {
        RetentionClass::Active
    } else if value >= STALE_MIN_SCORE {
        RetentionClass::Stale
    } else {
        RetentionClass::Archive
    }
}

/// Archival immunity: causal language, the always-keep types, or heavy use.
pub fn is_immune(obs: &Observation) -> bool {
    obs.has_causal_language
        || matches!(
            obs.obs_type,
            ObservationType::Decision | ObservationType::Gotcha | ObservationType::TradeOff
        )
        || obs.access_count >= IMMUNE_ACCESS_COUNT
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    pub archived: usize,
    pub immune_skipped: usize,
    pub active: usize,
    pub stale: usize,
    pub candidates: usize,
}

/// Move all non-immune observations scoring below `threshold` to the archive
/// file and drop them from the live set and the index. One-way: nothing ever
/// moves back through this engine.
///
/// With `dry_run` the classification report is computed and nothing moves.
pub fn archive(
    store: &mut ObservationStore,
    index: &mut SearchIndex,
    threshold: f64,
    params: &RetentionParams,
    dry_run: bool,
) -> Result<ArchiveReport> {
    let now = chrono::Utc::now();

    let mut to_archive: Vec<Observation> = Vec::new();
    let mut report = ArchiveReport {
        archived: 0,
        immune_skipped: 0,
        active: 0,
        stale: 0,
        candidates: 0,
    };

    for obs in store.all() {
        let value = score(obs, now, params);
        match classify(value) {
            RetentionClass::Active => report.active += 1,
            RetentionClass::Stale => report.stale += 1,
            RetentionClass::Archive => report.candidates += 1,
        }
        if value < threshold {
            if is_immune(obs) {
                report.immune_skipped += 1;
            } else {
                to_archive.push(obs.clone());
            }
        }
    }

    if dry_run || to_archive.is_empty() {
        return Ok(report);
    }

    let ids: Vec<u64> = to_archive.iter().map(|o| o.id).collect();
    let dir = store.data_dir().clone();
    dir.with_lock(|| {
        store.reconcile_from_disk()?;
        store.data_dir().append_archive(&to_archive)?;
        store.remove_archived(&ids, index);
        store.persist_replacing()
    })?;

    report.archived = ids.len();
    tracing::info!(archived = report.archived, threshold, "retention archival complete");
    Ok(report)
}
