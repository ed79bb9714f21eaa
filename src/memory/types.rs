//! Core record definitions.
//!
//! Defines [`ObservationType`] (the nine structured memory categories),
//! [`Observation`] (the primary memory record), the knowledge-graph records
//! ([`Entity`], [`Relation`], [`GraphLine`]), and [`Session`].
//!
//! Field names serialize in camelCase because the on-disk files are shared
//! with other tools that already read and write that shape.

use serde::{Deserialize, Serialize};

/// The closed set of observation types. The type drives the display icon
/// and the retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationType {
    /// What the user asked for in a session.
    SessionRequest,
    /// A surprising pitfall worth never re-learning.
    Gotcha,
    /// A problem paired with the fix that worked.
    ProblemSolution,
    /// How a subsystem actually behaves.
    HowItWorks,
    /// A change that was made and why.
    WhatChanged,
    /// Something learned while exploring.
    Discovery,
    /// The reason a thing exists at all.
    WhyItExists,
    /// A decision that was taken.
    Decision,
    /// A trade-off that was weighed.
    TradeOff,
}

impl ObservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionRequest => "session-request",
            Self::Gotcha => "gotcha",
            Self::ProblemSolution => "problem-solution",
            Self::HowItWorks => "how-it-works",
            Self::WhatChanged => "what-changed",
            Self::Discovery => "discovery",
            Self::WhyItExists => "why-it-exists",
            Self::Decision => "decision",
            Self::TradeOff => "trade-off",
        }
    }

    /// Icon used in compact search results.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::SessionRequest => "💬",
            Self::Gotcha => "⚠️",
            Self::ProblemSolution => "🔧",
            Self::HowItWorks => "⚙️",
            Self::WhatChanged => "📝",
            Self::Discovery => "🔍",
            Self::WhyItExists => "🏛️",
            Self::Decision => "⚖️",
            Self::TradeOff => "🔀",
        }
    }

    pub const ALL: [ObservationType; 9] = [
        Self::SessionRequest,
        Self::Gotcha,
        Self::ProblemSolution,
        Self::HowItWorks,
        Self::WhatChanged,
        Self::Discovery,
        Self::WhyItExists,
        Self::Decision,
        Self::TradeOff,
    ];
}

impl std::fmt::Display for ObservationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObservationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session-request" => Ok(Self::SessionRequest),
            "gotcha" => Ok(Self::Gotcha),
            "problem-solution" => Ok(Self::ProblemSolution),
            "how-it-works" => Ok(Self::HowItWorks),
            "what-changed" => Ok(Self::WhatChanged),
            "discovery" => Ok(Self::Discovery),
            "why-it-exists" => Ok(Self::WhyItExists),
            "decision" => Ok(Self::Decision),
            "trade-off" => Ok(Self::TradeOff),
            _ => Err(format!("unknown observation type: {s}")),
        }
    }
}

/// The primary memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Monotonically increasing, never reused within an installation.
    pub id: u64,
    /// Logical owner in the knowledge graph. Never empty.
    pub entity_name: String,
    #[serde(rename = "type")]
    pub obs_type: ObservationType,
    /// ~5–10 words. Doubles as the dedup signal during migration.
    pub title: String,
    pub narrative: String,
    /// Assertions extracted from the narrative.
    #[serde(default)]
    pub facts: Vec<String>,
    /// Deduplicated case-insensitively after enrichment.
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    /// Precomputed cost estimate of the full record.
    #[serde(default)]
    pub tokens: usize,
    /// Immutable after insert.
    pub created_at: String,
    /// Set only on topic-key upsert.
    #[serde(default)]
    pub updated_at: String,
    /// Canonical project identifier. Rewritten on alias migration.
    pub project_id: String,
    /// Set by the extractor; drives retention immunity.
    #[serde(default)]
    pub has_causal_language: bool,
    /// `family/slug`; unique within a project when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_key: Option<String>,
    /// Incremented on topic-key upsert.
    #[serde(default = "default_revision")]
    pub revision_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Incremented when returned by search.
    #[serde(default)]
    pub access_count: u32,
    #[serde(default)]
    pub last_accessed_at: String,
}

fn default_revision() -> u32 {
    1
}

impl Observation {
    /// The text the embedding provider sees.
    pub fn searchable_text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.narrative);
        for fact in &self.facts {
            text.push(' ');
            text.push_str(fact);
        }
        text
    }
}

/// Estimate the token cost of an observation from its enriched content.
///
/// Pure function of (title, narrative, facts, filesModified, concepts); a
/// chars/4 heuristic, matching what clients budget against.
pub fn estimate_tokens(
    title: &str,
    narrative: &str,
    facts: &[String],
    files_modified: &[String],
    concepts: &[String],
) -> usize {
    let chars = title.len()
        + narrative.len()
        + facts.iter().map(String::len).sum::<usize>()
        + files_modified.iter().map(String::len).sum::<usize>()
        + concepts.iter().map(String::len).sum::<usize>();
    chars.div_ceil(4)
}

/// A knowledge-graph node, unique by `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
    /// Append-only free-text lines.
    #[serde(default)]
    pub observations: Vec<String>,
}

/// A knowledge-graph edge, unique by `(from, to, relationType)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub from: String,
    pub to: String,
    pub relation_type: String,
}

/// One line of `graph.jsonl`, interchangeable with the official memory-server
/// line format. Unknown type tags are rejected, not coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraphLine {
    Entity(Entity),
    Relation(Relation),
}

/// Session status. A session transitions active → completed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub agent: String,
    pub project_id: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Contents of `counter.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    pub next_id: u64,
}

impl Default for Counter {
    fn default() -> Self {
        Self { next_id: 1 }
    }
}
