//! Parameter definitions for the observation and retention MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `memory_store` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryStoreParams {
    /// Entity this observation belongs to in the knowledge graph.
    #[schemars(description = "Entity this observation belongs to (e.g. a module or subsystem name)")]
    pub entity_name: String,

    /// Observation type, e.g. `"decision"`, `"gotcha"`, `"how-it-works"`.
    #[schemars(
        description = "Observation type: session-request, gotcha, problem-solution, how-it-works, what-changed, discovery, why-it-exists, decision, or trade-off"
    )]
    pub r#type: String,

    /// Short title, ~5–10 words.
    #[schemars(description = "Short title, roughly 5-10 words")]
    pub title: String,

    /// Free-text narrative.
    #[schemars(description = "Free-text narrative of what was learned or done")]
    pub narrative: String,

    /// Discrete assertions extracted from the narrative.
    #[schemars(description = "Discrete factual assertions, one per entry")]
    pub facts: Option<Vec<String>>,

    /// Paths touched by the work being recorded.
    #[schemars(description = "File paths touched by the work being recorded")]
    pub files_modified: Option<Vec<String>>,

    /// Concept tags; the extractor enriches these automatically.
    #[schemars(description = "Concept tags; identifier-like tokens are added automatically")]
    pub concepts: Option<Vec<String>>,

    /// `family/slug` key making this observation upsert-unique per project.
    #[schemars(
        description = "Optional 'family/slug' topic key. Storing again with the same key updates the existing observation in place."
    )]
    pub topic_key: Option<String>,

    /// Session to attach the observation to.
    #[schemars(description = "Optional session id to attach this observation to")]
    pub session_id: Option<String>,
}

/// Parameters for the `memory_search` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemorySearchParams {
    /// Search query; empty returns recent observations in insertion order.
    #[schemars(description = "Search query. Empty string lists observations in insertion order.")]
    pub query: String,

    /// Project id override; defaults to the detected project.
    #[schemars(description = "Project id to search. Defaults to the current project.")]
    pub project_id: Option<String>,

    /// Restrict to one observation type.
    #[schemars(description = "Restrict results to one observation type")]
    pub r#type: Option<String>,

    /// ISO-8601 lower bound on createdAt.
    #[schemars(description = "Only observations created at or after this ISO-8601 timestamp")]
    pub since: Option<String>,

    /// ISO-8601 upper bound on createdAt.
    #[schemars(description = "Only observations created at or before this ISO-8601 timestamp")]
    pub until: Option<String>,

    /// Maximum number of hits.
    #[schemars(description = "Maximum number of hits to return")]
    pub limit: Option<usize>,

    /// Token budget across returned hits.
    #[schemars(description = "Stop adding hits once the next one would exceed this token budget")]
    pub max_tokens: Option<usize>,

    /// Require the vector channel; fails when no embedding backend is active.
    #[schemars(
        description = "Require vector similarity search. Errors with EmbeddingUnavailable when no embedding backend is active."
    )]
    pub vector_only: Option<bool>,
}

/// Parameters for the `memory_timeline` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryTimelineParams {
    /// Observation to center the window on.
    #[schemars(description = "Observation id to center the timeline on")]
    pub anchor_id: u64,

    /// Neighbors before the anchor (default 3).
    #[schemars(description = "How many observations before the anchor (default 3)")]
    pub depth_before: Option<usize>,

    /// Neighbors after the anchor (default 3).
    #[schemars(description = "How many observations after the anchor (default 3)")]
    pub depth_after: Option<usize>,
}

/// Parameters for the `memory_get` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryGetParams {
    /// Observation ids to hydrate in full.
    #[schemars(description = "Observation ids to return in full")]
    pub ids: Vec<u64>,
}

/// Parameters for the `memory_delete` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryDeleteParams {
    /// Observation id to delete.
    #[schemars(description = "Observation id to delete permanently")]
    pub id: u64,
}

/// Parameters for the `memory_archive` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryArchiveParams {
    /// Retention-score threshold below which records are archived.
    #[schemars(
        description = "Archive non-immune observations whose retention score falls below this threshold (default 1.0)"
    )]
    pub threshold: Option<f64>,

    /// Report what would happen without moving anything.
    #[schemars(description = "Classify and report only; move nothing")]
    pub dry_run: Option<bool>,
}
