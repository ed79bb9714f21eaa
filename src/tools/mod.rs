//! MCP tool handler — the service façade.
//!
//! Validates arguments, expands the project alias set once per call, and
//! delegates to the engine. Never reaches into durable files directly: every
//! write path goes through the engine (which takes the project lock), every
//! read path is lock-free.

pub mod graph_params;
pub mod memory_params;
pub mod session_params;

use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};

use crate::engine::Engine;
use crate::error::MemorixError;
use crate::memory::observations::StoreInput;
use crate::memory::types::{Entity, ObservationType, Relation};
use graph_params::*;
use memory_params::*;
use session_params::*;

/// The Memorix MCP tool handler. Holds the engine and exposes all tools via
/// the `#[tool_router]` macro.
#[derive(Clone)]
pub struct MemorixTools {
    tool_router: ToolRouter<Self>,
    engine: Arc<Mutex<Engine>>,
}

/// Shape an error as a JSON payload carrying the taxonomy kind.
fn tool_err(e: impl Into<anyhow::Error>) -> String {
    let e = e.into();
    let kind = e
        .downcast_ref::<MemorixError>()
        .map(MemorixError::kind)
        .unwrap_or("Internal");
    serde_json::json!({ "kind": kind, "message": e.to_string() }).to_string()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl MemorixTools {
    pub fn new(engine: Arc<Mutex<Engine>>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Engine>, String> {
        self.engine
            .lock()
            .map_err(|e| format!("engine lock poisoned: {e}"))
    }

    /// Run a blocking engine operation off the async thread.
    async fn blocking<T, F>(&self, op: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> Result<T, String> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut guard = engine
                .lock()
                .map_err(|e| format!("engine lock poisoned: {e}"))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| format!("task failed: {e}"))?
    }

    // ── Observations ─────────────────────────────────────────────────────

    /// Store a structured observation; same topic key updates in place.
    #[tool(
        description = "Store a structured observation about this project. Reusing a topicKey updates the existing observation instead of creating a new one."
    )]
    async fn memory_store(
        &self,
        Parameters(params): Parameters<MemoryStoreParams>,
    ) -> Result<String, String> {
        let obs_type = ObservationType::from_str(&params.r#type)?;

        if params.entity_name.trim().is_empty() {
            return Err("entity_name must not be empty".into());
        }
        if params.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        if let Some(topic_key) = &params.topic_key {
            if !topic_key.contains('/') {
                return Err("topic_key must look like 'family/slug'".into());
            }
        }

        tracing::info!(
            entity = %params.entity_name,
            obs_type = %obs_type,
            topic_key = params.topic_key.as_deref().unwrap_or(""),
            "memory_store called"
        );

        let input = StoreInput {
            entity_name: params.entity_name,
            obs_type,
            title: params.title,
            narrative: params.narrative,
            facts: params.facts.unwrap_or_default(),
            files_modified: params.files_modified.unwrap_or_default(),
            concepts: params.concepts.unwrap_or_default(),
            project_id: String::new(),
            topic_key: params.topic_key,
            session_id: params.session_id,
        };

        let outcome = self
            .blocking(move |engine| engine.store_observation(input).map_err(tool_err))
            .await?;

        tracing::info!(
            id = outcome.observation.id,
            updated = outcome.updated,
            "observation stored"
        );

        to_json(&serde_json::json!({
            "id": outcome.observation.id,
            "updated": outcome.updated,
            "revisionCount": outcome.observation.revision_count,
            "tokens": outcome.observation.tokens,
        }))
    }

    /// Layer-1 search returning compact hits.
    #[tool(
        description = "Search observations. Returns compact hits (id, title, type, tokens); use memory_get for full records and memory_timeline for surrounding context."
    )]
    async fn memory_search(
        &self,
        Parameters(params): Parameters<MemorySearchParams>,
    ) -> Result<String, String> {
        let obs_type = params
            .r#type
            .as_deref()
            .map(ObservationType::from_str)
            .transpose()?;

        // Embedding the query may be CPU-heavy, so the whole search runs off
        // the async thread.
        let query = params.query;
        let project_id = params.project_id;
        let since = params.since;
        let until = params.until;
        let limit = params.limit;
        let max_tokens = params.max_tokens;
        let vector_only = params.vector_only.unwrap_or(false);
        let hits = self
            .blocking(move |engine| {
                engine
                    .search(
                        &query,
                        project_id.as_deref(),
                        obs_type,
                        since,
                        until,
                        limit,
                        max_tokens,
                        vector_only,
                    )
                    .map_err(tool_err)
            })
            .await?;

        // Fire-and-forget access accounting: never blocks the response and
        // its failures are swallowed.
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        if !ids.is_empty() {
            let engine = Arc::clone(&self.engine);
            tokio::task::spawn_blocking(move || {
                if let Ok(mut guard) = engine.lock() {
                    if let Err(e) = guard.record_access(&ids) {
                        tracing::debug!(error = %e, "access accounting failed");
                    }
                }
            });
        }

        let total = hits.len();
        to_json(&serde_json::json!({ "hits": hits, "total": total }))
    }

    /// Layer-2 timeline around one observation.
    #[tool(description = "Show the observations created just before and after an anchor observation.")]
    async fn memory_timeline(
        &self,
        Parameters(params): Parameters<MemoryTimelineParams>,
    ) -> Result<String, String> {
        let engine = self.lock()?;
        let window = engine
            .timeline(
                params.anchor_id,
                params.depth_before.unwrap_or(3),
                params.depth_after.unwrap_or(3),
            )
            .map_err(tool_err)?;
        to_json(&serde_json::json!({ "observations": window }))
    }

    /// Layer-3 detail: full records by id.
    #[tool(description = "Return full observation records by id.")]
    async fn memory_get(
        &self,
        Parameters(params): Parameters<MemoryGetParams>,
    ) -> Result<String, String> {
        let engine = self.lock()?;
        let observations = engine.get_observations(&params.ids).map_err(tool_err)?;
        to_json(&serde_json::json!({ "observations": observations }))
    }

    /// Permanently delete one observation.
    #[tool(description = "Permanently delete one observation by id.")]
    async fn memory_delete(
        &self,
        Parameters(params): Parameters<MemoryDeleteParams>,
    ) -> Result<String, String> {
        let id = params.id;
        let removed = self
            .blocking(move |engine| engine.delete_observation(id).map_err(tool_err))
            .await?;
        tracing::info!(id = removed.id, "observation deleted");
        to_json(&serde_json::json!({ "deleted": removed.id }))
    }

    /// Archive low-retention observations.
    #[tool(
        description = "Archive non-immune observations whose retention score fell below the threshold. Pass dry_run=true to classify without moving anything."
    )]
    async fn memory_archive(
        &self,
        Parameters(params): Parameters<MemoryArchiveParams>,
    ) -> Result<String, String> {
        let threshold = params.threshold.unwrap_or(1.0);
        let dry_run = params.dry_run.unwrap_or(false);
        let report = self
            .blocking(move |engine| engine.archive(threshold, dry_run).map_err(tool_err))
            .await?;
        to_json(&report)
    }

    // ── Knowledge graph ──────────────────────────────────────────────────

    /// Create entities; existing names are skipped.
    #[tool(description = "Create knowledge-graph entities. Names that already exist are skipped.")]
    async fn graph_create_entities(
        &self,
        Parameters(params): Parameters<CreateEntitiesParams>,
    ) -> Result<String, String> {
        let entities: Vec<Entity> = params
            .entities
            .into_iter()
            .map(|e| Entity {
                name: e.name,
                entity_type: e.entity_type,
                observations: e.observations.unwrap_or_default(),
            })
            .collect();

        let created = self
            .blocking(move |engine| engine.create_entities(entities).map_err(tool_err))
            .await?;
        to_json(&serde_json::json!({ "created": created }))
    }

    /// Create relations; both endpoints must exist.
    #[tool(
        description = "Create directed relations between existing entities. Duplicate (from, to, relationType) tuples are skipped."
    )]
    async fn graph_create_relations(
        &self,
        Parameters(params): Parameters<CreateRelationsParams>,
    ) -> Result<String, String> {
        let relations: Vec<Relation> = params
            .relations
            .into_iter()
            .map(|r| Relation {
                from: r.from,
                to: r.to,
                relation_type: r.relation_type,
            })
            .collect();

        let created = self
            .blocking(move |engine| engine.create_relations(relations).map_err(tool_err))
            .await?;
        to_json(&serde_json::json!({ "created": created }))
    }

    /// Append observation lines to an entity.
    #[tool(description = "Append observation lines to an existing entity. Exact duplicates are skipped.")]
    async fn graph_add_observations(
        &self,
        Parameters(params): Parameters<AddObservationsParams>,
    ) -> Result<String, String> {
        let entity_name = params.entity_name;
        let lines = params.observations;
        let added = self
            .blocking(move |engine| {
                engine
                    .add_entity_observations(&entity_name, lines)
                    .map_err(tool_err)
            })
            .await?;
        to_json(&serde_json::json!({ "added": added }))
    }

    /// Search entities by name or observation content.
    #[tool(description = "Search entities by name or observation content, case-insensitively.")]
    async fn graph_search_nodes(
        &self,
        Parameters(params): Parameters<SearchNodesParams>,
    ) -> Result<String, String> {
        let engine = self.lock()?;
        let entities = engine.search_nodes(&params.query);
        to_json(&serde_json::json!({ "entities": entities }))
    }

    /// Open entities by exact name.
    #[tool(description = "Return full entity records by exact name.")]
    async fn graph_open_nodes(
        &self,
        Parameters(params): Parameters<OpenNodesParams>,
    ) -> Result<String, String> {
        let engine = self.lock()?;
        let entities = engine.open_nodes(&params.names);
        to_json(&serde_json::json!({ "entities": entities }))
    }

    /// The whole graph.
    #[tool(description = "Return every entity and relation in the knowledge graph.")]
    async fn graph_read(
        &self,
        Parameters(_params): Parameters<ReadGraphParams>,
    ) -> Result<String, String> {
        let engine = self.lock()?;
        let (entities, relations) = engine.read_graph();
        to_json(&serde_json::json!({ "entities": entities, "relations": relations }))
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    /// Open a session and get the context bundle.
    #[tool(
        description = "Open a session. Returns the previous session's summary plus the highest-value observations for this project."
    )]
    async fn session_start(
        &self,
        Parameters(params): Parameters<SessionStartParams>,
    ) -> Result<String, String> {
        if params.agent.trim().is_empty() {
            return Err("agent must not be empty".into());
        }
        let agent = params.agent;
        let bundle = self
            .blocking(move |engine| engine.session_start(&agent).map_err(tool_err))
            .await?;
        tracing::info!(session = %bundle.session.id, "session started");
        to_json(&bundle)
    }

    /// Complete the current session.
    #[tool(description = "Complete the current session, storing a summary for the next session start.")]
    async fn session_end(
        &self,
        Parameters(params): Parameters<SessionEndParams>,
    ) -> Result<String, String> {
        let summary = params.summary;
        let session = self
            .blocking(move |engine| engine.session_end(summary).map_err(tool_err))
            .await?;
        tracing::info!(session = %session.id, "session completed");
        to_json(&session)
    }

    /// Read one session.
    #[tool(description = "Read one session record by id.")]
    async fn session_context(
        &self,
        Parameters(params): Parameters<SessionContextParams>,
    ) -> Result<String, String> {
        let engine = self.lock()?;
        let session = engine.session_context(&params.id).map_err(tool_err)?;
        to_json(&session)
    }
}

#[tool_handler]
impl ServerHandler for MemorixTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Memorix is a persistent project memory. Use memory_store to record \
                 observations, memory_search/memory_timeline/memory_get to recall them, \
                 session_start at the beginning of a session, and session_end with a \
                 summary when finishing."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
