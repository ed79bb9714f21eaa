//! The engine — one value owning every component slice.
//!
//! Created once at startup; the MCP tool layer holds it behind a mutex and
//! delegates every call here. Startup order matters: project detection can
//! refuse to serve, the flattening migration must run before anything loads,
//! and alias canonicalization must run before the index is built so search
//! never sees a stale project id.

use std::path::Path;

use anyhow::Result;

use crate::config::MemorixConfig;
use crate::embedding::{cache::EmbeddingCache, create_provider, CachedProvider};
use crate::error::MemorixError;
use crate::index::{SearchHit, SearchIndex, SearchQuery};
use crate::memory::graph::KnowledgeGraph;
use crate::memory::observations::{ObservationStore, StoreInput, StoreOutcome};
use crate::memory::retention::{self, ArchiveReport, RetentionParams};
use crate::memory::session::{SessionStartBundle, SessionStore};
use crate::memory::types::{Entity, Observation, Relation, Session};
use crate::project::aliases::AliasRegistry;
use crate::project::{detect_project, ProjectInfo};
use crate::storage::DataDir;

pub struct Engine {
    project: ProjectInfo,
    canonical_id: String,
    aliases: AliasRegistry,
    observations: ObservationStore,
    graph: KnowledgeGraph,
    sessions: SessionStore,
    index: SearchIndex,
    provider: Option<CachedProvider>,
    retention_params: RetentionParams,
    default_limit: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Full startup sequence against the configured data directory.
    pub fn init(config: &MemorixConfig) -> Result<Self> {
        let cwd = config.working_dir();
        Self::init_at(config, &cwd, &config.resolved_data_dir())
    }

    /// Startup against explicit directories. Tests drive this directly.
    pub fn init_at(config: &MemorixConfig, cwd: &Path, data_dir: &Path) -> Result<Self> {
        let project = detect_project(cwd);
        if project.is_invalid() {
            return Err(MemorixError::InvalidProject(cwd.display().to_string()).into());
        }
        tracing::info!(project = %project.id, root = %project.root_path.display(), "project detected");

        let dir = DataDir::new(data_dir)?;
        dir.migrate_flatten()?;

        let provider = create_provider(&config.resolved_model_cache_dir()).map(|inner| {
            let cache_path = dir.embedding_cache_path();
            let cache = EmbeddingCache::load(&cache_path, inner.dimensions()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "embedding cache unreadable; starting cold");
                EmbeddingCache::empty(&cache_path)
            });
            CachedProvider::new(inner, cache)
        });

        let mut observations = ObservationStore::load(dir.clone())?;
        let graph = KnowledgeGraph::load(dir.clone())?;
        let sessions = SessionStore::load(dir.clone())?;

        // Alias registration + the two one-shot id migrations, persisted
        // under the project lock when anything changed.
        let mut aliases = AliasRegistry::load(&dir.aliases_path())?;
        let canonical_id = aliases.register(&project);
        let observed: Vec<String> = {
            let mut ids: Vec<String> = observations
                .all()
                .iter()
                .map(|o| o.project_id.clone())
                .collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let merged = aliases.auto_merge_by_basename(&observed);
        let canonical_id = aliases.canonical_for(&canonical_id);
        dir.with_lock(|| aliases.save(&dir.aliases_path()))?;
        if merged {
            tracing::info!(canonical = %canonical_id, "alias groups merged by basename");
        }

        let mut index = SearchIndex::new();
        let group = aliases.resolve_aliases(&canonical_id);
        observations.migrate_project_ids(&group, &canonical_id, &mut index)?;

        observations.reindex(&mut index, provider.as_ref());

        Ok(Self {
            project,
            canonical_id,
            aliases,
            observations,
            graph,
            sessions,
            index,
            provider,
            retention_params: config.retention_params(),
            default_limit: config.search.default_limit,
        })
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    pub fn canonical_project_id(&self) -> &str {
        &self.canonical_id
    }

    pub fn resolve_aliases(&self, id: &str) -> Vec<String> {
        self.aliases.resolve_aliases(id)
    }

    pub fn embedding_backend(&self) -> Option<&'static str> {
        self.provider.as_ref().map(CachedProvider::name)
    }

    // ── Observations ─────────────────────────────────────────────────────

    pub fn store_observation(&mut self, mut input: StoreInput) -> crate::error::Result<StoreOutcome> {
        if input.project_id.is_empty() {
            input.project_id = self.canonical_id.clone();
        }
        self.observations
            .store(input, &mut self.index, self.provider.as_ref())
    }

    pub fn delete_observation(&mut self, id: u64) -> crate::error::Result<Observation> {
        self.observations.delete(id, &mut self.index)
    }

    pub fn get_observations(&self, ids: &[u64]) -> crate::error::Result<Vec<Observation>> {
        self.observations.get_many(ids)
    }

    pub fn timeline(
        &self,
        anchor_id: u64,
        depth_before: usize,
        depth_after: usize,
    ) -> crate::error::Result<Vec<Observation>> {
        let aliases = self.resolve_aliases(&self.canonical_id);
        self.observations
            .timeline(anchor_id, depth_before, depth_after, &aliases)
    }

    // ── Search ───────────────────────────────────────────────────────────

    /// Layer-1 search. The alias set is expanded once per call; hybrid mode
    /// switches on when a provider is active and the query is non-empty.
    pub fn search(
        &self,
        query: &str,
        project_id: Option<&str>,
        obs_type: Option<crate::memory::types::ObservationType>,
        since: Option<String>,
        until: Option<String>,
        limit: Option<usize>,
        max_tokens: Option<usize>,
        vector_only: bool,
    ) -> crate::error::Result<Vec<SearchHit>> {
        let pid = project_id.unwrap_or(&self.canonical_id);
        let project_aliases = self.resolve_aliases(pid);

        let query_vector = match (&self.provider, query.trim().is_empty()) {
            (Some(provider), false) => match provider.embed(query) {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::warn!(error = %e, "query embedding failed; lexical-only search");
                    None
                }
            },
            _ => None,
        };

        if vector_only {
            self.index.require_vector(query_vector.as_deref())?;
        }

        let search_query = SearchQuery {
            query: query.to_string(),
            project_aliases,
            obs_type,
            since,
            until,
            limit: limit.or(Some(self.default_limit)),
            max_tokens,
        };
        self.index.search(&search_query, query_vector.as_deref())
    }

    /// The fire-and-forget accounting pass behind every search response.
    /// Callers dispatch this after replying and swallow its errors.
    pub fn record_access(&mut self, ids: &[u64]) -> crate::error::Result<()> {
        self.observations.record_access(ids, &mut self.index)
    }

    // ── Knowledge graph ──────────────────────────────────────────────────

    pub fn create_entities(&mut self, entities: Vec<Entity>) -> crate::error::Result<Vec<Entity>> {
        self.graph.create_entities(entities)
    }

    pub fn create_relations(
        &mut self,
        relations: Vec<Relation>,
    ) -> crate::error::Result<Vec<Relation>> {
        self.graph.create_relations(relations)
    }

    pub fn add_entity_observations(
        &mut self,
        entity_name: &str,
        lines: Vec<String>,
    ) -> crate::error::Result<Vec<String>> {
        self.graph.add_observations(entity_name, lines)
    }

    pub fn search_nodes(&self, query: &str) -> Vec<Entity> {
        self.graph.search_nodes(query).into_iter().cloned().collect()
    }

    pub fn open_nodes(&self, names: &[String]) -> Vec<Entity> {
        self.graph.open_nodes(names).into_iter().cloned().collect()
    }

    pub fn read_graph(&self) -> (Vec<Entity>, Vec<Relation>) {
        (
            self.graph.entities().to_vec(),
            self.graph.relations().to_vec(),
        )
    }

    // ── Retention ────────────────────────────────────────────────────────

    pub fn archive(&mut self, threshold: f64, dry_run: bool) -> crate::error::Result<ArchiveReport> {
        retention::archive(
            &mut self.observations,
            &mut self.index,
            threshold,
            &self.retention_params,
            dry_run,
        )
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    pub fn session_start(&mut self, agent: &str) -> crate::error::Result<SessionStartBundle> {
        let aliases = self.resolve_aliases(&self.canonical_id);
        self.sessions.start(
            agent,
            &self.canonical_id,
            &aliases,
            self.observations.all(),
            &self.retention_params,
        )
    }

    pub fn session_end(&mut self, summary: Option<String>) -> crate::error::Result<Session> {
        self.sessions.end(&self.canonical_id, summary)
    }

    pub fn session_context(&self, id: &str) -> crate::error::Result<Session> {
        self.sessions.context(id).cloned()
    }
}
