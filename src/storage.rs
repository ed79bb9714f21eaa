//! Durable formats and the flat data directory.
//!
//! All state lives in one flat directory; the `projectId` field inside each
//! record is the only project partition. Different editors may disagree about
//! a project's identifier, so a flat directory plus the alias registry is
//! what guarantees every editor shares the same file set. Do not reintroduce
//! per-project subdirectories.
//!
//! Missing files read as empty. A file that exists but fails to parse raises
//! [`MemorixError::Integrity`] and is never auto-repaired.

use std::path::{Path, PathBuf};

use crate::error::{MemorixError, Result};
use crate::fsio;
use crate::memory::types::{Counter, Entity, GraphLine, Observation, Relation, Session};

pub const OBSERVATIONS_FILE: &str = "observations.json";
pub const COUNTER_FILE: &str = "counter.json";
pub const GRAPH_FILE: &str = "graph.jsonl";
pub const SESSIONS_FILE: &str = "sessions.json";
pub const ARCHIVE_FILE: &str = "observations.archived.json";
pub const ALIASES_FILE: &str = ".project-aliases.json";
pub const EMBEDDING_CACHE_FILE: &str = ".embedding-cache.json";
pub const MIGRATED_SUBDIRS: &str = ".migrated-subdirs";

/// Handle to the flat data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    base: PathBuf,
}

impl DataDir {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base).map_err(|e| MemorixError::io("create dir", &base, e))?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn observations_path(&self) -> PathBuf {
        self.base.join(OBSERVATIONS_FILE)
    }

    pub fn counter_path(&self) -> PathBuf {
        self.base.join(COUNTER_FILE)
    }

    pub fn graph_path(&self) -> PathBuf {
        self.base.join(GRAPH_FILE)
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.base.join(SESSIONS_FILE)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.base.join(ARCHIVE_FILE)
    }

    pub fn aliases_path(&self) -> PathBuf {
        self.base.join(ALIASES_FILE)
    }

    pub fn embedding_cache_path(&self) -> PathBuf {
        self.base.join(EMBEDDING_CACHE_FILE)
    }

    /// Run `action` while holding this directory's project lock.
    pub fn with_lock<T>(&self, action: impl FnOnce() -> Result<T>) -> Result<T> {
        fsio::with_lock(&self.base, action)
    }

    // ── Observations ─────────────────────────────────────────────────────

    pub fn load_observations(&self) -> Result<Vec<Observation>> {
        read_json_or_default(&self.observations_path())
    }

    pub fn save_observations(&self, observations: &[Observation]) -> Result<()> {
        write_json(&self.observations_path(), observations)
    }

    pub fn load_counter(&self) -> Result<Counter> {
        read_json_or_default(&self.counter_path())
    }

    pub fn save_counter(&self, counter: &Counter) -> Result<()> {
        write_json(&self.counter_path(), counter)
    }

    // ── Archive ──────────────────────────────────────────────────────────

    pub fn load_archive(&self) -> Result<Vec<Observation>> {
        read_json_or_default(&self.archive_path())
    }

    /// Append records to the archive file. Read-modify-write; callers hold
    /// the project lock.
    pub fn append_archive(&self, records: &[Observation]) -> Result<()> {
        let mut archived = self.load_archive()?;
        archived.extend(records.iter().cloned());
        write_json(&self.archive_path(), &archived)
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    pub fn load_sessions(&self) -> Result<Vec<Session>> {
        read_json_or_default(&self.sessions_path())
    }

    pub fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        write_json(&self.sessions_path(), sessions)
    }

    // ── Knowledge graph (JSONL) ──────────────────────────────────────────

    /// Load `graph.jsonl`. Each line is an entity or relation object tagged
    /// with `type`; the format is line-interchangeable with the official
    /// memory-server project.
    pub fn load_graph(&self) -> Result<(Vec<Entity>, Vec<Relation>)> {
        let path = self.graph_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((vec![], vec![])),
            Err(e) => return Err(MemorixError::io("read", &path, e)),
        };

        let mut entities = Vec::new();
        let mut relations = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<GraphLine>(line) {
                Ok(GraphLine::Entity(e)) => entities.push(e),
                Ok(GraphLine::Relation(r)) => relations.push(r),
                Err(source) => return Err(MemorixError::Integrity { path, source }),
            }
        }
        Ok((entities, relations))
    }

    pub fn save_graph(&self, entities: &[Entity], relations: &[Relation]) -> Result<()> {
        let mut out = String::new();
        for entity in entities {
            let line = serde_json::to_string(&GraphLine::Entity(entity.clone()))
                .expect("graph line serializes");
            out.push_str(&line);
            out.push('\n');
        }
        for relation in relations {
            let line = serde_json::to_string(&GraphLine::Relation(relation.clone()))
                .expect("graph line serializes");
            out.push_str(&line);
            out.push('\n');
        }
        fsio::atomic_write(&self.graph_path(), out.as_bytes())
    }

    // ── One-shot flattening migration ────────────────────────────────────

    /// Migrate any pre-flat per-project subdirectories into the flat layout.
    ///
    /// Runs once: after the merged outputs are written, every processed
    /// subdirectory is renamed under `.migrated-subdirs/`, so a re-run finds
    /// nothing to do.
    pub fn migrate_flatten(&self) -> Result<MigrationReport> {
        let subdirs = self.find_migratable_subdirs()?;
        if subdirs.is_empty() {
            return Ok(MigrationReport::default());
        }

        tracing::info!(count = subdirs.len(), "flattening pre-flat data subdirectories");

        self.with_lock(|| {
            // 1–2. Gather subdirectory observations plus any base-level ones.
            let mut merged: Vec<Observation> = self.load_observations()?;
            let mut entities: Vec<Entity> = Vec::new();
            let mut relations: Vec<Relation> = Vec::new();
            let mut sessions: Vec<Session> = self.load_sessions()?;

            let (base_entities, base_relations) = self.load_graph()?;
            entities.extend(base_entities);
            relations.extend(base_relations);

            for dir in &subdirs {
                let sub = DataDir {
                    base: dir.clone(),
                };
                merged.extend(sub.load_observations()?);
                let (sub_entities, sub_relations) = sub.load_graph()?;
                merge_entities(&mut entities, sub_entities);
                merge_relations(&mut relations, sub_relations);
                sessions.extend(sub.load_sessions()?);
            }

            // 3. Dedup by (title, createdAt).
            let mut seen = std::collections::HashSet::new();
            merged.retain(|o| seen.insert((o.title.clone(), o.created_at.clone())));

            // 4. Reassign ids sequentially in createdAt order.
            merged.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            for (i, obs) in merged.iter_mut().enumerate() {
                obs.id = i as u64 + 1;
            }

            // 7. Publish the merged state.
            let count = merged.len();
            self.save_observations(&merged)?;
            self.save_graph(&entities, &relations)?;
            self.save_sessions(&sessions)?;
            self.save_counter(&Counter {
                next_id: count as u64 + 1,
            })?;

            // 8. Move processed subdirectories out of the way.
            let backup_root = self.base.join(MIGRATED_SUBDIRS);
            std::fs::create_dir_all(&backup_root)
                .map_err(|e| MemorixError::io("create dir", &backup_root, e))?;
            for dir in &subdirs {
                let name = dir.file_name().expect("subdir has a name");
                let dest = backup_root.join(name);
                std::fs::rename(dir, &dest).map_err(|e| MemorixError::io("rename", dir, e))?;
            }

            Ok(MigrationReport {
                subdirs_migrated: subdirs.len(),
                observations_merged: count,
            })
        })
    }

    /// Subdirectories of the base that contain an observations file.
    fn find_migratable_subdirs(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(MemorixError::io("read dir", &self.base, e)),
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.file_name()
                        .map(|n| n != MIGRATED_SUBDIRS)
                        .unwrap_or(false)
                    && p.join(OBSERVATIONS_FILE).is_file()
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub subdirs_migrated: usize,
    pub observations_merged: usize,
}

/// Union entities by name, unioning their observation lines.
fn merge_entities(into: &mut Vec<Entity>, from: Vec<Entity>) {
    for entity in from {
        if let Some(existing) = into.iter_mut().find(|e| e.name == entity.name) {
            for line in entity.observations {
                if !existing.observations.contains(&line) {
                    existing.observations.push(line);
                }
            }
        } else {
            into.push(entity);
        }
    }
}

/// Union relations by (from, to, relationType).
fn merge_relations(into: &mut Vec<Relation>, from: Vec<Relation>) {
    for relation in from {
        let exists = into.iter().any(|r| {
            r.from == relation.from
                && r.to == relation.to
                && r.relation_type == relation.relation_type
        });
        if !exists {
            into.push(relation);
        }
    }
}

fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(|source| MemorixError::Integrity {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(MemorixError::io("read", path, e)),
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).expect("durable types serialize");
    fsio::atomic_write(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::ObservationType;
    use tempfile::TempDir;

    fn obs(id: u64, title: &str, created_at: &str, project_id: &str) -> Observation {
        Observation {
            id,
            entity_name: "core".into(),
            obs_type: ObservationType::Discovery,
            title: title.into(),
            narrative: "details".into(),
            facts: vec![],
            files_modified: vec![],
            concepts: vec![],
            tokens: 4,
            created_at: created_at.into(),
            updated_at: String::new(),
            project_id: project_id.into(),
            has_causal_language: false,
            topic_key: None,
            revision_count: 1,
            session_id: None,
            access_count: 0,
            last_accessed_at: String::new(),
        }
    }

    #[test]
    fn missing_files_read_as_empty() {
        let tmp = TempDir::new().unwrap();
        let dir = DataDir::new(tmp.path()).unwrap();

        assert!(dir.load_observations().unwrap().is_empty());
        assert_eq!(dir.load_counter().unwrap().next_id, 1);
        assert!(dir.load_sessions().unwrap().is_empty());
        let (entities, relations) = dir.load_graph().unwrap();
        assert!(entities.is_empty() && relations.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_integrity_error() {
        let tmp = TempDir::new().unwrap();
        let dir = DataDir::new(tmp.path()).unwrap();
        std::fs::write(dir.observations_path(), "{not json").unwrap();

        let err = dir.load_observations().unwrap_err();
        assert_eq!(err.kind(), "IntegrityError");
        // The file itself is untouched.
        assert_eq!(
            std::fs::read_to_string(dir.observations_path()).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn observations_round_trip() {
        let tmp = TempDir::new().unwrap();
        let dir = DataDir::new(tmp.path()).unwrap();

        let records = vec![
            obs(1, "first", "2026-01-01T00:00:00Z", "acme/app"),
            obs(2, "second", "2026-01-02T00:00:00Z", "acme/app"),
        ];
        dir.save_observations(&records).unwrap();

        let loaded = dir.load_observations().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].title, "first");
        assert_eq!(loaded[1].id, 2);
    }

    #[test]
    fn graph_round_trips_as_jsonl() {
        let tmp = TempDir::new().unwrap();
        let dir = DataDir::new(tmp.path()).unwrap();

        let entities = vec![Entity {
            name: "auth".into(),
            entity_type: "module".into(),
            observations: vec!["owns login".into()],
        }];
        let relations = vec![Relation {
            from: "auth".into(),
            to: "db".into(),
            relation_type: "depends_on".into(),
        }];
        dir.save_graph(&entities, &relations).unwrap();

        let raw = std::fs::read_to_string(dir.graph_path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.lines().next().unwrap().contains("\"type\":\"entity\""));

        let (loaded_entities, loaded_relations) = dir.load_graph().unwrap();
        assert_eq!(loaded_entities[0].name, "auth");
        assert_eq!(loaded_relations[0].relation_type, "depends_on");
    }

    #[test]
    fn flatten_migration_merges_dedups_and_renumbers() {
        let tmp = TempDir::new().unwrap();
        let dir = DataDir::new(tmp.path()).unwrap();

        // Two pre-flat project subdirectories with one shared record.
        let sub_a = DataDir::new(tmp.path().join("proj-a")).unwrap();
        sub_a
            .save_observations(&[
                obs(1, "alpha", "2026-01-03T00:00:00Z", "local/proj-a"),
                obs(2, "shared", "2026-01-01T00:00:00Z", "local/proj-a"),
            ])
            .unwrap();
        let sub_b = DataDir::new(tmp.path().join("proj-b")).unwrap();
        sub_b
            .save_observations(&[
                obs(1, "beta", "2026-01-02T00:00:00Z", "local/proj-b"),
                obs(2, "shared", "2026-01-01T00:00:00Z", "local/proj-b"),
            ])
            .unwrap();

        let report = dir.migrate_flatten().unwrap();
        assert_eq!(report.subdirs_migrated, 2);
        assert_eq!(report.observations_merged, 3);

        let merged = dir.load_observations().unwrap();
        assert_eq!(merged.len(), 3);
        // createdAt ascending, ids 1..=3.
        assert_eq!(merged[0].title, "shared");
        assert_eq!(
            merged.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(dir.load_counter().unwrap().next_id, 4);

        // Subdirectories moved under .migrated-subdirs/.
        assert!(!tmp.path().join("proj-a").exists());
        assert!(tmp.path().join(MIGRATED_SUBDIRS).join("proj-a").is_dir());
    }

    #[test]
    fn flatten_migration_merges_graphs_and_sessions() {
        let tmp = TempDir::new().unwrap();
        let dir = DataDir::new(tmp.path()).unwrap();

        let sub = DataDir::new(tmp.path().join("proj")).unwrap();
        sub.save_observations(&[obs(1, "only", "2026-01-01T00:00:00Z", "local/proj")])
            .unwrap();
        sub.save_graph(
            &[Entity {
                name: "auth".into(),
                entity_type: "module".into(),
                observations: vec!["from sub".into()],
            }],
            &[],
        )
        .unwrap();

        dir.save_graph(
            &[Entity {
                name: "auth".into(),
                entity_type: "module".into(),
                observations: vec!["from base".into()],
            }],
            &[],
        )
        .unwrap();

        dir.migrate_flatten().unwrap();

        let (entities, _) = dir.load_graph().unwrap();
        assert_eq!(entities.len(), 1);
        let mut lines = entities[0].observations.clone();
        lines.sort();
        assert_eq!(lines, vec!["from base", "from sub"]);
    }

    #[test]
    fn flatten_migration_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = DataDir::new(tmp.path()).unwrap();

        let sub = DataDir::new(tmp.path().join("proj")).unwrap();
        sub.save_observations(&[obs(1, "only", "2026-01-01T00:00:00Z", "local/proj")])
            .unwrap();

        let first = dir.migrate_flatten().unwrap();
        assert_eq!(first.subdirs_migrated, 1);

        let second = dir.migrate_flatten().unwrap();
        assert_eq!(second, MigrationReport::default());
        assert_eq!(dir.load_observations().unwrap().len(), 1);
    }
}
