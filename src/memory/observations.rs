//! Observation store — create, upsert, reindex, reconcile-on-write.
//!
//! Writes are rare compared to reads, so every write re-reads the durable
//! file under the project lock before publishing the merged result. That is
//! what keeps two editor processes from clobbering each other without any
//! shared memory.

use crate::embedding::CachedProvider;
use crate::error::{MemorixError, Result};
use crate::extract;
use crate::index::SearchIndex;
use crate::memory::types::{estimate_tokens, Counter, Observation, ObservationType};
use crate::storage::DataDir;

/// Caller-supplied fields for a new observation.
#[derive(Debug, Clone)]
pub struct StoreInput {
    pub entity_name: String,
    pub obs_type: ObservationType,
    pub title: String,
    pub narrative: String,
    pub facts: Vec<String>,
    pub files_modified: Vec<String>,
    pub concepts: Vec<String>,
    pub project_id: String,
    pub topic_key: Option<String>,
    pub session_id: Option<String>,
}

/// Outcome of a store call; `updated` marks a topic-key upsert.
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub observation: Observation,
    pub updated: bool,
}

pub struct ObservationStore {
    dir: DataDir,
    observations: Vec<Observation>,
    next_id: u64,
}

impl ObservationStore {
    pub fn load(dir: DataDir) -> Result<Self> {
        let observations = dir.load_observations()?;
        let counter = dir.load_counter()?;
        // A stale counter never hands out a used id.
        let max_id = observations.iter().map(|o| o.id).max().unwrap_or(0);
        let next_id = counter.next_id.max(max_id + 1);
        Ok(Self {
            dir,
            observations,
            next_id,
        })
    }

    pub fn all(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Observation> {
        self.observations.iter().find(|o| o.id == id)
    }

    /// Layer-3 detail: full records for `ids`, in input order.
    pub fn get_many(&self, ids: &[u64]) -> Result<Vec<Observation>> {
        ids.iter()
            .map(|&id| {
                self.get(id)
                    .cloned()
                    .ok_or_else(|| MemorixError::NotFound(format!("observation {id}")))
            })
            .collect()
    }

    /// Store a new observation, or dispatch to the topic-key upsert when a
    /// record with the same (projectId, topicKey) already exists.
    pub fn store(
        &mut self,
        input: StoreInput,
        index: &mut SearchIndex,
        provider: Option<&CachedProvider>,
    ) -> Result<StoreOutcome> {
        if let Some(topic_key) = &input.topic_key {
            let existing = self
                .observations
                .iter()
                .position(|o| {
                    o.project_id == input.project_id && o.topic_key.as_deref() == Some(topic_key)
                });
            if let Some(pos) = existing {
                let observation = self.upsert(pos, input, index, provider)?;
                return Ok(StoreOutcome {
                    observation,
                    updated: true,
                });
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        let now = chrono::Utc::now().to_rfc3339();
        let mut obs = enrich(input, id, now.clone(), now);

        let embedding = embed_observation(provider, &obs);
        index.insert(&obs, embedding);

        // Reconcile-on-write: another process may have published since we
        // loaded. Adopt its records, resolve id collisions in our favor of
        // the disk, and republish the union.
        self.dir.clone().with_lock(|| {
            let on_disk = self.dir.load_observations()?;
            let disk_counter = self.dir.load_counter()?;

            let disk_max = on_disk.iter().map(|o| o.id).max().unwrap_or(0);
            if on_disk.iter().any(|o| o.id == obs.id) {
                let reassigned = disk_max + 1;
                index.remove(obs.id);
                obs.id = reassigned;
                let embedding = embed_observation(provider, &obs);
                index.insert(&obs, embedding);
            }

            let mut merged = on_disk;
            for local in &self.observations {
                if !merged.iter().any(|o| o.id == local.id) {
                    merged.push(local.clone());
                }
            }
            merged.push(obs.clone());
            merged.sort_by_key(|o| o.id);

            let next_id = self
                .next_id
                .max(disk_counter.next_id)
                .max(merged.iter().map(|o| o.id).max().unwrap_or(0) + 1);

            self.dir.save_observations(&merged)?;
            self.dir.save_counter(&Counter { next_id })?;

            self.observations = merged;
            self.next_id = next_id;
            Ok(())
        })?;

        let observation = self
            .get(obs.id)
            .cloned()
            .expect("stored observation is present");
        Ok(StoreOutcome {
            observation,
            updated: false,
        })
    }

    /// Topic-key upsert: replace content, bump revisionCount, set updatedAt,
    /// preserve id and createdAt.
    fn upsert(
        &mut self,
        pos: usize,
        input: StoreInput,
        index: &mut SearchIndex,
        provider: Option<&CachedProvider>,
    ) -> Result<Observation> {
        let existing = &self.observations[pos];
        let id = existing.id;
        let created_at = existing.created_at.clone();
        let revision_count = existing.revision_count + 1;
        let access_count = existing.access_count;
        let last_accessed_at = existing.last_accessed_at.clone();

        let now = chrono::Utc::now().to_rfc3339();
        let mut obs = enrich(input, id, created_at, now);
        obs.revision_count = revision_count;
        obs.access_count = access_count;
        obs.last_accessed_at = last_accessed_at;

        index.remove(id);
        let embedding = embed_observation(provider, &obs);
        index.insert(&obs, embedding);

        self.observations[pos] = obs.clone();
        self.persist()?;
        Ok(obs)
    }

    /// Explicit delete. Removes from the live set and the index. The removal
    /// happens under the lock, after reconciling, so a concurrent writer's
    /// copy of the record cannot resurrect it.
    pub fn delete(&mut self, id: u64, index: &mut SearchIndex) -> Result<Observation> {
        self.dir.clone().with_lock(|| {
            self.reconcile_from_disk()?;
            let pos = self
                .observations
                .iter()
                .position(|o| o.id == id)
                .ok_or_else(|| MemorixError::NotFound(format!("observation {id}")))?;
            let removed = self.observations.remove(pos);
            index.remove(id);
            self.dir.save_observations(&self.observations)?;
            self.dir.save_counter(&Counter {
                next_id: self.next_id,
            })?;
            Ok(removed)
        })
    }

    /// Rebuild the index from the stored observations.
    ///
    /// One `embed_batch` covers every record so a cold start never pays
    /// per-observation inference overhead. Batch failure degrades to a
    /// lexical-only index.
    pub fn reindex(&self, index: &mut SearchIndex, provider: Option<&CachedProvider>) {
        let texts: Vec<String> = self
            .observations
            .iter()
            .map(|o| o.searchable_text())
            .collect();

        let embeddings: Vec<Option<Vec<f32>>> = match provider {
            Some(provider) => {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                match provider.embed_batch(&refs) {
                    Ok(vectors) => vectors.into_iter().map(Some).collect(),
                    Err(e) => {
                        tracing::warn!(error = %e, "batch embedding failed; reindexing without vectors");
                        vec![None; texts.len()]
                    }
                }
            }
            None => vec![None; texts.len()],
        };

        for (obs, embedding) in self.observations.iter().zip(embeddings) {
            index.insert(obs, embedding);
        }
        tracing::debug!(count = self.observations.len(), "search index rebuilt");
    }

    /// Rewrite observations carrying a non-canonical alias. Persists once.
    pub fn migrate_project_ids(
        &mut self,
        aliases: &[String],
        canonical: &str,
        index: &mut SearchIndex,
    ) -> Result<usize> {
        let mut migrated = 0usize;
        for obs in &mut self.observations {
            if obs.project_id != canonical && aliases.iter().any(|a| a == &obs.project_id) {
                obs.project_id = canonical.to_string();
                index.rewrite_project_id(obs.id, canonical);
                migrated += 1;
            }
        }
        if migrated > 0 {
            self.persist()?;
            tracing::info!(migrated, canonical, "canonicalized observation project ids");
        }
        Ok(migrated)
    }

    /// Layer-2 timeline: the anchor plus neighbors in createdAt order, read
    /// from the authoritative observation list.
    pub fn timeline(
        &self,
        anchor_id: u64,
        depth_before: usize,
        depth_after: usize,
        project_aliases: &[String],
    ) -> Result<Vec<Observation>> {
        let mut ordered: Vec<&Observation> = self
            .observations
            .iter()
            .filter(|o| {
                project_aliases.is_empty() || project_aliases.iter().any(|a| a == &o.project_id)
            })
            .collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let pos = ordered
            .iter()
            .position(|o| o.id == anchor_id)
            .ok_or_else(|| MemorixError::NotFound(format!("observation {anchor_id}")))?;

        let start = pos.saturating_sub(depth_before);
        let end = (pos + depth_after + 1).min(ordered.len());
        Ok(ordered[start..end].iter().map(|&o| o.clone()).collect())
    }

    /// Fire-and-forget access accounting for returned search hits.
    pub fn record_access(&mut self, ids: &[u64], index: &mut SearchIndex) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut touched = false;
        for obs in &mut self.observations {
            if ids.contains(&obs.id) {
                obs.access_count += 1;
                obs.last_accessed_at = now.clone();
                touched = true;
            }
        }
        if touched {
            index.record_access(ids, &now);
            self.persist()?;
        }
        Ok(())
    }

    /// Remove `ids` from the live set (retention archival). The caller has
    /// already appended them to the archive file under the same lock.
    pub(crate) fn remove_archived(&mut self, ids: &[u64], index: &mut SearchIndex) {
        self.observations.retain(|o| !ids.contains(&o.id));
        for &id in ids {
            index.remove(id);
        }
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.dir
    }

    /// Publish the in-memory set under the project lock, reconciling with
    /// records other processes may have added meanwhile.
    pub(crate) fn persist(&mut self) -> Result<()> {
        self.dir.clone().with_lock(|| {
            self.reconcile_from_disk()?;
            self.dir.save_observations(&self.observations)?;
            self.dir.save_counter(&Counter {
                next_id: self.next_id,
            })
        })
    }

    /// Merge disk records this instance has not seen. Callers hold the
    /// project lock. Newly adopted records enter the index on next reindex.
    pub(crate) fn reconcile_from_disk(&mut self) -> Result<()> {
        let on_disk = self.dir.load_observations()?;
        for disk_obs in on_disk {
            if !self.observations.iter().any(|o| o.id == disk_obs.id) {
                self.observations.push(disk_obs);
            }
        }
        self.observations.sort_by_key(|o| o.id);
        self.next_id = self
            .next_id
            .max(self.observations.iter().map(|o| o.id).max().unwrap_or(0) + 1);
        Ok(())
    }

    /// Persist without merging disk state back in. Used by archival, where
    /// records must actually leave the live set.
    pub(crate) fn persist_replacing(&mut self) -> Result<()> {
        let next_id = self.next_id;
        self.dir.save_observations(&self.observations)?;
        self.dir.save_counter(&Counter { next_id })
    }
}

/// Run the extractor and produce the enriched, token-counted record.
fn enrich(input: StoreInput, id: u64, created_at: String, updated_at: String) -> Observation {
    let mut text = format!("{} {}", input.title, input.narrative);
    for fact in &input.facts {
        text.push(' ');
        text.push_str(fact);
    }
    let extracted = extract::extract(&text);

    let concepts = extract::enrich_concepts(&input.concepts, &extracted);
    let files_modified = extract::enrich_files(&input.files_modified, &extracted.files);
    let tokens = estimate_tokens(
        &input.title,
        &input.narrative,
        &input.facts,
        &files_modified,
        &concepts,
    );

    Observation {
        id,
        entity_name: input.entity_name,
        obs_type: input.obs_type,
        title: input.title,
        narrative: input.narrative,
        facts: input.facts,
        files_modified,
        concepts,
        tokens,
        created_at,
        updated_at,
        project_id: input.project_id,
        has_causal_language: extracted.has_causal_language,
        topic_key: input.topic_key,
        revision_count: 1,
        session_id: input.session_id,
        access_count: 0,
        last_accessed_at: String::new(),
    }
}

fn embed_observation(
    provider: Option<&CachedProvider>,
    obs: &Observation,
) -> Option<Vec<f32>> {
    let provider = provider?;
    match provider.embed(&obs.searchable_text()) {
        Ok(vector) => Some(vector),
        Err(e) => {
            tracing::warn!(error = %e, id = obs.id, "embedding failed; indexing without vector");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn input(title: &str, topic_key: Option<&str>) -> StoreInput {
        StoreInput {
            entity_name: "auth".into(),
            obs_type: ObservationType::Decision,
            title: title.into(),
            narrative: "short narrative".into(),
            facts: vec![],
            files_modified: vec![],
            concepts: vec![],
            project_id: "acme/app".into(),
            topic_key: topic_key.map(String::from),
            session_id: None,
        }
    }

    fn fresh(tmp: &TempDir) -> (ObservationStore, SearchIndex) {
        let dir = DataDir::new(tmp.path()).unwrap();
        (ObservationStore::load(dir).unwrap(), SearchIndex::new())
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);

        let a = store.store(input("one", None), &mut index, None).unwrap();
        let b = store.store(input("two", None), &mut index, None).unwrap();
        let c = store.store(input("three", None), &mut index, None).unwrap();

        assert_eq!(a.observation.id, 1);
        assert_eq!(b.observation.id, 2);
        assert_eq!(c.observation.id, 3);
        assert_eq!(store.data_dir().load_counter().unwrap().next_id, 4);
    }

    #[test]
    fn topic_key_upsert_preserves_id_and_created_at() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);

        let first = store
            .store(input("JWT refresh", Some("decision/jwt-refresh")), &mut index, None)
            .unwrap();
        assert!(!first.updated);

        let mut second_input = input("JWT refresh", Some("decision/jwt-refresh"));
        second_input.narrative = "15-minute expiry".into();
        let second = store.store(second_input, &mut index, None).unwrap();

        assert!(second.updated);
        assert_eq!(second.observation.id, first.observation.id);
        assert_eq!(second.observation.created_at, first.observation.created_at);
        assert_eq!(second.observation.revision_count, 2);
        assert_eq!(second.observation.narrative, "15-minute expiry");
        assert!(!second.observation.updated_at.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_requires_matching_project() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);

        store
            .store(input("shared topic", Some("how/it-works")), &mut index, None)
            .unwrap();

        let mut other = input("shared topic", Some("how/it-works"));
        other.project_id = "other/project".into();
        let outcome = store.store(other, &mut index, None).unwrap();

        assert!(!outcome.updated);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn store_enriches_from_extractor() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);

        let mut rich = input("cache design", None);
        rich.narrative =
            "We memoize src/cache/warm.rs because cold starts were slow for maxAge".into();
        let outcome = store.store(rich, &mut index, None).unwrap();

        let obs = &outcome.observation;
        assert!(obs.has_causal_language);
        assert!(obs.files_modified.contains(&"src/cache/warm.rs".to_string()));
        assert!(obs.concepts.contains(&"maxAge".to_string()));
        assert!(obs.tokens > 0);
    }

    #[test]
    fn reconcile_keeps_foreign_records() {
        let tmp = TempDir::new().unwrap();
        let dir = DataDir::new(tmp.path()).unwrap();

        // Two stores over the same directory, as two processes would be.
        let mut store_a = ObservationStore::load(dir.clone()).unwrap();
        let mut store_b = ObservationStore::load(dir).unwrap();
        let mut index_a = SearchIndex::new();
        let mut index_b = SearchIndex::new();

        store_a.store(input("from a", None), &mut index_a, None).unwrap();
        store_b.store(input("from b", None), &mut index_b, None).unwrap();

        let on_disk = store_b.data_dir().load_observations().unwrap();
        assert_eq!(on_disk.len(), 2);
        let mut ids: Vec<u64> = on_disk.iter().map(|o| o.id).collect();
        ids.dedup();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store_b.data_dir().load_counter().unwrap().next_id, 3);
    }

    #[test]
    fn delete_removes_from_store_and_index() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);

        let outcome = store.store(input("doomed", None), &mut index, None).unwrap();
        let id = outcome.observation.id;
        assert!(index.contains(id));

        store.delete(id, &mut index).unwrap();
        assert!(store.get(id).is_none());
        assert!(!index.contains(id));
        assert!(store.data_dir().load_observations().unwrap().is_empty());

        let err = store.delete(id, &mut index).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn reindex_rebuilds_from_disk_state() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);
        store.store(input("persisted", None), &mut index, None).unwrap();

        // Fresh process: empty index until reindex.
        let reloaded = ObservationStore::load(store.data_dir().clone()).unwrap();
        let mut new_index = SearchIndex::new();
        assert!(new_index.is_empty());

        reloaded.reindex(&mut new_index, None);
        assert_eq!(new_index.len(), 1);

        // Idempotent: a second run produces the same state.
        reloaded.reindex(&mut new_index, None);
        assert_eq!(new_index.len(), 1);
    }

    #[test]
    fn migrate_project_ids_rewrites_aliases_once() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);

        let mut placeholder = input("early note", None);
        placeholder.project_id = "placeholder/app".into();
        store.store(placeholder, &mut index, None).unwrap();

        let mut local = input("later note", None);
        local.project_id = "local/app".into();
        store.store(local, &mut index, None).unwrap();

        let aliases = vec![
            "placeholder/app".to_string(),
            "local/app".to_string(),
            "acme/app".to_string(),
        ];
        let migrated = store
            .migrate_project_ids(&aliases, "acme/app", &mut index)
            .unwrap();
        assert_eq!(migrated, 2);
        assert!(store.all().iter().all(|o| o.project_id == "acme/app"));

        // Already canonical: nothing to do.
        let migrated = store
            .migrate_project_ids(&aliases, "acme/app", &mut index)
            .unwrap();
        assert_eq!(migrated, 0);
    }

    #[test]
    fn timeline_centers_on_anchor() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);
        for i in 1..=7 {
            store
                .store(input(&format!("entry {i}"), None), &mut index, None)
                .unwrap();
        }

        let window = store.timeline(4, 2, 2, &[]).unwrap();
        assert_eq!(window.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);

        // Clamped at the edges.
        let window = store.timeline(1, 3, 1, &[]).unwrap();
        assert_eq!(window.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2]);

        let err = store.timeline(99, 3, 3, &[]).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn record_access_bumps_counters() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut index) = fresh(&tmp);
        let id = store
            .store(input("tracked", None), &mut index, None)
            .unwrap()
            .observation
            .id;

        store.record_access(&[id], &mut index).unwrap();
        store.record_access(&[id], &mut index).unwrap();

        let obs = store.get(id).unwrap();
        assert_eq!(obs.access_count, 2);
        assert!(!obs.last_accessed_at.is_empty());

        // Persisted, not just in memory.
        let on_disk = store.data_dir().load_observations().unwrap();
        assert_eq!(on_disk[0].access_count, 2);
    }
}
