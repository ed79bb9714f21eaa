//! Knowledge graph — append-only entities and relations.
//!
//! Line-compatible with the official memory-server JSONL format, so other
//! tools reading or writing `graph.jsonl` must be tolerated; this module
//! only ever appends semantically (creates skip existing keys).

use crate::error::{MemorixError, Result};
use crate::memory::types::{Entity, Relation};
use crate::storage::DataDir;

pub struct KnowledgeGraph {
    dir: DataDir,
    entities: Vec<Entity>,
    relations: Vec<Relation>,
}

impl KnowledgeGraph {
    pub fn load(dir: DataDir) -> Result<Self> {
        let (entities, relations) = dir.load_graph()?;
        Ok(Self {
            dir,
            entities,
            relations,
        })
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Create entities, skipping names that already exist. Returns the
    /// entities actually created.
    pub fn create_entities(&mut self, new: Vec<Entity>) -> Result<Vec<Entity>> {
        let mut created = Vec::new();
        for entity in new {
            if self.entities.iter().any(|e| e.name == entity.name) {
                continue;
            }
            self.entities.push(entity.clone());
            created.push(entity);
        }
        if !created.is_empty() {
            self.persist()?;
        }
        Ok(created)
    }

    /// Create relations, skipping tuples that already exist. Both endpoints
    /// must name existing entities.
    pub fn create_relations(&mut self, new: Vec<Relation>) -> Result<Vec<Relation>> {
        for relation in &new {
            for endpoint in [&relation.from, &relation.to] {
                if !self.entities.iter().any(|e| &e.name == endpoint) {
                    return Err(MemorixError::NotFound(format!("entity {endpoint}")));
                }
            }
        }

        let mut created = Vec::new();
        for relation in new {
            let exists = self.relations.iter().any(|r| {
                r.from == relation.from
                    && r.to == relation.to
                    && r.relation_type == relation.relation_type
            });
            if exists {
                continue;
            }
            self.relations.push(relation.clone());
            created.push(relation);
        }
        if !created.is_empty() {
            self.persist()?;
        }
        Ok(created)
    }

    /// Append observation lines to an entity, deduplicating by exact string
    /// equality. Returns the lines actually added.
    pub fn add_observations(&mut self, entity_name: &str, lines: Vec<String>) -> Result<Vec<String>> {
        let entity = self
            .entities
            .iter_mut()
            .find(|e| e.name == entity_name)
            .ok_or_else(|| MemorixError::NotFound(format!("entity {entity_name}")))?;

        let mut added = Vec::new();
        for line in lines {
            if entity.observations.contains(&line) {
                continue;
            }
            entity.observations.push(line.clone());
            added.push(line);
        }
        if !added.is_empty() {
            self.persist()?;
        }
        Ok(added)
    }

    /// Entities whose name or any observation line contains `query`,
    /// case-insensitively.
    pub fn search_nodes(&self, query: &str) -> Vec<&Entity> {
        let needle = query.to_lowercase();
        self.entities
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&needle)
                    || e.observations
                        .iter()
                        .any(|o| o.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn open_nodes(&self, names: &[String]) -> Vec<&Entity> {
        self.entities
            .iter()
            .filter(|e| names.iter().any(|n| n == &e.name))
            .collect()
    }

    fn persist(&self) -> Result<()> {
        self.dir
            .clone()
            .with_lock(|| self.dir.save_graph(&self.entities, &self.relations))
    }
}
