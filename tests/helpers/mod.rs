#![allow(dead_code)]

use std::path::{Path, PathBuf};

use memorix::config::MemorixConfig;
use memorix::engine::Engine;
use memorix::index::SearchIndex;
use memorix::memory::observations::{ObservationStore, StoreInput};
use memorix::memory::types::ObservationType;
use memorix::storage::DataDir;
use tempfile::TempDir;

/// A workspace directory that detects as `local/<name>`.
pub fn local_project_dir(tmp: &TempDir, name: &str) -> PathBuf {
    let dir = tmp.path().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("Cargo.toml"), "[package]\n").unwrap();
    dir
}

/// A workspace directory with a git origin remote, detecting as `owner/repo`.
pub fn git_project_dir(tmp: &TempDir, name: &str, remote: &str) -> PathBuf {
    let dir = tmp.path().join(name);
    let git_dir = dir.join(".git");
    std::fs::create_dir_all(&git_dir).unwrap();
    std::fs::write(
        git_dir.join("config"),
        format!("[remote \"origin\"]\n\turl = {remote}\n"),
    )
    .unwrap();
    dir
}

/// Boot an engine against explicit cwd + data directories.
pub fn engine_at(cwd: &Path, data_dir: &Path) -> Engine {
    Engine::init_at(&MemorixConfig::default(), cwd, data_dir).unwrap()
}

/// A store + index pair over a fresh data directory.
pub fn fresh_store(data_dir: &Path) -> (ObservationStore, SearchIndex) {
    let dir = DataDir::new(data_dir).unwrap();
    (ObservationStore::load(dir).unwrap(), SearchIndex::new())
}

/// Minimal store input for a given project.
pub fn store_input(title: &str, project_id: &str) -> StoreInput {
    StoreInput {
        entity_name: "core".into(),
        obs_type: ObservationType::Discovery,
        title: title.into(),
        narrative: format!("{title} narrative"),
        facts: vec![],
        files_modified: vec![],
        concepts: vec![],
        project_id: project_id.into(),
        topic_key: None,
        session_id: None,
    }
}

/// Same, with a type and topic key.
pub fn typed_input(
    title: &str,
    project_id: &str,
    obs_type: ObservationType,
    topic_key: Option<&str>,
) -> StoreInput {
    StoreInput {
        obs_type,
        topic_key: topic_key.map(String::from),
        ..store_input(title, project_id)
    }
}
