mod helpers;

use helpers::{engine_at, local_project_dir};
use memorix::storage::{DataDir, MIGRATED_SUBDIRS};
use tempfile::TempDir;

/// A pre-flat layout (one subdirectory per project) flattens on first boot,
/// and the flattened store behaves like any other afterwards.
#[test]
fn engine_startup_flattens_legacy_subdirectories() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");

    // Legacy layout: per-project subdirectories with their own files.
    {
        let sub_a = DataDir::new(data_dir.join("app")).unwrap();
        let mut records = Vec::new();
        for i in 0..3 {
            let mut obs = observation(i + 1, &format!("from app {i}"), "local/app");
            obs.created_at = format!("2026-01-0{}T00:00:00+00:00", i + 1);
            records.push(obs);
        }
        sub_a.save_observations(&records).unwrap();

        let sub_b = DataDir::new(data_dir.join("tool")).unwrap();
        let mut obs = observation(1, "from tool", "local/tool");
        obs.created_at = "2026-01-02T12:00:00+00:00".into();
        sub_b.save_observations(&[obs]).unwrap();
    }

    let cwd = local_project_dir(&tmp, "app");
    let engine = engine_at(&cwd, &data_dir);

    // All four records live in the flat file with sequential ids.
    let dir = DataDir::new(&data_dir).unwrap();
    let flattened = dir.load_observations().unwrap();
    assert_eq!(flattened.len(), 4);
    assert_eq!(
        flattened.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    // createdAt ascending across the merged set.
    for pair in flattened.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }
    assert_eq!(dir.load_counter().unwrap().next_id, 5);

    // Subdirectories were preserved under the backup root.
    assert!(data_dir.join(MIGRATED_SUBDIRS).join("app").is_dir());
    assert!(data_dir.join(MIGRATED_SUBDIRS).join("tool").is_dir());

    // The flattened records are searchable right away, partitioned by the
    // projectId field rather than by directory.
    let hits = engine
        .search("tool", Some("local/tool"), None, None, None, None, None, false)
        .unwrap();
    assert_eq!(hits.len(), 1);
    let hits = engine
        .search("app", None, None, None, None, None, None, false)
        .unwrap();
    assert_eq!(hits.len(), 3);
}

#[test]
fn rebooting_after_flattening_changes_nothing() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");

    {
        let sub = DataDir::new(data_dir.join("app")).unwrap();
        sub.save_observations(&[observation(1, "only record", "local/app")])
            .unwrap();
    }

    let cwd = local_project_dir(&tmp, "app");
    drop(engine_at(&cwd, &data_dir));

    let dir = DataDir::new(&data_dir).unwrap();
    let first_pass = dir.load_observations().unwrap();

    drop(engine_at(&cwd, &data_dir));
    let second_pass = dir.load_observations().unwrap();

    assert_eq!(first_pass.len(), second_pass.len());
    assert_eq!(first_pass[0].id, second_pass[0].id);
    assert_eq!(first_pass[0].created_at, second_pass[0].created_at);
}

#[test]
fn duplicate_records_across_subdirs_collapse() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");

    let mut shared = observation(1, "shared title", "local/app");
    shared.created_at = "2026-01-01T00:00:00+00:00".into();

    {
        let sub_a = DataDir::new(data_dir.join("one")).unwrap();
        sub_a.save_observations(std::slice::from_ref(&shared)).unwrap();
        let sub_b = DataDir::new(data_dir.join("two")).unwrap();
        sub_b.save_observations(std::slice::from_ref(&shared)).unwrap();
    }

    let cwd = local_project_dir(&tmp, "app");
    drop(engine_at(&cwd, &data_dir));

    let dir = DataDir::new(&data_dir).unwrap();
    assert_eq!(dir.load_observations().unwrap().len(), 1);
}

fn observation(id: u64, title: &str, project_id: &str) -> memorix::memory::types::Observation {
    memorix::memory::types::Observation {
        id,
        entity_name: "core".into(),
        obs_type: memorix::memory::types::ObservationType::Discovery,
        title: title.into(),
        narrative: "legacy".into(),
        facts: vec![],
        files_modified: vec![],
        concepts: vec![],
        tokens: 4,
        created_at: "2026-01-01T00:00:00+00:00".into(),
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
