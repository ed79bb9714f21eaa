mod helpers;

use helpers::{engine_at, fresh_store, local_project_dir, store_input, typed_input};
use memorix::memory::types::ObservationType;
use tempfile::TempDir;

/// Store a record and backdate its createdAt on disk so decay applies.
fn backdate(data_dir: &std::path::Path, id: u64, hours: i64) {
    let dir = memorix::storage::DataDir::new(data_dir).unwrap();
    let mut records = dir.load_observations().unwrap();
    let created = chrono::Utc::now() - chrono::Duration::hours(hours);
    for obs in &mut records {
        if obs.id == id {
            obs.created_at = created.to_rfc3339();
        }
    }
    dir.save_observations(&records).unwrap();
}

#[test]
fn archive_moves_stale_records_one_way() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");

    let id = {
        let (mut store, mut index) = fresh_store(&data_dir);
        let id = store
            .store(store_input("ancient discovery", "local/app"), &mut index, None)
            .unwrap()
            .observation
            .id;
        store
            .store(store_input("fresh discovery", "local/app"), &mut index, None)
            .unwrap();
        id
    };
    backdate(&data_dir, id, 10_000);

    let cwd = local_project_dir(&tmp, "app");
    let mut engine = engine_at(&cwd, &data_dir);

    let report = engine.archive(1.0, false).unwrap();
    assert_eq!(report.archived, 1);

    // Gone from the live set and the index…
    assert!(engine.get_observations(&[id]).is_err());
    let hits = engine
        .search("ancient", None, None, None, None, None, None, false)
        .unwrap();
    assert!(hits.is_empty());

    // …and present in the archive file.
    let dir = memorix::storage::DataDir::new(&data_dir).unwrap();
    let archived = dir.load_archive().unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, id);

    // A second pass finds nothing: live→archived is one-way.
    let report = engine.archive(1.0, false).unwrap();
    assert_eq!(report.archived, 0);
    assert_eq!(dir.load_archive().unwrap().len(), 1);
}

#[test]
fn decisions_survive_archival_regardless_of_age() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");

    let id = {
        let (mut store, mut index) = fresh_store(&data_dir);
        store
            .store(
                typed_input("ten-thousand-hour decision", "local/app", ObservationType::Decision, None),
                &mut index,
                None,
            )
            .unwrap()
            .observation
            .id
    };
    backdate(&data_dir, id, 10_000);

    let cwd = local_project_dir(&tmp, "app");
    let mut engine = engine_at(&cwd, &data_dir);

    let report = engine.archive(1.0, false).unwrap();
    assert_eq!(report.archived, 0);
    assert_eq!(report.immune_skipped, 1);
    assert!(engine.get_observations(&[id]).is_ok());
}

#[test]
fn heavily_accessed_records_are_immune() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");

    let id = {
        let (mut store, mut index) = fresh_store(&data_dir);
        let id = store
            .store(store_input("much used discovery", "local/app"), &mut index, None)
            .unwrap()
            .observation
            .id;
        for _ in 0..5 {
            store.record_access(&[id], &mut index).unwrap();
        }
        id
    };
    backdate(&data_dir, id, 10_000);

    let cwd = local_project_dir(&tmp, "app");
    let mut engine = engine_at(&cwd, &data_dir);

    let report = engine.archive(1.0, false).unwrap();
    assert_eq!(report.archived, 0);
    assert!(engine.get_observations(&[id]).is_ok());
}

#[test]
fn dry_run_reports_without_moving() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");

    let id = {
        let (mut store, mut index) = fresh_store(&data_dir);
        store
            .store(store_input("would be archived", "local/app"), &mut index, None)
            .unwrap()
            .observation
            .id
    };
    backdate(&data_dir, id, 10_000);

    let cwd = local_project_dir(&tmp, "app");
    let mut engine = engine_at(&cwd, &data_dir);

    let report = engine.archive(1.0, true).unwrap();
    assert_eq!(report.archived, 0);
    assert_eq!(report.candidates, 1);
    assert!(engine.get_observations(&[id]).is_ok());

    let dir = memorix::storage::DataDir::new(&data_dir).unwrap();
    assert!(dir.load_archive().unwrap().is_empty());
}
