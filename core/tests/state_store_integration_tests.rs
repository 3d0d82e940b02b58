/// Integration tests for SqliteStateStore against a real on-disk database,
/// covering persistence across store instances and the legacy JSON mirror
/// import path (state_store.rs's `import_legacy_json_mirror`).
use adw_core::{ADWState, ActivityLogEntry, SqliteStateStore, StateStore};
use std::path::PathBuf;

fn test_db_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("adw_state_store_it_{}.db", name));
    let _ = std::fs::remove_file(&path);
    path
}

#[tokio::test]
async fn state_survives_reopening_the_database() {
    let db_path = test_db_path("reopen");

    {
        let store = SqliteStateStore::new(&db_path).await.unwrap();
        store.initialize().await.unwrap();

        let mut state = ADWState::new("a1b2c3d4");
        state.issue_number = Some(7);
        state.current_stage = "build".into();
        store.save(&state).await.unwrap();
    }

    let store = SqliteStateStore::new(&db_path).await.unwrap();
    store.initialize().await.unwrap();
    let loaded = store.load("a1b2c3d4").await.unwrap().unwrap();
    assert_eq!(loaded.issue_number, Some(7));
    assert_eq!(loaded.current_stage, "build");

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn list_all_excludes_soft_deleted_rows_across_many() {
    let db_path = test_db_path("list_excludes_deleted");
    let store = SqliteStateStore::new(&db_path).await.unwrap();
    store.initialize().await.unwrap();

    for id in ["11111111", "22222222", "33333333"] {
        store.save(&ADWState::new(id)).await.unwrap();
    }
    store.soft_delete("22222222").await.unwrap();

    let summaries = store.list_all().await.unwrap();
    let ids: Vec<&str> = summaries.iter().map(|s| s.adw_id.as_str()).collect();
    assert!(ids.contains(&"11111111"));
    assert!(ids.contains(&"33333333"));
    assert!(!ids.contains(&"22222222"));

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn import_legacy_json_mirror_skips_existing_ids_and_tags_activity() {
    let db_path = test_db_path("legacy_import");
    let store = SqliteStateStore::new(&db_path).await.unwrap();
    store.initialize().await.unwrap();

    // Seed one adw_id already present in the DB; the mirror file for it
    // must be skipped even though a mirror exists on disk.
    store.save(&ADWState::new("deadbeef")).await.unwrap();

    let agents_dir = std::env::temp_dir().join(format!(
        "adw_agents_it_{}",
        db_path.file_stem().unwrap().to_string_lossy()
    ));
    let _ = std::fs::remove_dir_all(&agents_dir);
    for id in ["deadbeef", "cafef00d"] {
        let dir = agents_dir.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        let state = ADWState::new(id);
        std::fs::write(
            dir.join("adw_state.json"),
            serde_json::to_string(&state).unwrap(),
        )
        .unwrap();
    }

    let imported = store.import_legacy_json_mirror(&agents_dir).await.unwrap();
    assert_eq!(imported, 1);

    assert!(store.load("cafef00d").await.unwrap().is_some());

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM adw_activity_logs WHERE adw_id = ? AND event_type = 'workflow_started'",
    )
    .bind("cafef00d")
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(count, 1);

    let _ = std::fs::remove_file(&db_path);
    let _ = std::fs::remove_dir_all(&agents_dir);
}

#[tokio::test]
async fn append_activity_then_soft_delete_preserves_activity_log() {
    let db_path = test_db_path("activity_survives_delete");
    let store = SqliteStateStore::new(&db_path).await.unwrap();
    store.initialize().await.unwrap();

    store.save(&ADWState::new("abcd1234")).await.unwrap();
    store
        .append_activity(&ActivityLogEntry::new("abcd1234", "stage_started"))
        .await
        .unwrap();
    store.soft_delete("abcd1234").await.unwrap();

    assert!(store.load("abcd1234").await.unwrap().is_none());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM adw_activity_logs WHERE adw_id = ?")
        .bind("abcd1234")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    let _ = std::fs::remove_file(&db_path);
}
