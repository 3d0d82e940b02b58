//! SQLite-backed implementation of [`StateStore`].
//!
//! Owns an in-process, versioned migration runner (a `migrations` tracking
//! table plus an ordered list of numbered SQL batches applied on
//! `initialize()`) rather than depending on an external migration tool.

use crate::errors::{StateStoreError, StateStoreResult};
use crate::models::{ADWState, ADWStateSummary, ActivityLogEntry};
use crate::traits::StateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

/// One numbered migration batch, tracked in the `migrations` table.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_adw_states",
        statements: &[
            r#"CREATE TABLE IF NOT EXISTS adw_states (
                adw_id TEXT PRIMARY KEY NOT NULL,
                issue_number INTEGER,
                issue_title TEXT,
                issue_body TEXT,
                issue_class TEXT,
                branch_name TEXT,
                worktree_path TEXT,
                current_stage TEXT NOT NULL DEFAULT 'backlog',
                status TEXT NOT NULL DEFAULT 'pending',
                workflow_name TEXT,
                model_set TEXT,
                data_source TEXT NOT NULL DEFAULT 'kanban',
                issue_json TEXT,
                orchestrator_state TEXT,
                plan_file TEXT,
                all_adws TEXT NOT NULL DEFAULT '[]',
                patch_file TEXT,
                patch_history TEXT NOT NULL DEFAULT '[]',
                patch_source_mode TEXT,
                backend_port INTEGER,
                websocket_port INTEGER,
                frontend_port INTEGER,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                completed_at TEXT,
                deleted_at TEXT
            )"#,
            r#"CREATE INDEX IF NOT EXISTS idx_adw_states_deleted_at ON adw_states(deleted_at)"#,
            r#"CREATE INDEX IF NOT EXISTS idx_adw_states_issue_number ON adw_states(issue_number)"#,
        ],
    },
    Migration {
        version: 2,
        name: "create_adw_activity_logs",
        statements: &[
            r#"CREATE TABLE IF NOT EXISTS adw_activity_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                adw_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                field_changed TEXT,
                old_value TEXT,
                new_value TEXT,
                event_data TEXT,
                timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"#,
            r#"CREATE INDEX IF NOT EXISTS idx_adw_activity_logs_adw_id ON adw_activity_logs(adw_id)"#,
        ],
    },
];

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> StateStoreResult<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StateStoreError::IoError)?;
            }
        }

        let connect_options = SqliteConnectOptions::from_str(&db_path.to_string_lossy())
            .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?;

        Ok(Self { pool })
    }

    /// An in-memory store, for tests.
    pub async fn in_memory() -> StateStoreResult<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn apply_migrations(&self) -> StateStoreResult<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS migrations (
                version INTEGER PRIMARY KEY NOT NULL,
                name TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::MigrationError(e.to_string()))?;

        let max_version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StateStoreError::MigrationError(e.to_string()))?;

        for migration in MIGRATIONS {
            if migration.version <= max_version {
                continue;
            }
            for statement in migration.statements {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        StateStoreError::MigrationError(format!(
                            "migration {} ({}): {}",
                            migration.version, migration.name, e
                        ))
                    })?;
            }
            sqlx::query("INSERT INTO migrations (version, name) VALUES (?, ?)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(&self.pool)
                .await
                .map_err(|e| StateStoreError::MigrationError(e.to_string()))?;
        }

        Ok(())
    }

    /// One-shot import of legacy `agents/<adw_id>/adw_state.json` mirror
    /// files into `adw_states`. Skips rows whose `adw_id` already exists,
    /// and appends a `workflow_started` activity row tagging the source.
    /// Explicit, CLI-invokable, never run implicitly on startup.
    pub async fn import_legacy_json_mirror(&self, agents_dir: &Path) -> StateStoreResult<usize> {
        let mut imported = 0usize;
        let Ok(mut entries) = tokio::fs::read_dir(agents_dir).await else {
            return Ok(0);
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StateStoreError::IoError)?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let mirror = path.join("adw_state.json");
            if !mirror.exists() {
                continue;
            }
            let adw_id = match path.file_name().and_then(|n| n.to_str()) {
                Some(id) => id.to_string(),
                None => continue,
            };
            if self.load(&adw_id).await?.is_some() {
                continue;
            }
            let contents = tokio::fs::read_to_string(&mirror)
                .await
                .map_err(StateStoreError::IoError)?;
            let state: ADWState = match serde_json::from_str(&contents) {
                Ok(s) => s,
                Err(_) => continue,
            };
            self.save(&state).await?;
            self.append_activity(
                &ActivityLogEntry::new(&adw_id, "workflow_started")
                    .with_event_data(serde_json::json!({"source": "legacy_json_mirror"})),
            )
            .await?;
            imported += 1;
        }

        Ok(imported)
    }
}

fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> ADWStateSummary {
    ADWStateSummary {
        adw_id: row.get("adw_id"),
        issue_class: row.get("issue_class"),
        issue_number: row.get("issue_number"),
        issue_title: row.get("issue_title"),
        branch_name: row.get("branch_name"),
        completed: row.get::<Option<String>, _>("completed_at").is_some(),
    }
}

fn parse_json_column(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn parse_json_array(raw: Option<String>) -> Vec<Value> {
    raw.and_then(|s| serde_json::from_str::<Vec<Value>>(&s).ok())
        .unwrap_or_default()
}

fn row_to_state(row: sqlx::sqlite::SqliteRow) -> ADWState {
    let data_source_str: String = row.get("data_source");
    let data_source = if data_source_str == "github" {
        crate::models::DataSource::Github
    } else {
        crate::models::DataSource::Kanban
    };

    let all_adws: Vec<String> = row
        .get::<Option<String>, _>("all_adws")
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    ADWState {
        adw_id: row.get("adw_id"),
        issue_number: row.get("issue_number"),
        issue_title: row.get("issue_title"),
        issue_body: row.get("issue_body"),
        issue_class: row.get("issue_class"),
        branch_name: row.get("branch_name"),
        worktree_path: row.get("worktree_path"),
        current_stage: row.get("current_stage"),
        status: row.get("status"),
        workflow_name: row.get("workflow_name"),
        model_set: row.get("model_set"),
        data_source,
        issue_json: parse_json_column(row.get("issue_json")),
        orchestrator_state: parse_json_column(row.get("orchestrator_state")),
        plan_file: row.get("plan_file"),
        all_adws,
        patch_file: row.get("patch_file"),
        patch_history: parse_json_array(row.get("patch_history")),
        patch_source_mode: row.get("patch_source_mode"),
        backend_port: row.get("backend_port"),
        websocket_port: row.get("websocket_port"),
        frontend_port: row.get("frontend_port"),
        created_at: row.get::<Option<DateTime<Utc>>, _>("created_at"),
        updated_at: row.get::<Option<DateTime<Utc>>, _>("updated_at"),
        completed_at: row.get::<Option<DateTime<Utc>>, _>("completed_at"),
        deleted_at: row.get::<Option<DateTime<Utc>>, _>("deleted_at"),
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn initialize(&self) -> StateStoreResult<()> {
        self.apply_migrations().await
    }

    async fn save(&self, state: &ADWState) -> StateStoreResult<()> {
        let issue_json = state
            .issue_json
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let orchestrator_state = state
            .orchestrator_state
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let all_adws = serde_json::to_string(&state.all_adws)
            .map_err(|e| StateStoreError::SerializationError(e.to_string()))?;
        let patch_history = serde_json::to_string(&state.patch_history)
            .map_err(|e| StateStoreError::SerializationError(e.to_string()))?;
        let data_source = match state.data_source {
            crate::models::DataSource::Github => "github",
            crate::models::DataSource::Kanban => "kanban",
        };
        let is_completed = state.is_completed();

        sqlx::query(
            r#"
            INSERT INTO adw_states (
                adw_id, issue_number, issue_title, issue_body, issue_class,
                branch_name, worktree_path, current_stage, status, workflow_name,
                model_set, data_source, issue_json, orchestrator_state, plan_file,
                all_adws, patch_file, patch_history, patch_source_mode,
                backend_port, websocket_port, frontend_port,
                created_at, updated_at, completed_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                CURRENT_TIMESTAMP, CURRENT_TIMESTAMP, CASE WHEN ? THEN CURRENT_TIMESTAMP ELSE NULL END
            )
            ON CONFLICT(adw_id) DO UPDATE SET
                issue_number = excluded.issue_number,
                issue_title = excluded.issue_title,
                issue_body = excluded.issue_body,
                issue_class = excluded.issue_class,
                branch_name = excluded.branch_name,
                worktree_path = excluded.worktree_path,
                current_stage = excluded.current_stage,
                status = excluded.status,
                workflow_name = excluded.workflow_name,
                model_set = excluded.model_set,
                data_source = excluded.data_source,
                issue_json = excluded.issue_json,
                orchestrator_state = excluded.orchestrator_state,
                plan_file = excluded.plan_file,
                all_adws = excluded.all_adws,
                patch_file = excluded.patch_file,
                patch_history = excluded.patch_history,
                patch_source_mode = excluded.patch_source_mode,
                backend_port = excluded.backend_port,
                websocket_port = excluded.websocket_port,
                frontend_port = excluded.frontend_port,
                updated_at = CURRENT_TIMESTAMP,
                completed_at = CASE
                    WHEN adw_states.completed_at IS NOT NULL THEN adw_states.completed_at
                    WHEN ? THEN CURRENT_TIMESTAMP
                    ELSE NULL
                END
            "#,
        )
        .bind(&state.adw_id)
        .bind(state.issue_number)
        .bind(&state.issue_title)
        .bind(&state.issue_body)
        .bind(&state.issue_class)
        .bind(&state.branch_name)
        .bind(&state.worktree_path)
        .bind(&state.current_stage)
        .bind(&state.status)
        .bind(&state.workflow_name)
        .bind(&state.model_set)
        .bind(data_source)
        .bind(issue_json)
        .bind(orchestrator_state)
        .bind(&state.plan_file)
        .bind(all_adws)
        .bind(&state.patch_file)
        .bind(patch_history)
        .bind(&state.patch_source_mode)
        .bind(state.backend_port)
        .bind(state.websocket_port)
        .bind(state.frontend_port)
        .bind(is_completed)
        .bind(is_completed)
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn load(&self, adw_id: &str) -> StateStoreResult<Option<ADWState>> {
        let row = sqlx::query("SELECT * FROM adw_states WHERE adw_id = ? AND deleted_at IS NULL")
            .bind(adw_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?;

        Ok(row.map(row_to_state))
    }

    async fn list_all(&self) -> StateStoreResult<Vec<ADWStateSummary>> {
        let rows = sqlx::query(
            "SELECT adw_id, issue_class, issue_number, issue_title, branch_name, completed_at
             FROM adw_states WHERE deleted_at IS NULL ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?;

        Ok(rows.iter().map(row_to_summary).collect())
    }

    async fn soft_delete(&self, adw_id: &str) -> StateStoreResult<u64> {
        let result = sqlx::query(
            "UPDATE adw_states SET deleted_at = CURRENT_TIMESTAMP WHERE adw_id = ? AND deleted_at IS NULL",
        )
        .bind(adw_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> StateStoreResult<()> {
        let event_data = entry.event_data.as_ref().map(|v| v.to_string());

        sqlx::query(
            r#"INSERT INTO adw_activity_logs
               (adw_id, event_type, field_changed, old_value, new_value, event_data, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.adw_id)
        .bind(&entry.event_type)
        .bind(&entry.field_changed)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(event_data)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ADWState;

    async fn store() -> SqliteStateStore {
        let s = SqliteStateStore::in_memory().await.unwrap();
        s.initialize().await.unwrap();
        s
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = store().await;
        let mut state = ADWState::new("a1b2c3d4");
        state.issue_number = Some(42);
        state.issue_title = Some("fix login bug".into());
        state.append_adw_name("dynamic_plan_build");
        store.save(&state).await.unwrap();

        let loaded = store.load("a1b2c3d4").await.unwrap().unwrap();
        assert_eq!(loaded.adw_id, "a1b2c3d4");
        assert_eq!(loaded.issue_number, Some(42));
        assert_eq!(loaded.all_adws, vec!["dynamic_plan_build".to_string()]);
    }

    #[tokio::test]
    async fn soft_delete_hides_from_load_and_list() {
        let store = store().await;
        let state = ADWState::new("abcdef01");
        store.save(&state).await.unwrap();

        let affected = store.soft_delete("abcdef01").await.unwrap();
        assert_eq!(affected, 1);

        assert!(store.load("abcdef01").await.unwrap().is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn soft_delete_is_idempotent() {
        let store = store().await;
        let state = ADWState::new("11112222");
        store.save(&state).await.unwrap();

        assert_eq!(store.soft_delete("11112222").await.unwrap(), 1);
        assert_eq!(store.soft_delete("11112222").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn save_is_a_full_upsert() {
        let store = store().await;
        let mut state = ADWState::new("deadbeef");
        state.current_stage = "plan".into();
        store.save(&state).await.unwrap();

        state.current_stage = "build".into();
        store.save(&state).await.unwrap();

        let loaded = store.load("deadbeef").await.unwrap().unwrap();
        assert_eq!(loaded.current_stage, "build");

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn completed_at_set_once_status_becomes_completed() {
        let store = store().await;
        let mut state = ADWState::new("ffffffff");
        store.save(&state).await.unwrap();
        assert!(store.load("ffffffff").await.unwrap().unwrap().completed_at.is_none());

        state.mark_completed();
        store.save(&state).await.unwrap();
        let loaded = store.load("ffffffff").await.unwrap().unwrap();
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn append_activity_allows_duplicates() {
        let store = store().await;
        let entry = ActivityLogEntry::new("a1b2c3d4", "stage_started");
        store.append_activity(&entry).await.unwrap();
        store.append_activity(&entry).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM adw_activity_logs WHERE adw_id = ?")
            .bind("a1b2c3d4")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn invalid_json_column_yields_none_not_a_failed_load() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO adw_states (adw_id, issue_json) VALUES (?, ?)",
        )
        .bind("badjson1")
        .bind("{not valid json")
        .execute(store.pool())
        .await
        .unwrap();

        let loaded = store.load("badjson1").await.unwrap().unwrap();
        assert!(loaded.issue_json.is_none());
    }
}
