//! Read-only facade over the [`StateStore`], projecting rows into the
//! lightweight summaries HTTP handlers serve.

use crate::errors::StateStoreResult;
use crate::traits::StateStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A list-view projection of an `ADWState` row.
///
/// This is the **only** place that falls back to `issue_json.title` when
/// the primary `issue_title` column is null -- stages and the orchestrator
/// engine never derive titles themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdwSummary {
    pub adw_id: String,
    pub issue_class: Option<String>,
    pub issue_number: Option<i64>,
    pub issue_title: Option<String>,
    pub branch_name: Option<String>,
    pub completed: bool,
}

pub struct Discovery {
    store: Arc<dyn StateStore>,
}

impl Discovery {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Active (non-soft-deleted) ADW summaries, with the issue-class
    /// leading slash stripped and a title fallback applied.
    pub async fn list_active(&self) -> StateStoreResult<Vec<AdwSummary>> {
        let rows = self.store.list_all().await?;
        let mut summaries = Vec::with_capacity(rows.len());

        for row in rows {
            let mut issue_title = row.issue_title;
            if issue_title.is_none() {
                if let Some(state) = self.store.load(&row.adw_id).await? {
                    issue_title = state
                        .issue_json
                        .as_ref()
                        .and_then(|v| v.get("title"))
                        .and_then(|t| t.as_str())
                        .map(|s| s.to_string());
                }
            }

            summaries.push(AdwSummary {
                adw_id: row.adw_id,
                issue_class: row.issue_class.map(|c| c.trim_start_matches('/').to_string()),
                issue_number: row.issue_number,
                issue_title,
                branch_name: row.branch_name,
                completed: row.completed,
            });
        }

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ADWState;
    use crate::state_store::SqliteStateStore;
    use serde_json::json;

    async fn discovery() -> (Discovery, Arc<SqliteStateStore>) {
        let store = Arc::new(SqliteStateStore::in_memory().await.unwrap());
        store.initialize().await.unwrap();
        (Discovery::new(store.clone()), store)
    }

    #[tokio::test]
    async fn falls_back_to_issue_json_title_when_column_is_null() {
        let (discovery, store) = discovery().await;
        let mut state = ADWState::new("a1b2c3d4");
        state.issue_class = Some("/feature".into());
        state.issue_json = Some(json!({"title": "from json"}));
        store.save(&state).await.unwrap();

        let summaries = discovery.list_active().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].issue_title.as_deref(), Some("from json"));
        assert_eq!(summaries[0].issue_class.as_deref(), Some("feature"));
    }

    #[tokio::test]
    async fn primary_title_column_wins_over_json() {
        let (discovery, store) = discovery().await;
        let mut state = ADWState::new("a1b2c3d4");
        state.issue_title = Some("primary title".into());
        state.issue_json = Some(json!({"title": "from json"}));
        store.save(&state).await.unwrap();

        let summaries = discovery.list_active().await.unwrap();
        assert_eq!(summaries[0].issue_title.as_deref(), Some("primary title"));
    }

    #[tokio::test]
    async fn excludes_soft_deleted_rows() {
        let (discovery, store) = discovery().await;
        let state = ADWState::new("abcdef01");
        store.save(&state).await.unwrap();
        store.soft_delete("abcdef01").await.unwrap();

        assert!(discovery.list_active().await.unwrap().is_empty());
    }
}
