/// Core trait definitions for the ADW orchestration system.
use crate::errors::{StageError, StateStoreResult};
use crate::models::{ADWState, ADWStateSummary, ActivityLogEntry, StageContext};
use async_trait::async_trait;

/// Persistence layer for `ADWState` rows and their activity logs.
///
/// Implementors own the storage medium (SQLite in production, an in-memory
/// pool in tests) but must honor soft-delete visibility rules: a loaded or
/// listed row never has `deleted_at` set.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Apply pending migrations and prepare the store for use.
    async fn initialize(&self) -> StateStoreResult<()>;

    /// Full UPSERT on `adw_id`. Updates `updated_at`; sets `completed_at`
    /// the first time `status` becomes a terminal stage.
    async fn save(&self, state: &ADWState) -> StateStoreResult<()>;

    /// Returns `None` if the row doesn't exist or is soft-deleted.
    async fn load(&self, adw_id: &str) -> StateStoreResult<Option<ADWState>>;

    /// Summaries of all visible rows, lightest projection (no JSON bodies).
    async fn list_all(&self) -> StateStoreResult<Vec<ADWStateSummary>>;

    /// Alias of `load`, present for symmetry with the discovery layer's naming.
    async fn get(&self, adw_id: &str) -> StateStoreResult<Option<ADWState>> {
        self.load(adw_id).await
    }

    /// Marks the row deleted. Returns the number of rows affected (0 if
    /// already deleted or absent); this is a no-op, not an error.
    async fn soft_delete(&self, adw_id: &str) -> StateStoreResult<u64>;

    /// Appends one row to `adw_activity_logs`. Always inserts; duplicates
    /// across repeated calls with identical payloads are expected and kept.
    async fn append_activity(&self, entry: &ActivityLogEntry) -> StateStoreResult<()>;
}

/// The capability set every SDLC stage implementation exposes.
///
/// The orchestrator drives these hooks in a fixed order per stage:
/// `preconditions` → `should_skip` → `execute`, with `on_failure` invoked
/// only when `execute` fails or panics, and `cleanup` invoked unconditionally
/// afterward.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable name, a member of the closed stage set.
    fn name(&self) -> &'static str;

    /// Human-readable name used in log banners and events.
    fn display_name(&self) -> &'static str;

    /// Stage names that must already have completed.
    fn dependencies(&self) -> &'static [&'static str];

    /// Cheap checks; a failure here aborts the stage without running `execute`.
    async fn preconditions(&self, ctx: &StageContext) -> Result<(), StageError>;

    /// Policy-level opt-out. `Some(reason)` causes the stage to be marked
    /// skipped without running `execute`.
    async fn should_skip(&self, ctx: &StageContext) -> Result<Option<String>, StageError>;

    /// The stage's real work.
    async fn execute(&self, ctx: &mut StageContext) -> Result<crate::models::StageOutcome, StageError>;

    /// Invoked when `execute` fails or panics; best-effort, errors are logged not propagated.
    async fn on_failure(&self, _ctx: &StageContext, _error: &StageError) {}

    /// Invoked unconditionally after `execute`/`on_failure`, win or lose.
    async fn cleanup(&self, _ctx: &StageContext) {}
}
