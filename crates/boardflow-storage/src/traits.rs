//! The storage trait every backend implements.

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::types::{
    AutomationLogEntry, AutomationRecord, Board, CellValue, ChangeEvent, Column, Item,
    NewAutomationLog, NewItem,
};

/// Relational store holding boards, items, cells, rules, events and logs.
///
/// The automation engine only ever sees this trait. Implementations must be
/// safe to share across concurrent processing cycles.
#[async_trait]
pub trait BoardStore: Send + Sync {
    // ==================== Change events ====================

    /// Pending events (`processed_at` is null), oldest first, optionally
    /// restricted to one board.
    async fn fetch_pending_events(
        &self,
        board_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChangeEvent>, StorageError>;

    /// Atomically marks up to `limit` pending events as processed at
    /// `claimed_at` and returns exactly the rows this call transitioned.
    ///
    /// Two concurrent callers never receive the same event.
    async fn claim_pending_events(
        &self,
        board_id: Option<&str>,
        limit: usize,
        claimed_at: OffsetDateTime,
    ) -> Result<Vec<ChangeEvent>, StorageError>;

    /// Sets `processed_at` on the given events. Events already processed
    /// keep their original timestamp.
    async fn mark_events_processed(
        &self,
        event_ids: &[String],
        processed_at: OffsetDateTime,
    ) -> Result<(), StorageError>;

    /// Most recent events regardless of state, newest first.
    async fn list_recent_events(&self, limit: usize) -> Result<Vec<ChangeEvent>, StorageError>;

    // ==================== Automation rules ====================

    /// Active rules owned by any of `board_ids`.
    async fn list_active_automations(
        &self,
        board_ids: &[String],
    ) -> Result<Vec<AutomationRecord>, StorageError>;

    /// All rules (active or not) with the given trigger type.
    async fn list_automations_by_trigger(
        &self,
        trigger_type: &str,
    ) -> Result<Vec<AutomationRecord>, StorageError>;

    async fn get_automation(&self, id: &str) -> Result<Option<AutomationRecord>, StorageError>;

    /// Replaces a rule's trigger config. Fails with `NotFound` for an unknown id.
    async fn update_trigger_config(
        &self,
        id: &str,
        trigger_config: &Value,
    ) -> Result<(), StorageError>;

    // ==================== Automation logs ====================

    async fn append_log(&self, log: &NewAutomationLog) -> Result<(), StorageError>;

    /// Most recent log rows, newest first, joined with their rule.
    async fn list_recent_logs(&self, limit: usize)
    -> Result<Vec<AutomationLogEntry>, StorageError>;

    // ==================== Boards and items ====================

    async fn get_board(&self, id: &str) -> Result<Option<Board>, StorageError>;

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StorageError>;

    async fn create_item(&self, item: &NewItem) -> Result<Item, StorageError>;

    async fn archive_item(&self, id: &str, at: OffsetDateTime) -> Result<(), StorageError>;

    async fn delete_item(&self, id: &str) -> Result<(), StorageError>;

    /// Highest position among items of a group, `None` if the group is empty.
    async fn max_group_position(&self, group_id: &str) -> Result<Option<i64>, StorageError>;

    /// Sets an item's group and position in one write. Fails with `NotFound`
    /// if no row was updated.
    async fn move_item_to_group(
        &self,
        item_id: &str,
        group_id: &str,
        position: i64,
    ) -> Result<(), StorageError>;

    // ==================== Columns and cells ====================

    async fn list_columns(&self, board_id: &str) -> Result<Vec<Column>, StorageError>;

    /// Status-typed columns across all boards.
    async fn list_status_columns(&self) -> Result<Vec<Column>, StorageError>;

    async fn list_cell_values(&self, item_id: &str) -> Result<Vec<CellValue>, StorageError>;

    async fn get_cell_value(
        &self,
        item_id: &str,
        column_id: &str,
    ) -> Result<Option<CellValue>, StorageError>;

    async fn insert_cell_values(&self, cells: &[CellValue]) -> Result<(), StorageError>;

    /// Overwrites the value of an existing (item, column) cell.
    async fn update_cell_value(
        &self,
        item_id: &str,
        column_id: &str,
        value: Option<&Value>,
    ) -> Result<(), StorageError>;

    /// Updates the cell when a row exists, inserts it otherwise.
    async fn upsert_cell_value(
        &self,
        item_id: &str,
        column_id: &str,
        value: Option<&Value>,
    ) -> Result<(), StorageError> {
        if self.get_cell_value(item_id, column_id).await?.is_some() {
            self.update_cell_value(item_id, column_id, value).await
        } else {
            self.insert_cell_values(&[CellValue::new(item_id, column_id, value.cloned())])
                .await
        }
    }

    /// Short backend name for logs and the readiness probe.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test that BoardStore is object-safe
    fn _assert_store_object_safe(_: &dyn BoardStore) {}
}
