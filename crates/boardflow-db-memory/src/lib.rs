//! In-memory [`BoardStore`] backend.
//!
//! Every table lives behind one `tokio::sync::RwLock`, so multi-row
//! operations such as claiming pending events are atomic with respect to
//! concurrent cycles. Used for local development (`storage.backend =
//! "memory"`) and throughout the test suites.

use std::collections::HashSet;

use async_trait::async_trait;
use boardflow_storage::{
    AutomationLog, AutomationLogEntry, AutomationRecord, AutomationSummary, Board, BoardStore,
    CellValue, ChangeEvent, Column, Group, Item, NewAutomationLog, NewItem, StorageError,
};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    boards: Vec<Board>,
    groups: Vec<Group>,
    items: Vec<Item>,
    columns: Vec<Column>,
    cells: Vec<CellValue>,
    automations: Vec<AutomationRecord>,
    events: Vec<ChangeEvent>,
    logs: Vec<AutomationLog>,
}

impl Tables {
    fn pending_indices(&self, board_id: Option<&str>, limit: usize) -> Vec<usize> {
        let mut idx: Vec<usize> = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_pending())
            .filter(|(_, e)| board_id.is_none_or(|b| e.board_id == b))
            .map(|(i, _)| i)
            .collect();
        // stable sort keeps insertion order for equal timestamps
        idx.sort_by_key(|&i| self.events[i].created_at);
        idx.truncate(limit);
        idx
    }
}

/// Process-local storage for boards, rules, events and logs.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl InMemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers. These bypass the trait so tests and local development
    // can set up boards without a change-capture layer.

    pub async fn insert_board(&self, board: Board) {
        self.tables.write().await.boards.push(board);
    }

    pub async fn insert_group(&self, group: Group) {
        self.tables.write().await.groups.push(group);
    }

    pub async fn insert_item(&self, item: Item) {
        self.tables.write().await.items.push(item);
    }

    pub async fn insert_column(&self, column: Column) {
        self.tables.write().await.columns.push(column);
    }

    pub async fn insert_automation(&self, automation: AutomationRecord) {
        self.tables.write().await.automations.push(automation);
    }

    pub async fn insert_event(&self, event: ChangeEvent) {
        self.tables.write().await.events.push(event);
    }

    pub async fn set_cell(&self, item_id: &str, column_id: &str, value: Option<Value>) {
        let mut t = self.tables.write().await;
        match t
            .cells
            .iter_mut()
            .find(|c| c.item_id == item_id && c.column_id == column_id)
        {
            Some(cell) => cell.value = value,
            None => t.cells.push(CellValue::new(item_id, column_id, value)),
        }
    }

    // Inspection helpers.

    /// All log rows in append order.
    pub async fn logs(&self) -> Vec<AutomationLog> {
        self.tables.read().await.logs.clone()
    }

    /// All events in insertion order.
    pub async fn events(&self) -> Vec<ChangeEvent> {
        self.tables.read().await.events.clone()
    }

    /// All items, including archived ones.
    pub async fn items(&self) -> Vec<Item> {
        self.tables.read().await.items.clone()
    }

    /// The stored cell, if a row exists. `Some(None)` is a cleared cell.
    pub async fn cell(&self, item_id: &str, column_id: &str) -> Option<Option<Value>> {
        self.tables
            .read()
            .await
            .cells
            .iter()
            .find(|c| c.item_id == item_id && c.column_id == column_id)
            .map(|c| c.value.clone())
    }
}

#[async_trait]
impl BoardStore for InMemoryStorage {
    async fn fetch_pending_events(
        &self,
        board_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChangeEvent>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.pending_indices(board_id, limit)
            .into_iter()
            .map(|i| t.events[i].clone())
            .collect())
    }

    async fn claim_pending_events(
        &self,
        board_id: Option<&str>,
        limit: usize,
        claimed_at: OffsetDateTime,
    ) -> Result<Vec<ChangeEvent>, StorageError> {
        let mut t = self.tables.write().await;
        let idx = t.pending_indices(board_id, limit);
        let mut claimed = Vec::with_capacity(idx.len());
        for i in idx {
            t.events[i].processed_at = Some(claimed_at);
            claimed.push(t.events[i].clone());
        }
        Ok(claimed)
    }

    async fn mark_events_processed(
        &self,
        event_ids: &[String],
        processed_at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        let ids: HashSet<&str> = event_ids.iter().map(String::as_str).collect();
        let mut t = self.tables.write().await;
        for ev in t.events.iter_mut() {
            if ids.contains(ev.id.as_str()) && ev.processed_at.is_none() {
                ev.processed_at = Some(processed_at);
            }
        }
        Ok(())
    }

    async fn list_recent_events(&self, limit: usize) -> Result<Vec<ChangeEvent>, StorageError> {
        let t = self.tables.read().await;
        let mut events = t.events.clone();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit);
        Ok(events)
    }

    async fn list_active_automations(
        &self,
        board_ids: &[String],
    ) -> Result<Vec<AutomationRecord>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.automations
            .iter()
            .filter(|a| a.is_active && board_ids.contains(&a.board_id))
            .cloned()
            .collect())
    }

    async fn list_automations_by_trigger(
        &self,
        trigger_type: &str,
    ) -> Result<Vec<AutomationRecord>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.automations
            .iter()
            .filter(|a| a.trigger_type == trigger_type)
            .cloned()
            .collect())
    }

    async fn get_automation(&self, id: &str) -> Result<Option<AutomationRecord>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.automations.iter().find(|a| a.id == id).cloned())
    }

    async fn update_trigger_config(
        &self,
        id: &str,
        trigger_config: &Value,
    ) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        let rule = t
            .automations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StorageError::not_found("automation", id))?;
        rule.trigger_config = trigger_config.clone();
        Ok(())
    }

    async fn append_log(&self, log: &NewAutomationLog) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        t.logs.push(AutomationLog {
            id: new_id(),
            automation_id: log.automation_id.clone(),
            status: log.status,
            message: log.message.clone(),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn list_recent_logs(
        &self,
        limit: usize,
    ) -> Result<Vec<AutomationLogEntry>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.logs
            .iter()
            .rev()
            .take(limit)
            .map(|log| AutomationLogEntry {
                log: log.clone(),
                automation: t
                    .automations
                    .iter()
                    .find(|a| a.id == log.automation_id)
                    .map(AutomationSummary::from),
            })
            .collect())
    }

    async fn get_board(&self, id: &str) -> Result<Option<Board>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.boards.iter().find(|b| b.id == id).cloned())
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.items.iter().find(|i| i.id == id).cloned())
    }

    async fn create_item(&self, item: &NewItem) -> Result<Item, StorageError> {
        let created = Item {
            id: new_id(),
            board_id: item.board_id.clone(),
            name: item.name.clone(),
            position: item.position,
            group_id: item.group_id.clone(),
            archived_at: None,
        };
        self.tables.write().await.items.push(created.clone());
        Ok(created)
    }

    async fn archive_item(&self, id: &str, at: OffsetDateTime) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        if let Some(item) = t.items.iter_mut().find(|i| i.id == id) {
            item.archived_at = Some(at);
        }
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        t.items.retain(|i| i.id != id);
        t.cells.retain(|c| c.item_id != id);
        Ok(())
    }

    async fn max_group_position(&self, group_id: &str) -> Result<Option<i64>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.items
            .iter()
            .filter(|i| i.group_id.as_deref() == Some(group_id))
            .map(|i| i.position)
            .max())
    }

    async fn move_item_to_group(
        &self,
        item_id: &str,
        group_id: &str,
        position: i64,
    ) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        let item = t
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| StorageError::not_found("item", item_id))?;
        item.group_id = Some(group_id.to_string());
        item.position = position;
        Ok(())
    }

    async fn list_columns(&self, board_id: &str) -> Result<Vec<Column>, StorageError> {
        let t = self.tables.read().await;
        let mut cols: Vec<Column> = t
            .columns
            .iter()
            .filter(|c| c.board_id == board_id)
            .cloned()
            .collect();
        cols.sort_by_key(|c| c.position);
        Ok(cols)
    }

    async fn list_status_columns(&self) -> Result<Vec<Column>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.columns.iter().filter(|c| c.is_status()).cloned().collect())
    }

    async fn list_cell_values(&self, item_id: &str) -> Result<Vec<CellValue>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.cells
            .iter()
            .filter(|c| c.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn get_cell_value(
        &self,
        item_id: &str,
        column_id: &str,
    ) -> Result<Option<CellValue>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.cells
            .iter()
            .find(|c| c.item_id == item_id && c.column_id == column_id)
            .cloned())
    }

    async fn insert_cell_values(&self, cells: &[CellValue]) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        for cell in cells {
            if t.cells
                .iter()
                .any(|c| c.item_id == cell.item_id && c.column_id == cell.column_id)
            {
                return Err(StorageError::invalid_data(format!(
                    "duplicate cell value for item {} column {}",
                    cell.item_id, cell.column_id
                )));
            }
        }
        t.cells.extend_from_slice(cells);
        Ok(())
    }

    async fn update_cell_value(
        &self,
        item_id: &str,
        column_id: &str,
        value: Option<&Value>,
    ) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        for cell in t
            .cells
            .iter_mut()
            .filter(|c| c.item_id == item_id && c.column_id == column_id)
        {
            cell.value = value.cloned();
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
