//! Entity types persisted by the board store.
//!
//! Field names follow the relational schema one-to-one so rows can be
//! (de)serialized straight from the REST backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Column type string used by status columns.
pub const STATUS_COLUMN_TYPE: &str = "status";

/// One observed write to a status-typed cell.
///
/// `processed_at` is `None` while the event is pending. Once set it is never
/// cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: String,
    pub board_id: String,
    pub item_id: String,
    pub column_id: String,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
}

impl ChangeEvent {
    /// Creates a pending event with no previous value.
    #[must_use]
    pub fn pending(
        id: impl Into<String>,
        board_id: impl Into<String>,
        item_id: impl Into<String>,
        column_id: impl Into<String>,
        new_value: Option<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            board_id: board_id.into(),
            item_id: item_id.into(),
            column_id: column_id.into(),
            old_value: None,
            new_value,
            created_at: OffsetDateTime::now_utc(),
            processed_at: None,
        }
    }

    /// Sets the previous cell value.
    #[must_use]
    pub fn with_old_value(mut self, old_value: Value) -> Self {
        self.old_value = Some(old_value);
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: OffsetDateTime) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns `true` while the event has not been processed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }
}

/// An automation rule exactly as stored in the `automations` table.
///
/// `action_config` holds either a list of `{type, config}` steps or, for
/// rules written before multi-step support, the config of the single
/// `action_type` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRecord {
    pub id: String,
    pub board_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: Value,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub action_config: Value,
}

/// Outcome recorded by an automation log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
}

impl LogStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log row to append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAutomationLog {
    pub automation_id: String,
    pub status: LogStatus,
    pub message: String,
}

impl NewAutomationLog {
    #[must_use]
    pub fn success(automation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            automation_id: automation_id.into(),
            status: LogStatus::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(automation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            automation_id: automation_id.into(),
            status: LogStatus::Error,
            message: message.into(),
        }
    }
}

/// A persisted, append-only automation log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLog {
    pub id: String,
    pub automation_id: String,
    pub status: LogStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Rule fields embedded next to a log row in the inspection views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSummary {
    #[serde(default)]
    pub name: String,
    pub board_id: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub trigger_config: Value,
    #[serde(default)]
    pub action_config: Value,
}

impl From<&AutomationRecord> for AutomationSummary {
    fn from(record: &AutomationRecord) -> Self {
        Self {
            name: record.name.clone(),
            board_id: record.board_id.clone(),
            is_active: record.is_active,
            trigger_config: record.trigger_config.clone(),
            action_config: record.action_config.clone(),
        }
    }
}

/// A log row joined with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLogEntry {
    #[serde(flatten)]
    pub log: AutomationLog,
    #[serde(default, rename = "automations")]
    pub automation: Option<AutomationSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub board_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: i64,
}

/// A row on a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub board_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub archived_at: Option<OffsetDateTime>,
}

/// Fields of an item to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub board_id: String,
    pub name: String,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// One selectable option of a status column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOption {
    pub label: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub board_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub position: i64,
}

impl Column {
    #[must_use]
    pub fn is_status(&self) -> bool {
        self.column_type == STATUS_COLUMN_TYPE
    }

    /// Ordered options of a status column. Malformed entries are skipped.
    #[must_use]
    pub fn status_options(&self) -> Vec<StatusOption> {
        self.config
            .get("options")
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(|o| serde_json::from_value(o.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The value of one (item, column) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellValue {
    pub item_id: String,
    pub column_id: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl CellValue {
    #[must_use]
    pub fn new(
        item_id: impl Into<String>,
        column_id: impl Into<String>,
        value: Option<Value>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            column_id: column_id.into(),
            value,
        }
    }
}
