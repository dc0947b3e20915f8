//! Automation rule definitions, normalized from stored rows.

use boardflow_storage::AutomationRecord;
use serde::Deserialize;
use serde_json::Value;

/// Placeholder text the settings UI stores when no status was picked.
pub const STATUS_PLACEHOLDER: &str = "Status...";

/// Trigger type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerType {
    /// A status cell changed value
    StatusChanged,
    /// Any trigger this engine does not evaluate
    Other(String),
}

impl TriggerType {
    pub const STATUS_CHANGED: &'static str = "STATUS_CHANGED";

    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::StatusChanged => Self::STATUS_CHANGED,
            TriggerType::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            Self::STATUS_CHANGED => TriggerType::StatusChanged,
            other => TriggerType::Other(other.to_string()),
        }
    }
}

/// The status value a trigger waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    /// Unset, null, `""` or the placeholder: fires when the status is cleared.
    Empty,
    /// Fires when the new label equals this string exactly.
    Label(String),
    /// A non-string target; never fires.
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub column_id: Option<String>,
    pub target: TargetStatus,
}

impl TriggerConfig {
    /// Decodes a stored `trigger_config`. Malformed fields degrade to values
    /// that simply never match.
    pub fn from_json(value: &Value) -> Self {
        let column_id = value
            .get("column_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let target = match value.get("target_status") {
            None | Some(Value::Null) => TargetStatus::Empty,
            Some(Value::String(s)) if s.is_empty() || s == STATUS_PLACEHOLDER => {
                TargetStatus::Empty
            }
            Some(Value::String(s)) => TargetStatus::Label(s.clone()),
            Some(_) => TargetStatus::Invalid,
        };

        Self { column_id, target }
    }
}

/// Action type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    MoveToBoard,
    MoveToGroup,
    CallWebhook,
    SendEmail,
    Notify,
    ChangeStatus,
    AiFillFields,
    /// Unrecognized type string, kept for logging
    Unknown(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::MoveToBoard => "MOVE_TO_BOARD",
            ActionType::MoveToGroup => "MOVE_TO_GROUP",
            ActionType::CallWebhook => "CALL_WEBHOOK",
            ActionType::SendEmail => "SEND_EMAIL",
            ActionType::Notify => "NOTIFY",
            ActionType::ChangeStatus => "CHANGE_STATUS",
            ActionType::AiFillFields => "AI_FILL_FIELDS",
            ActionType::Unknown(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "MOVE_TO_BOARD" => ActionType::MoveToBoard,
            "MOVE_TO_GROUP" => ActionType::MoveToGroup,
            "CALL_WEBHOOK" => ActionType::CallWebhook,
            "SEND_EMAIL" => ActionType::SendEmail,
            "NOTIFY" => ActionType::Notify,
            "CHANGE_STATUS" => ActionType::ChangeStatus,
            "AI_FILL_FIELDS" => ActionType::AiFillFields,
            other => ActionType::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a rule's ordered action list. `config` is decoded by the
/// executor for the step's type.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionStep {
    pub action_type: ActionType,
    pub config: Value,
}

impl ActionStep {
    fn from_json(value: &Value) -> Self {
        Self {
            action_type: ActionType::parse(value.get("type").and_then(Value::as_str).unwrap_or("")),
            config: value.get("config").cloned().unwrap_or(Value::Null),
        }
    }
}

/// An automation rule with its action list already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationRule {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub is_active: bool,
    pub trigger_type: TriggerType,
    pub trigger: TriggerConfig,
    pub actions: Vec<ActionStep>,
}

impl From<&AutomationRecord> for AutomationRule {
    fn from(record: &AutomationRecord) -> Self {
        // Rules written before multi-step support keep one action in
        // action_type/action_config.
        let actions = match &record.action_config {
            Value::Array(steps) => steps.iter().map(ActionStep::from_json).collect(),
            config => vec![ActionStep {
                action_type: ActionType::parse(record.action_type.as_deref().unwrap_or("")),
                config: config.clone(),
            }],
        };

        Self {
            id: record.id.clone(),
            board_id: record.board_id.clone(),
            name: record.name.clone(),
            is_active: record.is_active,
            trigger_type: TriggerType::parse(&record.trigger_type),
            trigger: TriggerConfig::from_json(&record.trigger_config),
            actions,
        }
    }
}

// ==================== Per-action configs ====================

#[derive(Debug, Clone, Deserialize)]
pub struct MoveToBoardConfig {
    pub dest_board_id: String,
    #[serde(default)]
    pub new_status: Option<String>,
    #[serde(default)]
    pub status_column_id: Option<String>,
    #[serde(default)]
    pub archive_source: Option<bool>,
}

impl MoveToBoardConfig {
    pub fn archive_source(&self) -> bool {
        self.archive_source.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveToGroupConfig {
    pub dest_group_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallWebhookConfig {
    pub url: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendEmailConfig {
    #[serde(default)]
    pub email_template: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub after_status: Option<String>,
    #[serde(default)]
    pub after_status_column_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeStatusConfig {
    pub status_column_id: String,
    #[serde(default)]
    pub status_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    pub column_id: String,
    #[serde(default)]
    pub instruction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiFillFieldsConfig {
    #[serde(default)]
    pub ai_instructions: String,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
}
