//! Automation engine for Boardflow.
//!
//! Status changes on board items are captured as change events. A cycle
//! matches pending events against the boards' STATUS_CHANGED rules and runs
//! each matching rule's ordered action steps.
//!
//! # Architecture
//!
//! ```text
//! POST /api/automation/process ─┐
//!                               ├→ RunCoordinator → match_events → AutomationExecutor
//! CyclePoller (optional) ───────┘                                   ↓
//!                                          BoardStore / email relay / webhooks / AI
//! ```
//!
//! # Action types
//!
//! - `MOVE_TO_BOARD` - copy the item to another board, archive or delete the source
//! - `MOVE_TO_GROUP` - append the item to another group
//! - `CHANGE_STATUS` - set or clear a status cell
//! - `CALL_WEBHOOK` - POST an event envelope with placeholders resolved
//! - `SEND_EMAIL` - render a template and send it through the email relay
//! - `AI_FILL_FIELDS` - ask a completion model for field values
//! - `NOTIFY` - reserved, no-op

mod completion;
mod coordinator;
mod executor;
pub mod handlers;
mod matcher;
mod types;

pub use completion::{
    ChatCompletionClient, CompletionError, CompletionProvider, PromptInput, build_prompt,
    coerce_field_value, parse_field_values,
};
pub use coordinator::{CoordinatorError, CycleConfig, CyclePoller, CycleReport, RunCoordinator};
pub use executor::{ActionError, AutomationExecutor};
pub use handlers::{AutomationState, automation_routes};
pub use matcher::{RuleMatch, match_events, rule_matches};
pub use types::{
    ActionStep, ActionType, AiFillFieldsConfig, AutomationRule, CallWebhookConfig,
    ChangeStatusConfig, FieldMapping, MoveToBoardConfig, MoveToGroupConfig, STATUS_PLACEHOLDER,
    SendEmailConfig, TargetStatus, TriggerConfig, TriggerType,
};
