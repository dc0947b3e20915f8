//! Automation execution engine.
//!
//! Runs the ordered action steps of a matched rule. A failing step is logged
//! and never stops the steps after it. Every rule execution ends with one
//! summary log row.

use std::sync::Arc;

use boardflow_notifications::{
    EmailDefaults, EmailRelayAdapter, EmailSpec, NotificationAdapter, NotificationError, Outbound,
    SendResult, TemplateContext, WebhookAdapter, cell_display_string, compose_email,
};
use boardflow_storage::{
    BoardStore, CellValue, ChangeEvent, Column, Item, NewAutomationLog, NewItem, StorageError,
    resolve_display_label,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::completion::{
    ChatCompletionClient, CompletionError, CompletionProvider, PromptInput, build_prompt,
    coerce_field_value, parse_field_values,
};
use super::types::{
    ActionStep, ActionType, AiFillFieldsConfig, AutomationRule, CallWebhookConfig,
    ChangeStatusConfig, MoveToBoardConfig, MoveToGroupConfig, SendEmailConfig,
};
use crate::config::AutomationConfig;

/// Position given to items moved onto another board. The board UI
/// re-sequences on its next read.
const MOVED_ITEM_POSITION: i64 = 999_999;

const EMAIL_BOARD_FALLBACK: &str = "Unknown Board";
const AI_BOARD_FALLBACK: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid {action} config: {message}")]
    InvalidConfig { action: String, message: String },

    #[error("Item {0} not found")]
    ItemNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

fn decode_config<T: DeserializeOwned>(step: &ActionStep) -> Result<T, ActionError> {
    serde_json::from_value(step.config.clone()).map_err(|e| ActionError::InvalidConfig {
        action: step.action_type.to_string(),
        message: e.to_string(),
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// An item with its board name, the board's columns and the item's cells.
struct ItemSnapshot {
    item: Item,
    board_name: String,
    columns: Vec<Column>,
    cells: Vec<CellValue>,
}

impl ItemSnapshot {
    fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    fn has_cell(&self, column_id: &str) -> bool {
        self.cells.iter().any(|c| c.column_id == column_id)
    }

    fn cell(&self, column_id: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|c| c.column_id == column_id)
            .and_then(|c| c.value.as_ref())
    }

    /// Cells paired with their column, skipping cells of unknown columns.
    fn named_cells(&self) -> impl Iterator<Item = (&Column, Option<&Value>)> {
        self.cells
            .iter()
            .filter_map(|cell| self.column(&cell.column_id).map(|c| (c, cell.value.as_ref())))
    }

    fn template_context(&self, status_column_id: Option<&str>) -> TemplateContext {
        let mut ctx = TemplateContext::new(&self.item.name, &self.board_name);
        // {{status.value}} only exists when the item has a cell row for the column
        if let Some(column_id) = status_column_id.filter(|id| self.has_cell(id)) {
            let value = self.cell(column_id);
            let status = resolve_display_label(value).unwrap_or_else(|| cell_display_string(value));
            ctx.set_status(&status);
        }
        for (column, value) in self.named_cells() {
            ctx.add_column(&column.name, &cell_display_string(value));
        }
        ctx
    }

    /// First non-empty value of a column whose name mentions "email".
    fn email_fallback(&self) -> Option<String> {
        self.named_cells()
            .filter(|(column, _)| column.name.to_lowercase().contains("email"))
            .map(|(_, value)| cell_display_string(value))
            .find(|s| !s.is_empty())
    }

    /// Current values keyed by column name, as shown to the AI model.
    fn field_values(&self) -> Map<String, Value> {
        self.named_cells()
            .map(|(column, value)| (column.name.clone(), Value::String(cell_display_string(value))))
            .collect()
    }
}

/// Executes matched automation rules against the board store and the
/// outbound providers.
pub struct AutomationExecutor {
    store: Arc<dyn BoardStore>,
    email: Arc<dyn NotificationAdapter>,
    webhook: Arc<dyn NotificationAdapter>,
    completion: Arc<dyn CompletionProvider>,
    email_defaults: EmailDefaults,
}

impl AutomationExecutor {
    pub fn new(
        store: Arc<dyn BoardStore>,
        email: Arc<dyn NotificationAdapter>,
        webhook: Arc<dyn NotificationAdapter>,
        completion: Arc<dyn CompletionProvider>,
        email_defaults: EmailDefaults,
    ) -> Self {
        Self {
            store,
            email,
            webhook,
            completion,
            email_defaults,
        }
    }

    /// Wires the HTTP-backed providers from configuration. `http_client`
    /// is shared by every outbound call.
    pub fn from_config(
        store: Arc<dyn BoardStore>,
        http_client: reqwest::Client,
        config: &AutomationConfig,
    ) -> Self {
        let email = EmailRelayAdapter::new(http_client.clone(), config.email_relay_url.clone());
        if !email.is_configured() {
            warn!("automation.email_relay_url not set; SEND_EMAIL actions will fail");
        }
        let webhook = WebhookAdapter::new(http_client.clone(), config.webhook_secret.clone());
        let completion = ChatCompletionClient::new(http_client, &config.ai);

        info!(
            model = %config.ai.model,
            signed_webhooks = config.webhook_secret.is_some(),
            "Automation executor initialized"
        );

        Self::new(
            store,
            Arc::new(email),
            Arc::new(webhook),
            Arc::new(completion),
            EmailDefaults {
                from: config.default_from.clone(),
                subject: config.default_subject.clone(),
            },
        )
    }

    /// Runs every step of `rule` for `event` in order and writes the summary
    /// log. Returns the number of steps attempted.
    pub async fn execute(&self, rule: &AutomationRule, event: &ChangeEvent) -> usize {
        info!(
            automation_id = %rule.id,
            automation_name = %rule.name,
            event_id = %event.id,
            item_id = %event.item_id,
            steps = rule.actions.len(),
            "Executing automation"
        );

        for step in &rule.actions {
            if let Err(e) = self.execute_step(rule, event, step).await {
                warn!(
                    automation_id = %rule.id,
                    event_id = %event.id,
                    action = %step.action_type,
                    error = %e,
                    "Action step failed"
                );
                self.log(NewAutomationLog::error(
                    &rule.id,
                    format!("Failed to execute {}: {}", step.action_type, e),
                ))
                .await;
            }
        }

        let attempted = rule.actions.len();
        self.log(NewAutomationLog::success(
            &rule.id,
            format!("Processed event {} with {} action(s)", event.id, attempted),
        ))
        .await;
        attempted
    }

    /// Appends a log row. A failed append is reported to tracing only.
    async fn log(&self, entry: NewAutomationLog) {
        if let Err(e) = self.store.append_log(&entry).await {
            error!(
                automation_id = %entry.automation_id,
                status = %entry.status,
                error = %e,
                "Failed to append automation log"
            );
        }
    }

    async fn execute_step(
        &self,
        rule: &AutomationRule,
        event: &ChangeEvent,
        step: &ActionStep,
    ) -> Result<(), ActionError> {
        debug!(
            automation_id = %rule.id,
            event_id = %event.id,
            action = %step.action_type,
            "Running action step"
        );
        match &step.action_type {
            ActionType::MoveToBoard => self.move_to_board(event, decode_config(step)?).await,
            ActionType::MoveToGroup => self.move_to_group(event, decode_config(step)?).await,
            ActionType::ChangeStatus => self.change_status(event, decode_config(step)?).await,
            ActionType::CallWebhook => {
                self.call_webhook(rule, event, decode_config(step)?).await;
                Ok(())
            }
            ActionType::SendEmail => {
                self.send_email(rule, event, decode_config(step)?).await;
                Ok(())
            }
            ActionType::AiFillFields => {
                self.ai_fill_fields(rule, event, decode_config(step)?).await;
                Ok(())
            }
            ActionType::Notify => {
                debug!(automation_id = %rule.id, "NOTIFY has no delivery channel; skipped");
                Ok(())
            }
            ActionType::Unknown(name) => {
                warn!(automation_id = %rule.id, action = %name, "Unknown action type; skipped");
                Ok(())
            }
        }
    }

    async fn load_snapshot(
        &self,
        item_id: &str,
        board_id: &str,
        board_fallback: &str,
    ) -> Result<Option<ItemSnapshot>, ActionError> {
        let Some(item) = self.store.get_item(item_id).await? else {
            return Ok(None);
        };
        let board_name = self
            .store
            .get_board(board_id)
            .await?
            .map_or_else(|| board_fallback.to_string(), |b| b.name);
        let columns = self.store.list_columns(board_id).await?;
        let cells = self.store.list_cell_values(item_id).await?;
        Ok(Some(ItemSnapshot {
            item,
            board_name,
            columns,
            cells,
        }))
    }

    // ==================== Item mutations ====================

    async fn move_to_board(
        &self,
        event: &ChangeEvent,
        cfg: MoveToBoardConfig,
    ) -> Result<(), ActionError> {
        let source = self
            .store
            .get_item(&event.item_id)
            .await?
            .ok_or_else(|| ActionError::ItemNotFound(event.item_id.clone()))?;
        let cells = self.store.list_cell_values(&source.id).await?;

        let moved = self
            .store
            .create_item(&NewItem {
                board_id: cfg.dest_board_id.clone(),
                name: source.name.clone(),
                position: MOVED_ITEM_POSITION,
                group_id: None,
            })
            .await?;

        let copies: Vec<CellValue> = cells
            .into_iter()
            .map(|c| CellValue::new(&moved.id, &c.column_id, c.value))
            .collect();
        if !copies.is_empty() {
            self.store.insert_cell_values(&copies).await?;
        }

        if let (Some(status), Some(column_id)) = (
            non_empty(cfg.new_status.as_deref()),
            non_empty(cfg.status_column_id.as_deref()),
        ) {
            let value = Value::String(status.to_string());
            self.store
                .upsert_cell_value(&moved.id, column_id, Some(&value))
                .await?;
        }

        if cfg.archive_source() {
            self.store
                .archive_item(&source.id, OffsetDateTime::now_utc())
                .await?;
        } else {
            self.store.delete_item(&source.id).await?;
        }

        info!(
            item_id = %source.id,
            new_item_id = %moved.id,
            dest_board_id = %cfg.dest_board_id,
            archived = cfg.archive_source(),
            "Moved item to board"
        );
        Ok(())
    }

    async fn move_to_group(
        &self,
        event: &ChangeEvent,
        cfg: MoveToGroupConfig,
    ) -> Result<(), ActionError> {
        let position = self
            .store
            .max_group_position(&cfg.dest_group_id)
            .await?
            .map_or(0, |max| max + 1);
        self.store
            .move_item_to_group(&event.item_id, &cfg.dest_group_id, position)
            .await?;
        info!(
            item_id = %event.item_id,
            group_id = %cfg.dest_group_id,
            position,
            "Moved item to group"
        );
        Ok(())
    }

    async fn change_status(
        &self,
        event: &ChangeEvent,
        cfg: ChangeStatusConfig,
    ) -> Result<(), ActionError> {
        let value = non_empty(cfg.status_value.as_deref()).map(|s| Value::String(s.to_string()));
        self.store
            .upsert_cell_value(&event.item_id, &cfg.status_column_id, value.as_ref())
            .await?;
        info!(
            item_id = %event.item_id,
            column_id = %cfg.status_column_id,
            status = cfg.status_value.as_deref().unwrap_or(""),
            "Changed status"
        );
        Ok(())
    }

    // ==================== Outbound calls ====================

    async fn call_webhook(&self, rule: &AutomationRule, event: &ChangeEvent, cfg: CallWebhookConfig) {
        let entry = match self.try_call_webhook(rule, event, cfg).await {
            Ok(res) if res.success => {
                NewAutomationLog::success(&rule.id, format!("Webhook {}", res.status))
            }
            Ok(res) => NewAutomationLog::error(&rule.id, format!("Webhook {}", res.status)),
            Err(e) => NewAutomationLog::error(&rule.id, format!("Webhook failed: {e}")),
        };
        self.log(entry).await;
    }

    async fn try_call_webhook(
        &self,
        rule: &AutomationRule,
        event: &ChangeEvent,
        cfg: CallWebhookConfig,
    ) -> Result<SendResult, ActionError> {
        let envelope = json!({
            "automation_id": rule.id,
            "board_id": event.board_id,
            "item_id": event.item_id,
            "column_id": event.column_id,
            "old_value": event.old_value,
            "new_value": event.new_value,
            "payload": cfg.payload.unwrap_or(Value::Null),
        });

        // An item deleted since the event leaves placeholders unresolved.
        let payload = match self
            .load_snapshot(&event.item_id, &event.board_id, EMAIL_BOARD_FALLBACK)
            .await?
        {
            Some(snapshot) => snapshot
                .template_context(Some(&event.column_id))
                .substitute_deep(&envelope),
            None => envelope,
        };

        let result = self
            .webhook
            .send(&Outbound::Webhook {
                url: cfg.url.clone(),
                payload,
            })
            .await?;
        info!(
            automation_id = %rule.id,
            url = %cfg.url,
            status = result.status,
            "Webhook called"
        );
        Ok(result)
    }

    async fn send_email(&self, rule: &AutomationRule, event: &ChangeEvent, cfg: SendEmailConfig) {
        if let Err(e) = self.try_send_email(rule, event, &cfg).await {
            let message = match e {
                ActionError::ItemNotFound(_)
                | ActionError::Notification(NotificationError::RecipientNotFound) => e.to_string(),
                other => format!("Email failed: {other}"),
            };
            warn!(automation_id = %rule.id, error = %message, "SEND_EMAIL failed");
            self.log(NewAutomationLog::error(&rule.id, message)).await;
        }
    }

    async fn try_send_email(
        &self,
        rule: &AutomationRule,
        event: &ChangeEvent,
        cfg: &SendEmailConfig,
    ) -> Result<(), ActionError> {
        let snapshot = self
            .load_snapshot(&event.item_id, &event.board_id, EMAIL_BOARD_FALLBACK)
            .await?
            .ok_or_else(|| ActionError::ItemNotFound(event.item_id.clone()))?;
        let ctx = snapshot.template_context(Some(&event.column_id));
        let fallback_to = snapshot.email_fallback();

        let message = compose_email(
            &ctx,
            &EmailSpec {
                template: &cfg.email_template,
                from: cfg.from.as_deref(),
                to: cfg.to.as_deref(),
                cc: cfg.cc.as_deref(),
                bcc: cfg.bcc.as_deref(),
                subject: cfg.subject.as_deref(),
            },
            fallback_to.as_deref(),
            &self.email_defaults,
        )?;
        let recipients = message.to.join(", ");

        let result = self.email.send(&Outbound::Email(message)).await?;
        if !result.success {
            let reason = result
                .error
                .unwrap_or_else(|| format!("HTTP {}", result.status));
            self.log(NewAutomationLog::error(
                &rule.id,
                format!("Email webhook failed: {reason}"),
            ))
            .await;
            return Ok(());
        }

        info!(automation_id = %rule.id, to = %recipients, "Email sent");
        self.log(NewAutomationLog::success(
            &rule.id,
            format!("Email sent to {recipients}"),
        ))
        .await;

        if let (Some(status), Some(column_id)) = (
            non_empty(cfg.after_status.as_deref()),
            non_empty(cfg.after_status_column_id.as_deref()),
        ) {
            let value = Value::String(status.to_string());
            self.store
                .upsert_cell_value(&event.item_id, column_id, Some(&value))
                .await?;
            self.log(NewAutomationLog::success(
                &rule.id,
                format!("Status updated to {status}"),
            ))
            .await;
        }
        Ok(())
    }

    async fn ai_fill_fields(
        &self,
        rule: &AutomationRule,
        event: &ChangeEvent,
        cfg: AiFillFieldsConfig,
    ) {
        if let Err(e) = self.try_ai_fill_fields(rule, event, &cfg).await {
            let message = match e {
                ActionError::ItemNotFound(_) | ActionError::Completion(_) => e.to_string(),
                other => format!("AI fill fields failed: {other}"),
            };
            warn!(automation_id = %rule.id, error = %message, "AI_FILL_FIELDS failed");
            self.log(NewAutomationLog::error(&rule.id, message)).await;
        }
    }

    async fn try_ai_fill_fields(
        &self,
        rule: &AutomationRule,
        event: &ChangeEvent,
        cfg: &AiFillFieldsConfig,
    ) -> Result<(), ActionError> {
        let snapshot = self
            .load_snapshot(&event.item_id, &event.board_id, AI_BOARD_FALLBACK)
            .await?
            .ok_or_else(|| ActionError::ItemNotFound(event.item_id.clone()))?;

        let field_lines: Vec<String> = cfg
            .field_mappings
            .iter()
            .filter_map(|m| {
                snapshot.column(&m.column_id).map(|c| {
                    format!("- {} ({}): {}", c.name, c.column_type, m.instruction)
                })
            })
            .collect();
        let fields = snapshot.field_values();
        let prompt = build_prompt(&PromptInput {
            item_name: &snapshot.item.name,
            board_name: &snapshot.board_name,
            fields: &fields,
            instructions: &cfg.ai_instructions,
            field_lines: &field_lines,
        });

        let content = self.completion.complete(&prompt).await?;
        let values = parse_field_values(&content)?;

        let total = cfg.field_mappings.len();
        let mut updated = 0usize;
        for mapping in &cfg.field_mappings {
            let Some(column) = snapshot.column(&mapping.column_id) else {
                continue;
            };
            let Some(raw) = values.get(&column.name) else {
                continue;
            };
            let value = coerce_field_value(&column.column_type, raw);
            match self
                .store
                .upsert_cell_value(&event.item_id, &column.id, Some(&value))
                .await
            {
                Ok(()) => updated += 1,
                Err(e) => {
                    self.log(NewAutomationLog::error(
                        &rule.id,
                        format!("Failed to update {}: {}", column.name, e),
                    ))
                    .await;
                }
            }
        }

        info!(automation_id = %rule.id, updated, total, "AI fields filled");
        self.log(NewAutomationLog::success(
            &rule.id,
            format!("AI filled {updated} of {total} field(s) (updated {updated} of {total} fields)"),
        ))
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use boardflow_db_memory::InMemoryStorage;
    use boardflow_storage::{Board, Group, LogStatus};
    use crate::automations::types::{TriggerConfig, TriggerType};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticCompletion(String);

    #[async_trait]
    impl CompletionProvider for StaticCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            Ok(self.0.clone())
        }
    }

    fn column(id: &str, name: &str, column_type: &str) -> Column {
        Column {
            id: id.into(),
            board_id: "b1".into(),
            name: name.into(),
            column_type: column_type.into(),
            config: Value::Null,
            position: 0,
        }
    }

    async fn seeded_store() -> Arc<InMemoryStorage> {
        let store = Arc::new(InMemoryStorage::new());
        store
            .insert_board(Board {
                id: "b1".into(),
                name: "Engineering".into(),
            })
            .await;
        store
            .insert_group(Group {
                id: "g1".into(),
                board_id: "b1".into(),
                name: "Todo".into(),
                position: 0,
            })
            .await;
        store
            .insert_item(Item {
                id: "i1".into(),
                board_id: "b1".into(),
                name: "Fix login".into(),
                position: 0,
                group_id: Some("g1".into()),
                archived_at: None,
            })
            .await;
        store.insert_column(column("c1", "Status", "status")).await;
        store.insert_column(column("c2", "Owner Email", "email")).await;
        store.insert_column(column("c3", "Estimate", "number")).await;
        store
            .set_cell("i1", "c1", Some(json!({"label": "Done", "color": "#0f0"})))
            .await;
        store
            .set_cell("i1", "c2", Some(json!("owner@example.com")))
            .await;
        store
    }

    fn executor(store: Arc<InMemoryStorage>, relay_url: Option<String>) -> AutomationExecutor {
        executor_with_completion(store, relay_url, "{}")
    }

    fn executor_with_completion(
        store: Arc<InMemoryStorage>,
        relay_url: Option<String>,
        completion: &str,
    ) -> AutomationExecutor {
        let client = reqwest::Client::new();
        AutomationExecutor::new(
            store,
            Arc::new(EmailRelayAdapter::new(client.clone(), relay_url)),
            Arc::new(WebhookAdapter::new(client, None)),
            Arc::new(StaticCompletion(completion.to_string())),
            EmailDefaults {
                from: "noreply@boardflow.local".into(),
                subject: "Task Update".into(),
            },
        )
    }

    fn rule(actions: Vec<(ActionType, Value)>) -> AutomationRule {
        AutomationRule {
            id: "a1".into(),
            board_id: "b1".into(),
            name: "On done".into(),
            is_active: true,
            trigger_type: TriggerType::StatusChanged,
            trigger: TriggerConfig::from_json(&json!({"target_status": "Done"})),
            actions: actions
                .into_iter()
                .map(|(action_type, config)| ActionStep {
                    action_type,
                    config,
                })
                .collect(),
        }
    }

    fn done_event() -> ChangeEvent {
        ChangeEvent::pending("e1", "b1", "i1", "c1", Some(json!({"label": "Done"})))
    }

    fn messages(logs: &[boardflow_storage::AutomationLog]) -> Vec<(LogStatus, String)> {
        logs.iter().map(|l| (l.status, l.message.clone())).collect()
    }

    #[tokio::test]
    async fn change_status_clears_on_empty_value() {
        let store = seeded_store().await;
        let exec = executor(store.clone(), None);
        let r = rule(vec![
            (
                ActionType::ChangeStatus,
                json!({"status_column_id": "c1", "status_value": ""}),
            ),
            (
                ActionType::ChangeStatus,
                json!({"status_column_id": "c9", "status_value": "Archived"}),
            ),
        ]);
        assert_eq!(exec.execute(&r, &done_event()).await, 2);
        assert_eq!(store.cell("i1", "c1").await, Some(None));
        assert_eq!(store.cell("i1", "c9").await, Some(Some(json!("Archived"))));
    }

    #[tokio::test]
    async fn failing_step_does_not_stop_later_steps() {
        let store = seeded_store().await;
        let exec = executor(store.clone(), None);
        let r = rule(vec![
            (ActionType::MoveToGroup, json!({})),
            (ActionType::MoveToGroup, json!({"dest_group_id": "g2"})),
            (
                ActionType::ChangeStatus,
                json!({"status_column_id": "c1", "status_value": "Archived"}),
            ),
        ]);
        exec.execute(&r, &done_event()).await;

        assert_eq!(store.cell("i1", "c1").await, Some(Some(json!("Archived"))));
        let logs = messages(&store.logs().await);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].0, LogStatus::Error);
        assert!(logs[0].1.starts_with("Failed to execute MOVE_TO_GROUP: invalid MOVE_TO_GROUP config"));
        assert_eq!(
            logs[1],
            (LogStatus::Success, "Processed event e1 with 3 action(s)".into())
        );
    }

    #[tokio::test]
    async fn move_to_group_appends_after_last_position() {
        let store = seeded_store().await;
        store
            .insert_item(Item {
                id: "i2".into(),
                board_id: "b1".into(),
                name: "Other".into(),
                position: 4,
                group_id: Some("g2".into()),
                archived_at: None,
            })
            .await;
        let exec = executor(store.clone(), None);
        exec.execute(
            &rule(vec![(ActionType::MoveToGroup, json!({"dest_group_id": "g2"}))]),
            &done_event(),
        )
        .await;

        let items = store.items().await;
        let moved = items.iter().find(|i| i.id == "i1").unwrap();
        assert_eq!(moved.group_id.as_deref(), Some("g2"));
        assert_eq!(moved.position, 5);
    }

    #[tokio::test]
    async fn move_to_board_copies_cells_and_archives_source() {
        let store = seeded_store().await;
        let exec = executor(store.clone(), None);
        exec.execute(
            &rule(vec![(
                ActionType::MoveToBoard,
                json!({"dest_board_id": "b2", "new_status": "New", "status_column_id": "c1"}),
            )]),
            &done_event(),
        )
        .await;

        let items = store.items().await;
        let source = items.iter().find(|i| i.id == "i1").unwrap();
        assert!(source.archived_at.is_some());
        let moved = items.iter().find(|i| i.board_id == "b2").unwrap();
        assert_eq!(moved.name, "Fix login");
        assert_eq!(moved.position, MOVED_ITEM_POSITION);
        assert_eq!(store.cell(&moved.id, "c1").await, Some(Some(json!("New"))));
        assert_eq!(
            store.cell(&moved.id, "c2").await,
            Some(Some(json!("owner@example.com")))
        );
    }

    #[tokio::test]
    async fn move_to_board_can_delete_source() {
        let store = seeded_store().await;
        let exec = executor(store.clone(), None);
        exec.execute(
            &rule(vec![(
                ActionType::MoveToBoard,
                json!({"dest_board_id": "b2", "archive_source": false}),
            )]),
            &done_event(),
        )
        .await;
        let items = store.items().await;
        assert!(items.iter().all(|i| i.id != "i1"));
        assert_eq!(store.cell("i1", "c2").await, None);
    }

    #[tokio::test]
    async fn webhook_envelope_is_substituted_and_logged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({
                "automation_id": "a1",
                "item_id": "i1",
                "column_id": "c1",
                "payload": {"text": "Fix login is Done on Engineering"}
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let store = seeded_store().await;
        let exec = executor(store.clone(), None);
        exec.execute(
            &rule(vec![(
                ActionType::CallWebhook,
                json!({
                    "url": format!("{}/hook", server.uri()),
                    "payload": {"text": "{{item.name}} is {{status.value}} on {{board.name}}"}
                }),
            )]),
            &done_event(),
        )
        .await;

        let logs = messages(&store.logs().await);
        assert_eq!(logs[0], (LogStatus::Success, "Webhook 202".into()));
    }

    #[tokio::test]
    async fn status_placeholder_without_cell_is_left_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({
                "column_id": "c3",
                "payload": {"s": "[{{status.value}}]", "name": "Fix login"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = seeded_store().await;
        let exec = executor(store.clone(), None);
        // i1 has no cell on c3
        let event = ChangeEvent::pending("e1", "b1", "i1", "c3", Some(json!("Done")));
        exec.execute(
            &rule(vec![(
                ActionType::CallWebhook,
                json!({
                    "url": format!("{}/hook", server.uri()),
                    "payload": {"s": "[{{status.value}}]", "name": "{{item.name}}"}
                }),
            )]),
            &event,
        )
        .await;

        let logs = messages(&store.logs().await);
        assert_eq!(logs[0], (LogStatus::Success, "Webhook 200".into()));
    }

    #[tokio::test]
    async fn webhook_error_status_is_logged_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let store = seeded_store().await;
        let exec = executor(store.clone(), None);
        exec.execute(
            &rule(vec![(ActionType::CallWebhook, json!({"url": server.uri()}))]),
            &done_event(),
        )
        .await;
        let logs = messages(&store.logs().await);
        assert_eq!(logs[0], (LogStatus::Error, "Webhook 500".into()));
    }

    #[tokio::test]
    async fn email_falls_back_to_email_column_and_sets_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/relay"))
            .and(body_partial_json(json!({
                "to": ["owner@example.com"],
                "subject": "Fix login is Done",
                "from": "noreply@boardflow.local"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = seeded_store().await;
        let exec = executor(store.clone(), Some(format!("{}/relay", server.uri())));
        exec.execute(
            &rule(vec![(
                ActionType::SendEmail,
                json!({
                    "email_template": "Subject: {{item.name}} is {{status.value}}\n\nSee https://boards.example.com",
                    "after_status": "Notified",
                    "after_status_column_id": "c1"
                }),
            )]),
            &done_event(),
        )
        .await;

        let logs = messages(&store.logs().await);
        assert_eq!(
            logs[..2],
            [
                (LogStatus::Success, "Email sent to owner@example.com".into()),
                (LogStatus::Success, "Status updated to Notified".into()),
            ]
        );
        assert_eq!(store.cell("i1", "c1").await, Some(Some(json!("Notified"))));
    }

    #[tokio::test]
    async fn email_relay_rejection_is_logged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "bad sender"})),
            )
            .mount(&server)
            .await;
        let store = seeded_store().await;
        let exec = executor(store.clone(), Some(server.uri()));
        exec.execute(
            &rule(vec![(
                ActionType::SendEmail,
                json!({"email_template": "hi", "to": "{{column.Owner Email}}"}),
            )]),
            &done_event(),
        )
        .await;
        let logs = messages(&store.logs().await);
        assert_eq!(
            logs[0],
            (LogStatus::Error, "Email webhook failed: bad sender".into())
        );
    }

    #[tokio::test]
    async fn ai_fill_coerces_and_counts_updates() {
        let store = seeded_store().await;
        let exec = executor_with_completion(
            store.clone(),
            None,
            "```json\n{\"Estimate\": \"8 hours\"}\n```",
        );
        exec.execute(
            &rule(vec![(
                ActionType::AiFillFields,
                json!({
                    "ai_instructions": "Estimate the work",
                    "field_mappings": [
                        {"column_id": "c3", "instruction": "hours"},
                        {"column_id": "c2", "instruction": "owner"}
                    ]
                }),
            )]),
            &done_event(),
        )
        .await;

        assert_eq!(store.cell("i1", "c3").await, Some(Some(json!(8))));
        let logs = messages(&store.logs().await);
        assert_eq!(
            logs[0],
            (
                LogStatus::Success,
                "AI filled 1 of 2 field(s) (updated 1 of 2 fields)".into()
            )
        );
    }

    #[tokio::test]
    async fn ai_parse_failure_is_logged() {
        let store = seeded_store().await;
        let exec = executor_with_completion(store.clone(), None, "I cannot help with that");
        exec.execute(
            &rule(vec![(
                ActionType::AiFillFields,
                json!({"field_mappings": [{"column_id": "c3"}]}),
            )]),
            &done_event(),
        )
        .await;
        let logs = messages(&store.logs().await);
        assert_eq!(logs[0].0, LogStatus::Error);
        assert!(logs[0].1.starts_with("Failed to parse AI response"));
    }

    #[tokio::test]
    async fn notify_and_unknown_steps_are_no_ops() {
        let store = seeded_store().await;
        let exec = executor(store.clone(), None);
        let n = exec
            .execute(
                &rule(vec![
                    (ActionType::Notify, Value::Null),
                    (ActionType::Unknown("SLACK_PING".into()), json!({})),
                ]),
                &done_event(),
            )
            .await;
        assert_eq!(n, 2);
        let logs = messages(&store.logs().await);
        assert_eq!(
            logs,
            vec![(LogStatus::Success, "Processed event e1 with 2 action(s)".into())]
        );
    }
}
