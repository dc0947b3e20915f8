//! Matches change events against status-changed rules.
//!
//! Pure: neither events nor rules are mutated, and the same inputs always
//! produce the same pairs.

use boardflow_storage::{ChangeEvent, is_empty_status, resolve_display_label};

use super::types::{AutomationRule, TargetStatus, TriggerType};

/// A (change event, rule) pair that passed every trigger condition.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub event: &'a ChangeEvent,
    pub rule: &'a AutomationRule,
}

/// Whether `rule` fires for `event`.
pub fn rule_matches(rule: &AutomationRule, event: &ChangeEvent) -> bool {
    if !rule.is_active || rule.trigger_type != TriggerType::StatusChanged {
        return false;
    }
    if rule.board_id != event.board_id {
        return false;
    }
    if let Some(column_id) = &rule.trigger.column_id {
        if column_id != &event.column_id {
            return false;
        }
    }

    let new_value = event.new_value.as_ref();
    match &rule.trigger.target {
        TargetStatus::Empty => is_empty_status(new_value),
        TargetStatus::Label(target) => {
            resolve_display_label(new_value).is_some_and(|label| label == *target)
        }
        TargetStatus::Invalid => false,
    }
}

/// All matching pairs, grouped by event in input order.
pub fn match_events<'a>(
    events: &'a [ChangeEvent],
    rules: &'a [AutomationRule],
) -> Vec<RuleMatch<'a>> {
    let mut matches = Vec::new();
    for event in events {
        for rule in rules {
            let matched = rule_matches(rule, event);
            tracing::debug!(
                event_id = %event.id,
                automation_id = %rule.id,
                column_id = %event.column_id,
                matched,
                "evaluated trigger"
            );
            if matched {
                matches.push(RuleMatch { event, rule });
            }
        }
    }
    matches
}
