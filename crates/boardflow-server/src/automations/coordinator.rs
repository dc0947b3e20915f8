//! Run coordinator: one batch of pending change events per cycle.
//!
//! A cycle takes up to `batch_size` pending events (oldest first), loads the
//! active rules of the boards they touch, executes every match and leaves
//! each taken event processed. The background poller runs cycles on an
//! interval when `automation.poll_interval_ms` is set.

use std::sync::Arc;
use std::time::Duration;

use boardflow_storage::{BoardStore, ChangeEvent, StorageError};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info};

use super::executor::AutomationExecutor;
use super::matcher::match_events;
use super::types::AutomationRule;
use crate::config::{AutomationConfig, ClaimStrategy};

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Failed to fetch events: {0}")]
    EventFetch(#[source] StorageError),

    #[error("Failed to fetch automations: {0}")]
    RuleFetch(#[source] StorageError),

    #[error("Failed to mark events processed: {0}")]
    MarkProcessed(#[source] StorageError),
}

/// Result of one cycle. `processed` counts events taken, not rules run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub processed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CycleConfig {
    pub batch_size: usize,
    pub claim_strategy: ClaimStrategy,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self::from(&AutomationConfig::default())
    }
}

impl From<&AutomationConfig> for CycleConfig {
    fn from(cfg: &AutomationConfig) -> Self {
        Self {
            batch_size: cfg.batch_size,
            claim_strategy: cfg.claim_strategy,
        }
    }
}

pub struct RunCoordinator {
    store: Arc<dyn BoardStore>,
    executor: Arc<AutomationExecutor>,
    config: CycleConfig,
}

/// Board ids in first-seen order, without duplicates.
fn distinct_boards(events: &[ChangeEvent]) -> Vec<String> {
    let mut boards: Vec<String> = Vec::new();
    for event in events {
        if !boards.contains(&event.board_id) {
            boards.push(event.board_id.clone());
        }
    }
    boards
}

impl RunCoordinator {
    pub fn new(
        store: Arc<dyn BoardStore>,
        executor: Arc<AutomationExecutor>,
        config: CycleConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    pub fn config(&self) -> CycleConfig {
        self.config
    }

    /// Runs one cycle, optionally limited to a single board.
    ///
    /// Fetch failures abort the cycle before any action runs. Action
    /// failures never do; they end up in the automation log.
    pub async fn run_cycle(&self, board_id: Option<&str>) -> Result<CycleReport, CoordinatorError> {
        let batch = self.config.batch_size;
        let events = match self.config.claim_strategy {
            ClaimStrategy::Atomic => {
                self.store
                    .claim_pending_events(board_id, batch, OffsetDateTime::now_utc())
                    .await
            }
            ClaimStrategy::MarkAfter => self.store.fetch_pending_events(board_id, batch).await,
        }
        .map_err(CoordinatorError::EventFetch)?;

        if events.is_empty() {
            debug!(board_id = board_id.unwrap_or("*"), "No pending events");
            return Ok(CycleReport { processed: 0 });
        }

        let boards = distinct_boards(&events);
        let rules: Vec<AutomationRule> = self
            .store
            .list_active_automations(&boards)
            .await
            .map_err(CoordinatorError::RuleFetch)?
            .iter()
            .map(AutomationRule::from)
            .collect();

        let matches = match_events(&events, &rules);
        info!(
            events = events.len(),
            boards = boards.len(),
            rules = rules.len(),
            matches = matches.len(),
            "Processing change events"
        );

        for m in &matches {
            self.executor.execute(m.rule, m.event).await;
        }

        if self.config.claim_strategy == ClaimStrategy::MarkAfter {
            let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
            self.store
                .mark_events_processed(&ids, OffsetDateTime::now_utc())
                .await
                .map_err(CoordinatorError::MarkProcessed)?;
        }

        info!(processed = events.len(), "Cycle complete");
        Ok(CycleReport {
            processed: events.len(),
        })
    }
}

/// Background loop that runs a cycle per tick.
pub struct CyclePoller {
    coordinator: Arc<RunCoordinator>,
    period: Duration,
}

impl CyclePoller {
    pub fn new(coordinator: Arc<RunCoordinator>, period: Duration) -> Self {
        Self {
            coordinator,
            period,
        }
    }

    /// Start the poller in a background task.
    ///
    /// Returns a shutdown sender; sending `true` stops the loop after the
    /// cycle in flight.
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            info!(
                interval_ms = self.period.as_millis() as u64,
                "Automation poller started"
            );
            let mut ticker = interval(self.period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.coordinator.run_cycle(None).await {
                            Ok(report) if report.processed > 0 => {
                                info!(processed = report.processed, "Poll cycle processed events");
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "Poll cycle failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Automation poller shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
