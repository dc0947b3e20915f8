//! # boardflow-storage
//!
//! Storage abstraction layer for the Boardflow automation engine.
//!
//! This crate defines the [`BoardStore`] trait and the row types it moves.
//! Implementations live in separate crates (`boardflow-db-rest`,
//! `boardflow-db-memory`).
//!
//! ## Example
//!
//! ```ignore
//! use boardflow_storage::{BoardStore, StorageError};
//!
//! async fn pending_count(store: &dyn BoardStore) -> Result<usize, StorageError> {
//!     Ok(store.fetch_pending_events(None, 100).await?.len())
//! }
//! ```

mod error;
pub mod status;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use status::{StatusValue, is_empty_status, resolve_display_label};
pub use traits::BoardStore;
pub use types::{
    AutomationLog, AutomationLogEntry, AutomationRecord, AutomationSummary, Board, CellValue,
    ChangeEvent, Column, Group, Item, LogStatus, NewAutomationLog, NewItem, STATUS_COLUMN_TYPE,
    StatusOption,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynStore = std::sync::Arc<dyn BoardStore>;
