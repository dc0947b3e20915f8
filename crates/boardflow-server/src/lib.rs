pub mod automations;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use automations::{
    AutomationExecutor, AutomationRule, AutomationState, CycleConfig, CyclePoller, CycleReport,
    RunCoordinator,
};
pub use config::{
    AiConfig, AppConfig, AutomationConfig, ClaimStrategy, ConfigPresence, LoggingConfig,
    RestStorageConfig, ServerConfig, StorageBackend, StorageConfig,
};
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AppState, BoardflowServer, ServerBuilder, build_app, create_store};
