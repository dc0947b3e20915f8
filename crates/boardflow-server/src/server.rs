use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::FromRef, middleware, routing::get};
use boardflow_db_memory::InMemoryStorage;
use boardflow_db_rest::{RestBoardStore, RestStoreConfig};
use boardflow_storage::{BoardStore, StorageError};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::automations::{
    AutomationExecutor, AutomationState, CycleConfig, CyclePoller, RunCoordinator,
    automation_routes,
};
use crate::config::{AppConfig, StorageBackend, StorageConfig};
use crate::{handlers, middleware as app_middleware};

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub automation: AutomationState,
}

impl FromRef<AppState> for AutomationState {
    fn from_ref(state: &AppState) -> Self {
        state.automation.clone()
    }
}

impl AppState {
    /// Wires the engine over the store selected by `storage.backend`.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let store = create_store(&cfg.storage)?;
        Self::with_store(cfg, store)
    }

    /// Wires the engine over an existing store.
    pub fn with_store(cfg: &AppConfig, store: Arc<dyn BoardStore>) -> anyhow::Result<Self> {
        let mut http = reqwest::Client::builder();
        if let Some(timeout) = cfg.automation.request_timeout() {
            http = http.timeout(timeout);
        }
        let http = http.build()?;

        let executor = Arc::new(AutomationExecutor::from_config(
            store.clone(),
            http,
            &cfg.automation,
        ));
        let coordinator = Arc::new(RunCoordinator::new(
            store.clone(),
            executor,
            CycleConfig::from(&cfg.automation),
        ));

        Ok(Self {
            automation: AutomationState {
                store,
                coordinator,
                presence: cfg.presence(),
            },
        })
    }
}

/// Create the board store for the configured backend.
pub fn create_store(cfg: &StorageConfig) -> Result<Arc<dyn BoardStore>, StorageError> {
    match cfg.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        StorageBackend::Rest => {
            let base_url = cfg
                .rest
                .base_url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| StorageError::invalid_data("storage.rest.base_url is not set"))?;
            if cfg.rest.service_key.is_none() {
                tracing::warn!("storage.rest.service_key not set; requests are unauthenticated");
            }
            let store = RestBoardStore::new(RestStoreConfig {
                base_url,
                service_key: cfg.rest.service_key.clone().unwrap_or_default(),
                timeout: cfg.rest.timeout(),
            })?;
            tracing::info!("REST storage initialized");
            Ok(Arc::new(store))
        }
    }
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .merge(automation_routes::<AppState>())
        // Middleware stack (order: request id -> trace -> cors), then body limit
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(app_middleware::request_id))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            use tracing::field::Empty;
                            let req_id = req
                                .extensions()
                                .get::<app_middleware::RequestId>()
                                .and_then(|id| id.0.to_str().ok())
                                .unwrap_or("")
                                .to_string();
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                                http.status_code = Empty,
                                request_id = %req_id
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(CorsLayer::permissive()),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct BoardflowServer {
    addr: SocketAddr,
    app: Router,
    poller: Option<CyclePoller>,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<Arc<dyn BoardStore>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use `store` instead of the one `storage.backend` selects.
    pub fn with_store(mut self, store: Arc<dyn BoardStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> anyhow::Result<BoardflowServer> {
        let state = match self.store {
            Some(store) => AppState::with_store(&self.config, store)?,
            None => AppState::from_config(&self.config)?,
        };
        tracing::info!(
            storage = state.automation.store.backend_name(),
            claim_strategy = ?self.config.automation.claim_strategy,
            batch_size = self.config.automation.batch_size,
            "Automation engine initialized"
        );

        let poller = self
            .config
            .automation
            .poll_interval()
            .map(|period| CyclePoller::new(state.automation.coordinator.clone(), period));
        let app = build_app(&self.config, state);

        Ok(BoardflowServer {
            addr: self.addr,
            app,
            poller,
        })
    }
}

impl BoardflowServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let poller_shutdown = self.poller.map(CyclePoller::start);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(tx) = poller_shutdown {
            let _ = tx.send(true);
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
