//! HTTP gateway for toolrelay.
//!
//! Exposes the orchestrator over JSON and Server-Sent Events, plus the
//! agent cache management endpoints used as the "agent definition
//! changed" signal.
//!
//! Built on Axum.

pub mod api_v1;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Method};
use axum::{Router, extract::State, response::Json, routing::get};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use toolrelay_agent::{AgentCache, AgentResolver, Orchestrator, OrchestratorSettings, ResolverSettings};
use toolrelay_config::{AppConfig, StoreKind};
use toolrelay_core::agent::AgentStore;
use toolrelay_core::error::ProviderError;
use toolrelay_core::tool::{ToolCatalog, ToolExecutor};
use toolrelay_store::{InMemoryAgentStore, LoadError, RestAgentStore};
use toolrelay_tools::{
    CatalogError, HttpToolExecutor, LocalToolExecutor, UnavailableExecutor, default_catalog,
    load_catalog,
};

/// Shared state for every route.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub resolver: Arc<AgentResolver>,
    pub cache: Arc<AgentCache>,
    pub provider_name: String,
    pub request_timeout: Duration,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("agent store setup failed: {0}")]
    Store(#[from] LoadError),

    #[error("tool catalog setup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("agent store kind 'rest' needs agents.store.rest_url")]
    MissingRestUrl,
}

/// Wire up provider, store, tools, and orchestrator from configuration.
pub fn build_state(config: &AppConfig) -> Result<SharedState, GatewayError> {
    let provider = toolrelay_providers::build_from_config(config)?;
    let store = build_store(config)?;

    let catalog = match &config.tools.catalog_path {
        Some(path) => load_catalog(path)?,
        None => default_catalog(),
    };

    let inner: Arc<dyn ToolExecutor> = match &config.tools.executor_url {
        Some(url) => Arc::new(HttpToolExecutor::new(url.clone(), config.tools.timeout_secs)),
        None => {
            info!("No tool executor URL configured, only switch_agent will run");
            Arc::new(UnavailableExecutor)
        }
    };
    let executor = Arc::new(LocalToolExecutor::new(store.clone(), inner));

    let cache = Arc::new(AgentCache::new(config.agents.cache_ttl()));
    let resolver = Arc::new(
        AgentResolver::new(store, cache.clone())
            .with_settings(ResolverSettings::from_config(&config.agents)),
    );

    let orchestrator = Orchestrator::new(
        provider.clone(),
        executor,
        resolver.clone(),
        Arc::new(catalog),
    )
    .with_settings(OrchestratorSettings::from_config(&config.orchestrator));

    Ok(Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        resolver,
        cache,
        provider_name: provider.name().to_string(),
        request_timeout: config.orchestrator.request_timeout(),
    }))
}

/// Agent store selected by `agents.store`.
pub fn build_store(config: &AppConfig) -> Result<Arc<dyn AgentStore>, GatewayError> {
    let store = &config.agents.store;
    match store.kind {
        StoreKind::Memory => {
            let agents = match &store.definitions_path {
                Some(path) => InMemoryAgentStore::load(path)?,
                None => InMemoryAgentStore::new(),
            };
            Ok(Arc::new(agents))
        }
        StoreKind::Rest => {
            let url = store.rest_url.clone().ok_or(GatewayError::MissingRestUrl)?;
            Ok(Arc::new(RestAgentStore::new(url, store.api_key.clone())))
        }
    }
}

/// Build the full router: health, the v1 API, CORS, and tracing.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            axum::http::header::CONTENT_TYPE,
        ]);

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config)?;
    let app = build_router(state);

    info!(addr = %addr, provider = config.provider.as_str(), "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider_name.clone(),
    })
}
