//! HTTP surface.
//!
//! - POST /api/upload                        multipart clothing photo -> new item
//! - POST /api/generate/{id}                 run the generation pipeline
//! - GET  /api/clothing/{id}                 fetch an item
//! - GET  /api/uploads/{folder}/{filename}   stored original/generated files
//! - GET  /api/status                        health check

pub mod handlers;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::TryonConfig;
use crate::item::{ItemStore, MemoryItemStore};
use crate::orchestrator::Orchestrator;
use crate::provider::{ClaudeProvider, GeminiProvider, ImageProvider, ProviderChain};
use crate::storage::ImageStore;

// ============================================================================
// Server State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ItemStore>,
    pub images: Arc<ImageStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub providers: Arc<ProviderChain>,
}

// ============================================================================
// Routes
// ============================================================================

/// Create the router with all endpoints
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(handlers::status_handler))
        .route(
            "/api/upload",
            post(handlers::upload_handler).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/generate/{id}", post(handlers::generate_handler))
        .route("/api/clothing/{id}", get(handlers::get_item_handler))
        .route(
            "/api/uploads/{folder}/{filename}",
            get(handlers::serve_upload_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build the provider chain from configured API keys: Gemini first, Claude
/// as the fallback.
pub fn build_provider_chain(config: &TryonConfig) -> ProviderChain {
    let mut providers: Vec<Box<dyn ImageProvider>> = Vec::new();

    if let Some(key) = &config.gemini_api_key {
        providers.push(Box::new(GeminiProvider::new(key.clone())));
    }
    if let Some(key) = &config.anthropic_api_key {
        providers.push(Box::new(ClaudeProvider::new(key.clone())));
    }

    if providers.is_empty() {
        warn!("No generation API key configured; /api/generate will return 503");
    }

    ProviderChain::new(providers)
}

/// Run the HTTP server
pub async fn run(config: &TryonConfig) -> Result<()> {
    let images = Arc::new(ImageStore::new(&config.uploads_dir));
    images.ensure_dirs().await?;

    let store: Arc<dyn ItemStore> = Arc::new(MemoryItemStore::new());
    let providers = Arc::new(build_provider_chain(config));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        images.clone(),
        providers.clone(),
    ));

    let state = AppState {
        store,
        images,
        orchestrator,
        providers,
    };

    let app = create_router(state, config.max_upload_bytes());
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;

    info!("Server listening on http://{}", config.bind_address());
    axum::serve(listener, app).await?;

    Ok(())
}
