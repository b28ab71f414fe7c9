pub mod clients;
pub mod config;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod websocket;
pub mod ws;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use clients::document_store::{DocumentStore, HttpDocumentStore};
use clients::identity::{HttpIdentityProvider, IdentityProvider};
use clients::memory_store::MemoryDocumentStore;
use config::Config;
use docs::ApiDoc;
use routes::create_api_routes;
use websocket::handler::websocket_handler;
use ws::SyncEngine;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let engine = SyncEngine::new(store, config.flush_debounce());
        Self {
            engine,
            identity,
            config: Arc::new(config),
        }
    }

    /// Wire up the upstream clients named by the configuration.
    pub fn from_config(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn DocumentStore> = match &config.documents_url {
            Some(url) => {
                info!("Using document store at {}", url);
                Arc::new(HttpDocumentStore::new(
                    url,
                    config.service_jwt_secret.clone(),
                    config.service_name.clone(),
                    config.upstream_timeout(),
                )?)
            }
            None => {
                warn!("No DOCUMENTS_URL configured - documents are kept in memory only");
                Arc::new(MemoryDocumentStore::new())
            }
        };

        let identity: Option<Arc<dyn IdentityProvider>> = match &config.identity_url {
            Some(url) => {
                info!("Using identity provider at {}", url);
                Some(Arc::new(HttpIdentityProvider::new(
                    url,
                    config.service_jwt_secret.clone(),
                    config.service_name.clone(),
                    config.upstream_timeout(),
                )?))
            }
            None => {
                warn!("No IDENTITY_URL configured - viewers are not verified");
                None
            }
        };

        Ok(Self::new(config, store, identity))
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Build the full application router: WebSocket endpoint, API and Swagger UI.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/api", create_api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
