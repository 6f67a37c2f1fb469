//! Webhook intake that durably fetches, archives and expires the resources
//! webhooks point at.
//!
//! Requests never do the slow work inline. Ingress verifies and compresses
//! the webhook body and enqueues a `process-hook` task; that fans out into
//! one `save-resource` task per event, which fetches and archives the
//! resource. Purges run the same way, as a chain of `purge-step` tasks.

pub mod archiver;
pub mod config;
pub mod dispatch;
pub mod integrity;
pub mod middleware;
pub mod observability;
pub mod purge;
pub mod routes;
pub mod store;
pub mod streaming;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    archiver::Archiver,
    config::HookvaultConfig,
    dispatch::{Dispatcher, TaskQueue},
    integrity::key_hash,
    purge::Purger,
    store::ArchiveStore,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HookvaultConfig>,
    pub store: Arc<dyn ArchiveStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub archiver: Arc<Archiver>,
    pub purger: Arc<Purger>,
    /// Hex SHA-256 of the application key.
    pub key_hash: Arc<str>,
}

impl AppState {
    pub fn new(
        config: HookvaultConfig,
        store: Arc<dyn ArchiveStore>,
        queue: Arc<dyn TaskQueue>,
        dispatcher: Arc<dyn Dispatcher>,
        http_client: reqwest::Client,
    ) -> Self {
        let archiver = Archiver::new(
            http_client,
            store.clone(),
            config.app.key.clone(),
            &config.limits,
        );
        let purger = Purger::new(store.clone(), dispatcher.clone(), &config.retention);

        Self {
            key_hash: key_hash(&config.app.key).into(),
            config: Arc::new(config),
            store,
            queue,
            dispatcher,
            archiver: Arc::new(archiver),
            purger: Arc::new(purger),
        }
    }
}

/// Build the HTTP router.
pub fn build_app(config: &HookvaultConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness))
        .route("/r", post(routes::ingress::receive))
        .route("/r/", post(routes::ingress::receive))
        .route("/cron/daily", get(routes::purge::daily))
        .merge(routes::listing_routes())
        .merge(routes::task_routes(state.clone()));

    if config.observability.metrics.enabled {
        app = app.route("/metrics", get(routes::health::metrics));
    }

    // Admin purge is only reachable with a configured token
    if config.app.admin_token.is_some() {
        app = app
            .route("/purge", post(routes::purge::admin_purge))
            .route("/purge/", post(routes::purge::admin_purge));
    }

    app.layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(DefaultBodyLimit::max(config.server.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}
