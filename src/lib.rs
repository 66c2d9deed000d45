pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {crate::services::orchestrator::WebhookProcessor, std::sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub stripe_webhook_secret: String,
    pub processor: Arc<WebhookProcessor>,
}
