use std::sync::Arc;

use tracing::error;

use companion_db::Database;
use companion_notify::PushSender;

use crate::error::ApiError;
use crate::providers::{AiProvider, CheckoutProvider, IdentityProvider};

pub type AppState = Arc<AppStateInner>;

/// Settings the handlers read at request time.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    pub vapid_public_key: String,
    pub stripe_webhook_secret: Option<String>,
    /// Public origin used for absolute links (sitemap).
    pub site_url: String,
}

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub config: ApiConfig,
    pub ai: Arc<dyn AiProvider>,
    pub identity: Arc<dyn IdentityProvider>,
    pub checkout: Arc<dyn CheckoutProvider>,
    pub push: Arc<dyn PushSender>,
}

impl AppStateInner {
    /// Run a database closure on the blocking pool.
    pub async fn db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)
    }
}
