mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use companion_api::auth::hash_password;
use companion_api::providers::{OpenAiClient, SessionExchangeClient, StripeClient};
use companion_api::{ApiConfig, AppState, AppStateInner};
use companion_db::Database;
use companion_notify::{PushSender, WebPushSender, scheduler};
use companion_types::models::AdminRole;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "companion=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    seed_admin(&db, &config)?;

    // External services
    let push: Arc<dyn PushSender> = Arc::new(WebPushSender::new(config.vapid.clone())?);

    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        config: ApiConfig {
            jwt_secret: config.jwt_secret.clone(),
            vapid_public_key: config.vapid_public_key.clone(),
            stripe_webhook_secret: config.stripe_webhook_secret.clone(),
            site_url: config.site_url.clone(),
        },
        ai: Arc::new(OpenAiClient::new(config.openai.clone())?),
        identity: Arc::new(SessionExchangeClient::new(config.oauth_session_url.clone())?),
        checkout: Arc::new(StripeClient::new(config.stripe_api_base.clone(), config.stripe_api_key.clone())?),
        push: push.clone(),
    });

    // Background notification jobs
    tokio::spawn(scheduler::run_random_loop(db.clone(), push.clone(), config.random_interval_secs));
    tokio::spawn(scheduler::run_inactivity_loop(db, push, config.inactivity_interval_secs));

    let app = companion_api::router(state)
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Companion server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Create the initial super admin when the admin table is empty.
fn seed_admin(db: &Database, config: &Config) -> anyhow::Result<()> {
    if db.count_admins()? > 0 {
        return Ok(());
    }
    let hash = hash_password(&config.admin_password)?;
    db.create_admin(&config.admin_email, "Super Admin", &hash, AdminRole::SuperAdmin)?;
    info!("Seeded super admin {}", config.admin_email);
    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let Some(origins) = &config.cors_origins else {
        return CorsLayer::permissive();
    };
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
