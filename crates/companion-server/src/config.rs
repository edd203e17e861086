use std::path::PathBuf;

use tracing::warn;

use companion_api::providers::openai::OpenAiConfig;
use companion_notify::VapidConfig;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Everything the binary reads from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// `None` means any origin.
    pub cors_origins: Option<Vec<String>>,
    pub site_url: String,
    pub openai: OpenAiConfig,
    pub stripe_api_key: Option<String>,
    pub stripe_api_base: String,
    pub stripe_webhook_secret: Option<String>,
    pub vapid_public_key: String,
    pub vapid: Option<VapidConfig>,
    pub oauth_session_url: String,
    pub admin_email: String,
    pub admin_password: String,
    pub random_interval_secs: u64,
    pub inactivity_interval_secs: u64,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match var(name) {
        Some(raw) => raw.parse().map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = var_or("COMPANION_JWT_SECRET", DEV_JWT_SECRET);
        if jwt_secret == DEV_JWT_SECRET {
            warn!("COMPANION_JWT_SECRET is unset; using the development secret");
        }

        let cors_origins = match var_or("CORS_ORIGINS", "*").as_str() {
            "*" => None,
            list => Some(list.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect()),
        };

        if var("PAYPAL_MODE").is_some_and(|m| m != "mock") {
            warn!("PAYPAL_MODE is ignored; PayPal checkout always runs in mock mode");
        }

        let vapid_public_key = var_or("VAPID_PUBLIC_KEY", "");
        let vapid = match var("VAPID_PRIVATE_KEY_PEM") {
            Some(pem) if !vapid_public_key.is_empty() => Some(VapidConfig {
                public_key: vapid_public_key.clone(),
                // Single-line env values carry escaped newlines.
                private_key_pem: pem.replace("\\n", "\n"),
                subject: var_or("VAPID_SUBJECT", "mailto:admin@example.com"),
            }),
            _ => None,
        };

        Ok(Self {
            host: var_or("COMPANION_HOST", "0.0.0.0"),
            port: parsed_or("COMPANION_PORT", 8001)?,
            db_path: var_or("COMPANION_DB_PATH", "companion.db").into(),
            jwt_secret,
            cors_origins,
            site_url: var_or("COMPANION_SITE_URL", "http://localhost:3000"),
            openai: OpenAiConfig {
                api_key: var("LLM_API_KEY"),
                base_url: var_or("LLM_BASE_URL", "https://api.openai.com/v1"),
                chat_model: var_or("LLM_CHAT_MODEL", "gpt-4o-mini"),
                image_model: var_or("LLM_IMAGE_MODEL", "gpt-image-1"),
                tts_model: var_or("LLM_TTS_MODEL", "tts-1"),
            },
            stripe_api_key: var("STRIPE_API_KEY"),
            stripe_api_base: var_or("STRIPE_API_BASE", "https://api.stripe.com"),
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            vapid_public_key,
            vapid,
            oauth_session_url: var_or(
                "OAUTH_SESSION_URL",
                "https://demobackend.emergentagent.com/auth/v1/env/oauth/session-data",
            ),
            admin_email: var_or("ADMIN_EMAIL", "admin@admin.com"),
            admin_password: var_or("ADMIN_PASSWORD", "admin123"),
            random_interval_secs: parsed_or("NOTIFY_RANDOM_INTERVAL_SECS", 7200)?,
            inactivity_interval_secs: parsed_or("NOTIFY_INACTIVITY_INTERVAL_SECS", 14400)?,
        })
    }
}
