use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BlingSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bling payment-method id used to attach an installment plan to
    /// submitted orders. Absent means no installment data is sent.
    #[serde(default)]
    pub payment_method_id: Option<u64>,
    #[serde(default = "default_token_refresh_skew", with = "humantime_serde")]
    pub token_refresh_skew: Duration,
    #[serde(default = "default_oauth_state_ttl", with = "humantime_serde")]
    pub oauth_state_ttl: Duration,
}

impl Default for BlingSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            api_base: default_api_base(),
            token_url: default_token_url(),
            authorize_url: default_authorize_url(),
            timeout_ms: default_timeout_ms(),
            payment_method_id: None,
            token_refresh_skew: default_token_refresh_skew(),
            oauth_state_ttl: default_oauth_state_ttl(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bling: BlingSettings,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bling: BlingSettings::default(),
            database_path: default_database_path(),
        }
    }
}

impl Config {
    /// Load from config.toml (if present) and environment variables.
    /// Environment variables override file values.
    /// Supported env keys: BLING_CLIENT_ID, BLING_CLIENT_SECRET,
    /// BLING_REDIRECT_URI, BLING_API_BASE, BLING_TOKEN_URL,
    /// BLING_AUTHORIZE_URL, BLING_TIMEOUT_MS, BLING_FORMA_PAGAMENTO_ID,
    /// BLING_TOKEN_REFRESH_SKEW, BLING_OAUTH_STATE_TTL, DATABASE_PATH
    pub fn load() -> Self {
        // 1) Start with defaults + config.toml only if it exists
        let base: Config = Default::default();
        let mut fig = Figment::from(Serialized::defaults(base));
        if std::path::Path::new("config.toml").exists() {
            fig = fig.merge(Toml::file("config.toml"));
        }
        let mut cfg: Config = fig.extract().unwrap_or_default();

        // 2) Overlay environment variables explicitly
        if let Ok(v) = std::env::var("BLING_CLIENT_ID") {
            cfg.bling.client_id = v;
        }
        if let Ok(v) = std::env::var("BLING_CLIENT_SECRET") {
            cfg.bling.client_secret = v;
        }
        if let Ok(v) = std::env::var("BLING_REDIRECT_URI") {
            cfg.bling.redirect_uri = v;
        }
        if let Ok(v) = std::env::var("BLING_API_BASE") {
            cfg.bling.api_base = v;
        }
        if let Ok(v) = std::env::var("BLING_TOKEN_URL") {
            cfg.bling.token_url = v;
        }
        if let Ok(v) = std::env::var("BLING_AUTHORIZE_URL") {
            cfg.bling.authorize_url = v;
        }
        if let Ok(v) = std::env::var("BLING_TIMEOUT_MS") {
            cfg.bling.timeout_ms = v.parse().unwrap_or(cfg.bling.timeout_ms);
        }
        if let Ok(v) = std::env::var("BLING_FORMA_PAGAMENTO_ID") {
            cfg.bling.payment_method_id = v.parse().ok();
        }
        if let Ok(v) = std::env::var("BLING_TOKEN_REFRESH_SKEW") {
            cfg.bling.token_refresh_skew = parse_duration_env(&v, cfg.bling.token_refresh_skew);
        }
        if let Ok(v) = std::env::var("BLING_OAUTH_STATE_TTL") {
            cfg.bling.oauth_state_ttl = parse_duration_env(&v, cfg.bling.oauth_state_ttl);
        }
        if let Ok(v) = std::env::var("DATABASE_PATH") {
            cfg.database_path = v;
        }

        cfg
    }

    pub fn from_env() -> Self {
        Self::load()
    }
}

fn parse_duration_env(value: &str, current: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(current)
}

fn default_api_base() -> String {
    "https://api.bling.com.br/Api/v3".to_string()
}

fn default_token_url() -> String {
    "https://bling.com.br/Api/v3/oauth/token".to_string()
}

fn default_authorize_url() -> String {
    "https://www.bling.com.br/Api/v3/oauth/authorize".to_string()
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_token_refresh_skew() -> Duration {
    Duration::from_secs(60)
}

fn default_oauth_state_ttl() -> Duration {
    Duration::from_secs(600) // 10 minutes
}

fn default_database_path() -> String {
    "data/quotes.redb".to_string()
}
