//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! service-wide constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogSettings {
    /// Telegram Bot API token (falls back to `TELEGRAM_BOT_TOKEN`)
    #[serde(default)]
    pub telegram_token: String,
    /// Base URL of the Telegram Bot API (used for file download URLs)
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    /// MongoDB connection string
    pub mongo_uri: Option<String>,
    /// MongoDB database name
    #[serde(default = "default_mongo_database")]
    pub mongo_database: String,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,
    /// Public base URL that serves the bucket (custom domain or r2.dev)
    pub cdn_public_url: Option<String>,
    /// Logical folder every migrated asset is stored under
    #[serde(default = "default_cdn_folder")]
    pub cdn_folder: String,

    /// Author recorded on newly created catalog records
    #[serde(default = "default_catalog_author")]
    pub catalog_author: String,

    /// HTTP listen host
    #[serde(default = "default_server_host")]
    pub server_host: String,
    /// HTTP listen port
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Maximum accepted request body size in bytes
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_mongo_database() -> String {
    "telegram_catalog".to_string()
}

fn default_cdn_folder() -> String {
    "telegram_images".to_string()
}

fn default_catalog_author() -> String {
    "catalog@teledex.local".to_string()
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_server_port() -> u16 {
    3000
}

const fn default_body_limit_bytes() -> usize {
    200 * 1024 * 1024
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            telegram_api_url: default_telegram_api_url(),
            mongo_uri: None,
            mongo_database: default_mongo_database(),
            r2_access_key_id: None,
            r2_secret_access_key: None,
            r2_endpoint_url: None,
            r2_bucket_name: None,
            cdn_public_url: None,
            cdn_folder: default_cdn_folder(),
            catalog_author: default_catalog_author(),
            server_host: default_server_host(),
            server_port: default_server_port(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

/// Build the layered configuration source shared by every crate.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg.. `APP__SERVER_PORT=8080 ./target/teledex-server`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl CatalogSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Older deployments export the Mongo connection string as `URI`
        if settings.mongo_uri.is_none() {
            if let Ok(val) = std::env::var("URI") {
                if !val.is_empty() {
                    settings.mongo_uri = Some(val);
                }
            }
        }
        if settings.telegram_token.is_empty() {
            if let Ok(val) = std::env::var("TELEGRAM_BOT_TOKEN") {
                settings.telegram_token = val;
            }
        }

        Ok(settings)
    }

    /// Public base URL for stored objects.
    ///
    /// Falls back to path-style `{endpoint}/{bucket}` when no public domain is configured.
    #[must_use]
    pub fn cdn_base_url(&self) -> Option<String> {
        if let Some(url) = self.cdn_public_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.trim_end_matches('/').to_string());
        }
        match (&self.r2_endpoint_url, &self.r2_bucket_name) {
            (Some(endpoint), Some(bucket)) => {
                Some(format!("{}/{bucket}", endpoint.trim_end_matches('/')))
            }
            _ => None,
        }
    }

    /// `host:port` pair the HTTP server binds to
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

// Telegram API retry configuration
/// Maximum retries for transient Telegram API failures
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff between Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for the Telegram API backoff
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Default timeout for CDN downloads and uploads
pub const CDN_HTTP_TIMEOUT_SECS: u64 = 30;

/// Get CDN HTTP timeout from env or default.
///
/// Environment variable: `CDN_HTTP_TIMEOUT_SECS`.
#[must_use]
pub fn get_cdn_http_timeout_secs() -> u64 {
    std::env::var("CDN_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(CDN_HTTP_TIMEOUT_SECS)
}

/// Cap on "you may also like" results
pub const RELATED_ITEMS_LIMIT: i64 = 8;
