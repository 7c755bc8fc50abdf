//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `PASS_BASE_URL` (optional): host that serves wallet passes
/// - `PASS_SIGNING_SECRET` (optional): HMAC secret for pass URLs. A random
///   secret is generated when unset, so passes do not survive a restart.
/// - `HOTEL_NAME` (optional): shown in delivered messages
/// - `DELIVERY_API_URL` (optional): email/SMS gateway; unset means deliveries are not sent
/// - `DELIVERY_API_KEY` (optional): gateway credential, also signs request bodies
/// - `DELIVERY_TIMEOUT_SECS` (optional): per-request timeout, defaults to 5
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_pass_base_url")]
    pub pass_base_url: url::Url,

    #[serde(default)]
    pub pass_signing_secret: Option<String>,

    #[serde(default = "default_hotel_name")]
    pub hotel_name: String,

    #[serde(default)]
    pub delivery_api_url: Option<url::Url>,

    #[serde(default)]
    pub delivery_api_key: Option<String>,

    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_pass_base_url() -> url::Url {
    url::Url::parse("https://passes.localhost").expect("default pass base URL is valid")
}

fn default_hotel_name() -> String {
    "Hotel".to_string()
}

fn default_delivery_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Secret used to sign pass URLs.
    ///
    /// Falls back to 32 random bytes, hex encoded, when none is configured.
    pub fn signing_secret(&self) -> String {
        match &self.pass_signing_secret {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => {
                tracing::warn!(
                    "PASS_SIGNING_SECRET not set, using a random secret; issued pass URLs will not verify after restart"
                );
                let bytes: [u8; 32] = rand::random();
                hex::encode(bytes)
            }
        }
    }
}
