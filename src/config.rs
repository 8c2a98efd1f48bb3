//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

use crate::middleware::auth::AdminAllowList;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `AUTH_URL`, `AUTH_ANON_KEY`: hosted auth service used to verify bearer tokens
/// - `ADMIN_EMAILS`: comma-separated back-office allow-list
/// - `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`, `PAYPAL_BASE_URL`
/// - `TMDB_API_KEY`, `TMDB_BASE_URL`, `TMDB_IMAGE_BASE_URL`, `TMDB_LANGUAGE`, `TMDB_CACHE_TTL_SECS`
/// - `CRON_SECRET`: bearer secret for scheduled maintenance calls
/// - `MAIL_WEBHOOK_URL`, `MAIL_WEBHOOK_SECRET` (optional): transactional mail relay
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub auth_url: String,
    pub auth_anon_key: String,

    #[serde(default)]
    pub admin_emails: String,

    pub paypal_client_id: String,
    pub paypal_client_secret: String,
    #[serde(default = "default_paypal_base_url")]
    pub paypal_base_url: String,

    pub tmdb_api_key: String,
    #[serde(default = "default_tmdb_base_url")]
    pub tmdb_base_url: String,
    #[serde(default = "default_tmdb_image_base_url")]
    pub tmdb_image_base_url: String,
    #[serde(default = "default_tmdb_language")]
    pub tmdb_language: String,
    #[serde(default = "default_tmdb_cache_ttl_secs")]
    pub tmdb_cache_ttl_secs: u64,

    pub cron_secret: String,

    pub mail_webhook_url: Option<String>,
    pub mail_webhook_secret: Option<String>,

    #[serde(default = "default_currency")]
    pub store_currency: String,

    #[serde(default = "default_pending_order_ttl_hours")]
    pub pending_order_ttl_hours: i64,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_paypal_base_url() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_tmdb_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_image_base_url() -> String {
    "https://image.tmdb.org/t/p/w500".to_string()
}

fn default_tmdb_language() -> String {
    "ar".to_string()
}

fn default_tmdb_cache_ttl_secs() -> u64 {
    600
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_pending_order_ttl_hours() -> i64 {
    48
}

fn default_http_timeout_secs() -> u64 {
    10
}

/// Invalid configuration value detected after deserialization.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("{name} is not a valid URL: {value}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
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
    /// - A URL variable does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values `envy` cannot check by type alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("AUTH_URL", Some(&self.auth_url)),
            ("PAYPAL_BASE_URL", Some(&self.paypal_base_url)),
            ("TMDB_BASE_URL", Some(&self.tmdb_base_url)),
            ("TMDB_IMAGE_BASE_URL", Some(&self.tmdb_image_base_url)),
            ("MAIL_WEBHOOK_URL", self.mail_webhook_url.as_ref()),
        ];
        for (name, value) in urls {
            if let Some(value) = value {
                url::Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
                    name,
                    value: value.clone(),
                })?;
            }
        }

        if self.cron_secret.trim().is_empty() {
            return Err(ConfigError::Empty("CRON_SECRET"));
        }

        Ok(())
    }

    /// Parsed `ADMIN_EMAILS`.
    pub fn admin_allow_list(&self) -> AdminAllowList {
        AdminAllowList::parse(&self.admin_emails)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/storefront_test".to_string(),
        server_port: 3000,
        auth_url: "http://127.0.0.1:9".to_string(),
        auth_anon_key: "anon".to_string(),
        admin_emails: "admin@example.com".to_string(),
        paypal_client_id: "client".to_string(),
        paypal_client_secret: "secret".to_string(),
        paypal_base_url: default_paypal_base_url(),
        tmdb_api_key: "tmdb".to_string(),
        tmdb_base_url: default_tmdb_base_url(),
        tmdb_image_base_url: default_tmdb_image_base_url(),
        tmdb_language: default_tmdb_language(),
        tmdb_cache_ttl_secs: 60,
        cron_secret: "cron-secret".to_string(),
        mail_webhook_url: None,
        mail_webhook_secret: None,
        store_currency: default_currency(),
        pending_order_ttl_hours: 48,
        http_timeout_secs: 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = test_config();
        config.mail_webhook_url = Some("not a url".to_string());
        match config.validate() {
            Err(ConfigError::InvalidUrl { name, .. }) => assert_eq!(name, "MAIL_WEBHOOK_URL"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_blank_cron_secret() {
        let mut config = test_config();
        config.cron_secret = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Empty("CRON_SECRET"))));
    }

    #[test]
    fn admin_allow_list_is_parsed_from_emails() {
        let mut config = test_config();
        config.admin_emails = " Owner@Example.com, ,ops@example.com".to_string();
        let list = config.admin_allow_list();
        assert!(list.contains("owner@example.com"));
        assert!(list.contains("OPS@example.com"));
        assert!(!list.contains(""));
    }
}
