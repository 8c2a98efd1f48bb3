//! Shared application state handed to every handler and middleware.

use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;

use crate::{
    config::Config,
    db::DbPool,
    middleware::{auth::AdminAllowList, rate_limit::RateLimiters},
    services::{
        self, auth_client::AuthClient, mailer::Mailer, paypal::PayPalClient, tmdb::TmdbClient,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub admins: Arc<AdminAllowList>,
    pub auth: AuthClient,
    pub paypal: PayPalClient,
    pub tmdb: TmdbClient,
    pub mailer: Mailer,
    pub limiters: RateLimiters,
}

impl AppState {
    /// Build every client from configuration. All clients share one
    /// `reqwest::Client`.
    pub fn new(pool: DbPool, config: Config) -> Result<Self, reqwest::Error> {
        let http = services::http_client(config.http_timeout_secs)?;

        let auth = AuthClient::new(http.clone(), &config.auth_url, &config.auth_anon_key);
        let paypal = PayPalClient::new(
            http.clone(),
            &config.paypal_base_url,
            &config.paypal_client_id,
            &config.paypal_client_secret,
        );
        let tmdb = TmdbClient::new(
            http.clone(),
            &config.tmdb_base_url,
            &config.tmdb_image_base_url,
            &config.tmdb_api_key,
            &config.tmdb_language,
            Duration::from_secs(config.tmdb_cache_ttl_secs),
        );
        let mailer = Mailer::new(
            http,
            config.mail_webhook_url.as_deref(),
            config.mail_webhook_secret.as_deref(),
        );

        Ok(Self {
            pool,
            admins: Arc::new(config.admin_allow_list()),
            config: Arc::new(config),
            auth,
            paypal,
            tmdb,
            mailer,
            limiters: RateLimiters::default(),
        })
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Mailer {
    fn from_ref(state: &AppState) -> Self {
        state.mailer.clone()
    }
}

impl FromRef<AppState> for TmdbClient {
    fn from_ref(state: &AppState) -> Self {
        state.tmdb.clone()
    }
}
