use std::{path::PathBuf, time::Duration};

use evesync_esi::{
    EsiConfig, EsiEndpoints,
    config::{DEFAULT_DATASOURCE, DEFAULT_ESI_BASE_URL},
};
use evesync_store::{KeySource, VaultKey};

use crate::AppError;

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/auth/callback";
pub const DEFAULT_SCOPES: &str = "publicData";
pub const DEFAULT_DATABASE_PATH: &str = "evesync.sqlite";
pub const DEFAULT_SYNC_WORKERS: usize = 2;
pub const DEFAULT_SYNC_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_SYNC_RESULT_TTL: Duration = Duration::from_secs(500);
const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalQueueConfig {
    pub workers: usize,
    /// Total tries per job, the first run included.
    pub max_attempts: u32,
    pub capacity: usize,
    /// How long a finished or failed job stays queryable.
    pub result_ttl: Duration,
}

impl Default for LocalQueueConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_SYNC_WORKERS,
            max_attempts: DEFAULT_SYNC_MAX_ATTEMPTS,
            capacity: DEFAULT_QUEUE_CAPACITY,
            result_ttl: DEFAULT_SYNC_RESULT_TTL,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub esi: EsiConfig,
    pub database_path: PathBuf,
    pub token_key: Option<String>,
    pub secret_key: Option<String>,
    pub queue: LocalQueueConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source; unset and blank
    /// values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut endpoints = match var("EVESYNC_SSO_URL") {
            Some(base) => EsiEndpoints::with_base(&base),
            None => EsiEndpoints::default(),
        };
        endpoints.esi_base_url = var("EVESYNC_ESI_URL")
            .map(|url| url.trim_end_matches('/').to_owned())
            .unwrap_or_else(|| DEFAULT_ESI_BASE_URL.to_owned());

        let esi = EsiConfig {
            client_id: var("EVE_CLIENT_ID"),
            client_secret: var("EVE_CLIENT_SECRET"),
            redirect_uri: var("EVE_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_owned()),
            scopes: parse_scopes(var("EVE_SCOPES").as_deref().unwrap_or(DEFAULT_SCOPES)),
            user_agent: var("EVESYNC_USER_AGENT"),
            datasource: DEFAULT_DATASOURCE.to_owned(),
            endpoints,
        };
        esi.validate()?;

        let queue = LocalQueueConfig {
            workers: parse_number("EVESYNC_SYNC_WORKERS", var("EVESYNC_SYNC_WORKERS"))?
                .unwrap_or(DEFAULT_SYNC_WORKERS),
            max_attempts: parse_number(
                "EVESYNC_SYNC_MAX_ATTEMPTS",
                var("EVESYNC_SYNC_MAX_ATTEMPTS"),
            )?
            .unwrap_or(DEFAULT_SYNC_MAX_ATTEMPTS),
            result_ttl: parse_number(
                "EVESYNC_SYNC_RESULT_TTL_SECS",
                var("EVESYNC_SYNC_RESULT_TTL_SECS"),
            )?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SYNC_RESULT_TTL),
            ..LocalQueueConfig::default()
        };
        if queue.workers == 0 || queue.max_attempts == 0 {
            return Err(AppError::Configuration(
                "sync workers and attempts must be at least 1".to_owned(),
            ));
        }

        Ok(Self {
            esi,
            database_path: var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            token_key: var("ESI_TOKEN_KEY"),
            secret_key: var("SECRET_KEY"),
            queue,
        })
    }

    pub fn vault_key(&self) -> Result<(VaultKey, KeySource), AppError> {
        VaultKey::resolve(self.token_key.as_deref(), self.secret_key.as_deref()).map_err(|err| {
            AppError::Configuration(format!("ESI_TOKEN_KEY is not usable: {err}"))
        })
    }
}

/// Splits a scope list on whitespace and commas.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|scope| !scope.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_number<T: std::str::FromStr>(
    name: &str,
    value: Option<String>,
) -> Result<Option<T>, AppError> {
    value
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| {
                AppError::Configuration(format!("{name} must be a positive integer, got '{value}'"))
            })
        })
        .transpose()
}
