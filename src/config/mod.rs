//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Credentials wrapped in secrecy::SecretString to prevent log leaks.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};
use crate::queue::PollPolicy;

#[derive(Debug)]
pub struct Config {
    /// `None` when no Postgres credentials are configured.
    pub database_url: Option<SecretString>,
    pub poll: PollPolicy,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `DATABASE_URL` wins if set; otherwise the URL is assembled from
    /// `SCRAPEQ_DB_USERNAME`, `SCRAPEQ_DB_PASSWORD`, `SCRAPEQ_DB_HOST`
    /// and `SCRAPEQ_DB_NAME`. A username without a password is an error.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let database_url = match (
            optional_var("DATABASE_URL"),
            optional_var("SCRAPEQ_DB_USERNAME"),
        ) {
            (Some(url), _) => Some(SecretString::from(url)),
            (None, Some(username)) => Some(database_url_from_parts(
                &username,
                &SecretString::from(required_var("SCRAPEQ_DB_PASSWORD")?),
                &optional_var("SCRAPEQ_DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                &optional_var("SCRAPEQ_DB_NAME").unwrap_or_else(|| "scrapeq".to_string()),
            )),
            (None, None) => None,
        };

        let defaults = PollPolicy::default();
        let poll = PollPolicy::exponential(
            parsed_var("SCRAPEQ_POLL_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            parsed_var("SCRAPEQ_POLL_BASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            parsed_var("SCRAPEQ_POLL_MAX_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        );

        Ok(Self {
            database_url,
            poll,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// The Postgres URL, or a config error naming what to set.
    pub fn database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config(
                "set DATABASE_URL, or SCRAPEQ_DB_USERNAME and SCRAPEQ_DB_PASSWORD".to_string(),
            )
        })
    }
}

/// Postgres URL for the given credentials.
pub fn database_url_from_parts(
    username: &str,
    password: &SecretString,
    host: &str,
    database: &str,
) -> SecretString {
    SecretString::from(format!(
        "postgres://{username}:{}@{host}/{database}",
        password.expose_secret()
    ))
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_var(name)
        .map(|raw| {
            raw.parse()
                .map_err(|e| Error::Config(format!("{name}={raw} is invalid: {e}")))
        })
        .transpose()
}
