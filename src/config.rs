use crate::homie;
use crate::models::ConnectOptions;
use crate::query;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Message shown when the dashboard URL lacks a broker address.
pub const MISSING_HOST_OR_PORT: &str =
    "Please provide query arguments \"host\" and \"port\" to the MQTT server";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub dashboard_url: String,
    pub client_id_prefix: String,
    pub mqtt_keep_alive_secs: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Please provide query arguments \"host\" and \"port\" to the MQTT server")]
    MissingHostOrPort,
    #[error("Query argument \"port\" must be a valid TCP port, got {0:?}")]
    InvalidPort(String),
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

impl Config {
    fn validate_keep_alive(&self) -> Result<(), ConfigError> {
        const MIN_KEEP_ALIVE: u64 = 5;
        const MAX_KEEP_ALIVE: u64 = 3600;

        if !(MIN_KEEP_ALIVE..=MAX_KEEP_ALIVE).contains(&self.mqtt_keep_alive_secs) {
            return Err(ConfigError::ParsingError(format!(
                "MQTT_KEEP_ALIVE_SECS must be between {} and {} seconds",
                MIN_KEEP_ALIVE, MAX_KEEP_ALIVE
            )));
        }

        Ok(())
    }

    /// Build the configuration from `.env`, the environment and an optional
    /// dashboard URL given on the command line.
    pub fn from_env(url_override: Option<String>) -> Result<Self, ConfigError> {
        dotenv().ok();

        let dashboard_url = match url_override {
            Some(url) => url,
            None => env::var("DASHBOARD_URL")
                .map_err(|_| ConfigError::MissingOrInvalid("DASHBOARD_URL".to_string()))?,
        };

        let config = Self {
            dashboard_url: normalize_url(dashboard_url),
            client_id_prefix: env::var("DASHBOARD_CLIENT_ID")
                .unwrap_or_else(|_| "homie-dash".to_string()),
            mqtt_keep_alive_secs: env::var("MQTT_KEEP_ALIVE_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::ParsingError("MQTT_KEEP_ALIVE_SECS must be a valid number".to_string())
                })?,
        };

        config.validate_keep_alive()?;

        Ok(config)
    }
}

/// A bare `host=..&port=..` query is accepted as well as a full URL.
fn normalize_url(url: String) -> String {
    if url.contains('?') {
        url
    } else {
        format!("?{}", url)
    }
}

/// Broker and device parameters read once from the dashboard URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub device: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
    pub all: bool,
}

impl ConnectionParams {
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| query::parameter(url, name).filter(|v| !v.is_empty());

        let (host, port) = match (non_empty("host"), non_empty("port")) {
            (Some(host), Some(port)) => (host, port),
            _ => return Err(ConfigError::MissingHostOrPort),
        };
        let port = match port.trim().parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => return Err(ConfigError::InvalidPort(port)),
        };

        Ok(Self {
            host,
            port,
            device: non_empty("device"),
            user: non_empty("user"),
            password: non_empty("password"),
            use_ssl: non_empty("useSSL").is_some(),
            all: non_empty("all").is_some(),
        })
    }

    /// Options for the broker connection. The password only travels with a user.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.user.as_ref().and(self.password.clone()),
            use_ssl: self.use_ssl,
        }
    }

    pub fn subscriptions(&self) -> &'static [&'static str] {
        if self.all {
            &[homie::WILDCARD_FILTER]
        } else {
            &homie::DEFAULT_FILTERS
        }
    }
}
