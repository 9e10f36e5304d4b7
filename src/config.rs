use reqwest::Url;
use std::env;
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:poll_live.db";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Expected {0} in the environment")]
    Missing(&'static str),
    #[error("{name} is not a valid endpoint: {value}")]
    BadEndpoint { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: String,
    pub graphql_endpoint: String,
    pub realtime_endpoint: String,
    pub auth_region: String,
    pub auth_client_id: String,
    pub database_url: String,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let graphql_endpoint = require("GRAPHQL_ENDPOINT")?;
        let realtime_endpoint = match lookup("GRAPHQL_REALTIME_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            Some(explicit) => explicit.trim().to_string(),
            None => realtime_from_graphql(&graphql_endpoint)?,
        };

        Ok(Self {
            api_base_url: require("POLL_API_BASE_URL")?,
            api_key: require("POLL_API_KEY")?,
            graphql_endpoint,
            realtime_endpoint,
            auth_region: require("AUTH_REGION")?,
            auth_client_id: require("AUTH_CLIENT_ID")?,
            database_url: lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
        })
    }

    /// Host of the GraphQL endpoint, sent in the realtime handshake header.
    pub fn graphql_host(&self) -> Result<String, ConfigError> {
        let url = parse_endpoint(&self.graphql_endpoint)?;
        url.host_str()
            .map(str::to_string)
            .ok_or_else(|| bad_endpoint(&self.graphql_endpoint))
    }
}

fn bad_endpoint(value: &str) -> ConfigError {
    ConfigError::BadEndpoint {
        name: "GRAPHQL_ENDPOINT",
        value: value.to_string(),
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
    Url::parse(endpoint).map_err(|_| bad_endpoint(endpoint))
}

// https://x.appsync-api.region.amazonaws.com/graphql -> wss://x.appsync-realtime-api.region.amazonaws.com/graphql
fn realtime_from_graphql(endpoint: &str) -> Result<String, ConfigError> {
    let mut url = parse_endpoint(endpoint)?;
    if url.scheme() != "https" {
        return Err(bad_endpoint(endpoint));
    }

    let host = url
        .host_str()
        .ok_or_else(|| bad_endpoint(endpoint))?
        .replacen("appsync-api", "appsync-realtime-api", 1);
    url.set_host(Some(&host)).map_err(|_| bad_endpoint(endpoint))?;
    url.set_scheme("wss").map_err(|_| bad_endpoint(endpoint))?;
    Ok(url.to_string())
}
