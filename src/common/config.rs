use crate::common::types::{EtlError, EtlResult};
use std::env;
use std::fmt;

pub const DEFAULT_PELOTON_BASE_URL: &str = "https://api.onepeloton.com";
pub const DEFAULT_BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com";
pub const DEFAULT_FETCH_CONCURRENCY: usize = 5;

/// Where the Peloton password comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum PasswordSource {
    Plain(String),
    SecretsManager { secret_arn: String },
}

impl fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordSource::Plain(_) => f.write_str("Plain(<redacted>)"),
            PasswordSource::SecretsManager { secret_arn } => f
                .debug_struct("SecretsManager")
                .field("secret_arn", secret_arn)
                .finish(),
        }
    }
}

/// Where BigQuery access tokens come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Static(String),
    MetadataServer,
}

#[derive(Debug, Clone)]
pub struct PelotonConfig {
    pub username: String,
    pub password: PasswordSource,
    pub base_url: String,
    pub fetch_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset: String,
    pub token: TokenSource,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub peloton: PelotonConfig,
    pub warehouse: WarehouseConfig,
}

fn required<F>(lookup: &F, key: &str) -> EtlResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EtlError::Configuration(format!("{key} environment variable not set")))
}

impl PelotonConfig {
    pub fn from_env() -> EtlResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> EtlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let password = match (lookup("PELOTON_PASSWORD"), lookup("PELOTON_PASSWORD_SECRET_ARN")) {
            (Some(password), _) if !password.is_empty() => PasswordSource::Plain(password),
            (_, Some(secret_arn)) if !secret_arn.is_empty() => {
                PasswordSource::SecretsManager { secret_arn }
            }
            _ => {
                return Err(EtlError::Configuration(
                    "either PELOTON_PASSWORD or PELOTON_PASSWORD_SECRET_ARN must be set".to_string(),
                ));
            }
        };

        let fetch_concurrency = match lookup("PELOTON_FETCH_CONCURRENCY") {
            Some(raw) => raw.parse::<usize>().map(|n| n.max(1)).map_err(|e| {
                EtlError::Configuration(format!("invalid PELOTON_FETCH_CONCURRENCY '{raw}': {e}"))
            })?,
            None => DEFAULT_FETCH_CONCURRENCY,
        };

        Ok(Self {
            username: required(&lookup, "PELOTON_USERNAME")?,
            password,
            base_url: lookup("PELOTON_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PELOTON_BASE_URL.to_string()),
            fetch_concurrency,
        })
    }
}

impl WarehouseConfig {
    pub fn from_lookup<F>(lookup: F) -> EtlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = match lookup("GOOGLE_ACCESS_TOKEN") {
            Some(token) if !token.is_empty() => TokenSource::Static(token),
            _ => TokenSource::MetadataServer,
        };

        Ok(Self {
            project_id: required(&lookup, "BIGQUERY_PROJECT_ID")?,
            dataset: required(&lookup, "BIGQUERY_DATASET")?,
            token,
            base_url: lookup("BIGQUERY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BIGQUERY_BASE_URL.to_string()),
        })
    }
}

impl Config {
    pub fn from_env() -> EtlResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> EtlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            peloton: PelotonConfig::from_lookup(&lookup)?,
            warehouse: WarehouseConfig::from_lookup(&lookup)?,
        })
    }
}
