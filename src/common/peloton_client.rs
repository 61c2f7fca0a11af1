use crate::common::metrics;
use crate::common::types::{EtlError, EtlResult};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username_or_email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoginResponse {
    pub user_id: String,
    pub user_data: Option<LoginUserData>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoginUserData {
    pub cycling_ftp: Option<i64>,
    pub email: Option<String>,
    pub last_workout_at: Option<i64>,
    pub name: Option<String>,
    pub total_workouts: Option<u32>,
}

/// Session-holding client for the Peloton API. Login stores the session
/// cookie, which the cookie store replays on every later request.
pub struct PelotonClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl PelotonClient {
    pub fn new(base_url: &str) -> EtlResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("peloton"));

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        // Create client with retry middleware
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> EtlResult<LoginResponse> {
        let url = format!("{}/auth/login", self.base_url);
        let body = serde_json::to_vec(&LoginRequest {
            username_or_email: username,
            password,
        })?;

        let response = self
            .client
            .post(url)
            .body(body)
            .send()
            .await
            .inspect_err(|_e| {
                metrics::increment_peloton_api_failure();
            })?;

        if !response.status().is_success() {
            metrics::increment_peloton_api_failure();
            error!(
                "Failed to login using {} (status {})",
                username,
                response.status()
            );
            return Err(EtlError::Authentication(format!(
                "Failed to login using {username}"
            )));
        }

        let response_text = response.text().await.inspect_err(|_e| {
            metrics::increment_peloton_api_failure();
        })?;

        let login: LoginResponse = serde_json::from_str(&response_text).inspect_err(|_e| {
            metrics::increment_peloton_api_failure();
        })?;

        metrics::increment_peloton_api_success();
        info!("Successfully logged in as {}", username);
        Ok(login)
    }

    /// GET `path` (relative to the base URL) and decode the JSON body.
    /// `what` names the resource in errors and logs.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> EtlResult<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.get(url).send().await.inspect_err(|_e| {
            metrics::increment_peloton_api_failure();
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics::increment_peloton_api_failure();
            error!("Failed to fetch {} (status {})", what, status);
            return Err(EtlError::Http {
                status,
                what: what.to_string(),
            });
        }

        let response_text = response.text().await.inspect_err(|_e| {
            metrics::increment_peloton_api_failure();
        })?;

        let value: T = serde_json::from_str(&response_text).inspect_err(|e| {
            metrics::increment_peloton_api_failure();
            error!("Failed to parse {}: {}", what, e);
        })?;

        metrics::increment_peloton_api_success();
        debug!("Successfully fetched {}", what);
        Ok(value)
    }
}
