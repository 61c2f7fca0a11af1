use crate::common::config::TokenSource;
use crate::common::types::{EtlError, EtlResult};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
// Refresh this long before the metadata server says the token expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Supplies OAuth bearer tokens for the BigQuery API. Metadata server tokens
/// are reused until shortly before they expire.
pub struct AccessTokenProvider {
    source: TokenSource,
    client: ClientWithMiddleware,
    metadata_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub fn new(source: TokenSource) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            source,
            client,
            metadata_url: METADATA_TOKEN_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_metadata_url(mut self, url: &str) -> Self {
        self.metadata_url = url.to_string();
        self
    }

    pub async fn access_token(&self) -> EtlResult<String> {
        match &self.source {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::MetadataServer => {
                let mut cached = self.cached.lock().await;
                if let Some(entry) = cached.as_ref() {
                    if Instant::now() < entry.expires_at {
                        return Ok(entry.token.clone());
                    }
                }

                let token = self.fetch_metadata_token().await?;
                let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
                *cached = Some(CachedToken {
                    token: token.access_token.clone(),
                    expires_at: Instant::now() + lifetime,
                });
                Ok(token.access_token)
            }
        }
    }

    async fn fetch_metadata_token(&self) -> EtlResult<MetadataToken> {
        let response = self
            .client
            .get(&self.metadata_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EtlError::Authentication(format!(
                "metadata server returned {} for access token",
                response.status()
            )));
        }

        let token: MetadataToken = serde_json::from_str(&response.text().await?)?;
        debug!(
            "Fetched access token from metadata server, expires in {}s",
            token.expires_in
        );
        Ok(token)
    }
}
