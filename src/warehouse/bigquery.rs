use super::token::AccessTokenProvider;
use super::{LoadOutcome, TableSchema, Warehouse};
use crate::common::types::{EtlError, EtlResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MULTIPART_BOUNDARY: &str = "peloton_warehouse_load_boundary";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLLS: u32 = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: Option<JobReference>,
    status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

/// BigQuery load jobs over the REST API: a multipart upload of NDJSON rows,
/// then polling the job until it reports `DONE`.
pub struct BigQueryWarehouse {
    client: ClientWithMiddleware,
    tokens: AccessTokenProvider,
    base_url: String,
    project_id: String,
    dataset: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl BigQueryWarehouse {
    /// `dataset` may be qualified as `project.dataset`, in which case the
    /// destination project differs from the project running the job.
    pub fn new(base_url: &str, project_id: &str, dataset: &str, tokens: AccessTokenProvider) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            dataset: dataset.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    fn destination(&self, table: &str) -> serde_json::Value {
        let (project, dataset) = match self.dataset.split_once('.') {
            Some((project, dataset)) => (project, dataset),
            None => (self.project_id.as_str(), self.dataset.as_str()),
        };
        json!({
            "projectId": project,
            "datasetId": dataset,
            "tableId": table,
        })
    }

    fn job_configuration(&self, job_id: &str, schema: &TableSchema) -> serde_json::Value {
        json!({
            "jobReference": {
                "projectId": self.project_id,
                "jobId": job_id,
            },
            "configuration": {
                "load": {
                    "destinationTable": self.destination(schema.table),
                    "schema": schema.to_bigquery_json(),
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "writeDisposition": schema.write_disposition,
                    "createDisposition": "CREATE_IF_NEEDED",
                }
            }
        })
    }

    fn multipart_body(configuration: &serde_json::Value, ndjson: &[u8]) -> EtlResult<Vec<u8>> {
        let mut body = Vec::with_capacity(ndjson.len() + 1024);
        body.extend_from_slice(
            format!("--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n")
                .as_bytes(),
        );
        serde_json::to_writer(&mut body, configuration)?;
        body.extend_from_slice(
            format!("\r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: application/octet-stream\r\n\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(ndjson);
        body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
        Ok(body)
    }

    async fn insert_job(&self, job_id: &str, schema: &TableSchema, ndjson: &[u8]) -> EtlResult<Job> {
        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.base_url, self.project_id
        );
        let body = Self::multipart_body(&self.job_configuration(job_id, schema), ndjson)?;
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;

        let status = response.status();
        // A retried insert finds the job the first attempt already created
        if status == StatusCode::CONFLICT {
            warn!("Load job {} already exists, resuming it", job_id);
            return self.get_job(job_id, None).await;
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Load job insert for {} failed with {}: {}", schema.table, status, detail);
            return Err(EtlError::Http {
                status,
                what: format!("load job for table {}", schema.table),
            });
        }

        Ok(serde_json::from_str(&response.text().await?)?)
    }

    async fn get_job(&self, job_id: &str, location: Option<&str>) -> EtlResult<Job> {
        let mut url = format!(
            "{}/bigquery/v2/projects/{}/jobs/{}",
            self.base_url, self.project_id, job_id
        );
        if let Some(location) = location {
            url.push_str(&format!("?location={location}"));
        }
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Http {
                status,
                what: format!("load job {job_id}"),
            });
        }

        Ok(serde_json::from_str(&response.text().await?)?)
    }

    /// Block until the job is done, like `job.result()` in the client SDKs.
    async fn wait_for_job(&self, job_id: &str, mut job: Job) -> EtlResult<()> {
        let location = job
            .job_reference
            .as_ref()
            .and_then(|r| r.location.clone());

        for _ in 0..self.max_polls {
            if let Some(status) = &job.status {
                if status.state == "DONE" {
                    if let Some(error_result) = &status.error_result {
                        return Err(EtlError::LoadJob {
                            job_id: job_id.to_string(),
                            message: format!(
                                "{}: {}",
                                error_result.reason.as_deref().unwrap_or("unknown"),
                                error_result.message.as_deref().unwrap_or("no message")
                            ),
                        });
                    }
                    return Ok(());
                }
                debug!("Load job {} is {}", job_id, status.state);
            }

            tokio::time::sleep(self.poll_interval).await;
            job = self.get_job(job_id, location.as_deref()).await?;
        }

        Err(EtlError::LoadJob {
            job_id: job_id.to_string(),
            message: format!("not done after {} polls", self.max_polls),
        })
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn load(
        &self,
        schema: &TableSchema,
        ndjson: Vec<u8>,
        row_count: usize,
    ) -> EtlResult<LoadOutcome> {
        let job_id = format!("peloton_{}_{}", schema.table, uuid::Uuid::new_v4().simple());
        info!(
            "Starting load job {} for {} rows into {}.{}",
            job_id, row_count, self.dataset, schema.table
        );

        let job = self.insert_job(&job_id, schema, &ndjson).await?;
        self.wait_for_job(&job_id, job).await?;

        Ok(LoadOutcome {
            table: schema.table.to_string(),
            job_id: Some(job_id),
            rows: row_count,
        })
    }
}
