use crate::error::{EnricherError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Crawl dispatch: submits an asynchronous scrape job for a resolved
/// retailer URL to the external task runner. The runner reports back via
/// the webhook sometime later; nothing here waits for it.
#[async_trait]
pub trait CrawlDispatcher: Send + Sync {
    /// Start a crawl run. Returns the runner's opaque run id (used only
    /// for logging). Non-2xx answers surface as `Dispatch` errors so the
    /// caller can map them to a 502.
    async fn dispatch(&self, isbn13: &str, target_url: &str) -> Result<String>;
}

/// Follow-up lookups against the task runner, used when a webhook
/// arrives without an inline item. All failures are soft: the webhook
/// answers 202 and the vendor retries.
#[async_trait]
pub trait TaskRunnerApi: Send + Sync {
    /// Resolve a run id to its default dataset id.
    async fn run_dataset_id(&self, run_id: &str) -> Option<String>;
    /// Fetch the first item of a dataset's output.
    async fn dataset_first_item(&self, dataset_id: &str) -> Option<Value>;
}

pub struct TaskRunnerClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    task_id: Option<String>,
    webhook_secret: Option<String>,
}

impl TaskRunnerClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        task_id: Option<String>,
        webhook_secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            task_id,
            webhook_secret,
        })
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (&self.token, &self.task_id) {
            (Some(token), Some(task_id)) => Ok((token, task_id)),
            _ => Err(EnricherError::Config(
                "task-runner token or task id not configured".into(),
            )),
        }
    }
}

#[async_trait]
impl CrawlDispatcher for TaskRunnerClient {
    #[instrument(skip(self, target_url))]
    async fn dispatch(&self, isbn13: &str, target_url: &str) -> Result<String> {
        let (token, task_id) = self.credentials()?;

        let endpoint = format!(
            "{}/v2/actor-tasks/{}/runs?waitForFinish=0&token={}",
            self.base_url, task_id, token
        );
        let body = json!({
            "input": {
                "startUrls": [{ "url": target_url }],
                "isbn13": isbn13,
                "webhook_secret": self.webhook_secret,
            }
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnricherError::Upstream(format!("task-runner unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnricherError::Dispatch {
                status: status.as_u16(),
                body,
            });
        }

        let descriptor: Value = response.json().await.unwrap_or(Value::Null);
        let run_id = descriptor
            .get("data")
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        info!("Dispatched crawl run {} for {}", run_id, isbn13);
        Ok(run_id)
    }
}

#[async_trait]
impl TaskRunnerApi for TaskRunnerClient {
    async fn run_dataset_id(&self, run_id: &str) -> Option<String> {
        let token = self.token.as_deref()?;
        let endpoint = format!("{}/v2/actor-runs/{}?token={}", self.base_url, run_id, token);

        let response = match self.client.get(&endpoint).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("Run lookup for {} answered {}", run_id, r.status());
                return None;
            }
            Err(e) => {
                warn!("Run lookup for {} failed: {}", run_id, e);
                return None;
            }
        };

        let data: Value = response.json().await.ok()?;
        data.get("data")
            .and_then(|d| d.get("defaultDatasetId"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    async fn dataset_first_item(&self, dataset_id: &str) -> Option<Value> {
        let token = self.token.as_deref()?;
        let endpoint = format!(
            "{}/v2/datasets/{}/items?clean=true&format=json&limit=1&token={}",
            self.base_url, dataset_id, token
        );

        let response = match self.client.get(&endpoint).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("Dataset fetch for {} answered {}", dataset_id, r.status());
                return None;
            }
            Err(e) => {
                warn!("Dataset fetch for {} failed: {}", dataset_id, e);
                return None;
            }
        };

        let items: Value = response.json().await.ok()?;
        items.as_array().and_then(|a| a.first()).cloned()
    }
}
