use crate::constants;
use std::env;

/// Service configuration, loaded once from the environment at startup and
/// passed explicitly to the components that need it. Credentials have no
/// defaults: a missing webhook secret disables the webhook with a hard
/// 500 rather than silently accepting unauthenticated calls, and missing
/// task-runner credentials degrade category enrichment to a no-op while
/// the rest of the service keeps working.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret the crawler must echo back in its webhook calls.
    pub webhook_secret: Option<String>,
    /// Bearer key for the catalog lookup API.
    pub catalog_api_key: Option<String>,
    /// Task-runner API token and the id of the scrape task to run.
    pub crawler_token: Option<String>,
    pub crawler_task_id: Option<String>,

    pub catalog_api_url: String,
    pub autocomplete_url: String,
    pub product_url_prefix: String,
    pub search_detail_url_prefix: String,
    pub crawler_api_url: String,

    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            webhook_secret: non_empty(env::var("BOOKS_WEBHOOK_SECRET").ok()),
            catalog_api_key: non_empty(env::var("CATALOG_API_KEY").ok()),
            crawler_token: non_empty(env::var("CRAWLER_API_TOKEN").ok()),
            crawler_task_id: non_empty(env::var("CRAWLER_TASK_ID").ok()),
            catalog_api_url: env_or("CATALOG_API_URL", constants::CATALOG_API_URL),
            autocomplete_url: env_or("AUTOCOMPLETE_URL", constants::AUTOCOMPLETE_URL),
            product_url_prefix: env_or("PRODUCT_URL_PREFIX", constants::PRODUCT_URL_PREFIX),
            search_detail_url_prefix: env_or(
                "SEARCH_DETAIL_URL_PREFIX",
                constants::SEARCH_DETAIL_URL_PREFIX,
            ),
            crawler_api_url: env_or("CRAWLER_API_URL", constants::CRAWLER_API_URL),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
        }
    }

    /// Category enrichment requires both task-runner credentials.
    pub fn crawl_configured(&self) -> bool {
        self.crawler_token.is_some() && self.crawler_task_id.is_some()
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
