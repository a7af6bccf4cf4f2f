use crate::error::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Retailer URL resolution: ISBN in, validated product-page URL out.
///
/// The accurate path is an undocumented autocomplete endpoint that
/// answers JSONP and resolves the ISBN to the retailer's internal sale
/// id. Because it is fragile, every candidate URL (autocomplete-derived
/// or guessed) is liveness-checked with HEAD, then GET, before being
/// trusted; a constructed URL that 404s would make the crawler waste a
/// run.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, isbn13: &str) -> Result<Option<String>>;
}

/// Minimal HTTP surface the resolver needs, kept as a trait so tests can
/// script responses and count probes.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// GET a text body; `None` on timeout, network error or non-2xx.
    async fn get_text(&self, url: &str) -> Option<String>;
    /// True when the request completes with a 2xx status.
    async fn probe(&self, url: &str, method: Method) -> bool;
}

pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeClient for ReqwestProbe {
    async fn get_text(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(res) if res.status().is_success() => res.text().await.ok(),
            Ok(res) => {
                debug!("GET {} answered {}", url, res.status());
                None
            }
            Err(e) => {
                if !e.is_timeout() {
                    warn!("GET {} failed: {}", url, e);
                }
                None
            }
        }
    }

    async fn probe(&self, url: &str, method: Method) -> bool {
        match self.client.request(method.clone(), url).send().await {
            Ok(res) => res.status().is_success(),
            Err(e) => {
                if !e.is_timeout() {
                    warn!("{} {} failed: {}", method, url, e);
                }
                false
            }
        }
    }
}

pub struct RetailerUrlResolver {
    probe: Box<dyn ProbeClient>,
    autocomplete_url: String,
    product_url_prefix: String,
    search_detail_url_prefix: String,
}

static JSONP_RE: Lazy<Regex> = Lazy::new(|| {
    // Any callback identifier wrapping the JSON body, optional trailing ';'
    Regex::new(r"(?s)^[A-Za-z_$][\w$]*\s*\((.*)\)\s*;?\s*$").unwrap()
});

/// Strip the `identifier(...)` JSONP envelope and parse the inner JSON.
/// Anything that does not match is treated as "no match", never an error.
pub fn parse_jsonp(body: &str) -> Option<Value> {
    let captures = JSONP_RE.captures(body.trim())?;
    serde_json::from_str(captures.get(1)?.as_str()).ok()
}

impl RetailerUrlResolver {
    pub fn new(
        probe: Box<dyn ProbeClient>,
        autocomplete_url: &str,
        product_url_prefix: &str,
        search_detail_url_prefix: &str,
    ) -> Self {
        Self {
            probe,
            autocomplete_url: autocomplete_url.to_string(),
            product_url_prefix: product_url_prefix.to_string(),
            search_detail_url_prefix: search_detail_url_prefix.to_string(),
        }
    }

    /// HEAD first, GET as the fallback; some retailer frontends reject
    /// HEAD outright.
    async fn validates(&self, url: &str) -> bool {
        if self.probe.probe(url, Method::HEAD).await {
            return true;
        }
        self.probe.probe(url, Method::GET).await
    }

    async fn resolve_from_autocomplete(&self, isbn13: &str) -> Option<String> {
        let endpoint = format!(
            "{}?callback=autocompleteShop&keyword={}",
            self.autocomplete_url, isbn13
        );
        let body = self.probe.get_text(&endpoint).await?;
        let parsed = parse_jsonp(&body)?;

        let documents = parsed
            .get("data")
            .and_then(|d| d.get("resultDocuments"))
            .and_then(Value::as_array)?;
        if documents.is_empty() {
            return None;
        }

        // Prefer the exact catalog-code match; otherwise take the first hit.
        let doc = documents
            .iter()
            .find(|d| {
                d.get("CMDTCODE")
                    .and_then(Value::as_str)
                    .map(|c| c.trim() == isbn13)
                    .unwrap_or(false)
            })
            .unwrap_or(&documents[0]);

        let sale_id = doc
            .get("SALE_CMDTID")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        debug!("Autocomplete resolved sale id {} for {}", sale_id, isbn13);

        let url = format!("{}{}", self.product_url_prefix, sale_id);
        if self.validates(&url).await {
            Some(url)
        } else {
            None
        }
    }
}

#[async_trait]
impl UrlResolver for RetailerUrlResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, isbn13: &str) -> Result<Option<String>> {
        if let Some(url) = self.resolve_from_autocomplete(isbn13).await {
            return Ok(Some(url));
        }

        // Guessed patterns: direct detail page by ISBN, then search detail.
        let candidates = [
            format!("{}{}", self.product_url_prefix, isbn13),
            format!("{}{}", self.search_detail_url_prefix, isbn13),
        ];
        for candidate in candidates {
            if self.validates(&candidate).await {
                debug!("Fallback URL validated for {}: {}", isbn13, candidate);
                return Ok(Some(candidate));
            }
        }

        warn!("No retailer URL resolvable for {}", isbn13);
        Ok(None)
    }
}
