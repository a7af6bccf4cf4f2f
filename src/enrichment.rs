use crate::cache::Cache;
use crate::catalog::{CatalogApi, CatalogLookup};
use crate::constants;
use crate::dispatcher::CrawlDispatcher;
use crate::error::Result;
use crate::resolver::UrlResolver;
use crate::staleness::{needs_catalog_enrichment, needs_category_enrichment};
use crate::store::{BookRecord, BookStore, CatalogFields};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Request-triggered enrichment orchestration. Each inbound request
/// evaluates the staleness predicates and may run the catalog or
/// category pipeline inline; there is no scheduler and no queue. All
/// collaborators are injected trait objects so tests can count calls.
pub struct Enricher {
    store: Arc<dyn BookStore>,
    cache: Arc<dyn Cache>,
    catalog: Arc<dyn CatalogApi>,
    resolver: Arc<dyn UrlResolver>,
    /// `None` when the task-runner integration is unconfigured; category
    /// enrichment then degrades to a skipped no-op.
    dispatcher: Option<Arc<dyn CrawlDispatcher>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CatalogOutcome {
    /// Record already fully enriched; nothing fetched.
    Skipped { record: BookRecord },
    Enriched {
        cache_hit: bool,
        catalog: Option<CatalogFields>,
        record: BookRecord,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryOutcome {
    /// Category present or an attempt is still inside the 24h window.
    Skipped,
    /// No retailer URL could be resolved; dispatch was not attempted.
    Unresolved,
    /// Task-runner credentials missing; category enrichment disabled.
    NotConfigured,
    /// Crawl submitted; the webhook will deliver the result later.
    Queued { run_id: String },
}

impl Enricher {
    pub fn new(
        store: Arc<dyn BookStore>,
        cache: Arc<dyn Cache>,
        catalog: Arc<dyn CatalogApi>,
        resolver: Arc<dyn UrlResolver>,
        dispatcher: Option<Arc<dyn CrawlDispatcher>>,
    ) -> Self {
        Self {
            store,
            cache,
            catalog,
            resolver,
            dispatcher,
        }
    }

    /// Catalog pipeline: staleness check, 24h cache, bounded API call,
    /// upsert. Upstream failures degrade to "no data this time"; only
    /// store failures propagate.
    #[instrument(skip(self))]
    pub async fn enrich_catalog(&self, isbn13: &str) -> Result<CatalogOutcome> {
        let existing = self.store.get_by_isbn(isbn13).await?;
        if !needs_catalog_enrichment(existing.as_ref()) {
            // unwrap is safe: the predicate is always true for None
            return Ok(CatalogOutcome::Skipped {
                record: existing.unwrap(),
            });
        }

        let cache_key = constants::catalog_cache_key(isbn13);
        let mut cache_hit = false;
        let mut normalized: Option<CatalogFields> = None;

        match self.cache.get(&cache_key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Option<CatalogFields>>(&cached) {
                Ok(fields) => {
                    normalized = fields;
                    cache_hit = true;
                }
                Err(e) => warn!("Catalog cache entry unreadable for {}: {}", isbn13, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Catalog cache read failed for {}: {}", isbn13, e),
        }

        if !cache_hit {
            match self.catalog.lookup(isbn13).await? {
                CatalogLookup::Unavailable => {
                    // Transient upstream trouble is never cached as an
                    // answer; a future request may retry right away.
                }
                lookup => {
                    normalized = lookup.fields();
                    // Cache the explicit null too, so repeated misses don't
                    // hammer the API within the TTL.
                    let serialized = serde_json::to_string(&normalized)?;
                    if let Err(e) = self
                        .cache
                        .set(
                            &cache_key,
                            &serialized,
                            Duration::from_secs(constants::CATALOG_CACHE_TTL_SECS),
                        )
                        .await
                    {
                        warn!("Catalog cache write failed for {}: {}", isbn13, e);
                    }
                }
            }
        }

        let record = self
            .store
            .merge_catalog_fields(isbn13, normalized.clone())
            .await?;

        Ok(CatalogOutcome::Enriched {
            cache_hit,
            catalog: normalized,
            record,
        })
    }

    /// Category pipeline: staleness check, URL resolution (skipped once a
    /// trusted URL exists), crawl dispatch, attempt stamp. Dispatch
    /// errors propagate so the endpoint can answer 502.
    #[instrument(skip(self))]
    pub async fn enrich_category(&self, isbn13: &str) -> Result<CategoryOutcome> {
        let record = self.store.ensure_stub(isbn13).await?;
        if !needs_category_enrichment(Some(&record), Utc::now()) {
            return Ok(CategoryOutcome::Skipped);
        }

        // A previously resolved URL is trusted; re-resolution only happens
        // while it is null.
        let target_url = match record.retailer_url.clone() {
            Some(url) => Some(url),
            None => {
                let resolved = self.resolver.resolve(isbn13).await?;
                if let Some(url) = &resolved {
                    // Persist immediately so the expensive resolution is not
                    // repeated even if dispatch fails below.
                    if let Err(e) = self.store.merge_retailer_url(isbn13, url).await {
                        warn!("Retailer URL upsert failed for {}: {}", isbn13, e);
                    }
                }
                resolved
            }
        };

        let Some(target_url) = target_url else {
            return Ok(CategoryOutcome::Unresolved);
        };

        let Some(dispatcher) = &self.dispatcher else {
            info!("Crawl integration unconfigured; skipping dispatch for {}", isbn13);
            return Ok(CategoryOutcome::NotConfigured);
        };

        let run_id = dispatcher.dispatch(isbn13, &target_url).await?;

        // Dispatch counts as the fetch attempt: suppresses re-dispatch for
        // the staleness window even if the webhook never arrives.
        self.store.touch_category_fetch(isbn13).await?;

        Ok(CategoryOutcome::Queued { run_id })
    }
}
