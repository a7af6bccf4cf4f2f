use crate::cache::Cache;
use crate::constants;
use crate::dispatcher::TaskRunnerApi;
use crate::extract;
use crate::isbn::normalize_to_isbn13;
use crate::store::{BookStore, CategoryFields};
use axum::http::{HeaderMap, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Webhook ingestion: the crawler's asynchronous callback, decoupled in
/// time from whatever request dispatched the crawl. Stateless per
/// invocation: authenticate, parse, resolve the scraped item (inline or
/// via a run/dataset follow-up), normalize, persist, invalidate.
pub struct WebhookContext {
    pub secret: Option<String>,
    pub store: Arc<dyn BookStore>,
    pub cache: Arc<dyn Cache>,
    /// Needed only for webhooks that carry a run reference instead of an
    /// inline item; `None` when the task-runner integration is off.
    pub task_runner: Option<Arc<dyn TaskRunnerApi>>,
}

/// Candidate keys, in priority order, for each logical field of the
/// vendor payload. The payload shape is not under our control; these
/// lists are the one place that knowledge lives.
const ISBN_KEYS: [&str; 4] = ["isbn13", "isbn", "ISBN13", "ISBN"];
const URL_KEYS: [&str; 5] = ["retailer_url", "retailerUrl", "kyobo_url", "kyoboUrl", "url"];
const CATEGORY_KEYS: [&str; 5] = [
    "breadcrumbs",
    "breadcrumb",
    "categoryPath",
    "category",
    "categories",
];
const SCRAPED_AT_KEYS: [&str; 4] = ["scraped_at", "scrapedAt", "last_updated", "lastUpdated"];
const DATASET_KEYS: [&str; 2] = ["defaultDatasetId", "datasetId"];
const RUN_KEYS: [&str; 2] = ["runId", "run_id"];
/// Accepted only inside a `resource`-style envelope, where the task
/// runner's run object names its own id plain `id`. A bare top-level `id`
/// is too common in scraped items to treat as a run reference.
const ENVELOPE_RUN_KEYS: [&str; 1] = ["id"];

enum ResolvedItem {
    Inline(Value),
    Pending,
}

/// Process one webhook delivery. Returns the status and JSON body to
/// answer with; the route layer adds the no-store caching directive.
#[instrument(skip_all)]
pub async fn process(ctx: &WebhookContext, headers: &HeaderMap, body: &[u8]) -> (StatusCode, Value) {
    // 1. Authenticate.
    let Some(secret) = &ctx.secret else {
        error!("Webhook secret not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "server misconfigured"}),
        );
    };
    let provided = constants::WEBHOOK_SECRET_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != secret {
        warn!("Unauthorized webhook attempt");
        return (StatusCode::UNAUTHORIZED, json!({"error": "unauthorized"}));
    }

    // 2. Parse.
    let parsed: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!("Webhook body is not valid JSON: {}", e);
            return (StatusCode::BAD_REQUEST, json!({"error": "invalid json"}));
        }
    };

    // 3. Unwrap envelopes and resolve the scraped item.
    let Some(payload) = extract::unwrap_envelope(&parsed) else {
        warn!("Webhook body carries no object payload");
        return (StatusCode::BAD_REQUEST, json!({"error": "missing payload"}));
    };
    let enveloped = parsed
        .as_object()
        .map(|obj| ["payload", "data", "resource"].iter().any(|k| obj.contains_key(*k)))
        .unwrap_or(false);

    let item = match resolve_item(ctx, headers, payload, enveloped).await {
        ResolvedItem::Inline(item) => item,
        ResolvedItem::Pending => {
            info!("Crawl output not available yet; acknowledging as pending");
            return (StatusCode::ACCEPTED, json!({"status": "pending"}));
        }
    };
    let Some(item_obj) = item.as_object() else {
        return (StatusCode::ACCEPTED, json!({"status": "pending"}));
    };

    // 4. Extract and validate the ISBN. The vendor sends synthetic test
    // events without one; those are acknowledged, never errored.
    let isbn13 = extract::first_string(item_obj, &ISBN_KEYS).and_then(|s| normalize_to_isbn13(&s));
    let Some(isbn13) = isbn13 else {
        info!("Webhook without usable ISBN (likely a test event)");
        return (StatusCode::OK, json!({"ok": true, "note": "test event received"}));
    };

    // 5. Normalize the optional fields.
    let retailer_url = extract::first_string(item_obj, &URL_KEYS);
    let category = extract::first_string_array(item_obj, &CATEGORY_KEYS);
    let scraped_at = extract::first_timestamp(item_obj, &SCRAPED_AT_KEYS);
    info!(
        "Webhook for {}: url={:?} category={:?}",
        isbn13, retailer_url, category
    );

    // 6. Persist: raw payload first (full fidelity), then the normalized
    // merge. A payload without a category must not clear a known one;
    // the store's merge semantics guarantee that.
    let persisted = async {
        ctx.store
            .replace_raw_payload(&isbn13, item.clone(), scraped_at)
            .await?;
        ctx.store
            .merge_category_fields(
                &isbn13,
                CategoryFields {
                    retailer_url,
                    category,
                },
            )
            .await
    }
    .await;
    if let Err(e) = persisted {
        error!("Store update failed for {}: {}", isbn13, e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "store error"}),
        );
    }

    // 7. Best-effort downstream invalidation.
    if let Err(e) = ctx.cache.invalidate(&constants::book_cache_tag(&isbn13)).await {
        warn!("Cache invalidation failed for {}: {}", isbn13, e);
    }

    // 8. Done.
    (StatusCode::OK, json!({"status": "ok"}))
}

/// The crawler may deliver the item inline, or only a dataset/run
/// reference requiring a follow-up fetch. Lookup failures are `Pending`:
/// the vendor retries webhooks, so a transient miss must not become a
/// permanent error.
async fn resolve_item(
    ctx: &WebhookContext,
    headers: &HeaderMap,
    payload: &serde_json::Map<String, Value>,
    enveloped: bool,
) -> ResolvedItem {
    // Inline item: any recognizable ISBN field short-circuits the lookup.
    if ISBN_KEYS.iter().any(|k| payload.contains_key(*k)) {
        return ResolvedItem::Inline(Value::Object(payload.clone()));
    }

    let dataset_id = extract::first_string(payload, &DATASET_KEYS);
    let run_id = extract::first_string(payload, &RUN_KEYS)
        .or_else(|| {
            if enveloped {
                extract::first_string(payload, &ENVELOPE_RUN_KEYS)
            } else {
                None
            }
        })
        .or_else(|| {
            headers
                .get(constants::RUN_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

    if dataset_id.is_none() && run_id.is_none() {
        // Nothing to chase; hand the payload on so the ISBN check can
        // classify it as a test event.
        return ResolvedItem::Inline(Value::Object(payload.clone()));
    }

    let Some(runner) = &ctx.task_runner else {
        return ResolvedItem::Pending;
    };

    let dataset_id = match dataset_id {
        Some(id) => Some(id),
        None => match &run_id {
            Some(run) => runner.run_dataset_id(run).await,
            None => None,
        },
    };
    let Some(dataset_id) = dataset_id else {
        return ResolvedItem::Pending;
    };

    match runner.dataset_first_item(&dataset_id).await {
        Some(item) => ResolvedItem::Inline(item),
        None => ResolvedItem::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::store::InMemoryBookStore;
    use async_trait::async_trait;

    struct FakeRunner {
        dataset: Option<String>,
        item: Option<Value>,
    }

    #[async_trait]
    impl TaskRunnerApi for FakeRunner {
        async fn run_dataset_id(&self, _run_id: &str) -> Option<String> {
            self.dataset.clone()
        }
        async fn dataset_first_item(&self, _dataset_id: &str) -> Option<Value> {
            self.item.clone()
        }
    }

    fn ctx(runner: Option<FakeRunner>) -> WebhookContext {
        WebhookContext {
            secret: Some("abc".into()),
            store: Arc::new(InMemoryBookStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            task_runner: runner.map(|r| Arc::new(r) as Arc<dyn TaskRunnerApi>),
        }
    }

    fn authed_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-secret", "abc".parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn run_reference_is_chased_through_the_task_runner() {
        let runner = FakeRunner {
            dataset: Some("ds1".into()),
            item: Some(serde_json::json!({
                "isbn13": "9780141439518",
                "breadcrumbs": ["Fiction", "Classics"],
            })),
        };
        let ctx = ctx(Some(runner));
        let body = serde_json::to_vec(&serde_json::json!({"resource": {"runId": "r1"}})).unwrap();

        let (status, _) = process(&ctx, &authed_headers(), &body).await;
        assert_eq!(status, StatusCode::OK);

        let record = ctx.store.get_by_isbn("9780141439518").await.unwrap().unwrap();
        assert_eq!(
            record.category,
            Some(vec!["Fiction".to_string(), "Classics".to_string()])
        );
    }

    #[tokio::test]
    async fn missing_run_output_is_acknowledged_as_pending() {
        let runner = FakeRunner {
            dataset: Some("ds1".into()),
            item: None,
        };
        let ctx = ctx(Some(runner));
        let body = serde_json::to_vec(&serde_json::json!({"resource": {"runId": "r1"}})).unwrap();

        let (status, value) = process(&ctx, &authed_headers(), &body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(value["status"], "pending");
    }

    #[tokio::test]
    async fn run_reference_without_task_runner_is_pending() {
        let ctx = ctx(None);
        let body = serde_json::to_vec(&serde_json::json!({"runId": "r1"})).unwrap();

        let (status, _) = process(&ctx, &authed_headers(), &body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn incidental_id_on_an_inline_item_is_not_a_run_reference() {
        let ctx = ctx(None);
        // Scraped item with its own `id` but no usable ISBN: a test event,
        // not something to chase through the task runner.
        let body = serde_json::to_vec(&serde_json::json!({
            "id": "item-42",
            "url": "https://product.example/detail/S000X",
            "breadcrumbs": ["Fiction"]
        }))
        .unwrap();

        let (status, value) = process(&ctx, &authed_headers(), &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn enveloped_run_object_id_is_chased() {
        let runner = FakeRunner {
            dataset: Some("ds1".into()),
            item: Some(serde_json::json!({
                "isbn13": "9780141439518",
                "breadcrumbs": ["Fiction"],
            })),
        };
        let ctx = ctx(Some(runner));
        // The task runner's run object names its id plain `id`.
        let body = serde_json::to_vec(&serde_json::json!({"resource": {"id": "r1"}})).unwrap();

        let (status, _) = process(&ctx, &authed_headers(), &body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(ctx.store.get_by_isbn("9780141439518").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn run_id_fallback_header_is_honored() {
        let runner = FakeRunner {
            dataset: Some("ds1".into()),
            item: Some(serde_json::json!({"isbn13": "9780141439518", "category": ["문학"]})),
        };
        let ctx = ctx(Some(runner));
        let mut headers = authed_headers();
        headers.insert(constants::RUN_ID_HEADER, "r9".parse().unwrap());
        // Body has neither item fields nor a run reference.
        let body = serde_json::to_vec(&serde_json::json!({"eventType": "RUN.SUCCEEDED"})).unwrap();

        let (status, _) = process(&ctx, &headers, &body).await;
        assert_eq!(status, StatusCode::OK);
    }
}
