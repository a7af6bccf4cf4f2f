//! Endpoint defaults and tuning knobs shared across the enrichment pipeline.
//! Every URL here can be overridden through `Config` so tests and staging
//! can point the clients at stubs.

/// Catalog API search endpoint (ISBN-targeted book lookup).
pub const CATALOG_API_URL: &str = "https://dapi.kakao.com/v3/search/book";

/// Retailer autocomplete endpoint; answers JSONP, not bare JSON.
pub const AUTOCOMPLETE_URL: &str =
    "https://search.kyobobook.co.kr/srp/api/v1/search/autocomplete/shop";

/// Prefix for product detail pages keyed by the retailer's sale id.
pub const PRODUCT_URL_PREFIX: &str = "https://product.kyobobook.co.kr/detail/";

/// Retailer search detail page, used as a guessed fallback keyed by ISBN.
pub const SEARCH_DETAIL_URL_PREFIX: &str = "https://search.kyobobook.co.kr/product/detail/";

/// Task-runner API base for dispatching crawl jobs and fetching run output.
pub const CRAWLER_API_URL: &str = "https://api.apify.com";

/// Outbound timeout for catalog API calls.
pub const CATALOG_TIMEOUT_SECS: u64 = 5;

/// Outbound timeout for autocomplete and HEAD/GET URL validation.
pub const RESOLVE_TIMEOUT_SECS: u64 = 4;

/// TTL for cached catalog lookups and the category staleness window.
pub const CATALOG_CACHE_TTL_SECS: u64 = 60 * 60 * 24;

/// Header names the webhook accepts for the shared secret, in check order.
pub const WEBHOOK_SECRET_HEADERS: [&str; 3] = [
    "x-kbooks-webhook-secret",
    "x-crawler-secret",
    "x-webhook-secret",
];

/// Fallback header carrying the crawler run id when the body has none.
pub const RUN_ID_HEADER: &str = "x-run-id";

pub fn catalog_cache_key(isbn13: &str) -> String {
    format!("catalog:{isbn13}")
}

pub fn book_cache_tag(isbn13: &str) -> String {
    format!("book:{isbn13}")
}
