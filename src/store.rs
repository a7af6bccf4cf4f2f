use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Canonical per-ISBN book record. May exist as a stub (all fields empty
/// except `isbn13`) so references elsewhere never dangle. Catalog fields
/// and category fields are written by disjoint pipelines and merged
/// independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRecord {
    pub isbn13: String,
    pub title: Option<String>,
    /// Flattened display string ("A, B"), not a structured list.
    pub author: Option<String>,
    pub publisher: Option<String>,
    /// ISO date at year-month-day precision.
    pub publish_date: Option<String>,
    pub description: Option<String>,
    /// Resolved retailer product page. Once set it is trusted and never
    /// re-resolved.
    pub retailer_url: Option<String>,
    /// Breadcrumb path from the most recent successful scrape; fully
    /// replaced on each success, never merged.
    pub category: Option<Vec<String>>,
    pub catalog_fetched_at: Option<DateTime<Utc>>,
    pub category_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookRecord {
    pub fn stub(isbn13: &str) -> Self {
        let now = Utc::now();
        Self {
            isbn13: isbn13.to_string(),
            title: None,
            author: None,
            publisher: None,
            publish_date: None,
            description: None,
            retailer_url: None,
            category: None,
            catalog_fetched_at: None,
            category_fetched_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Normalized output of a catalog lookup, ready to merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFields {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
    pub description: Option<String>,
}

/// Normalized output of a webhook ingestion, ready to merge. `None`
/// fields were not present in the payload and must not overwrite
/// previously known data.
#[derive(Debug, Clone, Default)]
pub struct CategoryFields {
    pub retailer_url: Option<String>,
    pub category: Option<Vec<String>>,
}

/// Last raw crawler payload for an ISBN, replaced on every delivery.
/// Kept apart from `BookRecord` because its shape is vendor-controlled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawScrapePayload {
    pub isbn13: String,
    pub payload: Value,
    pub scraped_at: DateTime<Utc>,
}

/// Store for book records and raw scrape payloads. All mutations are
/// upserts keyed on `isbn13`; concurrent writers for the same key must
/// not corrupt the record (last write per field group wins).
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn get_by_isbn(&self, isbn13: &str) -> Result<Option<BookRecord>>;

    /// Create-if-absent; returns the existing record unchanged if present.
    async fn ensure_stub(&self, isbn13: &str) -> Result<BookRecord>;

    /// Merge catalog fields. `None` records the fetch attempt (timestamp
    /// only) without touching display fields.
    async fn merge_catalog_fields(
        &self,
        isbn13: &str,
        fields: Option<CatalogFields>,
    ) -> Result<BookRecord>;

    /// Merge category-pipeline fields: sets `retailer_url` if supplied,
    /// replaces `category` (and stamps `category_fetched_at`) only when a
    /// non-empty breadcrumb was extracted.
    async fn merge_category_fields(
        &self,
        isbn13: &str,
        fields: CategoryFields,
    ) -> Result<BookRecord>;

    /// Persist a freshly resolved retailer URL on its own, so resolution
    /// is not repeated even if the subsequent dispatch fails.
    async fn merge_retailer_url(&self, isbn13: &str, url: &str) -> Result<BookRecord>;

    /// Mark a category fetch attempt (dispatch time), suppressing
    /// re-dispatch for the staleness window.
    async fn touch_category_fetch(&self, isbn13: &str) -> Result<()>;

    /// Replace the raw payload row for this ISBN.
    async fn replace_raw_payload(
        &self,
        isbn13: &str,
        payload: Value,
        scraped_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn get_raw_payload(&self, isbn13: &str) -> Result<Option<RawScrapePayload>>;
}

/// In-memory store for development and testing.
pub struct InMemoryBookStore {
    books: Arc<Mutex<HashMap<String, BookRecord>>>,
    raw_payloads: Arc<Mutex<HashMap<String, RawScrapePayload>>>,
}

impl InMemoryBookStore {
    pub fn new() -> Self {
        Self {
            books: Arc::new(Mutex::new(HashMap::new())),
            raw_payloads: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryBookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn get_by_isbn(&self, isbn13: &str) -> Result<Option<BookRecord>> {
        let books = self.books.lock().unwrap();
        Ok(books.get(isbn13).cloned())
    }

    async fn ensure_stub(&self, isbn13: &str) -> Result<BookRecord> {
        let mut books = self.books.lock().unwrap();
        if let Some(existing) = books.get(isbn13) {
            return Ok(existing.clone());
        }
        let record = BookRecord::stub(isbn13);
        books.insert(isbn13.to_string(), record.clone());
        debug!("Created stub record for {}", isbn13);
        Ok(record)
    }

    async fn merge_catalog_fields(
        &self,
        isbn13: &str,
        fields: Option<CatalogFields>,
    ) -> Result<BookRecord> {
        let mut books = self.books.lock().unwrap();
        let record = books
            .entry(isbn13.to_string())
            .or_insert_with(|| BookRecord::stub(isbn13));

        let now = Utc::now();
        if let Some(fields) = fields {
            record.title = fields.title;
            record.author = match fields.authors.join(", ") {
                s if s.is_empty() => None,
                s => Some(s),
            };
            record.publisher = fields.publisher;
            record.publish_date = fields.publish_date;
            record.description = fields.description;
        }
        record.catalog_fetched_at = Some(now);
        record.updated_at = now;

        debug!("Merged catalog fields for {}", isbn13);
        Ok(record.clone())
    }

    async fn merge_category_fields(
        &self,
        isbn13: &str,
        fields: CategoryFields,
    ) -> Result<BookRecord> {
        let mut books = self.books.lock().unwrap();
        let record = books
            .entry(isbn13.to_string())
            .or_insert_with(|| BookRecord::stub(isbn13));

        let now = Utc::now();
        if let Some(url) = fields.retailer_url {
            record.retailer_url = Some(url);
        }
        if let Some(category) = fields.category {
            if !category.is_empty() {
                record.category = Some(category);
                record.category_fetched_at = Some(now);
            }
        }
        record.updated_at = now;

        debug!("Merged category fields for {}", isbn13);
        Ok(record.clone())
    }

    async fn merge_retailer_url(&self, isbn13: &str, url: &str) -> Result<BookRecord> {
        let mut books = self.books.lock().unwrap();
        let record = books
            .entry(isbn13.to_string())
            .or_insert_with(|| BookRecord::stub(isbn13));
        record.retailer_url = Some(url.to_string());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn touch_category_fetch(&self, isbn13: &str) -> Result<()> {
        let mut books = self.books.lock().unwrap();
        let record = books
            .entry(isbn13.to_string())
            .or_insert_with(|| BookRecord::stub(isbn13));
        let now = Utc::now();
        record.category_fetched_at = Some(now);
        record.updated_at = now;
        Ok(())
    }

    async fn replace_raw_payload(
        &self,
        isbn13: &str,
        payload: Value,
        scraped_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut raw = self.raw_payloads.lock().unwrap();
        raw.insert(
            isbn13.to_string(),
            RawScrapePayload {
                isbn13: isbn13.to_string(),
                payload,
                scraped_at: scraped_at.unwrap_or_else(Utc::now),
            },
        );
        debug!("Replaced raw scrape payload for {}", isbn13);
        Ok(())
    }

    async fn get_raw_payload(&self, isbn13: &str) -> Result<Option<RawScrapePayload>> {
        let raw = self.raw_payloads.lock().unwrap();
        Ok(raw.get(isbn13).cloned())
    }
}
