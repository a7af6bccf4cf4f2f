use crate::error::Result;
use crate::extract;
use crate::isbn::{is_valid_isbn13, split_isbn_field, to_isbn13};
use crate::store::CatalogFields;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{instrument, warn};

/// Synchronous catalog lookup: ISBN in, normalized metadata out.
///
/// Failures of any kind (missing key, timeout, non-2xx, unparseable
/// body) degrade to `Unavailable` so enrichment is skipped for this
/// request and retried by the staleness policy later. `Empty` is an
/// authoritative "the catalog has nothing" answer and is cacheable;
/// `Unavailable` must never be cached as such.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogLookup {
    Found(CatalogFields),
    Empty,
    Unavailable,
}

impl CatalogLookup {
    pub fn fields(self) -> Option<CatalogFields> {
        match self {
            CatalogLookup::Found(fields) => Some(fields),
            _ => None,
        }
    }
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn lookup(&self, isbn13: &str) -> Result<CatalogLookup>;
}

pub struct CatalogClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl CatalogClient {
    pub fn new(api_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    #[instrument(skip(self))]
    async fn lookup(&self, isbn13: &str) -> Result<CatalogLookup> {
        let Some(key) = &self.api_key else {
            warn!("Catalog API key not configured; skipping lookup");
            return Ok(CatalogLookup::Unavailable);
        };

        let request = self
            .client
            .get(&self.api_url)
            .header("Authorization", format!("KakaoAK {key}"))
            .query(&[("target", "isbn"), ("query", isbn13), ("size", "1")]);

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Catalog fetch failed for {}: {}", isbn13, e);
                return Ok(CatalogLookup::Unavailable);
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Catalog API error {} for {}: {}", status, isbn13, body);
            return Ok(CatalogLookup::Unavailable);
        }

        let data: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Catalog response parse failed for {}: {}", isbn13, e);
                return Ok(CatalogLookup::Unavailable);
            }
        };

        Ok(data
            .get("documents")
            .and_then(Value::as_array)
            .and_then(|docs| docs.first())
            .map(|doc| classify_document(isbn13, doc))
            .unwrap_or(CatalogLookup::Empty))
    }
}

/// Classify the vendor's first document against the requested ISBN. The
/// search is ISBN-targeted but can still answer fuzzily; a document whose
/// own ISBN resolves to a different book counts as no match, not as data
/// for the wrong record.
pub fn classify_document(isbn13: &str, doc: &Value) -> CatalogLookup {
    if let Some(reported) = doc_isbn13(doc) {
        if reported != isbn13 {
            warn!(
                "Catalog answered {} for a {} lookup; discarding",
                reported, isbn13
            );
            return CatalogLookup::Empty;
        }
    }
    normalize_doc(doc)
        .map(CatalogLookup::Found)
        .unwrap_or(CatalogLookup::Empty)
}

/// The vendor reports ISBNs as one space-separated "isbn10 isbn13" field.
/// Derive the canonical 13-digit form, converting from the 10-digit half
/// when that is all the document carries.
fn doc_isbn13(doc: &Value) -> Option<String> {
    let field = doc.get("isbn").and_then(Value::as_str)?;
    let (isbn10, isbn13) = split_isbn_field(field);
    isbn13
        .filter(|v| is_valid_isbn13(v))
        .or_else(|| isbn10.map(|v| to_isbn13(&v)))
}

/// Normalize one vendor document into `CatalogFields`. Empty strings
/// become `None`; invalid dates become `None`, never an error.
pub fn normalize_doc(doc: &Value) -> Option<CatalogFields> {
    let record = doc.as_object()?;

    let string_field = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let authors = record
        .get("authors")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let publish_date = record
        .get("datetime")
        .and_then(Value::as_str)
        .and_then(extract::parse_timestamp)
        .map(|dt| dt.format("%Y-%m-%d").to_string());

    Some(CatalogFields {
        title: string_field("title"),
        authors,
        publisher: string_field("publisher"),
        publish_date,
        description: string_field("contents"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_vendor_document() {
        let doc = json!({
            "title": "Pride and Prejudice",
            "authors": ["Jane Austen"],
            "publisher": null,
            "datetime": "1813-01-28T00:00:00Z",
            "contents": ""
        });

        let fields = normalize_doc(&doc).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Pride and Prejudice"));
        assert_eq!(fields.authors, vec!["Jane Austen".to_string()]);
        assert_eq!(fields.publisher, None);
        assert_eq!(fields.publish_date.as_deref(), Some("1813-01-28"));
        assert_eq!(fields.description, None);
    }

    #[test]
    fn invalid_dates_become_none() {
        let doc = json!({"title": "x", "datetime": "13th of never"});
        let fields = normalize_doc(&doc).unwrap();
        assert_eq!(fields.publish_date, None);
    }

    #[test]
    fn whitespace_authors_are_dropped() {
        let doc = json!({"authors": ["  ", "Jane Austen", ""]});
        let fields = normalize_doc(&doc).unwrap();
        assert_eq!(fields.authors, vec!["Jane Austen".to_string()]);
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(normalize_doc(&json!("nope")).is_none());
    }

    #[test]
    fn document_matching_the_combined_isbn_field_is_found() {
        let doc = json!({
            "isbn": "8937460777 9788937460777",
            "title": "동물농장"
        });
        let lookup = classify_document("9788937460777", &doc);
        assert!(matches!(lookup, CatalogLookup::Found(_)));
    }

    #[test]
    fn isbn10_only_documents_are_matched_after_conversion() {
        let doc = json!({"isbn": "0141439513", "title": "Pride and Prejudice"});
        let lookup = classify_document("9780141439518", &doc);
        assert!(matches!(lookup, CatalogLookup::Found(_)));
    }

    #[test]
    fn fuzzy_match_for_another_book_is_treated_as_empty() {
        let doc = json!({
            "isbn": "8937460777 9788937460777",
            "title": "동물농장"
        });
        let lookup = classify_document("9780141439518", &doc);
        assert_eq!(lookup, CatalogLookup::Empty);
    }

    #[test]
    fn documents_without_an_isbn_field_are_trusted() {
        let doc = json!({"title": "Pride and Prejudice"});
        let lookup = classify_document("9780141439518", &doc);
        assert!(matches!(lookup, CatalogLookup::Found(_)));
    }
}
