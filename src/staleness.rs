use crate::store::BookRecord;
use chrono::{DateTime, Duration, Utc};

/// Staleness policy: two pure predicates deciding whether a source needs
/// re-fetching for an ISBN. No I/O; callers evaluate these inline on each
/// request (there is no background scheduler).

/// Catalog enrichment is wanted until the record has been fetched at
/// least once AND all core display fields are filled. Partial enrichment
/// keeps retrying on every request, not just once.
pub fn needs_catalog_enrichment(record: Option<&BookRecord>) -> bool {
    let Some(record) = record else { return true };
    if record.catalog_fetched_at.is_none() {
        return true;
    }
    [
        &record.title,
        &record.author,
        &record.publisher,
        &record.description,
    ]
    .iter()
    .any(|f| f.is_none())
}

/// Category enrichment is wanted while the breadcrumb is empty and no
/// fetch was attempted within the last 24 hours. A populated category
/// stops retrying for good; there is no forced re-crawl on age alone.
/// The attempt timestamp is stamped at dispatch time, so an in-flight
/// crawl suppresses re-dispatch for the whole window even if its webhook
/// never arrives.
pub fn needs_category_enrichment(record: Option<&BookRecord>, now: DateTime<Utc>) -> bool {
    let Some(record) = record else { return true };
    if record
        .category
        .as_ref()
        .map(|c| !c.is_empty())
        .unwrap_or(false)
    {
        return false;
    }
    match record.category_fetched_at {
        None => true,
        Some(fetched_at) => now - fetched_at > Duration::hours(24),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BookRecord {
        BookRecord::stub("9780141439518")
    }

    #[test]
    fn missing_record_needs_both() {
        assert!(needs_catalog_enrichment(None));
        assert!(needs_category_enrichment(None, Utc::now()));
    }

    #[test]
    fn partial_catalog_keeps_retrying() {
        let mut r = record();
        r.catalog_fetched_at = Some(Utc::now());
        r.title = Some("Pride and Prejudice".into());
        r.author = Some("Jane Austen".into());
        // publisher and description still missing
        assert!(needs_catalog_enrichment(Some(&r)));

        r.publisher = Some("T. Egerton".into());
        r.description = Some("A novel of manners.".into());
        assert!(!needs_catalog_enrichment(Some(&r)));
    }

    #[test]
    fn unfetched_catalog_needs_enrichment_even_when_fields_set() {
        let mut r = record();
        r.title = Some("x".into());
        assert!(needs_catalog_enrichment(Some(&r)));
    }

    #[test]
    fn populated_category_never_goes_stale() {
        let mut r = record();
        r.category = Some(vec!["문학".into()]);
        r.category_fetched_at = Some(Utc::now() - Duration::days(30));
        assert!(!needs_category_enrichment(Some(&r), Utc::now()));
    }

    #[test]
    fn empty_category_respects_the_24h_window() {
        let mut r = record();
        let now = Utc::now();

        // never attempted
        assert!(needs_category_enrichment(Some(&r), now));

        // attempted just now (dispatch stamped): suppressed
        r.category_fetched_at = Some(now);
        assert!(!needs_category_enrichment(Some(&r), now));

        // still empty a day later: retry
        assert!(needs_category_enrichment(
            Some(&r),
            now + Duration::hours(24) + Duration::seconds(1)
        ));
    }

    #[test]
    fn empty_category_list_counts_as_empty() {
        let mut r = record();
        r.category = Some(vec![]);
        assert!(needs_category_enrichment(Some(&r), Utc::now()));
    }
}
