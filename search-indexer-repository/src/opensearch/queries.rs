//! OpenSearch request bodies used by the engine handle.

use serde_json::{json, Value};

use crate::errors::SearchError;
use search_indexer_shared::Uid;

/// Hits fetched per scroll page when resolving a raw query.
pub const RAW_QUERY_PAGE_SIZE: usize = 1_000;

/// How long OpenSearch keeps a raw-query scroll context between pages.
pub const RAW_QUERY_SCROLL_KEEP_ALIVE: &str = "1m";

/// Build a body that matches every document; used for delete-all.
pub fn build_match_all_query() -> Value {
    json!({
        "query": {
            "match_all": {}
        }
    })
}

/// Build the first page of a scrolled raw Lucene-syntax query that only
/// needs document ids.
pub fn build_raw_uid_query(raw_query: &str) -> Value {
    json!({
        "query": {
            "query_string": {
                "query": raw_query
            }
        },
        "_source": false,
        "size": RAW_QUERY_PAGE_SIZE,
        "sort": ["_doc"],
        "track_total_hits": true
    })
}

/// Build the body requesting the next page of a scroll.
pub fn build_scroll_continuation(scroll_id: &str) -> Value {
    json!({
        "scroll": RAW_QUERY_SCROLL_KEEP_ALIVE,
        "scroll_id": scroll_id
    })
}

/// Build the body releasing a scroll context.
pub fn build_clear_scroll(scroll_id: &str) -> Value {
    json!({
        "scroll_id": [scroll_id]
    })
}

/// Extract document uids from a search response body.
///
/// Hits whose `_id` is not a uid are skipped.
pub fn parse_hit_uids(body: &Value) -> Vec<Uid> {
    hits(body)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("_id").and_then(|id| id.as_str()))
                .filter_map(|id| id.parse::<Uid>().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn hits(body: &Value) -> Option<&Vec<Value>> {
    body.get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(|h| h.as_array())
}

/// One page of a scrolled uid query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidPage {
    pub uids: Vec<Uid>,
    /// Raw hits on the page, including ones whose id is not a uid.
    pub hit_count: usize,
    /// `hits.total`; accepts both the object and the bare number form.
    pub total: Option<u64>,
    pub scroll_id: Option<String>,
}

impl UidPage {
    pub fn parse(body: &Value) -> Self {
        let total = body.get("hits").and_then(|h| h.get("total")).and_then(|t| {
            t.as_u64()
                .or_else(|| t.get("value").and_then(|v| v.as_u64()))
        });

        Self {
            uids: parse_hit_uids(body),
            hit_count: hits(body).map(Vec::len).unwrap_or(0),
            total,
            scroll_id: body
                .get("_scroll_id")
                .and_then(|id| id.as_str())
                .map(str::to_string),
        }
    }
}

/// Accumulates scroll pages until the query is exhausted.
///
/// The first page fixes the expected total; finishing with fewer hits than
/// that is an error rather than a silently truncated result.
#[derive(Debug, Default)]
pub struct UidScroll {
    uids: Vec<Uid>,
    seen: u64,
    total: Option<u64>,
}

impl UidScroll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page; returns whether another page should be requested.
    pub fn push(&mut self, page: UidPage) -> bool {
        if self.total.is_none() {
            self.total = page.total;
        }
        self.seen += page.hit_count as u64;
        self.uids.extend(page.uids);

        page.hit_count > 0 && self.total.map_or(true, |total| self.seen < total)
    }

    pub fn finish(self) -> Result<Vec<Uid>, SearchError> {
        match self.total {
            Some(total) if self.seen < total => Err(SearchError::query(format!(
                "Raw query returned {} of {} matching documents",
                self.seen, total
            ))),
            _ => Ok(self.uids),
        }
    }
}
