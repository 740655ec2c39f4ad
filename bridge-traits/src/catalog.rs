//! Chart Catalog Abstraction
//!
//! A `CatalogSource` answers one paginated search against the remote chart
//! catalog and classifies the answer. It performs no retries of its own: a
//! rate-limited answer is reported as [`SearchOutcome::RateLimited`] so the
//! caller decides whether and when to ask again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Pagination key of a chart record in the remote catalog.
pub type ChartId = u64;

/// One page request against the catalog.
///
/// Selects records with `modifiedTime >= modified_after` and
/// `chartId > chart_id_after`, ordered by `chartId`, at most `per_page` of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub modified_after: DateTime<Utc>,
    pub chart_id_after: ChartId,
    pub per_page: u32,
}

impl CatalogQuery {
    pub fn new(modified_after: DateTime<Utc>, chart_id_after: ChartId, per_page: u32) -> Self {
        Self {
            modified_after,
            chart_id_after,
            per_page,
        }
    }
}

/// Classified result of a single catalog search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The search succeeded. Records are returned undecoded, in catalog
    /// order, so that one malformed record cannot poison the whole page.
    Page(Vec<serde_json::Value>),

    /// The catalog asked us to slow down (HTTP 429).
    RateLimited {
        /// Server-provided wait hint, if any
        retry_after: Option<Duration>,
    },

    /// The catalog rejected the request with a non-retryable status.
    Rejected { status: u16, message: String },
}

/// Remote chart catalog trait
///
/// Implementations issue exactly one query per call.
///
/// # Errors
///
/// Returns error only for transport-level failures (connection refused,
/// timeout, undecodable response envelope). HTTP statuses are reported
/// through [`SearchOutcome`].
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn search(&self, query: &CatalogQuery) -> Result<SearchOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_catalog_query_new() {
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let query = CatalogQuery::new(after, 42, 250);

        assert_eq!(query.modified_after, after);
        assert_eq!(query.chart_id_after, 42);
        assert_eq!(query.per_page, 250);
    }

    #[test]
    fn test_search_outcome_equality() {
        let a = SearchOutcome::RateLimited {
            retry_after: Some(Duration::from_secs(1)),
        };
        let b = SearchOutcome::RateLimited {
            retry_after: Some(Duration::from_secs(1)),
        };
        assert_eq!(a, b);
        assert_ne!(a, SearchOutcome::Page(vec![]));
    }
}
