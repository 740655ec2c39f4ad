//! Enchor search API connector
//!
//! Implements the `CatalogSource` trait over `POST /search/advanced`.

use async_trait::async_trait;
use bridge_traits::catalog::{CatalogQuery, CatalogSource, SearchOutcome};
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::config::CoreConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::EnchorError;
use crate::types::{AdvancedSearchRequest, AdvancedSearchResponse};

/// Longest error body kept in a rejection message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Enchor chart catalog connector
///
/// Issues exactly one HTTP request per [`CatalogSource::search`] call and
/// classifies the response. Retrying is left to the caller.
///
/// # Example
///
/// ```ignore
/// use provider_enchor::EnchorConnector;
/// use bridge_traits::catalog::{CatalogQuery, CatalogSource};
///
/// let connector = EnchorConnector::new(http_client, "https://api.enchor.us");
/// let outcome = connector.search(&CatalogQuery::new(after, 0, 250)).await?;
/// ```
pub struct EnchorConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// API root, without trailing slash
    base_url: String,

    request_timeout: Option<Duration>,

    /// Used to turn HTTP-date `Retry-After` values into delays
    clock: Arc<dyn Clock>,
}

impl EnchorConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build a connector from validated core configuration.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.http_client.clone(), config.catalog_base_url.clone())
            .with_timeout(config.request_timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn search_url(&self) -> String {
        format!("{}/search/advanced", self.base_url)
    }

    /// Server wait hint carried by a 429 response.
    ///
    /// `Retry-After` wins over the `RateLimit-Reset` / `RateLimit: reset=`
    /// family when both are present.
    fn retry_after(&self, response: &HttpResponse) -> Option<Duration> {
        if let Some(value) = response.header("Retry-After") {
            return parse_retry_after(value, self.clock.now());
        }

        if let Some(value) = response.header("RateLimit-Reset") {
            return parse_delay_seconds(value);
        }

        response.header("RateLimit").and_then(|value| {
            value
                .split([',', ';'])
                .filter_map(|part| part.trim().strip_prefix("reset="))
                .find_map(parse_delay_seconds)
        })
    }
}

#[async_trait]
impl CatalogSource for EnchorConnector {
    #[instrument(skip(self, query), fields(chart_id_after = query.chart_id_after, per_page = query.per_page))]
    async fn search(&self, query: &CatalogQuery) -> Result<SearchOutcome> {
        let mut request = HttpRequest::new(HttpMethod::Post, self.search_url())
            .header("Accept", "application/json, text/plain, */*")
            .json(&AdvancedSearchRequest::for_query(query))?;
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = self.http_client.execute(request).await?;

        if response.is_success() {
            let page: AdvancedSearchResponse =
                serde_json::from_slice(&response.body).map_err(|e| {
                    EnchorError::ParseError(format!("invalid advanced search response: {}", e))
                })?;

            debug!(
                status = response.status,
                records = page.data.len(),
                found = ?page.found,
                "Search page received"
            );
            return Ok(SearchOutcome::Page(page.data));
        }

        if response.is_rate_limited() {
            let retry_after = self.retry_after(&response);
            debug!(retry_after_ms = ?retry_after.map(|d| d.as_millis()), "Search rate limited");
            return Ok(SearchOutcome::RateLimited { retry_after });
        }

        let message: String = String::from_utf8_lossy(&response.body)
            .trim()
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect();
        warn!(status = response.status, "Search request rejected");

        Ok(SearchOutcome::Rejected {
            status: response.status,
            message,
        })
    }
}

/// `Retry-After` is either delta-seconds or an HTTP-date.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(delay) = parse_delay_seconds(value) {
        return Some(delay);
    }

    let at = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let delta = at.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

fn parse_delay_seconds(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
