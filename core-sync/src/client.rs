//! Rate-limited catalog client.
//!
//! Wraps a [`CatalogSource`] and turns its classified outcomes into either a
//! page of raw records or a fatal [`FetchError`]. HTTP 429 answers are retried
//! here with backoff, up to a bounded number of attempts, so callers never see
//! them.

use crate::error::FetchError;
use bridge_traits::catalog::{CatalogQuery, CatalogSource, ChartId, SearchOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff policy for rate-limited catalog requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Total attempts per page, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Double the delay after every rate-limited attempt
    pub use_exponential_backoff: bool,
    /// Prefer the server's `Retry-After` hint when one is given
    pub honor_retry_after: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
            honor_retry_after: true,
        }
    }
}

impl RateLimitPolicy {
    /// Constant delay between attempts, ignoring server hints.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            use_exponential_backoff: false,
            honor_retry_after: false,
        }
    }

    /// Delay to wait after the `attempt`-th rate-limited answer (1-based).
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if self.honor_retry_after {
            if let Some(hint) = retry_after {
                return hint.min(self.max_delay);
            }
        }

        if !self.use_exponential_backoff {
            return self.base_delay.min(self.max_delay);
        }

        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Issues one logical page request, absorbing rate limiting.
pub struct RateLimitedClient {
    source: Arc<dyn CatalogSource>,
    policy: RateLimitPolicy,
    page_size: u32,
}

impl RateLimitedClient {
    pub fn new(source: Arc<dyn CatalogSource>, policy: RateLimitPolicy, page_size: u32) -> Self {
        Self {
            source,
            policy,
            page_size,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Fetch the page of records modified at or after `after_time` with
    /// `chartId > cursor`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Status`] for any non-success status other than 429
    /// - [`FetchError::RateLimitExhausted`] when every attempt was rate limited
    /// - [`FetchError::Source`] for transport failures, which are not retried
    pub async fn fetch_page(
        &self,
        after_time: DateTime<Utc>,
        cursor: ChartId,
    ) -> Result<Vec<serde_json::Value>, FetchError> {
        let query = CatalogQuery::new(after_time, cursor, self.page_size);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let outcome = self
                .source
                .search(&query)
                .await
                .map_err(|e| FetchError::Source(e.to_string()))?;

            match outcome {
                SearchOutcome::Page(records) => {
                    debug!(cursor, attempt, records = records.len(), "Catalog page received");
                    return Ok(records);
                }
                SearchOutcome::Rejected { status, message } => {
                    warn!(cursor, status, "Catalog rejected page request");
                    return Err(FetchError::Status { status, message });
                }
                SearchOutcome::RateLimited { retry_after } => {
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            cursor,
                            attempts = attempt,
                            "Catalog still rate limited, giving up on page"
                        );
                        return Err(FetchError::RateLimitExhausted { attempts: attempt });
                    }

                    let delay = self.policy.delay_for(attempt, retry_after);
                    warn!(
                        cursor,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Catalog rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::{mock, Sequence};
    use serde_json::json;

    mock! {
        Source {}

        #[async_trait]
        impl CatalogSource for Source {
            async fn search(&self, query: &CatalogQuery) -> BridgeResult<SearchOutcome>;
        }
    }

    fn client(source: MockSource, policy: RateLimitPolicy) -> RateLimitedClient {
        RateLimitedClient::new(Arc::new(source), policy, 2)
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RateLimitPolicy::default();

        assert_eq!(policy.delay_for(1, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4, None), Duration::from_secs(8));
        assert_eq!(policy.delay_for(6, None), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40, None), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RateLimitPolicy::default();

        assert_eq!(
            policy.delay_for(3, Some(Duration::from_millis(500))),
            Duration::from_millis(500)
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(3600))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_fixed_policy_ignores_hint() {
        let policy = RateLimitPolicy::fixed(Duration::from_secs(1), 5);

        assert_eq!(policy.delay_for(1, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(4, Some(Duration::from_secs(9))), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retried_transparently() {
        let mut source = MockSource::new();
        let mut seq = Sequence::new();
        source
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SearchOutcome::RateLimited { retry_after: None }));
        source
            .expect_search()
            .withf(|query| query.chart_id_after == 7 && query.per_page == 2)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SearchOutcome::Page(vec![json!({ "chartId": 8 })])));

        let started = tokio::time::Instant::now();
        let records = client(source, RateLimitPolicy::default())
            .fetch_page(epoch(), 7)
            .await
            .unwrap();

        assert_eq!(records, vec![json!({ "chartId": 8 })]);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_is_fatal() {
        let mut source = MockSource::new();
        source
            .expect_search()
            .times(3)
            .returning(|_| Ok(SearchOutcome::RateLimited { retry_after: None }));

        let policy = RateLimitPolicy {
            max_attempts: 3,
            ..RateLimitPolicy::default()
        };
        let error = client(source, policy)
            .fetch_page(epoch(), 0)
            .await
            .unwrap_err();

        assert_eq!(error, FetchError::RateLimitExhausted { attempts: 3 });
    }

    #[tokio::test]
    async fn test_rejected_status_not_retried() {
        let mut source = MockSource::new();
        source.expect_search().times(1).returning(|_| {
            Ok(SearchOutcome::Rejected {
                status: 503,
                message: "Service Unavailable".to_string(),
            })
        });

        let error = client(source, RateLimitPolicy::default())
            .fetch_page(epoch(), 0)
            .await
            .unwrap_err();

        assert_eq!(
            error,
            FetchError::Status {
                status: 503,
                message: "Service Unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let mut source = MockSource::new();
        source
            .expect_search()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));

        let error = client(source, RateLimitPolicy::default())
            .fetch_page(epoch(), 0)
            .await
            .unwrap_err();

        assert!(matches!(error, FetchError::Source(message) if message.contains("connection reset")));
    }
}
