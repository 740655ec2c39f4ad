//! # Sync Engine
//!
//! Drives the paginated crawl of the remote chart catalog.
//!
//! ## Workflow
//!
//! Each iteration:
//! 1. Check for cancellation
//! 2. Fetch the next page (`chartId > cursor`, `modifiedTime >= after_time`)
//!    through the [`RateLimitedClient`]
//! 3. Normalize every record, skipping malformed ones, and merge them into the
//!    run's [`DedupMerger`]
//! 4. Advance the cursor to the highest `chartId` seen (never backwards)
//! 5. Hand the page to the caller's `on_page` callback
//! 6. Stop once a page contributes no previously unseen `groupId`
//!
//! Pages are processed strictly in request order. The cursor and the novelty
//! check both depend on the previous page, so there is no fan-out.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncEngine, SyncRequest};
//!
//! let engine = SyncEngine::new(catalog, SyncConfig::default())?
//!     .with_event_bus(event_bus);
//!
//! let request = SyncRequest::new(last_run)
//!     .resume_from(checkpoint_cursor)
//!     .with_cancellation(token.clone());
//!
//! let snapshot = engine
//!     .run_with(request, |records, cursor| persist_page(records, cursor))
//!     .await?;
//! println!("{} songs", snapshot.metadata.total_songs);
//! ```

use crate::client::{RateLimitPolicy, RateLimitedClient};
use crate::error::{Result, SyncError};
use crate::merger::DedupMerger;
use crate::record::{chart_id_of, normalize, GroupId, NormalizedRecord};
use bridge_traits::catalog::{CatalogSource, ChartId};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::config::{CoreConfig, MAX_PAGE_SIZE};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Records requested per catalog page
    pub page_size: u32,

    /// Development ceiling on pages per run. Not a termination strategy.
    pub max_pages: Option<u32>,

    /// Handling of rate-limited requests
    pub rate_limit: RateLimitPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_pages: None,
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SyncError::InvalidConfig(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.max_pages == Some(0) {
            return Err(SyncError::InvalidConfig(
                "max_pages must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "rate_limit.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&CoreConfig> for SyncConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages,
            rate_limit: RateLimitPolicy {
                max_attempts: config.max_rate_limit_attempts,
                base_delay: config.rate_limit_base_delay,
                ..RateLimitPolicy::default()
            },
        }
    }
}

/// Parameters of a single run.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Only records modified at or after this instant are fetched
    pub after_time: DateTime<Utc>,
    /// The crawl starts with `chartId > start_cursor`
    pub start_cursor: ChartId,
    pub cancellation: Option<CancellationToken>,
}

impl SyncRequest {
    pub fn new(after_time: DateTime<Utc>) -> Self {
        Self {
            after_time,
            start_cursor: 0,
            cancellation: None,
        }
    }

    /// Continue after a cursor reported by an earlier, interrupted run.
    pub fn resume_from(mut self, cursor: ChartId) -> Self {
        self.start_cursor = cursor;
        self
    }

    /// Checked between pages; a cancelled run returns [`SyncError::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

/// How far a run got. Reported on failure so the caller can resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Highest `chartId` of any fully processed page
    pub cursor: ChartId,
    pub pages_completed: u32,
    /// Distinct logical songs seen so far
    pub total_songs: usize,
    /// Chart records fetched so far, malformed ones included
    pub total_charts: u64,
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// A page contributed no new logical songs
    Converged,
    /// `max_pages` was reached first
    PageLimit,
}

/// Run bookkeeping persisted next to the mirrored charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// When the run started. Use as `after_time` for the next incremental run.
    pub last_run: DateTime<Utc>,
    pub total_songs: usize,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    /// One record per logical song, ordered by `groupId`
    pub charts: Vec<NormalizedRecord>,
    pub metadata: RunMetadata,
    /// Cursor after the last processed page
    pub cursor: ChartId,
    pub pages: u32,
    pub total_charts: u64,
    pub stop_reason: StopReason,
}

impl SyncSnapshot {
    pub fn get(&self, group_id: GroupId) -> Option<&NormalizedRecord> {
        self.charts
            .binary_search_by_key(&group_id, |record| record.group_id)
            .ok()
            .map(|index| &self.charts[index])
    }
}

/// Orchestrates one catalog crawl at a time.
///
/// The engine owns no durable state. Each run starts with a fresh
/// [`DedupMerger`]; persistence happens in the caller's `on_page` callback
/// and with the returned [`SyncSnapshot`].
pub struct SyncEngine {
    client: RateLimitedClient,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl SyncEngine {
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `config` fails validation.
    pub fn new(source: Arc<dyn CatalogSource>, config: SyncConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            client: RateLimitedClient::new(source, config.rate_limit.clone(), config.page_size),
            config,
            clock: Arc::new(SystemClock),
            event_bus: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Crawl everything modified at or after `after_time`, starting from the
    /// beginning of the catalog ordering.
    pub async fn run<F>(&self, after_time: DateTime<Utc>, on_page: F) -> Result<SyncSnapshot>
    where
        F: FnMut(&[NormalizedRecord], ChartId) + Send,
    {
        self.run_with(SyncRequest::new(after_time), on_page).await
    }

    /// Crawl according to `request`.
    ///
    /// `on_page` is called once per successfully fetched page with that
    /// page's valid records and the cursor after it. It is not called for a
    /// page that failed to fetch, nor for anything after it.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Fetch`] when a page cannot be fetched
    /// - [`SyncError::Cancelled`] when the request's token fires
    ///
    /// Both carry the [`SyncProgress`] reached before stopping.
    #[instrument(
        skip_all,
        fields(after_time = %request.after_time, start_cursor = request.start_cursor)
    )]
    pub async fn run_with<F>(&self, request: SyncRequest, mut on_page: F) -> Result<SyncSnapshot>
    where
        F: FnMut(&[NormalizedRecord], ChartId) + Send,
    {
        let last_run = self.clock.now();
        let mut merger = DedupMerger::new();
        let mut progress = SyncProgress {
            cursor: request.start_cursor,
            ..SyncProgress::default()
        };

        info!(
            page_size = self.config.page_size,
            max_pages = ?self.config.max_pages,
            "Starting catalog sync"
        );
        self.emit(SyncEvent::Started {
            after_time: request.after_time.to_rfc3339(),
            start_cursor: request.start_cursor,
        });

        let stop_reason = loop {
            if request.is_cancelled() {
                info!(cursor = progress.cursor, "Catalog sync cancelled");
                self.emit(SyncEvent::Cancelled {
                    cursor: progress.cursor,
                    pages: progress.pages_completed,
                });
                return Err(SyncError::Cancelled { progress });
            }

            let chart_id_after = progress.cursor;
            let raw_records = match self.client.fetch_page(request.after_time, chart_id_after).await
            {
                Ok(records) => records,
                Err(source) => {
                    error!(cursor = chart_id_after, error = %source, "Catalog sync failed");
                    self.emit(SyncEvent::Failed {
                        message: source.to_string(),
                        cursor: progress.cursor,
                        pages: progress.pages_completed,
                    });
                    return Err(SyncError::Fetch { source, progress });
                }
            };

            let fetched = raw_records.len() as u64;
            let mut page = Vec::with_capacity(raw_records.len());
            let mut page_max = chart_id_after;
            let mut new_songs = 0u64;

            for value in raw_records {
                if let Some(chart_id) = chart_id_of(&value) {
                    page_max = page_max.max(chart_id);
                }

                match normalize(value) {
                    Ok(record) => {
                        if merger.is_new_group(record.group_id) {
                            new_songs += 1;
                        }
                        merger.observe(record.clone());
                        page.push(record);
                    }
                    Err(e) => {
                        warn!(chart_id = ?e.chart_id, reason = %e.reason, "Skipping malformed catalog record");
                    }
                }
            }

            progress.cursor = page_max;
            progress.pages_completed += 1;
            progress.total_songs = merger.len();
            progress.total_charts += fetched;

            info!(
                fetch_after = %request.after_time,
                chart_id_after,
                last_chart_id_fetched = progress.cursor,
                new_songs,
                total_songs = progress.total_songs,
                total_charts = progress.total_charts,
                "Fetched catalog page"
            );

            on_page(&page, progress.cursor);

            self.emit(SyncEvent::PageFetched {
                page: progress.pages_completed,
                cursor: progress.cursor,
                records: fetched,
                new_songs,
                total_songs: progress.total_songs as u64,
            });

            if new_songs == 0 {
                break StopReason::Converged;
            }

            if let Some(max_pages) = self.config.max_pages {
                if progress.pages_completed >= max_pages {
                    warn!(
                        max_pages,
                        cursor = progress.cursor,
                        "Page limit reached before the catalog converged"
                    );
                    break StopReason::PageLimit;
                }
            }
        };

        info!(
            cursor = progress.cursor,
            pages = progress.pages_completed,
            total_songs = progress.total_songs,
            total_charts = progress.total_charts,
            ?stop_reason,
            "Catalog sync completed"
        );
        self.emit(SyncEvent::Completed {
            cursor: progress.cursor,
            pages: progress.pages_completed,
            total_songs: progress.total_songs as u64,
            total_charts: progress.total_charts,
        });

        Ok(SyncSnapshot {
            charts: merger.into_records(),
            metadata: RunMetadata {
                last_run,
                total_songs: progress.total_songs,
            },
            cursor: progress.cursor,
            pages: progress.pages_completed,
            total_charts: progress.total_charts,
            stop_reason,
        })
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(event_bus) = &self.event_bus {
            event_bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::catalog::{CatalogQuery, SearchOutcome};
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::time::FixedClock;
    use chrono::TimeZone;
    use mockall::{mock, Sequence};
    use serde_json::json;

    mock! {
        Source {}

        #[async_trait]
        impl CatalogSource for Source {
            async fn search(&self, query: &CatalogQuery) -> BridgeResult<SearchOutcome>;
        }
    }

    fn chart(chart_id: u64, group_id: u64) -> serde_json::Value {
        json!({
            "chartId": chart_id,
            "groupId": group_id,
            "name": format!("song {}", group_id),
            "modifiedTime": "2024-01-01T00:00:00Z"
        })
    }

    fn engine(source: MockSource, config: SyncConfig) -> SyncEngine {
        SyncEngine::new(Arc::new(source), config)
            .unwrap()
            .with_clock(Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            )))
    }

    #[test]
    fn test_config_validation() {
        assert!(SyncConfig::default().validate().is_ok());

        let config = SyncConfig {
            page_size: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        let config = SyncConfig {
            page_size: 251,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            max_pages: Some(0),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SyncConfig {
            page_size: 0,
            ..SyncConfig::default()
        };
        assert!(SyncEngine::new(Arc::new(MockSource::new()), config).is_err());
    }

    #[tokio::test]
    async fn test_converges_on_page_without_new_songs() {
        let mut source = MockSource::new();
        let mut seq = Sequence::new();
        source
            .expect_search()
            .withf(|query| query.chart_id_after == 0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SearchOutcome::Page(vec![chart(1, 10), chart(2, 11)])));
        source
            .expect_search()
            .withf(|query| query.chart_id_after == 2)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SearchOutcome::Page(vec![chart(3, 10)])));

        let config = SyncConfig {
            page_size: 2,
            ..SyncConfig::default()
        };
        let snapshot = engine(source, config)
            .run(DateTime::<Utc>::UNIX_EPOCH, |_, _| {})
            .await
            .unwrap();

        assert_eq!(snapshot.stop_reason, StopReason::Converged);
        assert_eq!(snapshot.pages, 2);
        assert_eq!(snapshot.cursor, 3);
        assert_eq!(snapshot.total_charts, 3);
        assert_eq!(snapshot.metadata.total_songs, 2);
        assert_eq!(
            snapshot.metadata.last_run,
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
        );
        assert!(snapshot.get(11).is_some());
        assert!(snapshot.get(12).is_none());
    }

    #[tokio::test]
    async fn test_page_limit_stops_run() {
        let mut source = MockSource::new();
        source.expect_search().times(2).returning(|query| {
            let next = query.chart_id_after + 1;
            Ok(SearchOutcome::Page(vec![chart(next, next)]))
        });

        let config = SyncConfig {
            page_size: 1,
            max_pages: Some(2),
            ..SyncConfig::default()
        };
        let snapshot = engine(source, config)
            .run(DateTime::<Utc>::UNIX_EPOCH, |_, _| {})
            .await
            .unwrap();

        assert_eq!(snapshot.stop_reason, StopReason::PageLimit);
        assert_eq!(snapshot.pages, 2);
        assert_eq!(snapshot.cursor, 2);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let mut source = MockSource::new();
        source
            .expect_search()
            .returning(|_| Ok(SearchOutcome::Page(vec![])));

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();

        engine(source, SyncConfig::default())
            .with_event_bus(bus)
            .run(DateTime::<Utc>::UNIX_EPOCH, |_, _| {})
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Started { start_cursor: 0, .. })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::PageFetched { page: 1, records: 0, new_songs: 0, .. })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Completed { pages: 1, total_songs: 0, .. })
        ));
    }

    #[test]
    fn test_sync_config_from_core_config() {
        use bridge_traits::error::BridgeError;
        use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
        use std::time::Duration;

        struct OfflineHttpClient;

        #[async_trait]
        impl HttpClient for OfflineHttpClient {
            async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
                Err(BridgeError::NotAvailable("offline".to_string()))
            }
        }

        let core = CoreConfig::builder()
            .mirror_dir("/tmp/mirror")
            .page_size(100)
            .max_pages(Some(5))
            .max_rate_limit_attempts(4)
            .rate_limit_base_delay(Duration::from_millis(250))
            .http_client(Arc::new(OfflineHttpClient))
            .build()
            .unwrap();

        let config = SyncConfig::from(&core);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.max_pages, Some(5));
        assert_eq!(config.rate_limit.max_attempts, 4);
        assert_eq!(config.rate_limit.base_delay, Duration::from_millis(250));
        assert!(config.rate_limit.use_exponential_backoff);
    }

    #[test]
    fn test_run_metadata_wire_names() {
        let metadata = RunMetadata {
            last_run: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            total_songs: 2,
        };
        let value = serde_json::to_value(&metadata).unwrap();

        assert_eq!(value["totalSongs"], json!(2));
        assert!(value.get("lastRun").is_some());
    }
}
