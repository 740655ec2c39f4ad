//! # Catalog Sync Module
//!
//! Mirrors the remote chart catalog incrementally.
//!
//! ## Overview
//!
//! A sync run pages through the catalog in `chartId` order, keeps one record
//! per logical song (`groupId`), and stops once a page brings no new song.
//! The caller persists each page as it arrives and receives the final
//! deduplicated snapshot plus run metadata.
//!
//! ## Components
//!
//! - **Record Normalizer** (`record`): Typed catalog schema and the allow-listed projection
//! - **Dedup Merger** (`merger`): Newest-wins map keyed by `groupId`
//! - **Rate-Limited Client** (`client`): One page request with bounded 429 backoff
//! - **Sync Engine** (`engine`): The paginated crawl, termination and progress reporting

pub mod client;
pub mod engine;
pub mod error;
pub mod merger;
pub mod record;

pub use client::{RateLimitPolicy, RateLimitedClient};
pub use engine::{
    RunMetadata, StopReason, SyncConfig, SyncEngine, SyncProgress, SyncRequest, SyncSnapshot,
};
pub use error::{FetchError, MalformedRecordError, Result, SyncError};
pub use merger::{DedupMerger, MergeOutcome};
pub use record::{
    normalize, CatalogRecord, ChartFeatures, Difficulties, GroupId, NormalizedRecord, SongInfo,
};
