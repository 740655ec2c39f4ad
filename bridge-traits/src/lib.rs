//! # Host Bridge Traits
//!
//! Capability traits the chart mirror core depends on but does not implement.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and the outside
//! world. The core never talks to the network or the system clock directly;
//! it goes through one of these traits so that hosts can swap transports and
//! tests can substitute deterministic fakes.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP execution
//! - [`CatalogSource`](catalog::CatalogSource) - One catalog search query with a classified outcome
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Implementations
//! should convert transport-specific errors to `BridgeError` and keep the
//! message actionable (include the URL or status that failed).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared behind
//! `Arc` across async tasks.
//!
//! ## Examples
//!
//! ### Implementing CatalogSource
//!
//! ```ignore
//! use bridge_traits::catalog::{CatalogQuery, CatalogSource, SearchOutcome};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct FixtureCatalog {
//!     pages: Vec<Vec<serde_json::Value>>,
//! }
//!
//! #[async_trait]
//! impl CatalogSource for FixtureCatalog {
//!     async fn search(&self, query: &CatalogQuery) -> Result<SearchOutcome> {
//!         // Implementation
//!         todo!()
//!     }
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{CatalogQuery, CatalogSource, ChartId, SearchOutcome};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
