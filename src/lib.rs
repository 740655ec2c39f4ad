//! Workspace facade crate.
//!
//! Re-exports the chart mirror crates so host applications can depend on
//! `chart-mirror-workspace` alone. The `desktop` feature (on by default)
//! pulls in the reqwest-backed HTTP client and lets `CoreConfig` fall back to
//! it when no client is injected.

pub use bridge_traits;
pub use core_runtime;
pub use core_sync;
pub use provider_enchor;

#[cfg(feature = "desktop")]
pub use bridge_desktop;

/// The types needed to run a sync from a host application.
pub mod prelude {
    pub use bridge_traits::{CatalogSource, ChartId, Clock, HttpClient};
    pub use core_runtime::config::CoreConfig;
    pub use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
    pub use core_sync::{
        DedupMerger, NormalizedRecord, StopReason, SyncConfig, SyncEngine, SyncError,
        SyncRequest, SyncSnapshot,
    };
    pub use provider_enchor::EnchorConnector;
}
