//! # Core Configuration Module
//!
//! Provides configuration management for the chart mirror.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the bridges and settings a sync run needs. It enforces
//! fail-fast validation so a misconfigured run never reaches the network.
//!
//! ## Required Settings
//!
//! - `mirror_dir` - Where the local mirror is persisted
//! - `HttpClient` - Required unless the `desktop-shims` feature injects the
//!   reqwest-backed default
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .mirror_dir("/path/to/mirror")
//!     .page_size(100)
//!     .max_rate_limit_attempts(5)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! The builder returns [`Error::Config`] for invalid values and
//! [`Error::CapabilityMissing`] when no HTTP client can be provided.

use crate::error::{Error, Result};
use bridge_traits::HttpClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Production catalog endpoint
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://api.enchor.us";

/// Largest page the catalog search API serves
pub const MAX_PAGE_SIZE: u32 = 250;

/// Core configuration for the chart mirror.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Base URL of the catalog search API
    pub catalog_base_url: String,

    /// Per-request timeout for catalog queries
    pub request_timeout: Duration,

    /// Directory holding the local mirror files
    pub mirror_dir: PathBuf,

    /// Records requested per catalog page
    pub page_size: u32,

    /// Development ceiling on pages per run
    pub max_pages: Option<u32>,

    /// Attempts per page before a rate-limited request becomes fatal
    pub max_rate_limit_attempts: u32,

    /// First backoff delay after a rate-limited response
    pub rate_limit_base_delay: Duration,

    /// HTTP client used by the catalog provider
    pub http_client: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("catalog_base_url", &self.catalog_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("mirror_dir", &self.mirror_dir)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("max_rate_limit_attempts", &self.max_rate_limit_attempts)
            .field("rate_limit_base_delay", &self.rate_limit_base_delay)
            .field("http_client", &"HttpClient { ... }")
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    catalog_base_url: Option<String>,
    request_timeout: Option<Duration>,
    mirror_dir: Option<PathBuf>,
    page_size: Option<u32>,
    max_pages: Option<u32>,
    max_rate_limit_attempts: Option<u32>,
    rate_limit_base_delay: Option<Duration>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl CoreConfigBuilder {
    pub fn catalog_base_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_base_url = Some(url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn mirror_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.mirror_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn max_pages(mut self, pages: Option<u32>) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn max_rate_limit_attempts(mut self, attempts: u32) -> Self {
        self.max_rate_limit_attempts = Some(attempts);
        self
    }

    pub fn rate_limit_base_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_base_delay = Some(delay);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the mirror directory is missing, the base URL is
    ///   not http(s), the page size is outside `1..=250`, or zero rate-limit
    ///   attempts are allowed
    /// - `Error::CapabilityMissing` if no HTTP client is available
    pub fn build(self) -> Result<CoreConfig> {
        let mirror_dir = self
            .mirror_dir
            .ok_or_else(|| Error::Config("mirror_dir is required".to_string()))?;

        let catalog_base_url = self
            .catalog_base_url
            .unwrap_or_else(|| DEFAULT_CATALOG_BASE_URL.to_string());
        if !(catalog_base_url.starts_with("http://") || catalog_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "catalog_base_url must be an http(s) URL, got {}",
                catalog_base_url
            )));
        }

        let page_size = self.page_size.unwrap_or(MAX_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }

        let max_rate_limit_attempts = self.max_rate_limit_attempts.unwrap_or(10);
        if max_rate_limit_attempts == 0 {
            return Err(Error::Config(
                "max_rate_limit_attempts must be at least 1".to_string(),
            ));
        }

        if self.max_pages == Some(0) {
            return Err(Error::Config("max_pages must be at least 1".to_string()));
        }

        let request_timeout = self.request_timeout.unwrap_or(Duration::from_secs(30));
        let http_client = resolve_http_client(self.http_client, request_timeout)?;

        Ok(CoreConfig {
            catalog_base_url: catalog_base_url.trim_end_matches('/').to_string(),
            request_timeout,
            mirror_dir,
            page_size,
            max_pages: self.max_pages,
            max_rate_limit_attempts,
            rate_limit_base_delay: self.rate_limit_base_delay.unwrap_or(Duration::from_secs(1)),
            http_client,
        })
    }
}

#[cfg(feature = "desktop-shims")]
fn resolve_http_client(
    client: Option<Arc<dyn HttpClient>>,
    timeout: Duration,
) -> Result<Arc<dyn HttpClient>> {
    match client {
        Some(client) => Ok(client),
        None => {
            let client = bridge_desktop::ReqwestHttpClient::with_timeout(timeout)
                .map_err(|e| Error::Config(e.to_string()))?;
            Ok(Arc::new(client))
        }
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn resolve_http_client(
    client: Option<Arc<dyn HttpClient>>,
    _timeout: Duration,
) -> Result<Arc<dyn HttpClient>> {
    client.ok_or_else(|| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                  Desktop: enable the `desktop-shims` feature. \
                  Tests: inject a mock client."
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::{HttpRequest, HttpResponse};

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> bridge_traits::error::Result<HttpResponse> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .mirror_dir("/tmp/mirror")
            .http_client(Arc::new(NoopHttpClient))
    }

    #[test]
    fn test_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.catalog_base_url, DEFAULT_CATALOG_BASE_URL);
        assert_eq!(config.page_size, 250);
        assert_eq!(config.max_pages, None);
        assert_eq!(config.max_rate_limit_attempts, 10);
        assert_eq!(config.rate_limit_base_delay, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = builder()
            .catalog_base_url("http://localhost:4200/api/")
            .build()
            .unwrap();
        assert_eq!(config.catalog_base_url, "http://localhost:4200/api");
    }

    #[test]
    fn test_missing_mirror_dir() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(NoopHttpClient))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_page_size() {
        assert!(matches!(builder().page_size(0).build(), Err(Error::Config(_))));
        assert!(matches!(builder().page_size(251).build(), Err(Error::Config(_))));
        assert!(builder().page_size(1).build().is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        let result = builder().catalog_base_url("ftp://catalog").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(builder().max_rate_limit_attempts(0).build().is_err());
        assert!(builder().max_pages(Some(0)).build().is_err());
        assert_eq!(
            builder().max_pages(Some(3)).build().unwrap().max_pages,
            Some(3)
        );
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_http_client() {
        let result = CoreConfig::builder().mirror_dir("/tmp/mirror").build();
        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));
    }
}
