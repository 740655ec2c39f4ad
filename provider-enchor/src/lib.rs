//! # Enchor Catalog Provider
//!
//! Implements `CatalogSource` for the Enchor chart search API.
//!
//! ## Overview
//!
//! This module provides:
//! - The advanced-search request body with every filter left open
//! - Classification of responses into pages, rate limiting and rejections
//! - `Retry-After` / `RateLimit-Reset` parsing for backoff hints

pub mod connector;
pub mod error;
pub mod types;

pub use connector::EnchorConnector;
pub use error::{EnchorError, Result};
