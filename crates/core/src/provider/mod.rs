//! Subtitle provider abstraction.
//!
//! This module provides the `SubtitleProvider` trait implemented by every
//! subtitle source, a `ProviderRegistry` mapping provider ids to
//! implementations, and a generic JSON-gateway backend for deployments that
//! front site scrapers behind an HTTP API.

mod http;
mod registry;
mod types;

pub use http::HttpProvider;
pub use registry::ProviderRegistry;
pub use types::*;
