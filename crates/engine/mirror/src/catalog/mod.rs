//! Client for the remote model catalog.
//!
//! The catalog is the source of truth for which models exist in a scene and
//! where they are placed. This module fetches the model list, downloads
//! individual assets into scoped temp files, and posts edited placements
//! back.

pub mod asset;
pub mod client;
pub mod types;

pub use asset::DownloadedAsset;
pub use client::CatalogClient;
pub use types::ModelDescriptor;

use thiserror::Error;

/// Errors emitted by catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Listing the catalog failed; the refresh that asked for it is abandoned.
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    /// One asset could not be downloaded or imported; only that model is dropped.
    #[error("asset '{name}' could not be resolved: {reason}")]
    AssetResolutionFailed { name: String, reason: String },
    /// A transform push-back was rejected or never reached the catalog.
    #[error("transform push for '{id}' failed: {reason}")]
    PushFailed { id: String, reason: String },
}

/// Convenience result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

pub(crate) fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
