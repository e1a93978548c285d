//! Client-side mirror of a remote model catalog.
//!
//! This crate provides:
//! - Row-major matrix decomposition into position/rotation/scale
//! - An async client for listing models, downloading assets and pushing edits
//! - A scene mirror that rebuilds the local object set on every refresh
//! - A local HTTP ingress for refresh notifications and movement commands
//! - The per-tick edit loop that ties them together on one owning thread

pub mod catalog;
pub mod config;
pub mod edit_loop;
pub mod headless;
pub mod ingress;
pub mod push;
pub mod scene;
pub mod transform;

pub use catalog::{CatalogClient, CatalogError, CatalogResult, DownloadedAsset, ModelDescriptor};
pub use config::{timeout_from_secs, ConfigError, MirrorConfig};
pub use edit_loop::{EditLoop, LocalEdit, RefreshSummary, TickReport};
pub use headless::{HeadlessScene, NodeId};
pub use ingress::{
    CommandIngressServer, Direction, IngressContext, IngressError, IngressJob, IngressState,
};
pub use push::{spawn_push_worker, start_push_reporter, PushQueue, PushRequest, PushStats};
pub use scene::{Aabb, ImportError, ReplaceSummary, SceneBackend, SceneEntry, SceneMirror};
pub use transform::{decompose, DecomposedTransform, MalformedTransform, RowMajor};
