//! Catalog HTTP client implementation

use super::{
    asset::{sanitize_name, DownloadedAsset},
    describe, CatalogError, CatalogResult, ModelDescriptor,
};
use crate::transform::RowMajor;
use reqwest::{Client, RequestBuilder, Url};
use std::{io::Write, path::PathBuf, time::Duration};
use tracing::debug;

/// Listing endpoint, filtered by `scene_id`.
const MODELS_SEARCH_PATH: &str = "/api/models/search";

/// Suffix given to downloaded asset files.
const ASSET_SUFFIX: &str = ".glb";

/// Catalog HTTP client
///
/// Every request is a plain async call; nothing is retried here. Callers
/// decide how failures affect the scene.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    base_url: String,
    scene_id: String,
    request_timeout: Option<Duration>,
    download_dir: Option<PathBuf>,
}

impl CatalogClient {
    /// Create a client for the catalog at `base_url`, scoped to `scene_id`.
    ///
    /// * `base_url` - e.g. "http://127.0.0.1:8000"
    /// * `scene_id` - scene whose models are listed and updated
    pub fn new(base_url: impl Into<String>, scene_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            scene_id: scene_id.into(),
            request_timeout: None,
            download_dir: None,
        }
    }

    /// Bound every request by `timeout`. Without one a hung catalog stalls
    /// only the operation waiting on it.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Place downloads in `dir` instead of the system temp dir.
    pub fn with_download_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.download_dir = dir;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    /// Fetch the full model list for the configured scene.
    pub async fn fetch_scene(&self) -> CatalogResult<Vec<ModelDescriptor>> {
        self.fetch_list(Some(&self.scene_id)).await
    }

    /// Fetch the full model list, optionally filtered by scene.
    ///
    /// Hidden models are included; filtering them is the caller's job.
    pub async fn fetch_list(&self, scene_filter: Option<&str>) -> CatalogResult<Vec<ModelDescriptor>> {
        let url = format!("{}{}", self.base_url, MODELS_SEARCH_PATH);
        let mut request = self.client.get(&url);
        if let Some(scene_id) = scene_filter {
            request = request.query(&[("scene_id", scene_id)]);
        }

        let response = self
            .apply_timeout(request)
            .send()
            .await
            .map_err(|e| CatalogError::FetchFailed(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::FetchFailed(format!(
                "listing returned status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::FetchFailed(describe(&e)))?;
        let models: Vec<ModelDescriptor> = serde_json::from_str(&body)
            .map_err(|e| CatalogError::FetchFailed(format!("invalid listing: {e}")))?;

        debug!(count = models.len(), "fetched model list");
        Ok(models)
    }

    /// Download `uri` into a temp file named after `dest_name`.
    ///
    /// The returned asset deletes its file on drop. On failure nothing is
    /// left behind: a partially written temp file is dropped with the error.
    pub async fn download_asset(&self, uri: &str, dest_name: &str) -> CatalogResult<DownloadedAsset> {
        let fail = |reason: String| CatalogError::AssetResolutionFailed {
            name: dest_name.to_string(),
            reason,
        };

        let url = self.resolve_uri(uri);
        let mut response = self
            .apply_timeout(self.client.get(&url))
            .send()
            .await
            .map_err(|e| fail(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("download of {url} returned status {status}")));
        }

        let prefix = format!("{}-", sanitize_name(dest_name));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(ASSET_SUFFIX);
        let mut file = match &self.download_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| fail(format!("temp file: {e}")))?;

        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(|e| fail(describe(&e)))? {
            file.write_all(&chunk)
                .map_err(|e| fail(format!("write: {e}")))?;
            written += chunk.len();
        }
        file.flush().map_err(|e| fail(format!("flush: {e}")))?;

        debug!(name = dest_name, bytes = written, "downloaded asset");
        Ok(DownloadedAsset::new(dest_name, file.into_temp_path()))
    }

    /// Post a row-major placement for `id`, tagged with the active scene.
    pub async fn push_transform(&self, id: &str, matrix: &RowMajor) -> CatalogResult<()> {
        let fail = |reason: String| CatalogError::PushFailed {
            id: id.to_string(),
            reason,
        };

        let url = self.transform_url(id).map_err(fail)?;
        let encoded = serde_json::to_string(matrix).map_err(|e| fail(e.to_string()))?;

        let response = self
            .apply_timeout(self.client.post(url))
            .form(&[("transform", encoded.as_str()), ("scene_id", self.scene_id.as_str())])
            .send()
            .await
            .map_err(|e| fail(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(format!("status {status}: {body}")));
        }

        debug!(id, "transform pushed");
        Ok(())
    }

    /// `<base>/api/models/<id>/transform`, with `id` escaped as a path segment.
    fn transform_url(&self, id: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| format!("bad base url: {e}"))?;
        url.path_segments_mut()
            .map_err(|_| "base url cannot hold a path".to_string())?
            .pop_if_empty()
            .extend(["api", "models", id, "transform"]);
        Ok(url)
    }

    /// Absolute URIs pass through; anything else is taken relative to the
    /// catalog base.
    fn resolve_uri(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri.to_string()
        } else {
            format!("{}/{}", self.base_url, uri.trim_start_matches('/'))
        }
    }

    fn apply_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}
