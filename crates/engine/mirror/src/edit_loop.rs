//! The owning thread's per-tick routine.
//!
//! `EditLoop` is the only thing that mutates the scene mirror. Each tick it
//! drains the ingress queue, runs queued refreshes one after another, applies
//! the pending movement and local edits to the selected entry, and hands the
//! result to the push-back queue.

use crate::{
    catalog::{CatalogClient, CatalogError, ModelDescriptor},
    ingress::{Direction, IngressContext, IngressJob},
    push::{PushQueue, PushRequest},
    scene::{ReplaceSummary, SceneBackend, SceneEntry, SceneMirror},
    transform::DecomposedTransform,
};
use futures::future::join_all;
use glam::Quat;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An edit made on the owning thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalEdit {
    /// Camera-relative step of one move-speed unit.
    Translate(Direction),
    /// Rotation around world Y, in degrees.
    RotateYaw(f32),
    /// Uniform scale factor.
    Scale(f32),
}

impl LocalEdit {
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'a' => Some(LocalEdit::Translate(Direction::Left)),
            'd' => Some(LocalEdit::Translate(Direction::Right)),
            'w' => Some(LocalEdit::Translate(Direction::Up)),
            's' => Some(LocalEdit::Translate(Direction::Down)),
            'q' => Some(LocalEdit::RotateYaw(-90.0)),
            'e' => Some(LocalEdit::RotateYaw(90.0)),
            'z' => Some(LocalEdit::Scale(2.0)),
            'x' => Some(LocalEdit::Scale(0.5)),
            _ => None,
        }
    }
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Descriptors in the listing, hidden ones included.
    pub listed: usize,
    pub visible: usize,
    /// Visible descriptors whose asset downloaded and imported.
    pub resolved: usize,
    /// `None` when the scene was left untouched.
    pub replaced: Option<ReplaceSummary>,
}

/// What a tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub refreshes: usize,
    pub refresh_failures: usize,
    /// Id of the entry edited this tick.
    pub edited: Option<String>,
    /// Whether the edit made it into the push-back queue.
    pub pushed: bool,
}

pub struct EditLoop<B: SceneBackend> {
    backend: B,
    mirror: SceneMirror<B::Handle>,
    catalog: Arc<CatalogClient>,
    context: IngressContext,
    pushes: PushQueue,
    selected: Option<String>,
    pending_edits: Vec<LocalEdit>,
    move_speed: f32,
}

impl<B: SceneBackend> EditLoop<B> {
    pub fn new(
        backend: B,
        catalog: Arc<CatalogClient>,
        context: IngressContext,
        pushes: PushQueue,
        move_speed: f32,
    ) -> Self {
        Self {
            backend,
            mirror: SceneMirror::new(),
            catalog,
            context,
            pushes,
            selected: None,
            pending_edits: Vec::new(),
            move_speed,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn mirror(&self) -> &SceneMirror<B::Handle> {
        &self.mirror
    }

    pub fn context(&self) -> &IngressContext {
        &self.context
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_entry(&self) -> Option<&SceneEntry<B::Handle>> {
        self.selected.as_deref().and_then(|id| self.mirror.get(id))
    }

    /// Selects a tracked entry by id. Unknown ids leave the selection as is.
    pub fn select_id(&mut self, id: &str) -> bool {
        if !self.mirror.contains(id) {
            debug!(id, "cannot select untracked id");
            return false;
        }
        self.selected = Some(id.to_string());
        info!(id, "selected");
        true
    }

    /// Selects whichever tracked entry owns `handle`, e.g. a clicked sub-part.
    pub fn select_handle(&mut self, handle: B::Handle) -> Option<&str> {
        let Some(id) = self.mirror.lookup_id(&self.backend, handle).map(str::to_string) else {
            debug!(?handle, "hit object is not server-tracked");
            return None;
        };
        info!(id = %id, "selected");
        self.selected = Some(id);
        self.selected.as_deref()
    }

    /// Queues an edit for the next tick.
    pub fn queue_edit(&mut self, edit: LocalEdit) {
        self.pending_edits.push(edit);
    }

    /// Queues a refresh behind anything already pending.
    pub fn request_refresh(&self) -> u64 {
        self.context.jobs.push(IngressJob::RefreshRequested)
    }

    /// Runs one tick.
    ///
    /// Refreshes drained this tick are awaited in arrival order, so a refresh
    /// never starts before the previous one has replaced the scene. Pushes are
    /// only queued, never awaited.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for queued in self.context.jobs.drain() {
            match queued.job {
                IngressJob::RefreshRequested => {
                    report.refreshes += 1;
                    match self.refresh().await {
                        Ok(summary) => debug!(seq = queued.seq, ?summary, "refresh finished"),
                        Err(err) => {
                            report.refresh_failures += 1;
                            error!(seq = queued.seq, error = %err, "refresh failed, keeping current scene");
                        }
                    }
                }
                IngressJob::ImmediateCommand(direction) => self.context.direction.set(direction),
            }
        }

        // One-shot: cleared whether or not anything is selected.
        let mut edits = std::mem::take(&mut self.pending_edits);
        if let Some(direction) = self.context.direction.take() {
            edits.push(LocalEdit::Translate(direction));
        }
        if edits.is_empty() {
            return report;
        }

        let Some(entry) = self.selected_entry() else {
            debug!(count = edits.len(), "no selection, edits discarded");
            return report;
        };
        let id = entry.id.clone();
        let transform = edits
            .iter()
            .fold(entry.transform, |transform, edit| self.apply_edit(transform, *edit));

        self.mirror.set_transform(&mut self.backend, &id, transform);
        report.pushed = self.pushes.enqueue(PushRequest {
            id: id.clone(),
            matrix: transform.to_row_major(),
        });
        report.edited = Some(id);
        report
    }

    /// Fetch, resolve and rebuild.
    ///
    /// A failed listing leaves the scene untouched. Individual assets that
    /// fail are dropped from the batch. Downloads run concurrently; imports
    /// happen here on the owning thread once all of them have settled.
    pub async fn refresh(&mut self) -> Result<RefreshSummary, CatalogError> {
        let models = self.catalog.fetch_scene().await?;
        let listed = models.len();
        let visible: Vec<ModelDescriptor> = models.into_iter().filter(|m| !m.hidden).collect();
        info!(visible = visible.len(), total = listed, "fetched catalog listing");

        let mut summary = RefreshSummary {
            listed,
            visible: visible.len(),
            ..RefreshSummary::default()
        };
        if visible.is_empty() {
            warn!("no visible models in catalog listing, scene left as is");
            return Ok(summary);
        }

        let catalog = self.catalog.clone();
        let downloads = join_all(
            visible
                .iter()
                .map(|model| catalog.download_asset(&model.model_path, model.label())),
        )
        .await;

        let mut resolved = Vec::with_capacity(visible.len());
        for (descriptor, download) in visible.into_iter().zip(downloads) {
            let handle = match download {
                Ok(asset) => {
                    let imported = self.backend.instantiate(asset.path(), descriptor.label());
                    if let Err(err) = asset.close() {
                        debug!(id = %descriptor.id, error = %err, "temp asset not removed");
                    }
                    match imported {
                        Ok(handle) => Some(handle),
                        Err(err) => {
                            let err = CatalogError::AssetResolutionFailed {
                                name: descriptor.label().to_string(),
                                reason: err.to_string(),
                            };
                            warn!(id = %descriptor.id, error = %err, "asset import failed");
                            None
                        }
                    }
                }
                Err(err) => {
                    warn!(id = %descriptor.id, error = %err, "asset download failed");
                    None
                }
            };
            summary.resolved += usize::from(handle.is_some());
            resolved.push((handle, descriptor));
        }

        let replaced = self.mirror.replace_all(&mut self.backend, resolved);
        summary.replaced = Some(replaced);
        self.reconcile_selection();
        info!(
            tracked = replaced.tracked,
            skipped = replaced.skipped,
            released = replaced.released,
            "scene refreshed"
        );
        Ok(summary)
    }

    fn reconcile_selection(&mut self) {
        if self.selected.as_deref().is_some_and(|id| self.mirror.contains(id)) {
            return;
        }
        let next = self.mirror.first_id().map(str::to_string);
        if next != self.selected {
            debug!(previous = ?self.selected, next = ?next, "selection moved");
        }
        self.selected = next;
    }

    fn apply_edit(&self, mut transform: DecomposedTransform, edit: LocalEdit) -> DecomposedTransform {
        match edit {
            LocalEdit::Translate(direction) => {
                let step = self.backend.camera_rotation() * direction.vector();
                transform.position += step * self.move_speed;
            }
            LocalEdit::RotateYaw(degrees) => {
                transform.rotation =
                    (Quat::from_rotation_y(degrees.to_radians()) * transform.rotation).normalize();
            }
            LocalEdit::Scale(factor) => transform.scale *= factor,
        }
        transform
    }
}
