use super::{Aabb, SceneBackend};
use crate::{catalog::ModelDescriptor, transform::DecomposedTransform};
use std::{collections::HashMap, fmt::Debug, hash::Hash};
use tracing::{debug, warn};

/// One catalog model instantiated in the local scene.
#[derive(Debug, Clone)]
pub struct SceneEntry<H> {
    pub id: String,
    pub name: String,
    pub handle: H,
    pub transform: DecomposedTransform,
}

/// Outcome of a `replace_all` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    /// Entries tracked after the call.
    pub tracked: usize,
    /// Entries released from the previous set.
    pub released: usize,
    /// Descriptors whose asset never resolved.
    pub skipped: usize,
    /// Descriptors placed at identity because their matrix was unusable.
    pub malformed: usize,
    /// Descriptors that repeated an id already seen in the same batch.
    pub duplicates: usize,
}

/// Tracks which scene objects belong to which catalog id.
///
/// The id map is the only record of what is server-tracked: at most one
/// entry per id, and nothing from a previous refresh survives `replace_all`.
#[derive(Debug)]
pub struct SceneMirror<H> {
    entries: HashMap<String, SceneEntry<H>>,
    by_handle: HashMap<H, String>,
    order: Vec<String>,
}

impl<H> Default for SceneMirror<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            by_handle: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<H: Copy + Eq + Hash + Debug> SceneMirror<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&SceneEntry<H>> {
        self.entries.get(id)
    }

    /// Tracked ids in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SceneEntry<H>> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn first_id(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    /// Releases every tracked handle and rebuilds from `resolved`.
    ///
    /// Pairs without a handle are assets that failed to resolve and are
    /// skipped. Each registered handle is placed from its descriptor's matrix
    /// and given a collider so pointer selection can find it.
    pub fn replace_all<B>(
        &mut self,
        backend: &mut B,
        resolved: Vec<(Option<H>, ModelDescriptor)>,
    ) -> ReplaceSummary
    where
        B: SceneBackend<Handle = H>,
    {
        let mut summary = ReplaceSummary {
            released: self.clear(backend),
            ..ReplaceSummary::default()
        };

        for (handle, descriptor) in resolved {
            let Some(handle) = handle else {
                summary.skipped += 1;
                continue;
            };

            let transform = match descriptor.placement() {
                Ok(transform) => transform,
                Err(err) => {
                    warn!(id = %descriptor.id, error = %err, "malformed transform, using identity");
                    summary.malformed += 1;
                    DecomposedTransform::IDENTITY
                }
            };

            if let Some(previous) = self.entries.remove(&descriptor.id) {
                warn!(id = %descriptor.id, "duplicate id in catalog listing, keeping the later one");
                self.by_handle.remove(&previous.handle);
                self.order.retain(|id| id != &descriptor.id);
                backend.destroy(previous.handle);
                summary.duplicates += 1;
            }

            backend.set_transform(handle, &transform);
            if !backend.has_collider(handle) {
                let collider = backend.render_bounds(handle).unwrap_or_else(Aabb::unit);
                backend.attach_collider(handle, collider);
            }

            self.by_handle.insert(handle, descriptor.id.clone());
            self.order.push(descriptor.id.clone());
            self.entries.insert(
                descriptor.id.clone(),
                SceneEntry {
                    name: descriptor.label().to_string(),
                    id: descriptor.id,
                    handle,
                    transform,
                },
            );
        }

        summary.tracked = self.entries.len();
        debug!(?summary, "scene mirror rebuilt");
        summary
    }

    /// Releases every tracked handle. Returns how many were released.
    pub fn clear<B>(&mut self, backend: &mut B) -> usize
    where
        B: SceneBackend<Handle = H>,
    {
        let released = self.entries.len();
        for id in self.order.drain(..) {
            if let Some(entry) = self.entries.remove(&id) {
                backend.destroy(entry.handle);
            }
        }
        self.entries.clear();
        self.by_handle.clear();
        released
    }

    /// Resolves `handle` to the tracked entry that owns it, walking up
    /// through its ancestors so that a clicked sub-part selects the model.
    pub fn lookup_id<B>(&self, backend: &B, handle: H) -> Option<&str>
    where
        B: SceneBackend<Handle = H>,
    {
        let mut current = Some(handle);
        while let Some(candidate) = current {
            if let Some(id) = self.by_handle.get(&candidate) {
                return Some(id.as_str());
            }
            current = backend.parent(candidate);
        }
        None
    }

    /// Replaces the placement of a tracked entry, locally and in the backend.
    pub fn set_transform<B>(
        &mut self,
        backend: &mut B,
        id: &str,
        transform: DecomposedTransform,
    ) -> bool
    where
        B: SceneBackend<Handle = H>,
    {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        entry.transform = transform;
        backend.set_transform(entry.handle, &transform);
        true
    }
}
