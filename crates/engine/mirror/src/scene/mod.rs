//! Local scene state and the seam to whatever renders it.
//!
//! `SceneBackend` is implemented by the host that owns renderable objects.
//! Every method is called from the owning thread only; handles never cross
//! to the ingress or push-back threads.

pub mod mirror;

pub use mirror::{ReplaceSummary, SceneEntry, SceneMirror};

use crate::transform::DecomposedTransform;
use glam::{Quat, Vec3};
use std::{fmt::Debug, hash::Hash, io, path::Path};
use thiserror::Error;

/// Errors raised while turning a downloaded file into a scene object.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unreadable asset: {0}")]
    Parse(String),
}

/// Axis-aligned box in a handle's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Unit cube around the origin, used when a model has nothing to measure.
    pub fn unit() -> Self {
        Self::new(Vec3::splat(-0.5), Vec3::splat(0.5))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Host-side scene operations needed to mirror the catalog.
pub trait SceneBackend {
    type Handle: Copy + Eq + Hash + Debug;

    /// Import the asset at `path` and instantiate it as a new root object.
    fn instantiate(&mut self, path: &Path, name: &str) -> Result<Self::Handle, ImportError>;

    /// Release `handle` and everything beneath it.
    fn destroy(&mut self, handle: Self::Handle);

    /// Structural parent, `None` for roots and released handles.
    fn parent(&self, handle: Self::Handle) -> Option<Self::Handle>;

    fn set_transform(&mut self, handle: Self::Handle, transform: &DecomposedTransform);

    /// Bounds of all renderable geometry under `handle`, if there is any.
    fn render_bounds(&self, handle: Self::Handle) -> Option<Aabb>;

    fn has_collider(&self, handle: Self::Handle) -> bool;

    /// Attach a box collider for hit-testing.
    fn attach_collider(&mut self, handle: Self::Handle, collider: Aabb);

    /// Orientation of the viewer; movement commands are relative to it.
    fn camera_rotation(&self) -> Quat {
        Quat::IDENTITY
    }
}
