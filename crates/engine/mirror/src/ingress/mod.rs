//! Command ingress: a local HTTP listener that feeds the owning thread.
//!
//! The listener runs on its own threads and never touches scene state. It
//! talks to the owning thread through an `IngressContext`: a FIFO job queue
//! for refresh notifications and a last-writer-wins cell for the pending
//! movement direction.

pub mod routes;
pub mod server;

pub use routes::{classify, Reply, Route};
pub use server::CommandIngressServer;

use glam::Vec3;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt, io,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};
use thiserror::Error;

/// Errors emitted by the ingress server.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("failed to bind {addr}: {source}")]
    ListenerBindFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn ingress thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("operation not valid while {0}")]
    InvalidState(IngressState),
}

/// Lifecycle of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressState {
    Stopped,
    Starting,
    Listening,
    Stopping,
}

impl fmt::Display for IngressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngressState::Stopped => "stopped",
            IngressState::Starting => "starting",
            IngressState::Listening => "listening",
            IngressState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Remote movement commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Parses a command name, ignoring case and surrounding slashes.
    pub fn from_command(command: &str) -> Option<Self> {
        match command.trim_matches('/').to_ascii_lowercase().as_str() {
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Unit step in view space.
    pub fn vector(self) -> Vec3 {
        match self {
            Direction::Left => Vec3::NEG_X,
            Direction::Right => Vec3::X,
            Direction::Up => Vec3::Y,
            Direction::Down => Vec3::NEG_Y,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            Direction::Left => 1,
            Direction::Right => 2,
            Direction::Up => 3,
            Direction::Down => 4,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Direction::Left),
            2 => Some(Direction::Right),
            3 => Some(Direction::Up),
            4 => Some(Direction::Down),
            _ => None,
        }
    }
}

/// The pending movement direction.
///
/// Last writer wins: concurrent commands overwrite each other and only the
/// value present at the next tick is applied. Movement is deliberately not
/// queued.
#[derive(Debug, Default)]
pub struct PendingDirection(AtomicU8);

impl PendingDirection {
    pub fn set(&self, direction: Direction) {
        self.0.store(direction.to_bits(), Ordering::Release);
    }

    /// Returns the pending direction and clears it.
    pub fn take(&self) -> Option<Direction> {
        Direction::from_bits(self.0.swap(0, Ordering::AcqRel))
    }

    pub fn peek(&self) -> Option<Direction> {
        Direction::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// A unit of cross-thread work, consumed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressJob {
    ImmediateCommand(Direction),
    RefreshRequested,
}

/// A job with its arrival ticket. Tickets increase in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedJob {
    pub seq: u64,
    pub job: IngressJob,
}

#[derive(Debug, Default)]
struct JobQueueInner {
    jobs: VecDeque<QueuedJob>,
    next_seq: u64,
}

/// Mutex-guarded FIFO: many producers, one consumer draining per tick.
#[derive(Debug, Default)]
pub struct JobQueue {
    inner: Mutex<JobQueueInner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `job` and returns its ticket.
    pub fn push(&self, job: IngressJob) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.push_back(QueuedJob { seq, job });
        seq
    }

    /// Removes and returns everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<QueuedJob> {
        let mut inner = self.inner.lock();
        inner.jobs.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }
}

/// Everything the ingress threads share with the owning thread.
#[derive(Debug, Clone, Default)]
pub struct IngressContext {
    pub jobs: Arc<JobQueue>,
    pub direction: Arc<PendingDirection>,
}

impl IngressContext {
    pub fn new() -> Self {
        Self::default()
    }
}
