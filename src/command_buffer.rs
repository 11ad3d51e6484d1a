// src/command_buffer.rs
//! Deferred render command queue.
//!
//! Two kinds of entries share one FIFO:
//! - **Raw commands**: a plain function pointer plus a payload region carved out
//!   of a contiguous byte arena (`allocate`).
//! - **Closures**: any `FnOnce(&mut dyn RenderBackend) + Send` (`submit`).
//!
//! `execute` replays every entry exactly once in submission order, then resets
//! the queue. Capacity is a byte budget accounted per entry (header + payload);
//! running out is an error under [`OverflowPolicy::Fail`] and a doubling of
//! the budget under [`OverflowPolicy::Grow`].

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{trace, warn};

use crate::error::{Error, Result};
use crate::gpu::RenderBackend;

/// Function invoked with the payload bytes written by the submitter.
pub type RawCommandFn = fn(&[u8], &mut dyn RenderBackend);

/// Boxed deferred work for the render thread.
pub type RenderCommand = Box<dyn FnOnce(&mut dyn RenderBackend) + Send + 'static>;

/// Bytes charged for each entry header: function pointer + payload size.
pub const COMMAND_HEADER_SIZE: usize = std::mem::size_of::<RawCommandFn>() + std::mem::size_of::<u32>();

/// Default byte budget for one frame of commands (10 MiB).
pub const DEFAULT_QUEUE_CAPACITY: usize = 10 * 1024 * 1024;

/// What happens when a submission does not fit the byte budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Reject the submission with [`Error::CommandQueueFull`].
    #[default]
    Fail,
    /// Double the budget until the submission fits.
    Grow,
}

enum CommandEntry {
    Raw {
        func: RawCommandFn,
        payload: Range<usize>,
    },
    Closure(RenderCommand),
}

// ============================================================================
// QUEUE
// ============================================================================

pub struct CommandQueue {
    arena: Vec<u8>,
    entries: Vec<CommandEntry>,
    used: usize,
    capacity: usize,
    policy: OverflowPolicy,
}

impl CommandQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            arena: Vec::new(),
            entries: Vec::new(),
            used: 0,
            capacity,
            policy,
        }
    }

    /// Reserve `size` payload bytes for `func` and return them for the caller to fill.
    /// The payload is handed to `func` unchanged at execute time.
    pub fn allocate(&mut self, func: RawCommandFn, size: usize) -> Result<&mut [u8]> {
        self.reserve(COMMAND_HEADER_SIZE + size)?;

        let start = self.arena.len();
        self.arena.resize(start + size, 0);
        self.entries.push(CommandEntry::Raw {
            func,
            payload: start..start + size,
        });
        Ok(&mut self.arena[start..start + size])
    }

    /// Queue a closure. Its captured state is charged against the budget.
    pub fn submit<F>(&mut self, command: F) -> Result<()>
    where
        F: FnOnce(&mut dyn RenderBackend) + Send + 'static,
    {
        self.reserve(COMMAND_HEADER_SIZE + std::mem::size_of::<F>())?;
        self.entries.push(CommandEntry::Closure(Box::new(command)));
        Ok(())
    }

    /// Run every queued entry in order, then reset. Returns the number executed.
    pub fn execute(&mut self, backend: &mut dyn RenderBackend) -> usize {
        let count = self.entries.len();
        if count == 0 {
            return 0;
        }
        trace!("Executing {} render commands ({} bytes)", count, self.used);

        let arena = &self.arena;
        for entry in self.entries.drain(..) {
            match entry {
                CommandEntry::Raw { func, payload } => func(&arena[payload], &mut *backend),
                CommandEntry::Closure(command) => command(&mut *backend),
            }
        }

        self.arena.clear();
        self.used = 0;
        count
    }

    /// Move all pending entries out, leaving an empty queue with the same budget.
    pub fn take(&mut self) -> CommandQueue {
        let fresh = CommandQueue::new(self.capacity, self.policy);
        std::mem::replace(self, fresh)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes charged so far this frame.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn reserve(&mut self, bytes: usize) -> Result<()> {
        let needed = self.used + bytes;
        if needed > self.capacity {
            match self.policy {
                OverflowPolicy::Fail => {
                    return Err(Error::CommandQueueFull {
                        requested: bytes,
                        used: self.used,
                        capacity: self.capacity,
                    });
                }
                OverflowPolicy::Grow => {
                    let mut capacity = self.capacity.max(COMMAND_HEADER_SIZE);
                    while capacity < needed {
                        capacity *= 2;
                    }
                    warn!(
                        "Render command queue grew from {} to {} bytes",
                        self.capacity, capacity
                    );
                    self.capacity = capacity;
                }
            }
        }
        self.used = needed;
        Ok(())
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::default())
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("len", &self.entries.len())
            .field("used", &self.used)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish()
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for profiling the submit/execute cycle. Safe to read from any thread.
#[derive(Debug, Default)]
pub struct CommandMetrics {
    pub submitted: AtomicUsize,
    pub executed: AtomicUsize,
    pub rejected: AtomicUsize,
    pub frames: AtomicUsize,
    pub peak_bytes: AtomicUsize,
}

/// Plain copy of [`CommandMetrics`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub submitted: usize,
    pub executed: usize,
    pub rejected: usize,
    pub frames: usize,
    pub peak_bytes: usize,
}

impl CommandMetrics {
    pub(crate) fn record_submit(&self, accepted: bool, used_bytes: usize) {
        if accepted {
            self.submitted.fetch_add(1, Ordering::Relaxed);
            self.peak_bytes.fetch_max(used_bytes, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_frame(&self, executed: usize) {
        self.executed.fetch_add(executed, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
        }
    }
}
