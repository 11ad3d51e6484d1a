// src/renderer.rs
//! Explicit render context.
//!
//! One `RenderContext` stands for the process's single GPU context. It is
//! created and dropped by the application and passed by reference to every
//! shader and material call that needs to queue GPU work.
//!
//! Submission is safe from any thread. Draining (`wait_and_render` or
//! `take_frame`) swaps the pending queue out under the lock and executes it
//! without holding the lock, so commands may queue work for the next frame.

use std::sync::Arc;

use log::{debug, error};
use parking_lot::Mutex;

use crate::command_buffer::{
    CommandMetrics, CommandQueue, MetricsSnapshot, OverflowPolicy, RawCommandFn, DEFAULT_QUEUE_CAPACITY,
};
use crate::error::Result;
use crate::gpu::RenderBackend;

/// Configuration for the render context and its render thread.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Byte budget of one frame's command queue.
    pub command_queue_capacity: usize,
    /// Behaviour when the budget is exhausted.
    pub overflow_policy: OverflowPolicy,
    /// Frames that may be queued to the render thread before `render_frame` blocks.
    pub frames_in_flight: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::Fail,
            frames_in_flight: 1,
        }
    }
}

impl RendererConfig {
    pub fn with_queue_capacity(mut self, bytes: usize) -> Self {
        self.command_queue_capacity = bytes;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }
}

pub struct RenderContext {
    config: RendererConfig,
    queue: Mutex<CommandQueue>,
    metrics: Arc<CommandMetrics>,
}

impl RenderContext {
    pub fn new(config: RendererConfig) -> Self {
        debug!(
            "Render context created ({} byte command budget, {:?} on overflow)",
            config.command_queue_capacity, config.overflow_policy
        );
        let queue = CommandQueue::new(config.command_queue_capacity, config.overflow_policy);
        Self {
            config,
            queue: Mutex::new(queue),
            metrics: Arc::new(CommandMetrics::default()),
        }
    }

    /// Queue `command` for the render thread.
    pub fn submit<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce(&mut dyn RenderBackend) + Send + 'static,
    {
        let mut queue = self.queue.lock();
        let result = queue.submit(command);
        self.record(&result, queue.used_bytes());
        result
    }

    /// Queue a raw command whose payload is a copy of `payload`.
    pub fn submit_raw(&self, func: RawCommandFn, payload: &[u8]) -> Result<()> {
        let mut queue = self.queue.lock();
        let result = queue
            .allocate(func, payload.len())
            .map(|slot| slot.copy_from_slice(payload));
        self.record(&result, queue.used_bytes());
        result
    }

    /// Drain the pending frame and run it on `backend`. Returns the number of commands run.
    pub fn wait_and_render(&self, backend: &mut dyn RenderBackend) -> usize {
        let mut frame = self.take_frame();
        let executed = frame.execute(backend);
        self.metrics.record_frame(executed);
        executed
    }

    /// Detach the pending frame, e.g. to hand it to a render thread.
    pub fn take_frame(&self) -> CommandQueue {
        self.queue.lock().take()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub(crate) fn metrics_handle(&self) -> Arc<CommandMetrics> {
        Arc::clone(&self.metrics)
    }

    fn record(&self, result: &Result<()>, used_bytes: usize) {
        self.metrics.record_submit(result.is_ok(), used_bytes);
        if let Err(err) = result {
            error!("Render command rejected: {}", err);
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(RendererConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_buffer::COMMAND_HEADER_SIZE;
    use crate::gpu::{GpuCall, ProgramId, RecordingBackend};
    use std::thread;

    fn use_program_from_payload(payload: &[u8], backend: &mut dyn RenderBackend) {
        backend.use_program(ProgramId(bytemuck::pod_read_unaligned(payload)));
    }

    #[test]
    fn test_submit_from_many_threads() {
        let ctx = Arc::new(RenderContext::default());

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let ctx = Arc::clone(&ctx);
                thread::spawn(move || {
                    for i in 0..25u32 {
                        ctx.submit(move |backend| backend.use_program(ProgramId(t * 100 + i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ctx.pending(), 100);

        let mut backend = RecordingBackend::new();
        assert_eq!(ctx.wait_and_render(&mut backend), 100);
        assert_eq!(ctx.pending(), 0);

        // Per-thread submission order survives.
        let from_first: Vec<u32> = backend
            .calls()
            .iter()
            .filter_map(|call| match call {
                GpuCall::UseProgram(ProgramId(id)) if *id < 100 => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(from_first, (0..25).collect::<Vec<_>>());

        let metrics = ctx.metrics();
        assert_eq!((metrics.submitted, metrics.executed, metrics.frames), (100, 100, 1));
    }

    #[test]
    fn test_raw_submission() {
        let ctx = RenderContext::default();
        ctx.submit_raw(use_program_from_payload, &7u32.to_ne_bytes()).unwrap();

        let mut backend = RecordingBackend::new();
        ctx.wait_and_render(&mut backend);
        assert_eq!(backend.calls(), &[GpuCall::UseProgram(ProgramId(7))]);
    }

    #[test]
    fn test_overflow_is_reported() {
        let ctx = RenderContext::new(RendererConfig::default().with_queue_capacity(COMMAND_HEADER_SIZE + 4));
        ctx.submit_raw(use_program_from_payload, &1u32.to_ne_bytes()).unwrap();
        assert!(ctx.submit_raw(use_program_from_payload, &2u32.to_ne_bytes()).is_err());
        assert_eq!(ctx.metrics().rejected, 1);
    }

    #[test]
    fn test_commands_queued_during_execute_land_next_frame() {
        let ctx = Arc::new(RenderContext::default());
        let inner = Arc::clone(&ctx);
        ctx.submit(move |_| {
            inner.submit(|backend| backend.use_program(ProgramId(2))).unwrap();
        })
        .unwrap();

        let mut backend = RecordingBackend::new();
        assert_eq!(ctx.wait_and_render(&mut backend), 1);
        assert_eq!(ctx.pending(), 1);
        assert_eq!(ctx.wait_and_render(&mut backend), 1);
        assert_eq!(backend.calls(), &[GpuCall::UseProgram(ProgramId(2))]);
    }
}
