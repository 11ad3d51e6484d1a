// src/render_thread.rs
//! Dedicated render thread.
//!
//! The thread owns the backend for its whole life. Frames detached from a
//! [`RenderContext`] travel over a bounded channel (`frames_in_flight` deep),
//! so a producer that runs ahead of the GPU blocks in `render_frame` instead
//! of piling up frames. `wait_idle` is the frame barrier.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info};

use crate::command_buffer::{CommandMetrics, CommandQueue};
use crate::error::{Error, Result};
use crate::gpu::RenderBackend;
use crate::renderer::RenderContext;

enum RenderMessage {
    Frame(CommandQueue),
    Shutdown,
}

pub struct RenderThread<B: RenderBackend + Send + 'static> {
    frames: Sender<RenderMessage>,
    completed: Receiver<usize>,
    in_flight: usize,
    handle: Option<JoinHandle<B>>,
}

impl<B: RenderBackend + Send + 'static> RenderThread<B> {
    /// Move `backend` onto a new thread named `slop-render`.
    pub fn spawn(ctx: &RenderContext, backend: B) -> Result<Self> {
        let (frames, inbox) = bounded(ctx.config().frames_in_flight.max(1));
        let (done, completed) = unbounded();
        let metrics = ctx.metrics_handle();

        let handle = thread::Builder::new()
            .name("slop-render".into())
            .spawn(move || render_loop(backend, inbox, done, metrics))?;

        info!("Render thread started");
        Ok(Self {
            frames,
            completed,
            in_flight: 0,
            handle: Some(handle),
        })
    }

    /// Detach the context's pending commands and queue them as one frame.
    pub fn render_frame(&mut self, ctx: &RenderContext) -> Result<()> {
        let frame = ctx.take_frame();
        self.frames
            .send(RenderMessage::Frame(frame))
            .map_err(|_| Error::RenderThread("render thread is gone".into()))?;
        self.in_flight += 1;
        Ok(())
    }

    /// Block until every queued frame has executed. Returns the number of commands run.
    pub fn wait_idle(&mut self) -> Result<usize> {
        let mut executed = 0;
        while self.in_flight > 0 {
            executed += self
                .completed
                .recv()
                .map_err(|_| Error::RenderThread("render thread stopped mid-frame".into()))?;
            self.in_flight -= 1;
        }
        Ok(executed)
    }

    /// Drain outstanding frames, stop the thread and hand the backend back.
    pub fn shutdown(mut self) -> Result<B> {
        self.wait_idle()?;
        let _ = self.frames.send(RenderMessage::Shutdown);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::RenderThread("render thread already joined".into()))?;
        handle
            .join()
            .map_err(|_| Error::RenderThread("render thread panicked".into()))
    }
}

impl<B: RenderBackend + Send + 'static> Drop for RenderThread<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.frames.send(RenderMessage::Shutdown);
            let _ = handle.join();
        }
    }
}

fn render_loop<B: RenderBackend>(
    mut backend: B,
    inbox: Receiver<RenderMessage>,
    done: Sender<usize>,
    metrics: Arc<CommandMetrics>,
) -> B {
    for message in inbox {
        match message {
            RenderMessage::Frame(mut frame) => {
                let executed = frame.execute(&mut backend);
                metrics.record_frame(executed);
                let _ = done.send(executed);
            }
            RenderMessage::Shutdown => break,
        }
    }
    debug!("Render thread exiting");
    backend
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, ProgramId, RecordingBackend};
    use crate::renderer::RendererConfig;

    #[test]
    fn test_frames_run_on_render_thread_in_order() {
        let ctx = RenderContext::new(RendererConfig::default().with_frames_in_flight(2));
        let mut render = RenderThread::spawn(&ctx, RecordingBackend::new()).unwrap();

        for frame in 0..3u32 {
            for i in 0..4u32 {
                ctx.submit(move |backend| {
                    assert_eq!(thread::current().name(), Some("slop-render"));
                    backend.use_program(ProgramId(frame * 10 + i));
                })
                .unwrap();
            }
            render.render_frame(&ctx).unwrap();
        }

        assert_eq!(render.wait_idle().unwrap(), 12);
        let backend = render.shutdown().unwrap();

        let ids: Vec<u32> = backend
            .calls()
            .iter()
            .filter_map(|call| match call {
                GpuCall::UseProgram(ProgramId(id)) => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 10, 11, 12, 13, 20, 21, 22, 23]);
        assert_eq!(ctx.metrics().frames, 3);
    }

    #[test]
    fn test_empty_frame_is_noop() {
        let ctx = RenderContext::default();
        let mut render = RenderThread::spawn(&ctx, RecordingBackend::new()).unwrap();
        render.render_frame(&ctx).unwrap();
        assert_eq!(render.wait_idle().unwrap(), 0);
        assert!(render.shutdown().unwrap().calls().is_empty());
    }
}
