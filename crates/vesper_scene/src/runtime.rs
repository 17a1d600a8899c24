//! # Threaded Runtime
//!
//! Spawns the update and render threads; the caller's thread is the event
//! thread and keeps the [`EventContext`].
//!
//! ```text
//!   caller (event) ──flush──▶ vesper-update ──flip + wake──▶ vesper-render ──▶ backend
//! ```
//!
//! The update thread runs one frame per tick of the configured interval. The
//! render thread sleeps until the update thread wakes it after a successful
//! flip. Shutdown stops the update thread first, so everything it emitted is
//! still presented before the render thread exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, tick, Receiver, RecvTimeoutError, Sender};
use vesper_core::{message_queue, RenderQueue};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::event::EventContext;
use crate::render::{RenderBackend, RenderContext};
use crate::scene::{SceneGraph, SceneStats};
use crate::update::UpdateManager;

const UPDATE_THREAD: &str = "vesper-update";
const RENDER_THREAD: &str = "vesper-render";

/// Upper bound on how long the render thread sleeps between stop checks.
const RENDER_IDLE: Duration = Duration::from_millis(50);

/// The three ends of an unthreaded pipeline.
///
/// Drive it by hand: flush `events`, call `update.update(..)`, then drain
/// `render_queue` with [`RenderQueue::process_pending`].
pub struct PipelineParts {
    /// Event-thread facade.
    pub events: EventContext,
    /// Update-thread driver, owning the scene graph.
    pub update: UpdateManager,
    /// Update→render queue.
    pub render_queue: Arc<RenderQueue<RenderContext>>,
}

/// Entry points for building a pipeline.
#[derive(Debug)]
pub struct Pipeline;

impl Pipeline {
    /// Builds the queues and scene graph without spawning threads.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn build(config: &PipelineConfig) -> PipelineResult<PipelineParts> {
        config.validate()?;

        let (sender, receiver) = message_queue(config.message_queue);
        let render_queue = Arc::new(RenderQueue::new(config.render_queue));
        let scene = SceneGraph::new(config.node_pool, config.renderer_pool);

        Ok(PipelineParts {
            events: EventContext::new(sender),
            update: UpdateManager::new(scene, receiver, Arc::clone(&render_queue)),
            render_queue,
        })
    }

    /// Starts the update and render threads.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation or a thread cannot be
    /// spawned.
    pub fn start(
        config: PipelineConfig,
        backend: Box<dyn RenderBackend>,
    ) -> PipelineResult<(EventContext, PipelineHandle)> {
        let PipelineParts {
            events,
            update,
            render_queue,
        } = Self::build(&config)?;

        let update_stop = Arc::new(AtomicBool::new(false));
        let render_stop = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = bounded(1);

        let render = {
            let queue = Arc::clone(&render_queue);
            let stop = Arc::clone(&render_stop);
            let context = RenderContext::new(backend);
            spawn(RENDER_THREAD, move || render_loop(&queue, context, &wake_rx, &stop))?
        };

        let mut handle = PipelineHandle {
            update: None,
            render: Some(render),
            update_stop: Arc::clone(&update_stop),
            render_stop,
            wake: wake_tx.clone(),
        };

        let interval = config.frame_interval();
        let update = spawn(UPDATE_THREAD, move || {
            update_loop(update, interval, &wake_tx, &update_stop)
        })?;
        handle.update = Some(update);

        tracing::info!(
            "Pipeline started (frame interval {} ms)",
            config.frame_interval_ms
        );
        Ok((events, handle))
    }
}

/// What the update thread reports when it exits.
#[derive(Clone, Copy, Debug, Default)]
struct UpdateSummary {
    frames: u64,
    messages_processed: u64,
    scene: SceneStats,
}

/// Totals collected at shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeReport {
    /// Update frames run.
    pub frames: u64,
    /// Event commands executed.
    pub messages_processed: u64,
    /// Frames handed to the backend.
    pub frames_presented: u64,
    /// Scene counters at exit.
    pub scene: SceneStats,
}

/// Owns the running threads. Dropping it stops them.
pub struct PipelineHandle {
    update: Option<JoinHandle<UpdateSummary>>,
    render: Option<JoinHandle<u64>>,
    update_stop: Arc<AtomicBool>,
    render_stop: Arc<AtomicBool>,
    wake: Sender<()>,
}

impl PipelineHandle {
    /// Stops both threads and collects their totals.
    ///
    /// Commands flushed before this call are processed and presented.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ThreadPanicked`] if either thread panicked.
    pub fn shutdown(mut self) -> PipelineResult<RuntimeReport> {
        let (update, render) = self.stop();
        let update = update?;
        let frames_presented = render?;

        let report = RuntimeReport {
            frames: update.frames,
            messages_processed: update.messages_processed,
            frames_presented,
            scene: update.scene,
        };
        tracing::info!(
            "Pipeline stopped: {} frames, {} messages, {} frames presented, {} stale commands",
            report.frames,
            report.messages_processed,
            report.frames_presented,
            report.scene.stale_commands
        );
        Ok(report)
    }

    fn stop(&mut self) -> (PipelineResult<UpdateSummary>, PipelineResult<u64>) {
        self.update_stop.store(true, Ordering::Release);
        let update = join(self.update.take(), UPDATE_THREAD);

        self.render_stop.store(true, Ordering::Release);
        let _ = self.wake.try_send(());
        let render = join(self.render.take(), RENDER_THREAD);

        (update, render)
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.update.is_some() || self.render.is_some() {
            let _ = self.stop();
        }
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("running", &self.update.is_some())
            .finish_non_exhaustive()
    }
}

fn spawn<T, F>(name: &'static str, body: F) -> PipelineResult<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(body)
        .map_err(|source| PipelineError::ThreadSpawn { name, source })
}

fn join<T: Default>(handle: Option<JoinHandle<T>>, name: &'static str) -> PipelineResult<T> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| PipelineError::ThreadPanicked(name)),
        None => Ok(T::default()),
    }
}

fn update_loop(
    mut manager: UpdateManager,
    interval: Duration,
    wake: &Sender<()>,
    stop: &AtomicBool,
) -> UpdateSummary {
    let ticker = tick(interval);
    let mut last = Instant::now();

    while !stop.load(Ordering::Acquire) {
        if ticker.recv().is_err() {
            break;
        }
        let now = Instant::now();
        let status = manager.update(now.duration_since(last).as_secs_f32());
        last = now;
        if status.render_flipped {
            let _ = wake.try_send(());
        }
    }

    // Pick up anything flushed just before the stop request.
    let status = manager.update(last.elapsed().as_secs_f32());
    if status.render_flipped {
        let _ = wake.try_send(());
    }

    let scene = manager.scene().stats();
    tracing::debug!("Update thread exiting after {} frames", manager.frame());
    UpdateSummary {
        frames: manager.frame(),
        messages_processed: manager.messages_processed(),
        scene,
    }
}

fn render_loop(
    queue: &RenderQueue<RenderContext>,
    mut context: RenderContext,
    wake: &Receiver<()>,
    stop: &AtomicBool,
) -> u64 {
    loop {
        match wake.recv_timeout(RENDER_IDLE) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if let Some((index, executed)) = queue.process_pending(&mut context) {
            tracing::trace!("Rendered container {} ({} commands)", index, executed);
        }
        if stop.load(Ordering::Acquire) {
            break;
        }
    }

    // The update thread has exited; take whatever it could not hand over.
    queue.process_pending(&mut context);
    if queue.flip() {
        queue.process_pending(&mut context);
    }

    tracing::debug!(
        "Render thread exiting after {} frames",
        context.frames_presented()
    );
    context.frames_presented()
}
