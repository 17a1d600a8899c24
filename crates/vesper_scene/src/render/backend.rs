//! Graphics backends: the boundary where completed frames leave the pipeline.

use std::sync::Arc;

use parking_lot::Mutex;

use super::RenderInstance;

/// Receives completed frames on the render thread.
///
/// Implementations issue the actual graphics work. `instances` is the full
/// visible set in draw order, valid only for the duration of the call.
pub trait RenderBackend: Send {
    /// Presents one completed update frame.
    fn present(&mut self, frame: u64, instances: &[RenderInstance]);
}

/// Discards every frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBackend;

impl RenderBackend for NullBackend {
    fn present(&mut self, _frame: u64, _instances: &[RenderInstance]) {}
}

/// A frame captured by [`RecordingBackend`].
#[derive(Clone, Debug, PartialEq)]
pub struct PresentedFrame {
    /// Update frame number.
    pub frame: u64,
    /// Visible instances in draw order.
    pub instances: Vec<RenderInstance>,
}

/// Keeps a copy of every presented frame.
///
/// Clones share the same log, so a test can keep one clone while the render
/// thread owns another.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    frames: Arc<Mutex<Vec<PresentedFrame>>>,
}

impl RecordingBackend {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every frame presented so far.
    #[must_use]
    pub fn frames(&self) -> Vec<PresentedFrame> {
        self.frames.lock().clone()
    }

    /// The most recently presented frame.
    #[must_use]
    pub fn last_frame(&self) -> Option<PresentedFrame> {
        self.frames.lock().last().cloned()
    }

    /// Number of frames presented.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl RenderBackend for RecordingBackend {
    fn present(&mut self, frame: u64, instances: &[RenderInstance]) {
        self.frames.lock().push(PresentedFrame {
            frame,
            instances: instances.to_vec(),
        });
    }
}
