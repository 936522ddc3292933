use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use rollcall_types::{vision::ImageFrame, Result};
use tracing::info;

use crate::{capture_error, FrameSource, SourceMetrics};

/// Source whose readiness is flipped from outside; grabs solid-color
/// frames. Used for integration testing of the capture loop.
pub struct ScriptedSource {
    width: u32,
    height: u32,
    opened: bool,
    control: ScriptedControl,
    metrics: SourceMetrics,
}

/// Shared switchboard for a [`ScriptedSource`] that has been moved into a
/// running kiosk.
#[derive(Clone, Default)]
pub struct ScriptedControl {
    ready: Arc<AtomicBool>,
    deny_open: Arc<AtomicBool>,
    grabs: Arc<AtomicU64>,
    grab_size: Arc<Mutex<Option<(u32, u32)>>>,
}

impl ScriptedControl {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Make the next `open` fail the way a denied camera permission would.
    pub fn deny_open(&self) {
        self.deny_open.store(true, Ordering::SeqCst);
    }

    pub fn grabs(&self) -> u64 {
        self.grabs.load(Ordering::SeqCst)
    }

    /// Grab frames at `size` while `dimensions` keeps reporting the size
    /// the source was opened with. `None` goes back to the opened size.
    pub fn set_grab_size(&self, size: Option<(u32, u32)>) {
        *self.grab_size.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = size;
    }

    fn grab_size(&self) -> Option<(u32, u32)> {
        *self.grab_size.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ScriptedSource {
    pub fn new(width: u32, height: u32) -> (Self, ScriptedControl) {
        let control = ScriptedControl::default();
        (
            Self {
                width,
                height,
                opened: false,
                control: control.clone(),
                metrics: SourceMetrics::default(),
            },
            control,
        )
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn open(&mut self) -> Result<()> {
        if self.control.deny_open.load(Ordering::SeqCst) {
            return Err(capture_error("camera permission denied"));
        }
        info!("Scripted source opened {}x{}", self.width, self.height);
        self.opened = true;
        Ok(())
    }

    fn poll_ready(&mut self) -> bool {
        let ready = self.opened && self.control.ready.load(Ordering::SeqCst);
        if !ready {
            self.metrics.not_ready_polls += 1;
        }
        ready
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.opened.then_some((self.width, self.height))
    }

    async fn grab(&mut self) -> Result<ImageFrame> {
        if !self.opened {
            return Err(capture_error("scripted source is not open"));
        }
        self.metrics.frames_grabbed += 1;
        self.control.grabs.fetch_add(1, Ordering::SeqCst);
        let (width, height) = self.control.grab_size().unwrap_or((self.width, self.height));
        let pixels = (width as usize) * (height as usize);
        Ok(ImageFrame::from_rgba(
            width,
            height,
            [90u8, 120, 150, 255].repeat(pixels),
        ))
    }

    fn metrics(&self) -> SourceMetrics {
        self.metrics.clone()
    }
}
