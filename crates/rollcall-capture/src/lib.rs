//! Frame sources feeding the capture loop, and still encoding.

use async_trait::async_trait;
use chrono::Utc;
use rollcall_types::{config::SourceConfig, vision::ImageFrame, Result, RollcallError};
use tracing::{debug, info};

mod dir;
mod encode;
mod scripted;

pub use dir::DirectorySource;
pub use encode::{decode_data_uri, encode_jpeg_data_uri};
pub use scripted::{ScriptedControl, ScriptedSource};

/// Counters a source keeps about its own behaviour.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceMetrics {
    pub frames_grabbed: u64,
    pub not_ready_polls: u64,
}

/// A live video feed that can be sampled for stills.
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the device. Failures here are terminal until the operator
    /// intervenes.
    async fn open(&mut self) -> Result<()>;

    /// Whether enough data is buffered to produce a frame right now.
    fn poll_ready(&mut self) -> bool;

    /// Pixel dimensions of the feed once known.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Grab the current picture. Only valid after `poll_ready` returned true.
    async fn grab(&mut self) -> Result<ImageFrame>;

    fn metrics(&self) -> SourceMetrics;
}

#[async_trait]
impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }

    fn poll_ready(&mut self) -> bool {
        (**self).poll_ready()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        (**self).dimensions()
    }

    async fn grab(&mut self) -> Result<ImageFrame> {
        (**self).grab().await
    }

    fn metrics(&self) -> SourceMetrics {
        (**self).metrics()
    }
}

/// Generates a moving test pattern; used for demos and when no camera is
/// attached.
pub struct SyntheticSource {
    config: SourceConfig,
    opened: bool,
    warmup_remaining: u32,
    tick: u64,
    metrics: SourceMetrics,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        let warmup_remaining = config.warmup_ticks;
        Self {
            config,
            opened: false,
            warmup_remaining,
            tick: 0,
            metrics: SourceMetrics::default(),
        }
    }

    fn render_pattern(&self) -> Vec<u8> {
        let (width, height) = (self.config.width, self.config.height);
        let mut data = Vec::with_capacity((width as usize) * (height as usize) * 4);
        let block = (width.min(height) / 4).max(1);
        let span = width.saturating_sub(block).max(1) as u64;
        let block_x = ((self.tick * 8) % span) as u32;
        let block_y = height.saturating_sub(block) / 2;
        for y in 0..height {
            for x in 0..width {
                let inside = (block_x..block_x + block).contains(&x)
                    && (block_y..block_y + block).contains(&y);
                if inside {
                    data.extend_from_slice(&[240, 240, 240, 255]);
                } else {
                    let r = (x * 255 / width.max(1)) as u8;
                    let g = (y * 255 / height.max(1)) as u8;
                    data.extend_from_slice(&[r, g, 96, 255]);
                }
            }
        }
        data
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn open(&mut self) -> Result<()> {
        info!(
            "Opening synthetic source {}x{}",
            self.config.width, self.config.height
        );
        self.opened = true;
        Ok(())
    }

    fn poll_ready(&mut self) -> bool {
        if !self.opened {
            self.metrics.not_ready_polls += 1;
            return false;
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            self.metrics.not_ready_polls += 1;
            return false;
        }
        true
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.opened.then_some((self.config.width, self.config.height))
    }

    async fn grab(&mut self) -> Result<ImageFrame> {
        if !self.opened {
            return Err(capture_error("synthetic source is not open"));
        }
        let data = self.render_pattern();
        self.tick += 1;
        self.metrics.frames_grabbed += 1;
        debug!("Synthetic frame {}", self.tick);
        Ok(ImageFrame {
            width: self.config.width,
            height: self.config.height,
            data,
            captured_at: Utc::now(),
        })
    }

    fn metrics(&self) -> SourceMetrics {
        self.metrics.clone()
    }
}

/// Generate an error aligned with capture semantics.
pub fn capture_error(message: impl Into<String>) -> RollcallError {
    RollcallError::Capture(message.into())
}
