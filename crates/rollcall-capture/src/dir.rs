use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use rollcall_types::{config::SourceConfig, vision::ImageFrame, Result};
use tracing::{debug, info};

use crate::{capture_error, FrameSource, SourceMetrics};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Replays the still images of a directory as a looping video feed, scaled
/// to the configured dimensions.
pub struct DirectorySource {
    config: SourceConfig,
    directory: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    warmup_remaining: u32,
    metrics: SourceMetrics,
}

impl DirectorySource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let directory = config
            .directory
            .as_ref()
            .map(PathBuf::from)
            .ok_or_else(|| capture_error("directory source needs source.directory"))?;
        let warmup_remaining = config.warmup_ticks;
        Ok(Self {
            config,
            directory,
            files: Vec::new(),
            cursor: 0,
            warmup_remaining,
            metrics: SourceMetrics::default(),
        })
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl FrameSource for DirectorySource {
    async fn open(&mut self) -> Result<()> {
        info!("Opening directory source {:?}", self.directory);
        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|err| {
            capture_error(format!("cannot open frame directory {:?}: {err}", self.directory))
        })?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| capture_error(format!("cannot list {:?}: {err}", self.directory)))?
        {
            let path = entry.path();
            if Self::is_image(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(capture_error(format!(
                "no images found in {:?}",
                self.directory
            )));
        }
        files.sort();
        info!("Directory source has {} frames", files.len());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn poll_ready(&mut self) -> bool {
        if self.files.is_empty() || self.warmup_remaining > 0 {
            self.warmup_remaining = self.warmup_remaining.saturating_sub(1);
            self.metrics.not_ready_polls += 1;
            return false;
        }
        true
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        (!self.files.is_empty()).then_some((self.config.width, self.config.height))
    }

    async fn grab(&mut self) -> Result<ImageFrame> {
        let path = self
            .files
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| capture_error("directory source is not open"))?;
        self.cursor = (self.cursor + 1) % self.files.len();

        let raw = tokio::fs::read(&path)
            .await
            .map_err(|err| capture_error(format!("failed to read {:?}: {err}", path)))?;
        let decoded = image::load_from_memory(&raw)
            .map_err(|err| capture_error(format!("failed to decode {:?}: {err}", path)))?
            .to_rgba8();
        let (width, height) = (self.config.width, self.config.height);
        let rgba = if decoded.dimensions() == (width, height) {
            decoded
        } else {
            imageops::resize(&decoded, width, height, FilterType::Triangle)
        };
        self.metrics.frames_grabbed += 1;
        debug!("Directory frame {:?}", path);
        Ok(ImageFrame::from_rgba(width, height, rgba.into_raw()))
    }

    fn metrics(&self) -> SourceMetrics {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use rollcall_types::config::SourceKind;

    fn config(dir: &Path) -> SourceConfig {
        SourceConfig {
            kind: SourceKind::Directory,
            width: 8,
            height: 6,
            directory: Some(dir.display().to_string()),
            warmup_ticks: 0,
        }
    }

    #[tokio::test]
    async fn replays_images_scaled_to_configured_size() {
        let dir = std::env::temp_dir().join("rollcall-dir-source-test");
        std::fs::create_dir_all(&dir).expect("create dir");
        RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]))
            .save(dir.join("a.png"))
            .expect("write a.png");
        RgbaImage::from_pixel(8, 6, Rgba([200, 20, 30, 255]))
            .save(dir.join("b.png"))
            .expect("write b.png");
        std::fs::write(dir.join("notes.txt"), "ignored").expect("write notes");

        let mut source = DirectorySource::new(config(&dir)).expect("source");
        assert!(!source.poll_ready());
        source.open().await.expect("open");
        assert!(source.poll_ready());

        let first = source.grab().await.expect("first");
        let second = source.grab().await.expect("second");
        let third = source.grab().await.expect("wraps around");
        assert_eq!(first.dimensions(), (8, 6));
        assert_eq!(second.data[0], 200);
        assert_eq!(third.dimensions(), (8, 6));
        assert_eq!(source.metrics().frames_grabbed, 3);

        std::fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[tokio::test]
    async fn missing_directory_fails_to_open() {
        let dir = std::env::temp_dir().join("rollcall-dir-source-missing");
        let mut source = DirectorySource::new(config(&dir)).expect("source");
        assert!(source.open().await.is_err());
        assert_eq!(source.dimensions(), None);
    }
}
