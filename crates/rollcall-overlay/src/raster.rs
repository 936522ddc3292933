use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use image::{Rgba, RgbaImage};
use rollcall_types::Result;
use tracing::debug;

use crate::{render_error, Color, DrawSurface, Rect};

/// Paints the overlay into an RGBA buffer so it can be composited or saved.
///
/// There is no glyph rasterizer here: label text is kept as placed strings
/// (`labels`) and only the rectangles are painted.
pub struct RasterSurface {
    image: RgbaImage,
    labels: Vec<(String, f32, f32)>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            labels: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn labels(&self) -> &[(String, f32, f32)] {
        &self.labels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.image.width() || y >= self.image.height() {
            return None;
        }
        let Rgba([r, g, b, a]) = *self.image.get_pixel(x, y);
        Some(Color { r, g, b, a })
    }

    /// Write the current overlay to `dir` as a timestamped PNG.
    pub fn save_png(&self, dir: &Path, seq: u64) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .map_err(|err| render_error(format!("failed to create snapshot dir {:?}: {err}", dir)))?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let path = dir.join(format!("overlay_{seq}_{timestamp}.png"));
        self.image
            .save(&path)
            .map_err(|err| render_error(format!("failed to save overlay: {err}")))?;
        Ok(path)
    }

    /// Pixel span `[start, end)` covered by `[from, to)`, clipped to `limit`.
    fn span(from: f32, to: f32, limit: u32) -> (u32, u32) {
        let start = from.round().clamp(0.0, limit as f32) as u32;
        let end = to.round().clamp(0.0, limit as f32) as u32;
        (start, end.max(start))
    }

    fn paint(&mut self, rect: Rect, color: Color) {
        if rect.is_empty() {
            return;
        }
        let (x0, x1) = Self::span(rect.x, rect.right(), self.image.width());
        let (y0, y1) = Self::span(rect.y, rect.bottom(), self.image.height());
        let pixel = Rgba([color.r, color.g, color.b, color.a]);
        for y in y0..y1 {
            for x in x0..x1 {
                self.image.put_pixel(x, y, pixel);
            }
        }
    }
}

impl DrawSurface for RasterSurface {
    fn clear(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
        self.labels.clear();
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        if rect.is_empty() {
            return;
        }
        // The stroke is centered on the rectangle's edges.
        let half = line_width / 2.0;
        let outer = Rect::new(
            rect.x - half,
            rect.y - half,
            rect.width + line_width,
            rect.height + line_width,
        );
        self.paint(Rect::new(outer.x, outer.y, outer.width, line_width), color);
        self.paint(
            Rect::new(outer.x, outer.bottom() - line_width, outer.width, line_width),
            color,
        );
        self.paint(Rect::new(outer.x, outer.y, line_width, outer.height), color);
        self.paint(
            Rect::new(outer.right() - line_width, outer.y, line_width, outer.height),
            color,
        );
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.paint(rect, color);
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, _color: Color, _font_px: f32) {
        debug!("Overlay label {:?} at ({}, {})", text, x, y);
        self.labels.push((text.to_string(), x, y));
    }
}
