//! Overlay rendering of annotation sets onto a drawing surface.
//!
//! Every render is a total redraw: the surface is cleared first and each
//! detection is drawn as a stroked box, a filled label plate anchored on the
//! box's bottom edge, and the label text.

use rollcall_types::{
    annotation::{AnnotationSet, Detection},
    RollcallError,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

mod raster;

pub use raster::RasterSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const LIME: Color = Color::rgb(0, 255, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };
}

/// Axis-aligned rectangle in surface pixels. Width and height are never
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Rectangle spanning two corners; inverted corners collapse to zero area.
    pub fn from_edges(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Coordinate space an overlay is drawn for: the source frame's pixel
/// dimensions and the factor the display applies to them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scale: 1.0,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Surface size in display pixels.
    pub fn surface_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.scale).round() as u32,
            (self.height as f32 * self.scale).round() as u32,
        )
    }
}

/// Primitive drawing target. Implementations clip anything outside their
/// bounds; none of the operations can fail.
pub trait DrawSurface {
    fn clear(&mut self, width: u32, height: u32);
    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color, font_px: f32);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    Clear {
        width: u32,
        height: u32,
    },
    StrokeRect {
        rect: Rect,
        color: Color,
        line_width: f32,
    },
    FillRect {
        rect: Rect,
        color: Color,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        color: Color,
        font_px: f32,
    },
}

/// Surface that keeps the commands of the latest redraw.
#[derive(Debug, Clone, Default)]
pub struct SceneRecorder {
    commands: Vec<DrawCommand>,
}

impl SceneRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn filled_rects(&self) -> impl Iterator<Item = (&Rect, &Color)> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DrawCommand::FillRect { rect, color } => Some((rect, color)),
            _ => None,
        })
    }

    pub fn stroked_rects(&self) -> impl Iterator<Item = (&Rect, &Color)> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DrawCommand::StrokeRect { rect, color, .. } => Some((rect, color)),
            _ => None,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl DrawSurface for SceneRecorder {
    fn clear(&mut self, width: u32, height: u32) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear { width, height });
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            color,
            line_width,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color, font_px: f32) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            color,
            font_px,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OverlayStyle {
    identified: Color,
    unknown: Color,
    text: Color,
    line_width: f32,
    plate_height: f32,
    text_inset: f32,
    font_px: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            identified: Color::LIME,
            unknown: Color::RED,
            text: Color::BLACK,
            line_width: 2.0,
            plate_height: 25.0,
            text_inset: 6.0,
            font_px: 18.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    /// Clear `surface` and draw every detection of `set`.
    pub fn render<S: DrawSurface + ?Sized>(
        &self,
        surface: &mut S,
        set: &AnnotationSet,
        viewport: Viewport,
    ) {
        let (width, height) = viewport.surface_size();
        surface.clear(width, height);
        for detection in &set.detections {
            self.draw_detection(surface, detection, viewport.scale);
        }
        trace!(
            "Rendered {} detections for seq {} on {}x{}",
            set.detections.len(),
            set.seq,
            width,
            height
        );
    }

    fn draw_detection<S: DrawSurface + ?Sized>(
        &self,
        surface: &mut S,
        detection: &Detection,
        scale: f32,
    ) {
        let bbox = detection.bbox.scaled(scale);
        let color = if detection.is_unknown() {
            self.style.unknown
        } else {
            self.style.identified
        };

        let frame = Rect::from_edges(bbox.left, bbox.top, bbox.right, bbox.bottom);
        surface.stroke_rect(frame, color, self.style.line_width);

        // Inverted boxes keep a zero-area plate and no text.
        let plate_height = if frame.is_empty() {
            0.0
        } else {
            self.style.plate_height
        };
        let plate = Rect::new(
            bbox.left,
            bbox.bottom - self.style.plate_height,
            frame.width,
            plate_height,
        );
        surface.fill_rect(plate, color);

        if !frame.is_empty() {
            surface.fill_text(
                &detection.name,
                bbox.left + self.style.text_inset,
                bbox.bottom - self.style.text_inset,
                self.style.text,
                self.style.font_px,
            );
        }
    }
}

pub fn render_error(message: impl Into<String>) -> RollcallError {
    RollcallError::Render(message.into())
}
