use serde::{Deserialize, Serialize};

/// Label the recognition service uses for faces it could not match.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Box edges in source-frame pixel space. On the wire this is the
/// `[left, top, right, bottom]` array. The service does not guarantee
/// `right > left` or `bottom > top`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Horizontal extent, zero for inverted boxes.
    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    /// Vertical extent, zero for inverted boxes.
    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.left * factor,
            self.top * factor,
            self.right * factor,
            self.bottom * factor,
        )
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([left, top, right, bottom]: [f32; 4]) -> Self {
        Self::new(left, top, right, bottom)
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.left, b.top, b.right, b.bottom]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub name: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, name: impl Into<String>) -> Self {
        Self {
            bbox,
            name: name.into(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name.eq_ignore_ascii_case(UNKNOWN_LABEL)
    }
}

/// Detections for one frame, tagged with that frame's sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub seq: u64,
    pub detections: Vec<Detection>,
}

impl AnnotationSet {
    pub fn new(seq: u64, detections: Vec<Detection>) -> Self {
        Self { seq, detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn identified(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| !d.is_unknown())
    }
}
