use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw still pulled from a frame source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    /// Raw RGBA pixel buffer, row-major.
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl ImageFrame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when the buffer length matches `width * height * 4`.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// One captured still with the sequence number assigned at capture time.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub image: ImageFrame,
}

impl Frame {
    pub fn new(seq: u64, image: ImageFrame) -> Self {
        Self { seq, image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// A compressed still carried as a `data:` URI, together with the pixel
/// dimensions it was encoded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedStill {
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

impl EncodedStill {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Media type between `data:` and the first `;` or `,`.
    pub fn media_type(&self) -> Option<&str> {
        let rest = self.data_uri.strip_prefix("data:")?;
        let end = rest.find([';', ','])?;
        Some(&rest[..end])
    }
}
