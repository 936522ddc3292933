use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, ColorType, DynamicImage, RgbaImage};
use rollcall_types::vision::{EncodedStill, ImageFrame};
use rollcall_types::Result;

use crate::capture_error;

const JPEG_PREFIX: &str = "data:image/jpeg;base64,";

/// Compress a frame into a JPEG `data:` URI.
pub fn encode_jpeg_data_uri(frame: &ImageFrame, quality: u8) -> Result<EncodedStill> {
    if !frame.is_well_formed() {
        return Err(capture_error(format!(
            "frame buffer does not match {}x{}",
            frame.width, frame.height
        )));
    }
    let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| capture_error("failed to build image buffer"))?;
    let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode(rgb.as_raw(), frame.width, frame.height, ColorType::Rgb8)
        .map_err(|err| capture_error(format!("jpeg encoding failed: {err}")))?;

    let mut data_uri = String::with_capacity(JPEG_PREFIX.len() + bytes.len() * 4 / 3 + 4);
    data_uri.push_str(JPEG_PREFIX);
    BASE64_STANDARD.encode_string(&bytes, &mut data_uri);
    Ok(EncodedStill {
        data_uri,
        width: frame.width,
        height: frame.height,
    })
}

/// Decode any base64 image `data:` URI back into an RGBA frame.
pub fn decode_data_uri(data_uri: &str) -> Result<ImageFrame> {
    let (header, payload) = data_uri
        .split_once(',')
        .ok_or_else(|| capture_error("data URI has no payload"))?;
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(capture_error(format!("unsupported data URI header: {header}")));
    }
    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|err| capture_error(format!("invalid base64 payload: {err}")))?;
    let rgba = image::load_from_memory(&bytes)
        .map_err(|err| capture_error(format!("image decoding failed: {err}")))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImageFrame::from_rgba(width, height, rgba.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_still_decodes_at_same_dimensions() {
        let frame = ImageFrame::from_rgba(16, 8, vec![128; 16 * 8 * 4]);
        let still = encode_jpeg_data_uri(&frame, 80).expect("encode");
        assert!(still.data_uri.starts_with("data:image/jpeg;base64,"));
        assert_eq!(still.dimensions(), (16, 8));

        let decoded = decode_data_uri(&still.data_uri).expect("decode");
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[test]
    fn malformed_frames_and_uris_are_rejected() {
        let frame = ImageFrame::from_rgba(4, 4, vec![0; 3]);
        assert!(encode_jpeg_data_uri(&frame, 80).is_err());
        assert!(decode_data_uri("not a uri").is_err());
        assert!(decode_data_uri("data:text/plain;base64,AAAA").is_err());
        assert!(decode_data_uri("data:image/jpeg;base64,!!!").is_err());
    }
}
