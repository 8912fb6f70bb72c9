//! Image transcoding for generated images.

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use log::debug;

use crate::error::Result;

const JPEG_QUALITY: u8 = 85;

/// Re-encodes any image format the decoder understands as an RGB JPEG.
///
/// Alpha is dropped; JPEG has no transparency.
pub fn transcode_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)?;
    debug!(
        "Transcoding {}x{} image ({} bytes) to JPEG",
        decoded.width(),
        decoded.height(),
        bytes.len()
    );

    let rgb = decoded.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(jpeg)
}

/// Attachment name for an uploaded image.
pub fn image_filename() -> String {
    format!("generated_{}.jpg", Utc::now().timestamp())
}
