//! Image encoding: `DynamicImage` → PNG bytes, and PNG bytes → base64 data URI.
//!
//! Cropped diagrams are handed to the caller as PNG because they are mostly
//! line art and printed labels, where JPEG ringing is worse than the extra
//! bytes. The data-URI form lets a caller embed a diagram straight into a
//! question record without a separate upload step.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Base64-encode PNG bytes.
pub fn png_base64(png: &[u8]) -> String {
    STANDARD.encode(png)
}

/// Wrap PNG bytes in a `data:image/png;base64,` URI.
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", png_base64(png))
}
