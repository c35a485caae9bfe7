//! Image encoding: RGBA page buffer → PNG bytes.
//!
//! PNG is lossless; JPEG artefacts around glyph edges would survive the
//! inversion and sharpening steps and show up as noise in the revealed page.

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Encode a page buffer as PNG.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn encode_small_image() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[..4], b"\x89PNG");
        let decoded = image::load_from_memory(&png).expect("valid png").to_rgba8();
        assert_eq!(decoded.dimensions(), (10, 10));
        assert_eq!(*decoded.get_pixel(3, 3), Rgba([255, 0, 0, 255]));
    }
}
