use crate::error::{CaptureError, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Serialize an RGB image into an in-memory PNG stream.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    let mut png = Vec::new();

    PngEncoder::new(&mut png)
        .write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::EncodingFailure(format!("PNG encode: {e}")))?;

    tracing::debug!("Encoded {}x{} PNG ({} bytes)", width, height, png.len());
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    #[test]
    fn output_starts_with_png_signature() {
        let image = RgbImage::from_pixel(4, 3, Rgb([12, 34, 56]));
        let png = encode_png(&image).unwrap();
        assert_eq!(png[..8], PNG_SIGNATURE);
    }

    #[test]
    fn output_decodes_to_same_pixels() {
        let mut image = RgbImage::new(3, 2);
        image.put_pixel(2, 1, Rgb([255, 0, 7]));
        let png = encode_png(&image).unwrap();

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded, image);
    }
}
