use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};

/// Small crops are enlarged before OCR; Tesseract does poorly under ~30px glyphs.
const UPSCALE_FACTOR: u32 = 2;

/// Converts image to binary by keeping only bright pixels.
///
/// Pixels where R > threshold AND G > threshold AND B > threshold become black (text).
/// All other pixels become white (background).
pub fn threshold_bright_pixels(
    img: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    threshold: u8,
) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel[0] > threshold && pixel[1] > threshold && pixel[2] > threshold {
            0u8
        } else {
            255u8
        };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Grayscale (or thresholded) and upscaled copy of a captured region.
pub fn prepare_for_ocr(img: &RgbaImage, threshold: Option<u8>) -> GrayImage {
    let gray = match threshold {
        Some(t) => threshold_bright_pixels(img, t),
        None => imageops::grayscale(img),
    };
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray;
    }
    imageops::resize(
        &gray,
        w * UPSCALE_FACTOR,
        h * UPSCALE_FACTOR,
        FilterType::CatmullRom,
    )
}
