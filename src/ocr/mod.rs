pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::TesseractEngine;
pub use extract::extract_price;
pub use setup::ensure_tesseract;

use image::RgbaImage;

use crate::error::Result;

/// Turns a captured bitmap into recognized text spans, in reading order.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, img: &RgbaImage) -> Result<Vec<String>>;
}

/// High-level function: bitmap → integer read from the last recognized span.
pub fn read_number(recognizer: &mut dyn TextRecognizer, img: &RgbaImage) -> Result<u64> {
    let spans = recognizer.recognize(img)?;
    extract_price(&spans)
}
