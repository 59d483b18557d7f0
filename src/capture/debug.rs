use chrono::Local;
use image::RgbaImage;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::ScreenCapture;
use crate::automation::config::RelativeRect;
use crate::error::Result;

/// Wraps a capture source and saves every region it returns as a PNG.
///
/// Save failures are logged and never fail the capture itself.
pub struct DebugCapture<C> {
    inner: C,
    dir: PathBuf,
    counter: u32,
}

impl<C: ScreenCapture> DebugCapture<C> {
    pub fn new(inner: C, dir: PathBuf) -> Self {
        Self {
            inner,
            dir,
            counter: 0,
        }
    }
}

impl<C: ScreenCapture> ScreenCapture for DebugCapture<C> {
    fn capture(&mut self, region: &RelativeRect) -> Result<RgbaImage> {
        let img = self.inner.capture(region)?;

        self.counter += 1;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .dir
            .join(format!("region_{}_{:05}.png", timestamp, self.counter));
        match img.save(&path) {
            Ok(()) => debug!("Saved capture to {}", path.display()),
            Err(e) => warn!("Failed to save capture {}: {}", path.display(), e),
        }

        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use tempfile::tempdir;

    struct SolidCapture;

    impl ScreenCapture for SolidCapture {
        fn capture(&mut self, _region: &RelativeRect) -> Result<RgbaImage> {
            Ok(ImageBuffer::from_pixel(4, 2, Rgba([1, 2, 3, 255])))
        }
    }

    #[test]
    fn test_debug_capture_saves_and_passes_through() {
        let dir = tempdir().unwrap();
        let mut capture = DebugCapture::new(SolidCapture, dir.path().to_path_buf());

        let img = capture.capture(&RelativeRect::default()).unwrap();
        capture.capture(&RelativeRect::default()).unwrap();

        assert_eq!(img.dimensions(), (4, 2));
        let saved = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(saved, 2);
    }

    #[test]
    fn test_debug_capture_ignores_save_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does").join("not").join("exist");
        let mut capture = DebugCapture::new(SolidCapture, missing);

        assert!(capture.capture(&RelativeRect::default()).is_ok());
    }
}
