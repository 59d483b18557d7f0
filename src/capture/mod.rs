//! Screen capture of normalized screen regions.
//!
//! This module provides:
//! - The `ScreenCapture` trait the marketplace reads through
//! - A GDI screen-region capture on Windows (`ScreenRegionCapture`)
//! - `DebugCapture`, which saves every capture to disk

pub mod debug;
#[cfg(windows)]
pub mod screen;

pub use debug::DebugCapture;
#[cfg(windows)]
pub use screen::ScreenRegionCapture;

use image::RgbaImage;

use crate::automation::config::RelativeRect;
use crate::error::Result;

/// Returns the pixels of a screen region given as fractions of the screen size.
pub trait ScreenCapture: Send {
    fn capture(&mut self, region: &RelativeRect) -> Result<RgbaImage>;
}
