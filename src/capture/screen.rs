//! Screen-region capture using GDI `BitBlt` from the desktop DC.

use image::{ImageBuffer, Rgba, RgbaImage};
use tracing::debug;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use super::ScreenCapture;
use crate::automation::config::RelativeRect;
use crate::error::{BotError, Result};

/// Captures regions of the primary screen.
#[derive(Debug, Default)]
pub struct ScreenRegionCapture;

impl ScreenRegionCapture {
    pub fn new() -> Self {
        Self
    }
}

/// Primary screen size in pixels.
pub fn screen_size() -> (u32, u32) {
    let width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
    let height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
    (width.max(0) as u32, height.max(0) as u32)
}

impl ScreenCapture for ScreenRegionCapture {
    fn capture(&mut self, region: &RelativeRect) -> Result<RgbaImage> {
        let (screen_w, screen_h) = screen_size();
        let (x, y, width, height) = region.to_pixels(screen_w, screen_h);
        if width == 0 || height == 0 {
            return Err(BotError::Capture(format!(
                "Region {:?} is empty on a {}x{} screen",
                region, screen_w, screen_h
            )));
        }
        debug!("Capturing {}x{} at ({}, {})", width, height, x, y);

        let mut bgra = vec![0u8; (width * height * 4) as usize];

        unsafe {
            let screen_dc = GetDC(HWND::default());
            if screen_dc.is_invalid() {
                return Err(BotError::Capture("GetDC failed".to_string()));
            }
            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, width as i32, height as i32);
            let previous = SelectObject(mem_dc, bitmap);

            let blit = BitBlt(
                mem_dc,
                0,
                0,
                width as i32,
                height as i32,
                screen_dc,
                x as i32,
                y as i32,
                SRCCOPY,
            );

            // Negative height requests a top-down DIB
            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    biHeight: -(height as i32),
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let lines = GetDIBits(
                mem_dc,
                bitmap,
                0,
                height,
                Some(bgra.as_mut_ptr() as *mut _),
                &mut info,
                DIB_RGB_COLORS,
            );

            SelectObject(mem_dc, previous);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(HWND::default(), screen_dc);

            blit.map_err(|e| BotError::Capture(format!("BitBlt failed: {}", e)))?;
            if lines == 0 {
                return Err(BotError::Capture("GetDIBits copied no lines".to_string()));
            }
        }

        // BGRA -> RGBA
        let img: RgbaImage = ImageBuffer::from_fn(width, height, |px, py| {
            let offset = ((py * width + px) * 4) as usize;
            Rgba([bgra[offset + 2], bgra[offset + 1], bgra[offset], 255])
        });
        Ok(img)
    }
}
