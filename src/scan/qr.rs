//! QR codes carrying note payloads: encoding a payload into a module matrix that can be
//! printed or shown on screen, and a decoder for camera frames.

use anyhow::{anyhow, Result};
use qrcode::{Color, QrCode};

use super::{
    controller::{QrDecoder, QrHit},
    window::CameraFrame,
};

const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// Light margin, in modules, drawn around a rendered code.
pub const QUIET_ZONE: usize = 4;

/// Square module matrix of an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    width: usize,
    dark: Vec<bool>,
}

impl QrMatrix {
    pub fn encode(data: &str) -> Result<Self> {
        let code = QrCode::new(data.as_bytes())
            .map_err(|err| anyhow!("failed to encode QR code: {err}"))?;
        let dark = code
            .to_colors()
            .into_iter()
            .map(|color| color == Color::Dark)
            .collect();

        Ok(Self {
            width: code.width(),
            dark,
        })
    }

    /// Modules per side, quiet zone excluded.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.dark[y * self.width + x]
    }

    /// Pixels per side of the rendered code, quiet zone included.
    pub fn image_side(&self, module_px: u32) -> u32 {
        (self.width + 2 * QUIET_ZONE) as u32 * module_px.max(1)
    }

    /// Black on white, `module_px` pixels per module.
    pub fn render(&self, module_px: u32) -> CameraFrame {
        let side = self.image_side(module_px);
        let mut frame = CameraFrame {
            pixels: vec![255; (side * side) as usize],
            width: side,
            height: side,
        };
        self.paint(&mut frame, 0, 0, module_px);
        frame
    }

    /// Draws the code and its quiet zone into `frame` with the top-left corner at
    /// `(left, top)`. Whatever falls outside the frame is clipped.
    pub fn paint(&self, frame: &mut CameraFrame, left: u32, top: u32, module_px: u32) {
        let module_px = module_px.max(1);
        let side = self.image_side(module_px);

        for dy in 0..side {
            let y = top + dy;
            if y >= frame.height {
                break;
            }
            let my = (dy / module_px) as usize;

            for dx in 0..side {
                let x = left + dx;
                if x >= frame.width {
                    break;
                }
                let mx = (dx / module_px) as usize;
                let dark = mx >= QUIET_ZONE
                    && my >= QUIET_ZONE
                    && self.is_dark(mx - QUIET_ZONE, my - QUIET_ZONE);

                let index = y as usize * frame.width as usize + x as usize;
                if let Some(pixel) = frame.pixels.get_mut(index) {
                    *pixel = if dark { 0 } else { 255 };
                }
            }
        }
    }
}

/// Finds and decodes the first readable code in a luminance image. Reports the four
/// corners of the code as its location.
#[derive(Debug, Default, Clone, Copy)]
pub struct LumaQrDecoder;

impl QrDecoder for LumaQrDecoder {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<QrHit> {
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 || pixels.len() < w * h {
            return None;
        }

        let mut image =
            rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| pixels[y * w + x]);
        for grid in image.detect_grids() {
            match grid.decode() {
                Ok((_, text)) => {
                    let points = grid
                        .bounds
                        .iter()
                        .map(|corner| (corner.x as f32, corner.y as f32))
                        .collect();
                    return Some(QrHit::new(text).with_points(points));
                }
                Err(err) => {
                    log_debug!("found a code but could not read it: {err:?}");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteContent, Rgba};

    #[test]
    fn note_survives_a_rendered_code() {
        let content = NoteContent {
            text: "Buy milk".into(),
            font_color: Rgba::BLACK,
            background_color: Rgba::opaque(0xFF, 0xEE, 0x58),
            size: Some(1.5),
        };
        let code = content.to_qr().unwrap();
        let image = code.render(4);
        assert_eq!(image.width, code.image_side(4));

        let hit = LumaQrDecoder
            .decode(&image.pixels, image.width, image.height)
            .unwrap();
        assert_eq!(NoteContent::from_payload(&hit.text), content);
    }

    #[test]
    fn location_follows_the_painted_code() {
        let code = QrMatrix::encode("wifi: guest").unwrap();
        let mut frame = CameraFrame {
            pixels: vec![255; 640 * 480],
            width: 640,
            height: 480,
        };
        code.paint(&mut frame, 360, 40, 5);

        let hit = LumaQrDecoder
            .decode(&frame.pixels, frame.width, frame.height)
            .unwrap();
        assert_eq!(hit.text, "wifi: guest");

        let (cx, cy) = hit.center().unwrap();
        let half = code.image_side(5) as f32 / 2.0;
        assert!((cx - (360.0 + half)).abs() < 10.0, "x {cx}");
        assert!((cy - (40.0 + half)).abs() < 10.0, "y {cy}");
    }

    #[test]
    fn blank_frame_has_no_code() {
        let pixels = vec![255; 64 * 64];
        assert_eq!(LumaQrDecoder.decode(&pixels, 64, 64), None);
        assert_eq!(LumaQrDecoder.decode(&pixels[..10], 64, 64), None);
    }

    #[test]
    fn painting_clips_at_the_frame_edge() {
        let code = QrMatrix::encode("MEMO").unwrap();
        let mut frame = CameraFrame {
            pixels: vec![255; 50 * 50],
            width: 50,
            height: 50,
        };
        code.paint(&mut frame, 40, 40, 2);
        assert_eq!(frame.pixels.len(), 50 * 50);
        assert_eq!(frame.pixels[40 * 50 + 40], 255);
        // First finder module, just past the quiet zone.
        assert!(code.is_dark(0, 0));
        assert_eq!(frame.pixels[48 * 50 + 48], 0);
        assert!(!code.is_dark(code.width(), 0));
    }
}
