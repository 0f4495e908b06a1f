use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Focus scans a small centered crop at full resolution; wide scans the whole frame at
/// half resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanMode {
    Focus,
    Wide,
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Focus
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSettings {
    /// Fraction of each frame dimension kept around the center.
    pub crop_factor: f32,
    pub downscale: u32,
    /// Minimum time between the end of one scan and the start of the next.
    pub interval: Duration,
}

impl ScanSettings {
    pub fn for_mode(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Focus => Self {
                crop_factor: 0.4,
                downscale: 1,
                interval: Duration::from_millis(500),
            },
            ScanMode::Wide => Self {
                crop_factor: 1.0,
                downscale: 2,
                interval: Duration::from_millis(500),
            },
        }
    }
}

/// Single-channel luminance image from the camera.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Centered crop of a camera frame and the downscaled image handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub frame_width: u32,
    pub frame_height: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub downscale: u32,
    pub output_width: u32,
    pub output_height: u32,
}

impl ScanWindow {
    pub fn for_frame(frame_width: u32, frame_height: u32, settings: &ScanSettings) -> Self {
        let crop = settings.crop_factor.clamp(0.0, 1.0);
        let width = ((frame_width as f32 * crop) as u32).min(frame_width);
        let height = ((frame_height as f32 * crop) as u32).min(frame_height);
        let downscale = settings.downscale.max(1);

        Self {
            frame_width,
            frame_height,
            x: (frame_width - width) / 2,
            y: (frame_height - height) / 2,
            width,
            height,
            downscale,
            output_width: width / downscale,
            output_height: height / downscale,
        }
    }

    /// Crops and nearest-neighbour downsamples `pixels`. `None` if the buffer is smaller
    /// than the frame it claims to be.
    pub fn extract(&self, pixels: &[u8]) -> Option<Vec<u8>> {
        let stride = self.frame_width as usize;
        if pixels.len() < stride * self.frame_height as usize {
            return None;
        }

        let mut out = Vec::with_capacity((self.output_width * self.output_height) as usize);
        for oy in 0..self.output_height {
            let row = (self.y + oy * self.downscale) as usize * stride;
            for ox in 0..self.output_width {
                out.push(pixels[row + (self.x + ox * self.downscale) as usize]);
            }
        }
        Some(out)
    }

    /// Maps a pixel of the downscaled output back to normalized frame coordinates
    /// (origin top-left, same orientation as screen space).
    pub fn to_normalized(&self, output_x: f32, output_y: f32) -> (f32, f32) {
        let fx = output_x * self.downscale as f32 + self.x as f32;
        let fy = output_y * self.downscale as f32 + self.y as f32;
        (
            fx / self.frame_width.max(1) as f32,
            fy / self.frame_height.max(1) as f32,
        )
    }

    pub fn center_normalized(&self) -> (f32, f32) {
        self.to_normalized(
            self.output_width as f32 / 2.0,
            self.output_height as f32 / 2.0,
        )
    }
}
