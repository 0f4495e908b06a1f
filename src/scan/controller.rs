use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::{
    geometry::ScreenPoint,
    session::queue::{Action, ActionSender},
};

use super::window::{CameraFrame, ScanMode, ScanSettings, ScanWindow};

const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_info, log_warn};

/// Decodes a QR code from a single-channel image. Runs on a blocking worker thread.
pub trait QrDecoder: Send + Sync + 'static {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<QrHit>;
}

/// A decoded code and where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct QrHit {
    pub text: String,
    /// Corner or finder points in pixels of the decoded image. May be empty when the
    /// decoder cannot locate the code.
    pub points: Vec<(f32, f32)>,
}

impl QrHit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            points: Vec::new(),
        }
    }

    pub fn with_points(mut self, points: Vec<(f32, f32)>) -> Self {
        self.points = points;
        self
    }

    /// Mean of `points`.
    pub fn center(&self) -> Option<(f32, f32)> {
        if self.points.is_empty() {
            return None;
        }
        let count = self.points.len() as f32;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        Some((sx / count, sy / count))
    }
}

/// Outcome of one scan. `text` is `None` when nothing was decoded; the event is still
/// delivered so the controller can re-arm.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub text: Option<String>,
    /// Screen point under the decoded code, or under the center of the scanned window when
    /// the decoder gave no location.
    pub screen_point: ScreenPoint,
}

/// Throttled QR scanning over camera frames.
///
/// At most one decode runs at a time. After a decode finishes the next one may start once
/// the mode's interval has elapsed. Payloads that already produced a note are remembered so
/// the same code is placed only once per session.
pub struct ScanController {
    mode: ScanMode,
    settings: ScanSettings,
    screen_width: f32,
    screen_height: f32,
    decoder: Arc<dyn QrDecoder>,
    runtime: Handle,
    completions: ActionSender,
    scanning: bool,
    next_scan_at: Option<Instant>,
    placed: HashSet<String>,
    cancel_token: CancellationToken,
}

impl ScanController {
    pub fn new(
        mode: ScanMode,
        screen_size: (f32, f32),
        decoder: Arc<dyn QrDecoder>,
        runtime: Handle,
        completions: ActionSender,
    ) -> Self {
        Self {
            mode,
            settings: ScanSettings::for_mode(mode),
            screen_width: screen_size.0,
            screen_height: screen_size.1,
            decoder,
            runtime,
            completions,
            scanning: false,
            next_scan_at: None,
            placed: HashSet::new(),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ScanMode) {
        if self.mode != mode {
            log_info!("scan mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        self.settings = ScanSettings::for_mode(mode);
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Starts a decode of `frame` unless one is running or the interval has not elapsed.
    /// Returns whether a decode was started.
    pub fn try_scan(&mut self, frame: CameraFrame, now: Instant) -> bool {
        if self.scanning {
            return false;
        }
        if let Some(next) = self.next_scan_at {
            if now < next {
                return false;
            }
        }

        let window = ScanWindow::for_frame(frame.width, frame.height, &self.settings);
        if window.output_width == 0 || window.output_height == 0 {
            log_warn!("camera frame {}x{} too small to scan", frame.width, frame.height);
            return false;
        }

        self.scanning = true;

        let (screen_width, screen_height) = (self.screen_width, self.screen_height);
        let decoder = self.decoder.clone();
        let completions = self.completions.clone();
        let token = self.cancel_token.clone();

        self.runtime.spawn(async move {
            let worker = tokio::task::spawn_blocking(move || {
                let pixels = window.extract(&frame.pixels)?;
                decoder.decode(&pixels, window.output_width, window.output_height)
            });

            let decoded = tokio::select! {
                _ = token.cancelled() => {
                    log_debug!("scan abandoned");
                    return;
                }
                decoded = worker => decoded,
            };

            let hit = match decoded {
                Ok(hit) => hit,
                Err(err) => {
                    log_warn!("QR decode worker failed: {err}");
                    None
                }
            };

            let (nx, ny) = hit
                .as_ref()
                .and_then(QrHit::center)
                .map(|(x, y)| window.to_normalized(x, y))
                .unwrap_or_else(|| window.center_normalized());
            let screen_point = ScreenPoint::new(nx * screen_width, ny * screen_height);

            log_debug!("scan finished: {:?} at {:?}", hit, screen_point);
            completions.send(Action::Scan(ScanEvent {
                text: hit.map(|hit| hit.text),
                screen_point,
            }));
        });

        true
    }

    /// Re-arms scanning after a completion has been applied.
    pub fn finish(&mut self, now: Instant) {
        self.scanning = false;
        self.next_scan_at = Some(now + self.settings.interval);
    }

    /// Abandons a running decode (its result is never delivered) and clears the cooldown.
    pub fn reset(&mut self) {
        self.cancel_token.cancel();
        self.cancel_token = CancellationToken::new();
        self.scanning = false;
        self.next_scan_at = None;
    }

    /// Time left before the next scan may start.
    pub fn cooldown(&self, now: Instant) -> Duration {
        self.next_scan_at
            .map(|next| next.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_placed(&self, text: &str) -> bool {
        self.placed.contains(text)
    }

    /// Returns false if `text` was already placed.
    pub fn mark_placed(&mut self, text: impl Into<String>) -> bool {
        self.placed.insert(text.into())
    }
}
