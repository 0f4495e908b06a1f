//! Note content and its persisted payload.
//!
//! The payload is a small versioned JSON object, the same one a QR code carries:
//! `{"v":1,"txt":"...","fc":"#FFFFFF","bc":"#000000","sz":1.0}`. Anything that does not
//! parse as that object is treated as plain text so older records and hand-written QR codes
//! still produce a note.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const ENABLE_LOGS: bool = true;

use crate::{log_warn, scan::QrMatrix};

pub const PAYLOAD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA` (the leading `#` is optional).
    pub fn parse_hex(value: &str) -> Result<Self> {
        let digits = value.trim().trim_start_matches('#');
        if !digits.is_ascii() || (digits.len() != 6 && digits.len() != 8) {
            return Err(anyhow!("invalid color '{value}'"));
        }

        let channel = |index: usize| {
            u8::from_str_radix(&digits[index..index + 2], 16)
                .with_context(|| format!("invalid color '{value}'"))
        };

        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if digits.len() == 8 { channel(6)? } else { 255 },
        })
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

/// What a note displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteContent {
    pub text: String,
    pub font_color: Rgba,
    pub background_color: Rgba,
    /// Initial uniform scale requested by the payload, if any.
    pub size: Option<f32>,
}

impl Default for NoteContent {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_color: Rgba::WHITE,
            background_color: Rgba::BLACK,
            size: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NotePayload {
    #[serde(default = "payload_version")]
    v: u32,
    #[serde(default)]
    txt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sz: Option<f32>,
}

fn payload_version() -> u32 {
    PAYLOAD_VERSION
}

impl NoteContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn to_payload(&self) -> Result<String> {
        let payload = NotePayload {
            v: PAYLOAD_VERSION,
            txt: self.text.clone(),
            fc: Some(self.font_color.to_hex()),
            bc: Some(self.background_color.to_hex()),
            sz: self.size,
        };
        serde_json::to_string(&payload).context("failed to serialize note payload")
    }

    /// QR code of [`NoteContent::to_payload`]; scanning it places a note with this content.
    pub fn to_qr(&self) -> Result<QrMatrix> {
        QrMatrix::encode(&self.to_payload()?)
    }

    /// Never fails: malformed payloads degrade to plain text, bad colors to defaults.
    pub fn from_payload(raw: &str) -> Self {
        let payload: NotePayload = match serde_json::from_str(raw) {
            Ok(payload) => payload,
            Err(_) => return Self::plain(raw),
        };

        if payload.v > PAYLOAD_VERSION {
            log_warn!(
                "note payload version {} is newer than supported ({}); reading best effort",
                payload.v,
                PAYLOAD_VERSION
            );
        }

        let color_or = |value: Option<String>, fallback: Rgba| match value {
            Some(hex) => Rgba::parse_hex(&hex).unwrap_or_else(|err| {
                log_warn!("{err:#}; using default");
                fallback
            }),
            None => fallback,
        };

        Self {
            text: payload.txt,
            font_color: color_or(payload.fc, Rgba::WHITE),
            background_color: color_or(payload.bc, Rgba::BLACK),
            size: payload.sz.filter(|size| size.is_finite() && *size > 0.0),
        }
    }
}
