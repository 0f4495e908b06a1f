use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::{
    gesture::GestureConfig,
    models::{NoteContent, Rgba},
    scan::ScanMode,
    session::SessionConfig,
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// What a freshly tapped note looks like. Colors are `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteDefaults {
    pub text: String,
    pub font_color: String,
    pub background_color: String,
}

impl Default for NoteDefaults {
    fn default() -> Self {
        Self {
            text: "New note".into(),
            font_color: Rgba::WHITE.to_hex(),
            background_color: Rgba::BLACK.to_hex(),
        }
    }
}

impl NoteDefaults {
    /// Unparseable colors fall back to white on black.
    pub fn to_content(&self) -> NoteContent {
        let font_color = Rgba::parse_hex(&self.font_color).unwrap_or_else(|err| {
            log_warn!("bad default font color {:?}: {err:#}", self.font_color);
            Rgba::WHITE
        });
        let background_color = Rgba::parse_hex(&self.background_color).unwrap_or_else(|err| {
            log_warn!(
                "bad default background color {:?}: {err:#}",
                self.background_color
            );
            Rgba::BLACK
        });

        NoteContent {
            text: self.text.clone(),
            font_color,
            background_color,
            size: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub note_defaults: NoteDefaults,
    pub scan_mode: ScanMode,
    pub gesture: GestureConfig,
}

impl UserSettings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            gesture: self.gesture,
            default_content: self.note_defaults.to_content(),
        }
    }
}

/// User settings kept in a JSON file and written back on every update.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads `path`; a missing or unparseable file yields defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("ignoring unreadable settings {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> UserSettings {
        self.data.read().unwrap().clone()
    }

    pub fn session_config(&self) -> SessionConfig {
        self.data.read().unwrap().session_config()
    }

    pub fn note_defaults(&self) -> NoteDefaults {
        self.data.read().unwrap().note_defaults.clone()
    }

    pub fn update_note_defaults(&self, defaults: NoteDefaults) -> Result<()> {
        self.update(|settings| settings.note_defaults = defaults)
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.data.read().unwrap().scan_mode
    }

    pub fn set_scan_mode(&self, mode: ScanMode) -> Result<()> {
        self.update(|settings| settings.scan_mode = mode)
    }

    pub fn gesture(&self) -> GestureConfig {
        self.data.read().unwrap().gesture
    }

    pub fn update_gesture(&self, gesture: GestureConfig) -> Result<()> {
        self.update(|settings| settings.gesture = gesture)
    }

    fn update(&self, change: impl FnOnce(&mut UserSettings)) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        change(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    /// Re-reads the file, replacing the in-memory copy.
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", self.path.display()))?;
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }
}
