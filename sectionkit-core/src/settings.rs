//! Section settings record shared by every rendered section.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::ErrorKind;
use std::path::Path;

/// Flat key/value settings handed to section templates as `section.settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionSettings(Map<String, Value>);

impl SectionSettings {
    /// Record used whenever the settings file is missing or unusable
    pub fn defaults() -> Self {
        let defaults = [
            ("bg_color", json!("#ffffff")),
            ("droplet_light", json!("#ffffff")),
            ("droplet_mid", json!("#6b6b6b")),
            ("droplet_dark", json!("#2c2c2c")),
            ("ocean_color", json!("#2c2c2c")),
            ("anim_duration", json!(2)),
            ("show_droplet", json!(true)),
            ("show_ripple", json!(true)),
        ];

        Self(
            defaults
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }

    /// Parse a settings document. Only a top-level JSON object is accepted.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Load settings from `path`, falling back to [`SectionSettings::defaults`]
    /// on any read or parse failure. Never fails.
    pub async fn load(path: &Path) -> Self {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("No settings at {:?}; using defaults", path);
                return Self::defaults();
            }
            Err(err) => {
                tracing::warn!("Failed to read settings {:?}: {}; using defaults", path, err);
                return Self::defaults();
            }
        };

        match Self::from_json_str(&raw) {
            Ok(settings) => {
                tracing::debug!("Loaded {} settings from {:?}", settings.len(), path);
                settings
            }
            Err(err) => {
                tracing::warn!("Invalid settings in {:?}: {}; using defaults", path, err);
                Self::defaults()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}
