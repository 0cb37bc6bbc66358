use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::schedule::autosave::AutosaveSettings;
use crate::schedule::time::{default_off_markers, TimeParser};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Club server root, e.g. "https://club.example.com". Empty runs the offline demo.
    #[serde(default)]
    pub store_url: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_autosave_delay_ms")]
    pub autosave_delay_ms: u64,
    #[serde(default = "default_saved_flash_ms")]
    pub saved_flash_ms: u64,
    #[serde(default = "default_failed_flash_ms")]
    pub failed_flash_ms: u64,
    #[serde(default = "default_off_markers")]
    pub off_markers: Vec<String>,
    #[serde(default = "default_off_display")]
    pub off_display: String,
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
    #[serde(default)]
    pub last_month: Option<String>,
}

fn default_autosave_delay_ms() -> u64 {
    100
}

fn default_saved_flash_ms() -> u64 {
    900
}

fn default_failed_flash_ms() -> u64 {
    1200
}

fn default_off_display() -> String {
    "OFF".to_string()
}

fn default_font_scale() -> f32 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            session_token: None,
            autosave_delay_ms: default_autosave_delay_ms(),
            saved_flash_ms: default_saved_flash_ms(),
            failed_flash_ms: default_failed_flash_ms(),
            off_markers: default_off_markers(),
            off_display: default_off_display(),
            font_scale: default_font_scale(),
            last_month: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .context("Failed to read config file")?;
            let config = serde_json::from_str(&contents)
                .context("Failed to parse config file")?;
            info!(path = %config_path.display(), "loaded config");
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        Ok(())
    }

    /// Load, or fall back to defaults with a warning
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!("using default config: {:#}", e);
            Config::default()
        })
    }

    pub fn is_offline(&self) -> bool {
        self.store_url.trim().is_empty()
    }

    fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "shiftgrid", "shiftgrid")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.json"))
    }

    /// Store root without trailing slashes; `None` when unset
    pub fn base_url(&self) -> Option<String> {
        let url = self.store_url.trim().trim_end_matches('/');
        if url.is_empty() {
            return None;
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            Some(url.to_string())
        } else {
            Some(format!("https://{}", url))
        }
    }

    pub fn parser(&self) -> TimeParser {
        TimeParser::new(self.off_markers.as_slice(), &self.off_display)
    }

    pub fn autosave_settings(&self) -> AutosaveSettings {
        AutosaveSettings {
            delay: Duration::from_millis(self.autosave_delay_ms),
            saved_flash: Duration::from_millis(self.saved_flash_ms),
            failed_flash: Duration::from_millis(self.failed_flash_ms),
        }
    }
}
