use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

use crate::overlay::DEFAULT_TEMPLATE;
use crate::resolver::HistoryWindow;

/// Environment override for the library location.
pub const DB_PATH_ENV: &str = "REKORDBOX_DB_PATH";

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// rekordbox `master.db` path (overrides the platform default).
    pub db_path: Option<PathBuf>,
    /// Database decryption key. Omit for unencrypted copies.
    pub key: Option<String>,
    /// Default history window.
    pub history: HistoryConfig,
    /// Overlay text output.
    pub overlay: OverlayConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub limit: usize,
    pub days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let window = HistoryWindow::default();
        Self {
            limit: window.limit,
            days: window.days,
        }
    }
}

impl HistoryConfig {
    pub fn window(&self) -> HistoryWindow {
        HistoryWindow::new(self.limit, self.days)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Name of the text source to update.
    pub source_name: String,
    /// Text template, e.g. `"{artist} - {title}"`.
    pub template: String,
    /// Where file-backed sources are written (defaults to the XDG data dir).
    pub output_dir: Option<PathBuf>,
    /// Seconds between polls in `watch`.
    pub refresh_secs: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            source_name: "NowPlaying".to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            output_dir: None,
            refresh_secs: 2,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/rbcast/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Locate rekordbox's library: `REKORDBOX_DB_PATH`, then the platform
/// install location (`%APPDATA%\Pioneer\rekordbox` on Windows,
/// `~/Library/Pioneer/rekordbox` on macOS). Only existing files qualify.
pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        log::warn!("{DB_PATH_ENV} points to missing file {}", path.display());
    }

    let base = BaseDirs::new()?;
    [
        base.config_dir().join("Pioneer").join("rekordbox").join("master.db"),
        base.home_dir()
            .join("Library")
            .join("Pioneer")
            .join("rekordbox")
            .join("master.db"),
    ]
    .into_iter()
    .find(|p| p.exists())
}

/// Resolve the default overlay output directory using XDG data directory.
pub fn default_output_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().join("overlay")
    } else {
        // Fallback: current directory
        PathBuf::from("overlay")
    }
}
