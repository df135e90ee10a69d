use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::replace::PathReplacement;
use crate::view::{FilterSelection, SortKey};

/// Directory names skipped while scanning unless the user overrides them.
pub const DEFAULT_BLOCKED_PATTERNS: &[&str] = &[".*", "*.anim", "__pycache__"];

const LIBRARY_DIR: &str = "RigsLibrary";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no per-user configuration directory available")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub provider: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            model: None,
            api_key: None,
        }
    }
}

/// Search text, filters and sort order restored when the library reopens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub search_text: String,
    pub filters: FilterSelection,
    pub sort_key: SortKey,
    pub sort_ascending: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            filters: FilterSelection::default(),
            sort_key: SortKey::Name,
            sort_ascending: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowGeometry {
    pub floating: bool,
    pub position: Option<(i32, i32)>,
    pub size: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub path_replacements: Vec<PathReplacement>,
    pub blocked_patterns: Vec<String>,
    pub ai: AiSettings,
    pub view: ViewState,
    pub window: WindowGeometry,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path_replacements: Vec::new(),
            blocked_patterns: DEFAULT_BLOCKED_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
            ai: AiSettings::default(),
            view: ViewState::default(),
            window: WindowGeometry::default(),
        }
    }
}

impl Settings {
    pub fn read(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Reads settings, falling back to defaults when the file is missing or
    /// cannot be parsed.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::read(path).unwrap_or_else(|err| {
            log::error!("failed to load settings {}: {err}", path.display());
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// File locations of one library instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    pub root: PathBuf,
    pub database: PathBuf,
    pub blacklist: PathBuf,
    pub images: PathBuf,
    pub settings: PathBuf,
}

impl LibraryPaths {
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            database: root.join("rigs_database.json"),
            blacklist: root.join("blacklist.json"),
            images: root.join("images"),
            settings: root.join("settings.json"),
            root,
        }
    }

    /// `<config dir>/RigsLibrary`, created if needed.
    pub fn default_location() -> Result<Self, SettingsError> {
        let mut root = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        root.push(LIBRARY_DIR);
        let paths = Self::in_dir(root);
        paths.ensure_dirs()?;
        Ok(paths)
    }

    pub fn ensure_dirs(&self) -> Result<(), SettingsError> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(&self.images)?;
        Ok(())
    }
}
