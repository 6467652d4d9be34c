use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::preview::{DEFAULT_WORKERS, LARGE_SCALE, PreviewStore, RenderScales, SMALL_SCALE};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "citeview";

const MAX_WORKERS: usize = 16;
const MIN_SCALE: f32 = 0.05;
const MAX_SCALE: f32 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_render_workers")]
    pub render_workers: usize,

    #[serde(default = "default_small_scale")]
    pub small_scale: f32,

    #[serde(default = "default_large_scale")]
    pub large_scale: f32,

    /// Maximum ready previews kept in memory; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_render_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_small_scale() -> f32 {
    SMALL_SCALE
}

fn default_large_scale() -> f32 {
    LARGE_SCALE
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            render_workers: default_render_workers(),
            small_scale: default_small_scale(),
            large_scale: default_large_scale(),
            cache_capacity: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Clamp values into workable ranges
    pub fn normalize(&mut self) {
        self.render_workers = self.render_workers.clamp(1, MAX_WORKERS);
        self.small_scale = clamp_scale(self.small_scale, SMALL_SCALE);
        self.large_scale = clamp_scale(self.large_scale, LARGE_SCALE);
        self.fetch_timeout_secs = self.fetch_timeout_secs.max(1);
        self.cache_capacity = self.cache_capacity.filter(|&c| c > 0);
        if self.log_level.trim().is_empty() {
            self.log_level = default_log_level();
        }
    }

    #[must_use]
    pub fn scales(&self) -> RenderScales {
        RenderScales {
            small: self.small_scale,
            large: self.large_scale,
        }
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Cache store matching `cache_capacity`
    #[must_use]
    pub fn preview_store(&self) -> PreviewStore {
        match self.cache_capacity {
            Some(capacity) => PreviewStore::bounded(capacity),
            None => PreviewStore::unbounded(),
        }
    }

    /// `log_level` as a filter, defaulting to info
    #[must_use]
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level
            .trim()
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

fn clamp_scale(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value >= MIN_SCALE {
        value.min(MAX_SCALE)
    } else {
        fallback
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `explicit` or the preferred location.
///
/// Never fails: a missing file is created with defaults, an unreadable one is
/// logged and defaults are used.
pub fn load_settings(explicit: Option<&Path>) -> Settings {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match preferred_config_path() {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using default settings");
                return Settings::default();
            }
        },
    };

    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        save_settings_to_file(&settings, &path);
        return settings;
    }

    match load_settings_from_path(&path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e:#}");
            Settings::default()
        }
    }
}

pub fn load_settings_from_path(path: &Path) -> anyhow::Result<Settings> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read settings file {path:?}"))?;
    let mut settings: Settings = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file {path:?}"))?;
    debug!("Loaded settings from {path:?}");

    if settings.version < CURRENT_VERSION {
        migrate_settings(&mut settings);
        save_settings_to_file(&settings, path);
    }

    settings.normalize();
    Ok(settings)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("\n# Threads rendering page previews\n");
    content.push_str(&format!("render_workers: {}\n", settings.render_workers));
    content.push_str("\n# Scale factors for inline thumbnails and the full-size view\n");
    content.push_str(&format!("small_scale: {}\n", settings.small_scale));
    content.push_str(&format!("large_scale: {}\n", settings.large_scale));
    content.push_str("\n# Keep at most this many rendered previews (omit for no limit)\n");
    match settings.cache_capacity {
        Some(capacity) => content.push_str(&format!("cache_capacity: {capacity}\n")),
        None => content.push_str("# cache_capacity: 500\n"),
    }
    content.push_str("\n# Timeout for downloading cited documents\n");
    content.push_str(&format!(
        "fetch_timeout_secs: {}\n",
        settings.fetch_timeout_secs
    ));
    content.push_str("\n# off, error, warn, info, debug, trace\n");
    content.push_str(&format!("log_level: \"{}\"\n", settings.log_level));

    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let settings = load_settings(Some(&path));
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        let reloaded = load_settings_from_path(&path).unwrap();
        assert_eq!(reloaded, Settings::default());
    }

    #[test]
    fn partial_file_uses_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 1\ncache_capacity: 3\nrender_workers: 99\n").unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.cache_capacity, Some(3));
        assert_eq!(settings.render_workers, MAX_WORKERS);
        assert_eq!(settings.small_scale, SMALL_SCALE);
        assert_eq!(settings.large_scale, LARGE_SCALE);
    }

    #[test]
    fn round_trips_custom_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let settings = Settings {
            cache_capacity: Some(42),
            small_scale: 0.25,
            log_level: "debug".to_string(),
            ..Settings::default()
        };
        save_settings_to_file(&settings, &path);

        let reloaded = load_settings_from_path(&path).unwrap();
        assert_eq!(reloaded, settings);
        assert_eq!(reloaded.level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "render_workers: [not a number").unwrap();

        assert!(load_settings_from_path(&path).is_err());
        assert_eq!(load_settings(Some(&path)), Settings::default());
    }

    #[test]
    fn old_version_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\n").unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.version, CURRENT_VERSION);
        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains(&format!("version: {CURRENT_VERSION}")));
    }

    #[test]
    fn normalize_rejects_bad_scales() {
        let mut settings = Settings {
            small_scale: 0.0,
            large_scale: f32::NAN,
            render_workers: 0,
            fetch_timeout_secs: 0,
            cache_capacity: Some(0),
            log_level: " ".to_string(),
            ..Settings::default()
        };
        settings.normalize();
        assert_eq!(settings.small_scale, SMALL_SCALE);
        assert_eq!(settings.large_scale, LARGE_SCALE);
        assert_eq!(settings.render_workers, 1);
        assert_eq!(settings.fetch_timeout_secs, 1);
        assert_eq!(settings.cache_capacity, None);
        assert_eq!(settings.log_level, "info");
    }
}
