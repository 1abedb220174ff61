use crate::domain::models::FanPreset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR_NAME: &str = "AquarisControl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Local socket the transport service listens on
    #[serde(default = "default_socket_name")]
    pub socket_name: String,
    #[serde(default = "default_connect_wait_ms")]
    pub connect_wait_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            socket_name: default_socket_name(),
            connect_wait_ms: default_connect_wait_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub transport: TransportSettings,

    // Orchestrator timing
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_repeat_interval_ms")]
    pub repeat_interval_ms: u64,

    // Controls
    #[serde(default = "default_nudge_step")]
    pub nudge_step: i64,
    #[serde(default = "default_fan_presets")]
    pub fan_presets: Vec<FanPreset>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            transport: TransportSettings::default(),
            poll_interval_ms: default_poll_interval_ms(),
            repeat_interval_ms: default_repeat_interval_ms(),
            nudge_step: default_nudge_step(),
            fan_presets: default_fan_presets(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "aquaris_control".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_socket_name() -> String {
    "@aquaris_transport".to_string()
}
fn default_connect_wait_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    3000
}
fn default_repeat_interval_ms() -> u64 {
    200
}
fn default_nudge_step() -> i64 {
    5
}
fn default_fan_presets() -> Vec<FanPreset> {
    vec![
        FanPreset::new("slow", "Slow", 50),
        FanPreset::new("medium", "Medium", 65),
        FanPreset::new("fast", "Fast", 80),
    ]
}

/// Platform config directory for this application, created on demand
pub fn app_config_dir() -> anyhow::Result<PathBuf> {
    let mut path = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_DIR_NAME);
    fs::create_dir_all(&path)?;
    Ok(path)
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = app_config_dir()?.join("settings.json");
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}
