use crate::domain::platform::{PlatformDevice, TYPED_PAYLOAD_VERSION};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

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
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
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
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// Advertisement watcher scanning mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanningMode {
    #[default]
    Active,
    Passive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// How long the binary keeps discovery running before stopping it
    #[serde(default = "default_scan_duration_secs")]
    pub scan_duration_secs: u64,
    #[serde(default)]
    pub scanning_mode: ScanningMode,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            scan_duration_secs: default_scan_duration_secs(),
            scanning_mode: ScanningMode::default(),
        }
    }
}

/// Scripted platform used when no native backend is available
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_platform_version")]
    pub platform_version: u32,
    #[serde(default = "default_bonded_devices")]
    pub bonded_devices: Vec<PlatformDevice>,
    #[serde(default = "default_advertising_devices")]
    pub advertising_devices: Vec<PlatformDevice>,
    #[serde(default = "default_advertising_interval_ms")]
    pub advertising_interval_ms: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            platform_version: default_platform_version(),
            bonded_devices: default_bonded_devices(),
            advertising_devices: default_advertising_devices(),
            advertising_interval_ms: default_advertising_interval_ms(),
        }
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
    "bluetooth_discovery".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_scan_duration_secs() -> u64 {
    12
}
fn default_platform_version() -> u32 {
    TYPED_PAYLOAD_VERSION
}
fn default_bonded_devices() -> Vec<PlatformDevice> {
    vec![PlatformDevice::new(Some("Desk Keyboard"), "DC:2C:26:0A:11:7F")]
}
fn default_advertising_devices() -> Vec<PlatformDevice> {
    vec![
        PlatformDevice::new(Some("Living Room Speaker"), "00:1A:7D:DA:71:13"),
        PlatformDevice::new(None, "5C:F3:70:8B:02:E4"),
        PlatformDevice::new(Some("Fitness Band"), "C4:7C:8D:6A:3E:90"),
    ]
}
fn default_advertising_interval_ms() -> u64 {
    750
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load settings from the user's config directory, writing defaults on first run
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::with_path(settings_path)
    }

    pub fn with_path(settings_path: PathBuf) -> anyhow::Result<Self> {
        let exists = settings_path.exists();
        let settings = if exists {
            Self::load_from_file(&settings_path).unwrap_or_default()
        } else {
            Settings::default()
        };

        let service = Self {
            settings,
            settings_path,
        };
        if !exists {
            service.save()?;
        }
        Ok(service)
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BluetoothDiscovery");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
