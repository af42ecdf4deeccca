// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Window size, validation layers and device requirements all come from here
// instead of being baked into the binary. Missing fields fall back to
// defaults, and so does a missing or broken config file.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub application: ApplicationConfig,
    pub debug: DebugConfig,
    pub device: DeviceConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
            resizable: false,
        }
    }
}

/// Names reported to the driver in VkApplicationInfo
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    pub engine_name: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Hello Triangle".to_string(),
            engine_name: "No Engine".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honoured in debug builds
    pub validation_layers: bool,
    pub layers: Vec<String>,
    pub list_extensions: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            list_extensions: true,
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vulkanize.log".to_string(),
        }
    }
}

/// GPU requirements
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Capabilities the chosen queue family must have
    pub queue_capabilities: Vec<String>,
    pub require_discrete_gpu: bool,
    pub require_geometry_shader: bool,
    pub queue_priority: f32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            queue_capabilities: vec!["graphics".to_string()],
            require_discrete_gpu: false,
            require_geometry_shader: false,
            queue_priority: 1.0,
        }
    }
}

impl Config {
    /// Load configuration from the path given on the command line (or
    /// config.toml), falling back to defaults on any error.
    ///
    /// Runs before logging is set up, so a fallback is returned as a warning
    /// for the caller to log instead of being logged here.
    pub fn load() -> (Self, Option<String>) {
        let path = std::env::args()
            .nth(1)
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Self::load_or_default(path)
    }

    /// Like `load_from_path`, but never fails
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<String>) {
        let path = path.as_ref();

        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (
                Config::default(),
                Some(format!("Failed to load {:?}: {:#}. Using defaults.", path, e)),
            ),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Validation is never enabled in release builds
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    pub fn log_level(&self) -> Result<log::LevelFilter> {
        self.debug
            .log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", self.debug.log_level))
    }

    /// Get required queue capabilities as Vulkan flags
    pub fn queue_flags(&self) -> vk::QueueFlags {
        let mut flags = vk::QueueFlags::empty();

        for name in &self.device.queue_capabilities {
            match name.to_lowercase().as_str() {
                "graphics" => flags |= vk::QueueFlags::GRAPHICS,
                "compute" => flags |= vk::QueueFlags::COMPUTE,
                "transfer" => flags |= vk::QueueFlags::TRANSFER,
                "sparse_binding" => flags |= vk::QueueFlags::SPARSE_BINDING,
                _ => log::warn!("Unknown queue capability '{}', ignoring", name),
            }
        }

        if flags.is_empty() {
            log::warn!("No usable queue capabilities configured, defaulting to graphics");
            flags = vk::QueueFlags::GRAPHICS;
        }

        flags
    }

    /// Priority in [0.0, 1.0]; NaN and infinities fall back to 1.0
    pub fn queue_priority(&self) -> f32 {
        let priority = self.device.queue_priority;

        if !priority.is_finite() {
            log::warn!("Queue priority {} is not finite, defaulting to 1.0", priority);
            return 1.0;
        }

        priority.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tutorial_constants() {
        let config = Config::default();
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert!(!config.window.resizable);
        assert_eq!(config.application.name, "Hello Triangle");
        assert_eq!(config.debug.layers, ["VK_LAYER_KHRONOS_validation"]);
        assert_eq!(config.queue_flags(), vk::QueueFlags::GRAPHICS);
        assert_eq!(config.queue_priority(), 1.0);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.window.title, "Vulkan");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[window]
width = 1024

[debug]
layers = ["VK_LAYER_A", "VK_LAYER_B"]
log_level = "debug"

[device]
queue_capabilities = ["Graphics", "compute"]
require_discrete_gpu = true
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.debug.layers, ["VK_LAYER_A", "VK_LAYER_B"]);
        assert_eq!(config.log_level().unwrap(), log::LevelFilter::Debug);
        assert!(config.device.require_discrete_gpu);
        assert!(!config.device.require_geometry_shader);
        assert_eq!(
            config.queue_flags(),
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[window\nwidth = ").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn unknown_capabilities_fall_back_to_graphics() {
        let mut config = Config::default();
        config.device.queue_capabilities = vec!["video".to_string()];
        assert_eq!(config.queue_flags(), vk::QueueFlags::GRAPHICS);

        config.device.queue_capabilities = vec!["video".to_string(), "transfer".to_string()];
        assert_eq!(config.queue_flags(), vk::QueueFlags::TRANSFER);
    }

    #[test]
    fn odd_values_are_sanitised() {
        let mut config = Config::default();
        config.device.queue_priority = 3.5;
        assert_eq!(config.queue_priority(), 1.0);
        config.device.queue_priority = -0.5;
        assert_eq!(config.queue_priority(), 0.0);
        config.debug.log_level = "chatty".to_string();
        assert!(config.log_level().is_err());
    }

    #[test]
    fn nan_priority_falls_back_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[device]\nqueue_priority = nan\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert!(config.device.queue_priority.is_nan());
        assert_eq!(config.queue_priority(), 1.0);

        let mut config = Config::default();
        config.device.queue_priority = f32::NEG_INFINITY;
        assert_eq!(config.queue_priority(), 1.0);
    }

    #[test]
    fn broken_file_falls_back_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[window]\nwidth = \"wide\"\n").unwrap();

        let (config, warning) = Config::load_or_default(&path);
        assert_eq!(config.window.width, 800);
        let warning = warning.expect("fallback should be reported");
        assert!(warning.contains("config.toml"));
        assert!(warning.contains("Using defaults"));

        let (_, warning) = Config::load_or_default(dir.path().join("absent.toml"));
        assert!(warning.is_none());
    }
}
