// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and key is optional. A missing or unparsable file falls back
// to the defaults below, which reproduce the hardcoded settings of the
// fixed triangle renderer.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::RendererSettings;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub app: AppConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub assets: AssetConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
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
            title: "Hello Vulkan".to_string(),
            width: 800,
            height: 600,
            resizable: false,
        }
    }
}

/// Names advertised to the driver in the instance's application info
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub engine_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Hello Vulkan".to_string(),
            engine_name: "n/a".to_string(),
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 3,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
        }
    }
}

impl DebugConfig {
    /// Parse `log_level`, falling back to `Info` for unknown names
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// Where the precompiled SPIR-V shaders live
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub shader_root: PathBuf,
    pub vertex_shader: String,
    pub fragment_shader: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            shader_root: PathBuf::from("shaders"),
            vertex_shader: "vertex.spv".to_string(),
            fragment_shader: "fragment.spv".to_string(),
        }
    }
}

impl AssetConfig {
    pub fn vertex_path(&self) -> PathBuf {
        self.shader_root.join(&self.vertex_shader)
    }

    pub fn fragment_path(&self) -> PathBuf {
        self.shader_root.join(&self.fragment_shader)
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
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

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The subset of the configuration the bootstrap sequence consumes
    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            app_name: self.app.name.clone(),
            engine_name: self.app.engine_name.clone(),
            enable_validation: self.debug.validation_layers,
            vertex_shader: self.assets.vertex_path(),
            fragment_shader: self.assets.fragment_path(),
            max_frames_in_flight: self.graphics.max_frames_in_flight.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert!(!config.window.resizable);
        assert_eq!(config.graphics.max_frames_in_flight, 3);
        assert_eq!(config.assets.vertex_path(), Path::new("shaders/vertex.spv"));
        assert_eq!(config.assets.fragment_path(), Path::new("shaders/fragment.spv"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            title = "Triangle"

            [assets]
            shader_root = "/opt/game/spv"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Triangle");
        assert_eq!(config.window.width, 800);
        assert_eq!(
            config.assets.vertex_path(),
            Path::new("/opt/game/spv/vertex.spv")
        );
        assert_eq!(config.assets.fragment_shader, "fragment.spv");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::from_toml_str("[window\nwidth = ").is_err());
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut debug = DebugConfig::default();
        debug.log_level = "loud".to_string();
        assert_eq!(debug.level_filter(), log::LevelFilter::Info);

        debug.log_level = "trace".to_string();
        assert_eq!(debug.level_filter(), log::LevelFilter::Trace);
    }

    #[test]
    fn renderer_settings_never_allow_zero_frames_in_flight() {
        let mut config = Config::default();
        config.graphics.max_frames_in_flight = 0;
        let settings = config.renderer_settings();
        assert_eq!(settings.max_frames_in_flight, 1);
        assert_eq!(settings.app_name, "Hello Vulkan");
    }
}
