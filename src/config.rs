// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a missing file, a missing section or a
// missing key all fall back to working values.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{ShaderBundle, ShaderStage};
use crate::renderer::RendererOptions;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub shaders: ShaderConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Frame Loop".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub vertex_count: u32,
    pub instance_count: u32,
    pub dynamic_viewport: bool,
    /// Absent means wait forever.
    pub acquire_timeout_ms: Option<u64>,
    /// How many times the host rebuilds the renderer after losing the device.
    pub device_lost_retries: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [1.0, 1.0, 1.0, 1.0],
            vertex_count: 3,
            instance_count: 1,
            dynamic_viewport: true,
            acquire_timeout_ms: None,
            device_lost_retries: 1,
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

/// SPIR-V file per shader stage
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: Option<PathBuf>,
    pub tessellation_control: Option<PathBuf>,
    pub tessellation_evaluation: Option<PathBuf>,
    pub geometry: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: Some(PathBuf::from("shaders/triangle.vert.spv")),
            tessellation_control: None,
            tessellation_evaluation: None,
            geometry: None,
            fragment: Some(PathBuf::from("shaders/triangle.frag.spv")),
        }
    }
}

impl ShaderConfig {
    pub fn path(&self, stage: ShaderStage) -> Option<&Path> {
        match stage {
            ShaderStage::Vertex => self.vertex.as_deref(),
            ShaderStage::TessellationControl => self.tessellation_control.as_deref(),
            ShaderStage::TessellationEvaluation => self.tessellation_evaluation.as_deref(),
            ShaderStage::Geometry => self.geometry.as_deref(),
            ShaderStage::Fragment => self.fragment.as_deref(),
        }
    }

    /// Read and validate every configured stage.
    pub fn load_bundle(&self) -> Result<ShaderBundle> {
        let mut bundle = ShaderBundle::new();
        for stage in ShaderStage::ALL {
            if let Some(path) = self.path(stage) {
                bundle
                    .load(stage, path)
                    .with_context(|| format!("Failed to load {:?} shader", stage))?;
            }
        }
        Ok(bundle)
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

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn renderer_options(&self) -> RendererOptions {
        RendererOptions {
            app_name: self.window.title.clone(),
            validation: self.debug.validation_layers,
            present_mode: self.present_mode(),
            clear_color: self.graphics.clear_color,
            vertex_count: self.graphics.vertex_count,
            instance_count: self.graphics.instance_count,
            dynamic_viewport: self.graphics.dynamic_viewport,
            acquire_timeout: self.graphics.acquire_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.graphics.vertex_count, 3);
        assert_eq!(config.graphics.instance_count, 1);
        assert_eq!(config.graphics.clear_color, [1.0; 4]);
        assert!(config.graphics.dynamic_viewport);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert!(config.shaders.vertex.is_some());
        assert!(config.shaders.geometry.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Demo"

            [graphics]
            present_mode = "Mailbox"
            instance_count = 4
            acquire_timeout_ms = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Demo");
        assert_eq!(config.window.height, 720);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);

        let options = config.renderer_options();
        assert_eq!(options.app_name, "Demo");
        assert_eq!(options.instance_count, 4);
        assert_eq!(options.vertex_count, 3);
        assert_eq!(options.acquire_timeout, Some(Duration::from_millis(16)));
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config = Config::parse("[graphics]\npresent_mode = \"vsync-ish\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn static_viewport_and_extra_stages() {
        let config = Config::parse(
            r#"
            [graphics]
            dynamic_viewport = false

            [shaders]
            geometry = "shaders/expand.geom.spv"
            "#,
        )
        .unwrap();

        assert!(!config.renderer_options().dynamic_viewport);
        assert_eq!(
            config.shaders.path(ShaderStage::Geometry),
            Some(Path::new("shaders/expand.geom.spv"))
        );
        assert!(config.shaders.path(ShaderStage::Fragment).is_some());
    }

    #[test]
    fn log_level_parses_or_defaults() {
        let config = Config::parse("[debug]\nlog_level = \"debug\"").unwrap();
        assert_eq!(config.log_level(), log::LevelFilter::Debug);

        let config = Config::parse("[debug]\nlog_level = \"chatty\"").unwrap();
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::parse("[graphics]\nvertex_count = \"three\"").is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = Config::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config.graphics.device_lost_retries, 1);
    }

    #[test]
    fn missing_shader_file_fails_bundle_load() {
        let config = Config::parse("[shaders]\nvertex = \"nope.spv\"\nfragment = \"nope.spv\"").unwrap();
        let err = config.shaders.load_bundle().unwrap_err();
        assert!(format!("{:#}", err).contains("Vertex"));
    }
}
