// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Only the driver's collaborators are configurable (diagnostics, shader
// locations). Window title and size are fixed.
// Provides sensible defaults if config file is missing or has errors.
//
// Relative paths (config.toml itself, the shader binaries) are looked up next
// to the executable first, then in the working directory, then in the crate
// directory, so the binary can be launched from anywhere.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub debug: DebugConfig,
    pub shaders: ShaderConfig,
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
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

/// Where the compiled SPIR-V lives
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

impl Config {
    /// Load config.toml, falling back to defaults.
    ///
    /// Runs before logging is up, so a broken file is handed back to the
    /// caller instead of being logged here.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default(resource_path("config.toml"))
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path. A missing file gives defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Shader binary locations, resolved the same way as config.toml
    pub fn shader_paths(&self) -> (PathBuf, PathBuf) {
        (
            resource_path(&self.shaders.vertex),
            resource_path(&self.shaders.fragment),
        )
    }

    /// Log level as a filter for env_logger
    pub fn log_filter(&self) -> LevelFilter {
        match self.debug.log_level.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            other => {
                // Logging is not up yet when this runs, so say it on stderr
                eprintln!("Unknown log level '{}', defaulting to info", other);
                LevelFilter::Info
            }
        }
    }

    /// Validation layers are a debug-build feature only
    pub fn enable_validation(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}

/// Resolve a packaged resource: executable directory, working directory,
/// then the crate directory.
pub fn resource_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut bases = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        bases.push(dir);
    }
    if let Ok(dir) = std::env::current_dir() {
        bases.push(dir);
    }
    bases.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")));

    resolve_against(path.as_ref(), &bases)
}

/// First base that actually contains `path`. Absolute paths and paths found
/// nowhere come back unchanged, so the eventual read error names them.
fn resolve_against(path: &Path, bases: &[PathBuf]) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    bases
        .iter()
        .map(|base| base.join(path))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}
